#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelConvolutionError {
    #[error("convolution requires a non-empty signal")]
    EmptySignal,
    #[error("convolution requires a non-empty kernel")]
    EmptyKernel,
    #[error("kernel weight must be finite at index {index}, got {value}")]
    NonFiniteKernel { index: usize, value: f64 },
}

/// Discrete linear convolution trimmed to the signal length.
///
/// The output is the centred slice of the full convolution, starting at
/// offset `(kernel.len() - 1) / 2`, so an odd symmetric kernel introduces no
/// shift.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Result<Vec<f64>, KernelConvolutionError> {
    if signal.is_empty() {
        return Err(KernelConvolutionError::EmptySignal);
    }
    if kernel.is_empty() {
        return Err(KernelConvolutionError::EmptyKernel);
    }
    if let Some((index, value)) = kernel
        .iter()
        .copied()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        return Err(KernelConvolutionError::NonFiniteKernel { index, value });
    }

    let offset = (kernel.len() - 1) / 2;
    let output = (0..signal.len())
        .map(|target| {
            // full[k] = sum_j signal[j] * kernel[k - j], with k = target + offset
            let k = target + offset;
            let j_min = k.saturating_sub(kernel.len() - 1);
            let j_max = k.min(signal.len() - 1);
            (j_min..=j_max)
                .map(|j| signal[j] * kernel[k - j])
                .sum::<f64>()
        })
        .collect();

    Ok(output)
}

/// Surrounds `values` with `width` copies of `fill` on each side.
pub fn pad_with(values: &[f64], width: usize, fill: f64) -> Vec<f64> {
    let mut padded = Vec::with_capacity(values.len() + 2 * width);
    padded.resize(width, fill);
    padded.extend_from_slice(values);
    padded.resize(values.len() + 2 * width, fill);
    padded
}

#[cfg(test)]
mod tests {
    use super::{convolve_same, pad_with, KernelConvolutionError};

    #[test]
    fn odd_symmetric_kernel_is_centred() {
        let signal = [0.0, 0.0, 1.0, 0.0, 0.0];
        let kernel = [0.25, 0.5, 0.25];
        let output = convolve_same(&signal, &kernel).expect("convolution");
        assert_eq!(output, vec![0.0, 0.25, 0.5, 0.25, 0.0]);
    }

    #[test]
    fn even_kernel_follows_centred_full_convolution() {
        let signal = [1.0, 2.0, 3.0];
        let kernel = [1.0, 1.0];
        // full = [1, 3, 5, 3], offset = 0
        let output = convolve_same(&signal, &kernel).expect("convolution");
        assert_eq!(output, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn kernel_longer_than_signal_keeps_signal_length() {
        let signal = [1.0, 1.0];
        let kernel = [0.2; 5];
        // full = [.2, .4, .4, .4, .4, .2], offset = 2
        let output = convolve_same(&signal, &kernel).expect("convolution");
        assert_eq!(output.len(), 2);
        assert!((output[0] - 0.4).abs() < 1.0e-15);
        assert!((output[1] - 0.4).abs() < 1.0e-15);
    }

    #[test]
    fn convolution_rejects_invalid_inputs() {
        assert_eq!(
            convolve_same(&[], &[1.0]),
            Err(KernelConvolutionError::EmptySignal)
        );
        assert_eq!(
            convolve_same(&[1.0], &[]),
            Err(KernelConvolutionError::EmptyKernel)
        );
        match convolve_same(&[1.0], &[0.5, f64::NAN]) {
            Err(KernelConvolutionError::NonFiniteKernel { index, value }) => {
                assert_eq!(index, 1);
                assert!(value.is_nan());
            }
            other => panic!("expected NonFiniteKernel, got {other:?}"),
        }
    }

    #[test]
    fn padding_surrounds_values() {
        assert_eq!(
            pad_with(&[0.5, 0.25], 2, 1.0),
            vec![1.0, 1.0, 0.5, 0.25, 1.0, 1.0]
        );
        assert_eq!(pad_with(&[0.5], 0, 1.0), vec![0.5]);
    }
}
