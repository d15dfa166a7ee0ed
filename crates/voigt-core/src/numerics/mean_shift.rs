//! Flat-kernel mean shift on one-dimensional samples.
//!
//! Every sample seeds a mode search; converged modes are ranked by the number
//! of samples inside their window and near-duplicates (closer than the
//! bandwidth to a stronger mode) are discarded. Samples are labelled with the
//! nearest surviving mode.

const MAX_ITERATIONS: usize = 300;
const CONVERGENCE_FRACTION: f64 = 1.0e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct MeanShiftResult {
    /// Cluster centres, strongest first.
    pub centers: Vec<f64>,
    /// Index into `centers` for every input sample.
    pub labels: Vec<usize>,
}

impl MeanShiftResult {
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(index, label)| (*label == cluster).then_some(index))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeanShiftError {
    #[error("mean shift requires at least one sample")]
    NoSamples,
    #[error("mean shift bandwidth must be finite and > 0, got {value}")]
    InvalidBandwidth { value: f64 },
    #[error("mean shift sample must be finite at index {index}, got {value}")]
    NonFiniteSample { index: usize, value: f64 },
}

pub fn mean_shift_1d(samples: &[f64], bandwidth: f64) -> Result<MeanShiftResult, MeanShiftError> {
    if samples.is_empty() {
        return Err(MeanShiftError::NoSamples);
    }
    if !bandwidth.is_finite() || bandwidth <= 0.0 {
        return Err(MeanShiftError::InvalidBandwidth { value: bandwidth });
    }
    if let Some((index, value)) = samples
        .iter()
        .copied()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        return Err(MeanShiftError::NonFiniteSample { index, value });
    }

    let tolerance = CONVERGENCE_FRACTION * bandwidth;
    let mut modes: Vec<(f64, usize)> = samples
        .iter()
        .filter_map(|&seed| climb(samples, seed, bandwidth, tolerance))
        .collect();

    modes.sort_by(|lhs, rhs| rhs.1.cmp(&lhs.1).then_with(|| rhs.0.total_cmp(&lhs.0)));

    let mut centers: Vec<f64> = Vec::new();
    for (mode, _) in modes {
        if centers
            .iter()
            .all(|center| (center - mode).abs() > bandwidth)
        {
            centers.push(mode);
        }
    }

    let labels = samples
        .iter()
        .map(|&sample| nearest(&centers, sample))
        .collect();

    Ok(MeanShiftResult { centers, labels })
}

fn climb(samples: &[f64], seed: f64, bandwidth: f64, tolerance: f64) -> Option<(f64, usize)> {
    let mut mean = seed;
    for iteration in 0..MAX_ITERATIONS {
        let (sum, count) = samples
            .iter()
            .filter(|&&sample| (sample - mean).abs() <= bandwidth)
            .fold((0.0, 0usize), |(sum, count), sample| (sum + sample, count + 1));
        if count == 0 {
            return None;
        }

        let previous = mean;
        mean = sum / count as f64;
        if (mean - previous).abs() < tolerance || iteration + 1 == MAX_ITERATIONS {
            return Some((mean, count));
        }
    }
    None
}

fn nearest(centers: &[f64], sample: f64) -> usize {
    centers
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |best, (index, center)| {
            let distance = (center - sample).abs();
            if distance < best.1 {
                (index, distance)
            } else {
                best
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::{mean_shift_1d, MeanShiftError};

    #[test]
    fn separated_bands_form_distinct_clusters() {
        let samples = [1215.0, 1216.0, 1217.5, 1548.2, 1550.8, 1206.5];
        let result = mean_shift_1d(&samples, 25.0).expect("mean shift");

        assert_eq!(result.centers.len(), 2);
        let lyman = result.labels[0];
        let civ = result.labels[3];
        assert_ne!(lyman, civ);
        assert_eq!(result.members(lyman), vec![0, 1, 2, 5]);
        assert_eq!(result.members(civ), vec![3, 4]);
        assert!((result.centers[lyman] - 1213.75).abs() < 1.0e-9);
        assert!((result.centers[civ] - 1549.5).abs() < 1.0e-9);
        // strongest cluster first
        assert_eq!(lyman, 0);
    }

    #[test]
    fn single_sample_is_its_own_centre() {
        let result = mean_shift_1d(&[1302.17], 25.0).expect("mean shift");
        assert_eq!(result.centers, vec![1302.17]);
        assert_eq!(result.labels, vec![0]);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert_eq!(mean_shift_1d(&[], 25.0), Err(MeanShiftError::NoSamples));
        assert_eq!(
            mean_shift_1d(&[1.0], 0.0),
            Err(MeanShiftError::InvalidBandwidth { value: 0.0 })
        );
        assert!(matches!(
            mean_shift_1d(&[1.0, f64::INFINITY], 1.0),
            Err(MeanShiftError::NonFiniteSample { index: 1, .. })
        ));
    }
}
