pub mod convolution;
pub mod faddeeva;

pub use convolution::{convolve_same, pad_with, KernelConvolutionError};
pub use faddeeva::{faddeeva, voigt_h, voigt_h_with_jacobian, VoigtDerivatives};
