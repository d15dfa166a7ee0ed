//! Region-wise LSF convolution of a model spectrum.

use crate::domain::{FitRegion, VoigtError, VoigtResult};
use crate::modules::lsf::LsfKernel;
use crate::numerics::{convolve_same, pad_with, KernelConvolutionError};
use rayon::prelude::*;
use tracing::debug;

/// Continuum level used to pad flux before convolving.
const FLUX_PAD_VALUE: f64 = 1.0;
/// Derivatives vanish at the continuum, so they are padded with zeros.
const DERIVATIVE_PAD_VALUE: f64 = 0.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvolutionError {
    #[error("{regions} regions but {kernels} LSF kernels")]
    KernelCountMismatch { regions: usize, kernels: usize },
    #[error("region {start}..={end} lies outside the {len}-pixel spectrum")]
    RegionOutOfRange { start: usize, end: usize, len: usize },
    #[error("region {start}..={end} starts after it ends")]
    InvertedRegion { start: usize, end: usize },
    #[error("region starting at {start} overlaps or precedes the region ending at {previous_end}")]
    UnorderedRegions { previous_end: usize, start: usize },
    #[error("convolution of region {start}..={end} failed: {source}")]
    Kernel {
        start: usize,
        end: usize,
        source: KernelConvolutionError,
    },
}

impl From<ConvolutionError> for VoigtError {
    fn from(error: ConvolutionError) -> Self {
        match error {
            ConvolutionError::KernelCountMismatch { .. } => {
                VoigtError::internal("RUN.CONVOLUTION", error.to_string())
            }
            ConvolutionError::RegionOutOfRange { .. }
            | ConvolutionError::InvertedRegion { .. }
            | ConvolutionError::UnorderedRegions { .. }
            | ConvolutionError::Kernel { .. } => {
                VoigtError::input_validation("INPUT.CONVOLUTION", error.to_string())
            }
        }
    }
}

/// Number of fill values placed on each side of a region before convolving.
pub fn padding_width(kernel: &LsfKernel) -> usize {
    kernel.len().div_ceil(2) + 1
}

/// Applies per-region kernels to a spectrum.
///
/// Pixels outside every region are copied unchanged. Regions are processed
/// in parallel; they must be ascending and disjoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvolutionEngine;

impl ConvolutionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Convolves flux, padding each region with the continuum.
    pub fn convolve(
        &self,
        profile: &[f64],
        regions: &[FitRegion],
        kernels: &[LsfKernel],
    ) -> VoigtResult<Vec<f64>> {
        Ok(convolve_regions(profile, regions, kernels, FLUX_PAD_VALUE)?)
    }

    /// Convolves a derivative row, padding each region with zeros.
    pub fn convolve_derivative(
        &self,
        derivative: &[f64],
        regions: &[FitRegion],
        kernels: &[LsfKernel],
    ) -> VoigtResult<Vec<f64>> {
        Ok(convolve_regions(
            derivative,
            regions,
            kernels,
            DERIVATIVE_PAD_VALUE,
        )?)
    }
}

fn convolve_regions(
    values: &[f64],
    regions: &[FitRegion],
    kernels: &[LsfKernel],
    fill: f64,
) -> Result<Vec<f64>, ConvolutionError> {
    if regions.len() != kernels.len() {
        return Err(ConvolutionError::KernelCountMismatch {
            regions: regions.len(),
            kernels: kernels.len(),
        });
    }
    check_regions(regions, values.len())?;

    let convolved: Vec<Vec<f64>> = regions
        .par_iter()
        .zip(kernels.par_iter())
        .map(|(region, kernel)| convolve_region(values, region, kernel, fill))
        .collect::<Result<_, _>>()?;

    let mut output = values.to_vec();
    for (region, segment) in regions.iter().zip(convolved) {
        output[region.indices()].copy_from_slice(&segment);
    }
    debug!(regions = regions.len(), fill, "convolved spectrum");
    Ok(output)
}

fn check_regions(regions: &[FitRegion], len: usize) -> Result<(), ConvolutionError> {
    let mut previous_end: Option<usize> = None;
    for region in regions {
        if region.start > region.end {
            return Err(ConvolutionError::InvertedRegion {
                start: region.start,
                end: region.end,
            });
        }
        if region.end >= len {
            return Err(ConvolutionError::RegionOutOfRange {
                start: region.start,
                end: region.end,
                len,
            });
        }
        if let Some(previous_end) = previous_end.filter(|end| region.start <= *end) {
            return Err(ConvolutionError::UnorderedRegions {
                previous_end,
                start: region.start,
            });
        }
        previous_end = Some(region.end);
    }
    Ok(())
}

fn convolve_region(
    values: &[f64],
    region: &FitRegion,
    kernel: &LsfKernel,
    fill: f64,
) -> Result<Vec<f64>, ConvolutionError> {
    let width = padding_width(kernel);
    let padded = pad_with(&values[region.indices()], width, fill);
    let convolved =
        convolve_same(&padded, kernel.weights()).map_err(|source| ConvolutionError::Kernel {
            start: region.start,
            end: region.end,
            source,
        })?;
    Ok(convolved[width..width + region.len()].to_vec())
}
