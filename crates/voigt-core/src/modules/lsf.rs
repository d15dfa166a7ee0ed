//! Line-spread-function kernel sources and per-region kernel assignment.
//!
//! A kernel is always sampled on an odd number of points centred on the
//! middle of the requested wavelength array, with the array's median pixel
//! spacing, and normalised to unit sum.

use crate::common::config::{InstrumentConfig, InstrumentSetting};
use crate::domain::{FitRegion, VoigtError};
use crate::modules::regions::GroupingWarning;
use crate::numerics::{interpolate_linear, median, stable_sum};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use tracing::{debug, warn};

const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949_4;

#[derive(Debug, Clone, PartialEq)]
pub struct LsfKernel {
    weights: Vec<f64>,
}

impl LsfKernel {
    /// Normalises `weights` to unit sum.
    pub fn new(weights: Vec<f64>) -> Result<Self, LsfError> {
        if weights.is_empty() {
            return Err(LsfError::EmptyKernel);
        }
        if let Some((index, value)) = weights
            .iter()
            .copied()
            .enumerate()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            return Err(LsfError::InvalidWeight { index, value });
        }
        let total = stable_sum(&weights);
        if total <= 0.0 {
            return Err(LsfError::DegenerateKernel);
        }
        Ok(Self {
            weights: weights.into_iter().map(|weight| weight / total).collect(),
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Kernel offsets (Angstrom) for a target array: odd length, centred, median spacing.
fn kernel_offsets(target_wavelengths: &[f64]) -> Result<Vec<f64>, LsfError> {
    if target_wavelengths.is_empty() {
        return Err(LsfError::EmptyTarget);
    }
    if target_wavelengths.len() == 1 {
        return Ok(vec![0.0]);
    }

    let steps: Vec<f64> = target_wavelengths
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect();
    let step = median(&steps)
        .filter(|step| *step > 0.0)
        .ok_or(LsfError::NonIncreasingTarget)?;

    let half = target_wavelengths.len() / 2;
    Ok((0..=2 * half)
        .map(|index| (index as f64 - half as f64) * step)
        .collect())
}

/// Gaussian LSF with a FWHM given in native pixels of `pixel_scale` Angstrom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianLsf {
    pub pixel_scale: f64,
    pub fwhm: f64,
}

impl GaussianLsf {
    pub fn new(pixel_scale: f64, fwhm: f64) -> Self {
        Self { pixel_scale, fwhm }
    }

    pub fn sigma_angstrom(&self) -> f64 {
        self.fwhm * self.pixel_scale / FWHM_TO_SIGMA
    }

    pub fn interpolate_to_grid(&self, target_wavelengths: &[f64]) -> Result<LsfKernel, LsfError> {
        let sigma = self.sigma_angstrom();
        let weights = kernel_offsets(target_wavelengths)?
            .into_iter()
            .map(|offset| (-0.5 * (offset / sigma).powi(2)).exp())
            .collect();
        LsfKernel::new(weights)
    }
}

/// Tabulated kernel profile sampled at wavelength offsets from the line centre.
///
/// COS and STIS kernels are supplied this way by the caller; values outside
/// the table are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedLsf {
    offsets: Vec<f64>,
    profile: Vec<f64>,
}

impl TabulatedLsf {
    pub fn new(offsets: Vec<f64>, profile: Vec<f64>) -> Result<Self, LsfError> {
        if offsets.len() < 2 || offsets.len() != profile.len() {
            return Err(LsfError::InvalidTable {
                reason: format!(
                    "need at least 2 matching samples, got {} offsets and {} values",
                    offsets.len(),
                    profile.len()
                ),
            });
        }
        if !offsets.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(LsfError::InvalidTable {
                reason: "offsets must be strictly increasing".to_string(),
            });
        }
        Ok(Self { offsets, profile })
    }

    pub fn interpolate_to_grid(&self, target_wavelengths: &[f64]) -> Result<LsfKernel, LsfError> {
        let first = self.offsets[0];
        let last = self.offsets[self.offsets.len() - 1];
        let weights = kernel_offsets(target_wavelengths)?
            .into_iter()
            .map(|offset| {
                if offset < first || offset > last {
                    0.0
                } else {
                    interpolate_linear(offset, &self.offsets, &self.profile).unwrap_or(0.0)
                }
            })
            .collect();
        LsfKernel::new(weights)
    }
}

/// Kernel source for one configured instrument setting.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelSource {
    Gaussian(GaussianLsf),
    Tabulated(TabulatedLsf),
}

impl KernelSource {
    pub fn interpolate_to_grid(&self, target_wavelengths: &[f64]) -> Result<LsfKernel, LsfError> {
        match self {
            Self::Gaussian(lsf) => lsf.interpolate_to_grid(target_wavelengths),
            Self::Tabulated(lsf) => lsf.interpolate_to_grid(target_wavelengths),
        }
    }
}

/// Builds one kernel source per instrument setting, in setting order.
pub trait LsfProvider {
    fn build_lsf_objects(&self, settings: &[InstrumentSetting]) -> Result<Vec<KernelSource>, LsfError>;
}

/// Analytic Gaussians plus caller-registered tables for COS/STIS settings.
#[derive(Debug, Clone, Default)]
pub struct DefaultLsfProvider {
    tabulated: HashMap<usize, TabulatedLsf>,
}

impl DefaultLsfProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the kernel table for the setting at `setting_index`.
    pub fn with_table(mut self, setting_index: usize, table: TabulatedLsf) -> Self {
        self.tabulated.insert(setting_index, table);
        self
    }
}

impl LsfProvider for DefaultLsfProvider {
    fn build_lsf_objects(&self, settings: &[InstrumentSetting]) -> Result<Vec<KernelSource>, LsfError> {
        settings
            .iter()
            .enumerate()
            .map(|(index, setting)| match setting {
                InstrumentSetting::Gaussian { pixel_scale, fwhm } => {
                    Ok(KernelSource::Gaussian(GaussianLsf::new(*pixel_scale, *fwhm)))
                }
                InstrumentSetting::Cos { .. } | InstrumentSetting::Stis { .. } => self
                    .tabulated
                    .get(&index)
                    .cloned()
                    .map(KernelSource::Tabulated)
                    .ok_or_else(|| LsfError::MissingTable {
                        index,
                        label: setting.label(),
                    }),
            })
            .collect()
    }
}

impl<T> LsfProvider for &T
where
    T: LsfProvider + ?Sized,
{
    fn build_lsf_objects(&self, settings: &[InstrumentSetting]) -> Result<Vec<KernelSource>, LsfError> {
        (**self).build_lsf_objects(settings)
    }
}

/// Pixel range used to request the kernel of `region`, plus the padding indices added.
///
/// Regions shorter than `floor` gain `ceil((floor - len) / 2) + 1` pixels on each
/// side, clamped to the grid.
pub fn kernel_request_span(
    region: &FitRegion,
    grid_len: usize,
    floor: usize,
) -> (RangeInclusive<usize>, Vec<usize>) {
    if region.len() >= floor {
        return (region.indices(), Vec::new());
    }

    let per_side = (floor - region.len()).div_ceil(2) + 1;
    let start = region.start.saturating_sub(per_side);
    let end = (region.end + per_side).min(grid_len.saturating_sub(1));
    let padding = (start..region.start).chain(region.end + 1..=end).collect();
    (start..=end, padding)
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelAssignment {
    pub kernels: Vec<LsfKernel>,
    /// Setting index used for each region.
    pub settings: Vec<usize>,
    pub warnings: Vec<GroupingWarning>,
}

/// Matches every region to its setting by median wavelength and interpolates its kernel.
pub fn assign_kernels(
    regions: &[FitRegion],
    grid: &[f64],
    config: &InstrumentConfig,
    sources: &[KernelSource],
) -> Result<KernelAssignment, LsfError> {
    if sources.len() != config.settings.len() {
        return Err(LsfError::SourceCountMismatch {
            sources: sources.len(),
            settings: config.settings.len(),
        });
    }

    let mut assignment = KernelAssignment {
        kernels: Vec::with_capacity(regions.len()),
        settings: Vec::with_capacity(regions.len()),
        warnings: Vec::new(),
    };
    for region in regions {
        let lo_wave = grid[region.start];
        let hi_wave = grid[region.end];
        let median_wave = median(region.wavelengths(grid)).unwrap_or(lo_wave);
        let setting = config
            .setting_index_for(median_wave)
            .ok_or(LsfError::NoRange {
                wavelength: median_wave,
                lo_wave,
                hi_wave,
            })?;

        let (span, padding) =
            kernel_request_span(region, grid.len(), config.thresholds.undersampling_floor);
        if !padding.is_empty() {
            warn!(
                median_wave,
                region_len = region.len(),
                ?padding,
                "line at {median_wave:.2} A undersamples the LSF; padding the kernel request"
            );
            assignment.warnings.push(GroupingWarning::Undersampled {
                region: *region,
                median_wave,
                padding,
            });
        }

        let kernel = sources[setting]
            .interpolate_to_grid(&grid[span])
            .map_err(|source| LsfError::Interpolation {
                lo_wave,
                hi_wave,
                reason: source.to_string(),
            })?;
        debug!(
            start = region.start,
            end = region.end,
            setting,
            kernel_len = kernel.len(),
            "assigned LSF kernel"
        );
        assignment.kernels.push(kernel);
        assignment.settings.push(setting);
    }
    Ok(assignment)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LsfError {
    #[error("LSF kernel must contain at least one weight")]
    EmptyKernel,
    #[error("LSF kernel weight must be finite and >= 0 at index {index}, got {value}")]
    InvalidWeight { index: usize, value: f64 },
    #[error("LSF kernel weights sum to zero")]
    DegenerateKernel,
    #[error("LSF interpolation requires at least one target wavelength")]
    EmptyTarget,
    #[error("LSF target wavelengths must be increasing")]
    NonIncreasingTarget,
    #[error("invalid tabulated LSF: {reason}")]
    InvalidTable { reason: String },
    #[error("no tabulated LSF registered for setting {index} ({label})")]
    MissingTable { index: usize, label: String },
    #[error("{sources} LSF sources built for {settings} instrument settings")]
    SourceCountMismatch { sources: usize, settings: usize },
    #[error(
        "no LSF range covers {wavelength:.3} A (region {lo_wave:.3}-{hi_wave:.3} A)"
    )]
    NoRange {
        wavelength: f64,
        lo_wave: f64,
        hi_wave: f64,
    },
    #[error(
        "LSF interpolation failed for region {lo_wave:.3}-{hi_wave:.3} A, which may span two gratings: {reason}"
    )]
    Interpolation {
        lo_wave: f64,
        hi_wave: f64,
        reason: String,
    },
}

impl From<LsfError> for VoigtError {
    fn from(error: LsfError) -> Self {
        let placeholder = match error {
            LsfError::NoRange { .. } => "CONFIG.LSF_RANGE",
            LsfError::Interpolation { .. } => "CONFIG.LSF_INTERPOLATION",
            LsfError::MissingTable { .. } | LsfError::SourceCountMismatch { .. } => {
                "CONFIG.LSF_SETTINGS"
            }
            _ => "CONFIG.LSF_KERNEL",
        };
        VoigtError::configuration(placeholder, error.to_string())
    }
}
