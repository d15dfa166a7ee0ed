//! Instrument configuration and grouping thresholds.
//!
//! Instrument settings are a closed set of LSF kinds; each setting owns one
//! entry of the LSF wavelength-range table so that a fit region maps to exactly
//! one kernel source. Both are plain serde documents so a driver can keep them
//! next to its spectrum.

use crate::domain::VoigtError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_GAP_BUFFER: usize = 4;
pub const DEFAULT_OUTLIER_FACTOR: f64 = 30.0;
pub const DEFAULT_MIN_FRAGMENT_PIXELS: usize = 15;
pub const DEFAULT_UNDERSAMPLING_FLOOR: usize = 10;
pub const DEFAULT_CLUSTER_BANDWIDTH: f64 = 25.0;

/// Empirical thresholds used while grouping fit pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupingThresholds {
    /// Largest number of skipped pixels that still joins two fit pixels into one region.
    pub gap_buffer: usize,
    /// A wavelength step larger than this multiple of the region median splits the region.
    pub outlier_factor: f64,
    /// Minimum length of a fragment produced by a wavelength-jump split.
    pub min_fragment_pixels: usize,
    /// Regions shorter than this are padded before requesting a kernel.
    pub undersampling_floor: usize,
    /// Mean-shift bandwidth in Angstrom.
    pub cluster_bandwidth: f64,
}

impl Default for GroupingThresholds {
    fn default() -> Self {
        Self {
            gap_buffer: DEFAULT_GAP_BUFFER,
            outlier_factor: DEFAULT_OUTLIER_FACTOR,
            min_fragment_pixels: DEFAULT_MIN_FRAGMENT_PIXELS,
            undersampling_floor: DEFAULT_UNDERSAMPLING_FLOOR,
            cluster_bandwidth: DEFAULT_CLUSTER_BANDWIDTH,
        }
    }
}

impl GroupingThresholds {
    pub fn with_gap_buffer(mut self, gap_buffer: usize) -> Self {
        self.gap_buffer = gap_buffer;
        self
    }

    pub fn with_outlier_factor(mut self, outlier_factor: f64) -> Self {
        self.outlier_factor = outlier_factor;
        self
    }

    pub fn with_min_fragment_pixels(mut self, min_fragment_pixels: usize) -> Self {
        self.min_fragment_pixels = min_fragment_pixels;
        self
    }

    pub fn with_undersampling_floor(mut self, undersampling_floor: usize) -> Self {
        self.undersampling_floor = undersampling_floor;
        self
    }

    pub fn with_cluster_bandwidth(mut self, cluster_bandwidth: f64) -> Self {
        self.cluster_bandwidth = cluster_bandwidth;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.outlier_factor.is_finite() || self.outlier_factor <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "outlierFactor",
                value: self.outlier_factor,
            });
        }
        if !self.cluster_bandwidth.is_finite() || self.cluster_bandwidth <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "clusterBandwidth",
                value: self.cluster_bandwidth,
            });
        }
        Ok(())
    }
}

/// One configured spectrograph setting.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum InstrumentSetting {
    #[serde(rename = "COS")]
    Cos {
        grating: String,
        #[serde(rename = "lifePosition")]
        life_position: String,
        #[serde(rename = "cenWave")]
        cen_wave: String,
        #[serde(default)]
        slit: Option<String>,
    },
    #[serde(rename = "STIS")]
    Stis {
        grating: String,
        #[serde(rename = "lifePosition", default)]
        life_position: Option<String>,
        #[serde(rename = "cenWave")]
        cen_wave: String,
        slit: String,
    },
    #[serde(rename = "Gaussian", alias = "gaussian")]
    Gaussian {
        /// Angstrom per native pixel.
        #[serde(rename = "pixelScale")]
        pixel_scale: f64,
        /// Full width at half maximum in native pixels.
        fwhm: f64,
    },
}

impl InstrumentSetting {
    pub fn label(&self) -> String {
        match self {
            Self::Cos {
                grating,
                life_position,
                cen_wave,
                ..
            } => format!("COS {grating} LP{life_position} {cen_wave}"),
            Self::Stis {
                grating,
                cen_wave,
                slit,
                ..
            } => format!("STIS {grating} {cen_wave} {slit}"),
            Self::Gaussian { pixel_scale, fwhm } => {
                format!("Gaussian fwhm={fwhm}px scale={pixel_scale}A/px")
            }
        }
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if let Self::Gaussian { pixel_scale, fwhm } = self {
            for (name, value) in [("pixelScale", *pixel_scale), ("fwhm", *fwhm)] {
                if !value.is_finite() || value <= 0.0 {
                    return Err(ConfigError::InvalidGaussianSetting { index, name, value });
                }
            }
        }
        Ok(())
    }
}

/// Wavelength interval covered by one instrument setting.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LsfRange {
    pub lo_wave: f64,
    pub hi_wave: f64,
}

impl LsfRange {
    pub const fn new(lo_wave: f64, hi_wave: f64) -> Self {
        Self { lo_wave, hi_wave }
    }

    pub fn contains(&self, wavelength: f64) -> bool {
        wavelength >= self.lo_wave && wavelength <= self.hi_wave
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentConfig {
    pub settings: Vec<InstrumentSetting>,
    pub lsf_ranges: Vec<LsfRange>,
    #[serde(default)]
    pub thresholds: GroupingThresholds,
}

impl InstrumentConfig {
    pub fn new(settings: Vec<InstrumentSetting>, lsf_ranges: Vec<LsfRange>) -> Self {
        Self {
            settings,
            lsf_ranges,
            thresholds: GroupingThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: GroupingThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Single Gaussian LSF covering every wavelength.
    pub fn single_gaussian(pixel_scale: f64, fwhm: f64) -> Self {
        Self::new(
            vec![InstrumentSetting::Gaussian { pixel_scale, fwhm }],
            vec![LsfRange::new(0.0, f64::MAX)],
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.is_empty() {
            return Err(ConfigError::NoSettings);
        }
        if self.settings.len() != self.lsf_ranges.len() {
            return Err(ConfigError::RangeCountMismatch {
                settings: self.settings.len(),
                ranges: self.lsf_ranges.len(),
            });
        }
        for (index, setting) in self.settings.iter().enumerate() {
            setting.validate(index)?;
        }
        for (index, range) in self.lsf_ranges.iter().enumerate() {
            if !range.lo_wave.is_finite()
                || !range.hi_wave.is_finite()
                || range.lo_wave >= range.hi_wave
            {
                return Err(ConfigError::InvalidRange {
                    index,
                    lo: range.lo_wave,
                    hi: range.hi_wave,
                });
            }
        }

        let mut order: Vec<usize> = (0..self.lsf_ranges.len()).collect();
        order.sort_by(|lhs, rhs| {
            self.lsf_ranges[*lhs]
                .lo_wave
                .total_cmp(&self.lsf_ranges[*rhs].lo_wave)
        });
        for pair in order.windows(2) {
            let first = self.lsf_ranges[pair[0]];
            let second = self.lsf_ranges[pair[1]];
            if second.lo_wave <= first.hi_wave {
                return Err(ConfigError::OverlappingRanges {
                    first: pair[0],
                    second: pair[1],
                    lo: second.lo_wave,
                    hi: first.hi_wave,
                });
            }
        }

        self.thresholds.validate()
    }

    /// Index of the setting whose range contains `wavelength`.
    pub fn setting_index_for(&self, wavelength: f64) -> Option<usize> {
        self.lsf_ranges
            .iter()
            .position(|range| range.contains(wavelength))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("instrument configuration must list at least one setting")]
    NoSettings,
    #[error("instrument configuration has {settings} settings but {ranges} LSF ranges")]
    RangeCountMismatch { settings: usize, ranges: usize },
    #[error("LSF range {index} is invalid: lo={lo}, hi={hi}")]
    InvalidRange { index: usize, lo: f64, hi: f64 },
    #[error("LSF ranges {first} and {second} overlap between {lo} and {hi} Angstrom")]
    OverlappingRanges {
        first: usize,
        second: usize,
        lo: f64,
        hi: f64,
    },
    #[error("Gaussian setting {index} requires finite {name} > 0, got {value}")]
    InvalidGaussianSetting {
        index: usize,
        name: &'static str,
        value: f64,
    },
    #[error("grouping threshold {name} must be finite and > 0, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("failed to read instrument configuration '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse instrument configuration '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<ConfigError> for VoigtError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Read { .. } => VoigtError::io_system("IO.CONFIG_READ", error.to_string()),
            ConfigError::Parse { .. } => {
                VoigtError::input_validation("INPUT.CONFIG_PARSE", error.to_string())
            }
            _ => VoigtError::configuration("CONFIG.INSTRUMENT", error.to_string()),
        }
    }
}

pub fn load_instrument_config(
    config_path: impl AsRef<Path>,
) -> Result<InstrumentConfig, ConfigError> {
    let config_path = config_path.as_ref();
    let source = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
        path: config_path.to_path_buf(),
        source,
    })?;
    let config: InstrumentConfig =
        serde_json::from_str(&source).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}
