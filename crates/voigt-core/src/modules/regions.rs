//! Grouping of fit pixels into convolution regions.
//!
//! Regions are contiguous index ranges: fit pixels separated by no more than
//! `gap_buffer` skipped pixels share a region and the skipped pixels are filled
//! in. Regions containing a wavelength discontinuity (typically the seam between
//! two detector segments) are split at the discontinuity.

use crate::common::config::{GroupingThresholds, InstrumentConfig};
use crate::domain::{FitPixelSet, FitRegion, VoigtError};
use crate::numerics::{mean_shift_1d, median, MeanShiftError};
use serde::Serialize;
use tracing::{debug, warn};

/// Recoverable problem found while grouping; always logged when produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GroupingWarning {
    /// The region's ends fall under different LSF settings; it was dropped.
    #[serde(rename_all = "camelCase")]
    GratingStraddle {
        region: FitRegion,
        lo_wave: f64,
        hi_wave: f64,
    },
    /// The region was too short for the LSF; the kernel was requested on a padded range.
    #[serde(rename_all = "camelCase")]
    Undersampled {
        region: FitRegion,
        median_wave: f64,
        padding: Vec<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WavelengthCluster {
    pub center: f64,
    /// Positions in the region list.
    pub regions: Vec<usize>,
}

/// Index of the cluster whose centre is nearest to `wavelength`.
pub fn nearest_cluster(clusters: &[WavelengthCluster], wavelength: f64) -> Option<usize> {
    clusters
        .iter()
        .enumerate()
        .min_by(|lhs, rhs| {
            (lhs.1.center - wavelength)
                .abs()
                .total_cmp(&(rhs.1.center - wavelength).abs())
        })
        .map(|(index, _)| index)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error("no valid pixels for fit, possibly due to the spectral gap settings")]
    EmptyFitPixels,
    #[error("fit pixel {index} lies outside the {len}-pixel wavelength grid")]
    PixelOutOfRange { index: usize, len: usize },
    #[error("wavelength clustering failed: {0}")]
    Clustering(#[from] MeanShiftError),
}

impl From<RegionError> for VoigtError {
    fn from(error: RegionError) -> Self {
        match error {
            RegionError::EmptyFitPixels => {
                VoigtError::configuration("CONFIG.EMPTY_FIT_PIXELS", error.to_string())
            }
            RegionError::PixelOutOfRange { .. } => {
                VoigtError::input_validation("INPUT.FIT_PIXELS", error.to_string())
            }
            RegionError::Clustering(_) => {
                VoigtError::internal("RUN.CLUSTERING", error.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RegionGrouper<'a> {
    grid: &'a [f64],
    thresholds: GroupingThresholds,
}

impl<'a> RegionGrouper<'a> {
    pub fn new(grid: &'a [f64], thresholds: GroupingThresholds) -> Self {
        Self { grid, thresholds }
    }

    pub fn compute_regions(&self, fit_pixels: &FitPixelSet) -> Result<Vec<FitRegion>, RegionError> {
        if fit_pixels.is_empty() {
            return Err(RegionError::EmptyFitPixels);
        }
        if let Some(index) = fit_pixels.max_index().filter(|index| *index >= self.grid.len()) {
            return Err(RegionError::PixelOutOfRange {
                index,
                len: self.grid.len(),
            });
        }

        let raw = self.contiguous_runs(fit_pixels.indices());
        let regions = self.split_wavelength_jumps(&raw);
        debug!(
            fit_pixels = fit_pixels.len(),
            raw_regions = raw.len(),
            regions = regions.len(),
            "grouped fit pixels"
        );
        Ok(regions)
    }

    fn contiguous_runs(&self, indices: &[usize]) -> Vec<FitRegion> {
        let mut runs = Vec::new();
        let mut start = indices[0];
        let mut previous = indices[0];
        for &index in &indices[1..] {
            if index - previous - 1 > self.thresholds.gap_buffer {
                runs.push(FitRegion::new(start, previous));
                start = index;
            }
            previous = index;
        }
        runs.push(FitRegion::new(start, previous));
        runs
    }

    fn split_wavelength_jumps(&self, raw: &[FitRegion]) -> Vec<FitRegion> {
        let mut regions: Vec<FitRegion> = Vec::with_capacity(raw.len());
        for (position, region) in raw.iter().enumerate() {
            let next_start = raw
                .get(position + 1)
                .map_or(self.grid.len(), |next| next.start);

            let fragments = self.fragments(region);
            if fragments.len() > 1 {
                debug!(
                    start = region.start,
                    end = region.end,
                    fragments = fragments.len(),
                    "split region at wavelength discontinuity"
                );
            } else {
                regions.push(*region);
                continue;
            }

            for (index, fragment) in fragments.iter().enumerate() {
                let upper_limit = fragments
                    .get(index + 1)
                    .map_or(next_start, |following| following.start)
                    - 1;
                let lower_limit = regions.last().map_or(0, |previous| previous.end + 1);
                regions.push(self.widen_fragment(*fragment, lower_limit, upper_limit));
            }
        }
        regions
    }

    fn fragments(&self, region: &FitRegion) -> Vec<FitRegion> {
        let waves = region.wavelengths(self.grid);
        let steps: Vec<f64> = waves.windows(2).map(|pair| pair[1] - pair[0]).collect();
        let Some(median_step) = median(&steps) else {
            return vec![*region];
        };

        let cutoff = self.thresholds.outlier_factor * median_step;
        let mut fragments = Vec::new();
        let mut start = region.start;
        for (offset, step) in steps.iter().copied().enumerate() {
            if step > cutoff {
                let last = region.start + offset;
                fragments.push(FitRegion::new(start, last));
                start = last + 1;
            }
        }
        fragments.push(FitRegion::new(start, region.end));
        fragments
    }

    /// Grows a short fragment upward, then downward, within `[lower_limit, upper_limit]`.
    ///
    /// The limits win over the minimum length, so a fragment squeezed between
    /// neighbours can stay short.
    fn widen_fragment(&self, fragment: FitRegion, lower_limit: usize, upper_limit: usize) -> FitRegion {
        let minimum = self.thresholds.min_fragment_pixels;
        if fragment.len() >= minimum {
            return fragment;
        }

        let end = (fragment.start + minimum - 1).min(upper_limit).max(fragment.end);
        let start = (end + 1)
            .saturating_sub(minimum)
            .max(lower_limit)
            .min(fragment.start);
        FitRegion::new(start, end)
    }

    /// Mean shift over the median wavelength of each region.
    pub fn cluster_regions(
        &self,
        regions: &[FitRegion],
    ) -> Result<Vec<WavelengthCluster>, RegionError> {
        let centres: Vec<f64> = regions
            .iter()
            .map(|region| median(region.wavelengths(self.grid)).unwrap_or(self.grid[region.start]))
            .collect();
        let result = mean_shift_1d(&centres, self.thresholds.cluster_bandwidth)?;

        let clusters: Vec<WavelengthCluster> = result
            .centers
            .iter()
            .enumerate()
            .map(|(cluster, center)| WavelengthCluster {
                center: *center,
                regions: result.members(cluster),
            })
            .collect();
        debug!(clusters = clusters.len(), "clustered region wavelengths");
        Ok(clusters)
    }
}

/// True when the region's first and last wavelengths belong to different LSF ranges.
pub fn detect_grating_straddle(region: &FitRegion, grid: &[f64], config: &InstrumentConfig) -> bool {
    config.setting_index_for(grid[region.start]) != config.setting_index_for(grid[region.end])
}

/// Removes straddling regions, returning the survivors and one warning per dropped region.
pub fn drop_straddling_regions(
    regions: Vec<FitRegion>,
    grid: &[f64],
    config: &InstrumentConfig,
) -> (Vec<FitRegion>, Vec<GroupingWarning>) {
    let mut warnings = Vec::new();
    let retained = regions
        .into_iter()
        .filter(|region| {
            if !detect_grating_straddle(region, grid, config) {
                return true;
            }
            let lo_wave = grid[region.start];
            let hi_wave = grid[region.end];
            warn!(
                start = region.start,
                end = region.end,
                lo_wave,
                hi_wave,
                "region spans settings with inconsistent LSFs; excluding it from the fit"
            );
            warnings.push(GroupingWarning::GratingStraddle {
                region: *region,
                lo_wave,
                hi_wave,
            });
            false
        })
        .collect();
    (retained, warnings)
}

#[cfg(test)]
mod tests {
    use super::{
        detect_grating_straddle, drop_straddling_regions, nearest_cluster, GroupingWarning,
        RegionError, RegionGrouper,
    };
    use crate::common::config::{GroupingThresholds, InstrumentConfig, InstrumentSetting, LsfRange};
    use crate::domain::{FitPixelSet, FitRegion, VoigtError, VoigtErrorCategory};

    fn uniform_grid(count: usize) -> Vec<f64> {
        (0..count).map(|index| 1200.0 + 0.01 * index as f64).collect()
    }

    /// Uniform 0.01 A sampling with a 40x step between pixels 40 and 41.
    fn jump_grid() -> Vec<f64> {
        (0..100)
            .map(|index| 1200.0 + 0.01 * index as f64 + if index > 40 { 0.39 } else { 0.0 })
            .collect()
    }

    fn regions_for(grid: &[f64], pixels: impl IntoIterator<Item = usize>) -> Vec<FitRegion> {
        RegionGrouper::new(grid, GroupingThresholds::default())
            .compute_regions(&FitPixelSet::from_indices(pixels))
            .expect("regions")
    }

    #[test]
    fn gaps_within_buffer_are_filled() {
        let grid = uniform_grid(30);
        let regions = regions_for(&grid, (0..=9).chain(14..=20));
        assert_eq!(regions, vec![FitRegion::new(0, 20)]);
    }

    #[test]
    fn gaps_beyond_buffer_split_regions() {
        let grid = uniform_grid(30);
        let regions = regions_for(&grid, (0..=9).chain(15..=20));
        assert_eq!(regions, vec![FitRegion::new(0, 9), FitRegion::new(15, 20)]);

        let wider = RegionGrouper::new(&grid, GroupingThresholds::default().with_gap_buffer(5))
            .compute_regions(&FitPixelSet::from_indices((0..=9).chain(15..=20)))
            .expect("regions");
        assert_eq!(wider, vec![FitRegion::new(0, 20)]);
    }

    #[test]
    fn empty_fit_pixels_are_a_configuration_error() {
        let grid = uniform_grid(10);
        let error = RegionGrouper::new(&grid, GroupingThresholds::default())
            .compute_regions(&FitPixelSet::default())
            .expect_err("empty set should fail");
        assert_eq!(error, RegionError::EmptyFitPixels);

        let error: VoigtError = error.into();
        assert_eq!(error.category(), VoigtErrorCategory::ConfigurationError);
        assert_eq!(error.placeholder(), "CONFIG.EMPTY_FIT_PIXELS");

        let error = RegionGrouper::new(&grid, GroupingThresholds::default())
            .compute_regions(&FitPixelSet::from_indices([3, 10]))
            .expect_err("out of range pixel should fail");
        assert_eq!(error, RegionError::PixelOutOfRange { index: 10, len: 10 });
    }

    #[test]
    fn wavelength_jump_splits_and_pads_trailing_fragment() {
        let grid = jump_grid();
        let regions = regions_for(&grid, 20..=45);
        assert_eq!(regions, vec![FitRegion::new(20, 40), FitRegion::new(41, 55)]);
        assert!(regions.iter().all(|region| region.len() >= 15));
    }

    #[test]
    fn short_leading_fragment_grows_downward_without_crossing_the_jump() {
        let grid = jump_grid();
        let regions = regions_for(&grid, 35..=60);
        assert_eq!(regions, vec![FitRegion::new(26, 40), FitRegion::new(41, 60)]);
    }

    #[test]
    fn fragment_padding_never_overlaps_the_next_region() {
        let grid = jump_grid();
        let regions = regions_for(&grid, (30..=45).chain(51..=70));
        assert_eq!(
            regions,
            vec![
                FitRegion::new(26, 40),
                FitRegion::new(41, 50),
                FitRegion::new(51, 70)
            ]
        );
        for pair in regions.windows(2) {
            assert!(!pair[0].overlaps(&pair[1]), "{pair:?} overlap");
        }
    }

    #[test]
    fn straddling_regions_are_dropped_with_warning() {
        let grid = uniform_grid(100);
        let config = InstrumentConfig::new(
            vec![
                InstrumentSetting::Gaussian {
                    pixel_scale: 0.01,
                    fwhm: 3.0,
                },
                InstrumentSetting::Gaussian {
                    pixel_scale: 0.01,
                    fwhm: 5.0,
                },
            ],
            vec![LsfRange::new(1199.0, 1200.5), LsfRange::new(1200.505, 1202.0)],
        );
        let regions = vec![
            FitRegion::new(0, 20),
            FitRegion::new(40, 60),
            FitRegion::new(70, 90),
        ];

        assert!(!detect_grating_straddle(&regions[0], &grid, &config));
        assert!(detect_grating_straddle(&regions[1], &grid, &config));

        let (retained, warnings) = drop_straddling_regions(regions, &grid, &config);
        assert_eq!(retained, vec![FitRegion::new(0, 20), FitRegion::new(70, 90)]);
        assert_eq!(warnings.len(), 1);
        match &warnings[0] {
            GroupingWarning::GratingStraddle { region, .. } => {
                assert_eq!(*region, FitRegion::new(40, 60));
            }
            other => panic!("expected GratingStraddle, got {other:?}"),
        }
    }

    #[test]
    fn region_centres_cluster_by_band() {
        let grid: Vec<f64> = (0..3000).map(|index| 1200.0 + 0.2 * index as f64).collect();
        let regions = vec![
            FitRegion::new(70, 100),
            FitRegion::new(120, 140),
            FitRegion::new(1700, 1760),
            FitRegion::new(1770, 1790),
        ];
        let clusters = RegionGrouper::new(&grid, GroupingThresholds::default())
            .cluster_regions(&regions)
            .expect("clusters");

        assert_eq!(clusters.len(), 2);
        let low = nearest_cluster(&clusters, 1220.0).expect("low band");
        let high = nearest_cluster(&clusters, 1550.0).expect("high band");
        assert_ne!(low, high);
        assert_eq!(clusters[low].regions, vec![0, 1]);
        assert_eq!(clusters[high].regions, vec![2, 3]);
    }
}
