pub mod errors;

pub use errors::{VoigtError, VoigtErrorCategory, VoigtResult};

use serde::{Deserialize, Serialize};
use std::ops::{Deref, RangeInclusive};

/// One absorbing cloud seen in one transition.
///
/// `line_id` is the tabulated rest wavelength (Angstrom) used to look up the
/// transition's atomic data.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub line_id: f64,
    pub log_column_density: f64,
    /// Doppler parameter in km/s.
    pub b_value: f64,
    pub redshift: f64,
    /// Velocity offset in km/s relative to `redshift`.
    #[serde(default)]
    pub velocity_offset: f64,
}

impl Component {
    pub const fn new(
        line_id: f64,
        log_column_density: f64,
        b_value: f64,
        redshift: f64,
        velocity_offset: f64,
    ) -> Self {
        Self {
            line_id,
            log_column_density,
            b_value,
            redshift,
            velocity_offset,
        }
    }

    pub fn with_log_column_density(mut self, log_column_density: f64) -> Self {
        self.log_column_density = log_column_density;
        self
    }

    pub fn with_b_value(mut self, b_value: f64) -> Self {
        self.b_value = b_value;
        self
    }

    pub fn with_velocity_offset(mut self, velocity_offset: f64) -> Self {
        self.velocity_offset = velocity_offset;
        self
    }
}

/// Rest-frame atomic data for one transition.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicTransition {
    pub rest_wavelength: f64,
    pub oscillator_strength: f64,
    /// Damping constant Gamma in s^-1.
    pub damping: f64,
}

impl AtomicTransition {
    pub const fn new(rest_wavelength: f64, oscillator_strength: f64, damping: f64) -> Self {
        Self {
            rest_wavelength,
            oscillator_strength,
            damping,
        }
    }
}

/// Strictly increasing, finite wavelengths in Angstrom.
#[derive(Debug, Clone, PartialEq)]
pub struct WavelengthGrid {
    values: Vec<f64>,
}

impl WavelengthGrid {
    pub fn new(values: Vec<f64>) -> VoigtResult<Self> {
        if values.is_empty() {
            return Err(VoigtError::input_validation(
                "INPUT.EMPTY_GRID",
                "wavelength grid must contain at least one point",
            ));
        }
        for (index, value) in values.iter().copied().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(VoigtError::input_validation(
                    "INPUT.GRID_VALUE",
                    format!("wavelength at index {index} must be finite and > 0, got {value}"),
                ));
            }
            if index > 0 && value <= values[index - 1] {
                return Err(VoigtError::input_validation(
                    "INPUT.GRID_ORDER",
                    format!(
                        "wavelength grid must be strictly increasing, index {index} has {value} after {}",
                        values[index - 1]
                    ),
                ));
            }
        }
        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

impl Deref for WavelengthGrid {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

/// Sorted, de-duplicated indices of the pixels included in a fit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct FitPixelSet {
    indices: Vec<usize>,
}

impl FitPixelSet {
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut indices: Vec<usize> = indices.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    pub fn from_mask(mask: &[bool]) -> Self {
        Self {
            indices: mask
                .iter()
                .enumerate()
                .filter_map(|(index, include)| include.then_some(index))
                .collect(),
        }
    }

    pub fn all(pixel_count: usize) -> Self {
        Self {
            indices: (0..pixel_count).collect(),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn max_index(&self) -> Option<usize> {
        self.indices.last().copied()
    }
}

impl From<Vec<usize>> for FitPixelSet {
    fn from(indices: Vec<usize>) -> Self {
        Self::from_indices(indices)
    }
}

impl From<FitPixelSet> for Vec<usize> {
    fn from(set: FitPixelSet) -> Self {
        set.indices
    }
}

/// Contiguous, inclusive run of pixel indices convolved as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FitRegion {
    pub start: usize,
    pub end: usize,
}

impl FitRegion {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub const fn is_empty(&self) -> bool {
        false
    }

    pub fn indices(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn wavelengths<'a>(&self, grid: &'a [f64]) -> &'a [f64] {
        &grid[self.start..=self.end]
    }

    pub fn overlaps(&self, other: &FitRegion) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::{FitPixelSet, FitRegion, VoigtErrorCategory, WavelengthGrid};

    #[test]
    fn fit_pixel_set_sorts_and_dedupes() {
        let set = FitPixelSet::from_indices([5, 1, 3, 1, 5]);
        assert_eq!(set.indices(), &[1, 3, 5]);
        assert_eq!(set.max_index(), Some(5));

        let mask = FitPixelSet::from_mask(&[true, false, true, true]);
        assert_eq!(mask.indices(), &[0, 2, 3]);
        assert!(FitPixelSet::from_mask(&[false, false]).is_empty());
    }

    #[test]
    fn wavelength_grid_rejects_unsorted_values() {
        let error = WavelengthGrid::new(vec![1200.0, 1201.0, 1200.5])
            .expect_err("unsorted grid should fail");
        assert_eq!(error.category(), VoigtErrorCategory::InputValidationError);
        assert_eq!(error.placeholder(), "INPUT.GRID_ORDER");

        let grid = WavelengthGrid::new(vec![1200.0, 1200.5]).expect("grid");
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn fit_region_reports_inclusive_extent() {
        let region = FitRegion::new(4, 9);
        assert_eq!(region.len(), 6);
        assert_eq!(region.indices().collect::<Vec<_>>(), vec![4, 5, 6, 7, 8, 9]);
        assert!(region.overlaps(&FitRegion::new(9, 12)));
        assert!(!region.overlaps(&FitRegion::new(10, 12)));
    }
}
