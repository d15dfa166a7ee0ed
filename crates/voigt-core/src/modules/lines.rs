//! Atomic line data lookup and the per-session transition cache.

use crate::domain::{AtomicTransition, Component, VoigtError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_MATCH_TOLERANCE: f64 = 0.01;

/// Source of rest wavelength, oscillator strength and damping constant for a line id.
pub trait LineDataSource {
    fn transition(&self, line_id: f64) -> Result<AtomicTransition, LineDataError>;
}

impl<T> LineDataSource for &T
where
    T: LineDataSource + ?Sized,
{
    fn transition(&self, line_id: f64) -> Result<AtomicTransition, LineDataError> {
        (**self).transition(line_id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEntry {
    #[serde(default)]
    pub label: Option<String>,
    pub rest_wavelength: f64,
    pub oscillator_strength: f64,
    pub damping: f64,
}

impl LineEntry {
    pub fn new(
        label: impl Into<String>,
        rest_wavelength: f64,
        oscillator_strength: f64,
        damping: f64,
    ) -> Self {
        Self {
            label: Some(label.into()),
            rest_wavelength,
            oscillator_strength,
            damping,
        }
    }

    pub fn transition(&self) -> AtomicTransition {
        AtomicTransition::new(self.rest_wavelength, self.oscillator_strength, self.damping)
    }
}

/// Tabulated transitions matched by nearest rest wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct LineList {
    entries: Vec<LineEntry>,
    tolerance: f64,
}

impl LineList {
    pub fn new(entries: Vec<LineEntry>) -> Result<Self, LineDataError> {
        for (index, entry) in entries.iter().enumerate() {
            let values = [
                entry.rest_wavelength,
                entry.oscillator_strength,
                entry.damping,
            ];
            if values.iter().any(|value| !value.is_finite())
                || entry.rest_wavelength <= 0.0
                || entry.oscillator_strength < 0.0
                || entry.damping < 0.0
            {
                return Err(LineDataError::InvalidEntry {
                    index,
                    rest_wavelength: entry.rest_wavelength,
                });
            }
        }
        Ok(Self {
            entries,
            tolerance: DEFAULT_MATCH_TOLERANCE,
        })
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn from_json_str(source: &str) -> Result<Self, LineDataError> {
        let entries: Vec<LineEntry> = serde_json::from_str(source)?;
        Self::new(entries)
    }

    /// A handful of strong far-UV transitions.
    pub fn common_uv() -> Self {
        Self {
            entries: vec![
                LineEntry::new("HI 1025", 1025.7223, 0.07912, 1.897e8),
                LineEntry::new("OVI 1031", 1031.926, 0.1325, 4.163e8),
                LineEntry::new("OVI 1037", 1037.617, 0.06580, 4.095e8),
                LineEntry::new("HI 1215", 1215.6701, 0.4164, 6.265e8),
                LineEntry::new("SiIV 1393", 1393.755, 0.5130, 8.800e8),
                LineEntry::new("SiIV 1402", 1402.770, 0.2550, 8.630e8),
                LineEntry::new("CIV 1548", 1548.204, 0.1899, 2.642e8),
                LineEntry::new("CIV 1550", 1550.781, 0.09475, 2.628e8),
            ],
            tolerance: DEFAULT_MATCH_TOLERANCE,
        }
    }

    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    pub fn find(&self, line_id: f64) -> Option<&LineEntry> {
        self.entries
            .iter()
            .map(|entry| (entry, (entry.rest_wavelength - line_id).abs()))
            .filter(|(_, distance)| *distance <= self.tolerance)
            .min_by(|lhs, rhs| lhs.1.total_cmp(&rhs.1))
            .map(|(entry, _)| entry)
    }
}

impl LineDataSource for LineList {
    fn transition(&self, line_id: f64) -> Result<AtomicTransition, LineDataError> {
        self.find(line_id)
            .map(LineEntry::transition)
            .ok_or(LineDataError::UnknownLine {
                line_id,
                tolerance: self.tolerance,
            })
    }
}

pub fn load_line_list(path: impl AsRef<Path>) -> Result<LineList, LineDataError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| LineDataError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<LineEntry> =
        serde_json::from_str(&source).map_err(|source| LineDataError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;
    LineList::new(entries)
}

#[derive(Debug, thiserror::Error)]
pub enum LineDataError {
    #[error("no transition within {tolerance} A of line id {line_id}")]
    UnknownLine { line_id: f64, tolerance: f64 },
    #[error("line list entry {index} ({rest_wavelength} A) has invalid atomic data")]
    InvalidEntry { index: usize, rest_wavelength: f64 },
    #[error("failed to read line list '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse line list '{}': {source}", path.display())]
    ParseFile {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to parse line list: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<LineDataError> for VoigtError {
    fn from(error: LineDataError) -> Self {
        match error {
            LineDataError::Read { .. } => VoigtError::io_system("IO.LINE_LIST", error.to_string()),
            LineDataError::Parse(_)
            | LineDataError::ParseFile { .. }
            | LineDataError::InvalidEntry { .. } => {
                VoigtError::input_validation("INPUT.LINE_LIST", error.to_string())
            }
            LineDataError::UnknownLine { .. } => {
                VoigtError::configuration("CONFIG.UNKNOWN_LINE", error.to_string())
            }
        }
    }
}

/// Transitions resolved once per line id for the lifetime of a fit session.
#[derive(Debug, Clone, Default)]
pub struct AtomicDataCache {
    transitions: HashMap<u64, AtomicTransition>,
}

impl AtomicDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<S>(
        &mut self,
        source: &S,
        components: &[Component],
    ) -> Result<Vec<AtomicTransition>, LineDataError>
    where
        S: LineDataSource + ?Sized,
    {
        components
            .iter()
            .map(|component| self.resolve_one(source, component.line_id))
            .collect()
    }

    fn resolve_one<S>(&mut self, source: &S, line_id: f64) -> Result<AtomicTransition, LineDataError>
    where
        S: LineDataSource + ?Sized,
    {
        let key = line_id.to_bits();
        if let Some(transition) = self.transitions.get(&key) {
            return Ok(*transition);
        }

        let transition = source.transition(line_id)?;
        debug!(
            line_id,
            rest_wavelength = transition.rest_wavelength,
            oscillator_strength = transition.oscillator_strength,
            damping = transition.damping,
            "cached atomic data"
        );
        self.transitions.insert(key, transition);
        Ok(transition)
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{load_line_list, AtomicDataCache, LineDataError, LineDataSource, LineList};
    use crate::domain::{AtomicTransition, Component, VoigtErrorCategory};
    use crate::VoigtError;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct CountingSource {
        calls: Cell<usize>,
    }

    impl LineDataSource for CountingSource {
        fn transition(&self, line_id: f64) -> Result<AtomicTransition, LineDataError> {
            self.calls.set(self.calls.get() + 1);
            Ok(AtomicTransition::new(line_id, 0.5, 1.0e8))
        }
    }

    #[test]
    fn lookup_matches_nearest_rest_wavelength_within_tolerance() {
        let lines = LineList::common_uv();
        let lya = lines.transition(1215.67).expect("Lyman alpha");
        assert_eq!(lya.rest_wavelength, 1215.6701);
        assert_eq!(lya.oscillator_strength, 0.4164);

        let error = lines.transition(1216.0).expect_err("too far from any line");
        assert!(matches!(error, LineDataError::UnknownLine { .. }));
        let error: VoigtError = error.into();
        assert_eq!(error.category(), VoigtErrorCategory::ConfigurationError);
    }

    #[test]
    fn cache_queries_source_once_per_line() {
        let source = CountingSource {
            calls: Cell::new(0),
        };
        let components = [
            Component::new(1548.2, 13.5, 10.0, 0.0, 0.0),
            Component::new(1548.2, 13.1, 25.0, 0.0, -40.0),
            Component::new(1550.8, 13.1, 25.0, 0.0, -40.0),
        ];
        let mut cache = AtomicDataCache::new();

        let first = cache.resolve(&source, &components).expect("resolve");
        let second = cache.resolve(&source, &components).expect("resolve again");

        assert_eq!(first, second);
        assert_eq!(source.calls.get(), 2);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn line_list_loads_from_json() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("lines.json");
        std::fs::write(
            &path,
            r#"[
              { "label": "NV 1238", "restWavelength": 1238.821, "oscillatorStrength": 0.156, "damping": 3.40e8 },
              { "restWavelength": 1242.804, "oscillatorStrength": 0.0777, "damping": 3.37e8 }
            ]"#,
        )
        .expect("line list should be written");

        let lines = load_line_list(&path).expect("line list should load");
        assert_eq!(lines.entries().len(), 2);
        assert_eq!(lines.entries()[0].label.as_deref(), Some("NV 1238"));
        let nv = lines.transition(1242.8).expect("NV 1242");
        assert_eq!(nv.damping, 3.37e8);

        let error = LineList::from_json_str(
            r#"[{ "restWavelength": -1.0, "oscillatorStrength": 0.1, "damping": 1.0 }]"#,
        )
        .expect_err("negative wavelength should fail");
        assert!(matches!(error, LineDataError::InvalidEntry { index: 0, .. }));
    }
}
