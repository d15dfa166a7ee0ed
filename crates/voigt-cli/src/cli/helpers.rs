use serde::Deserialize;
use std::fs;
use std::path::Path;
use voigt_core::common::config::{load_instrument_config, InstrumentConfig};
use voigt_core::modules::{load_line_list, LineEntry, LineList};
use voigt_core::numerics::linear_grid;
use voigt_core::{Component, FitPixelSet, VoigtError, VoigtResult, WavelengthGrid};

/// Wavelength grid as an explicit list or an evenly spaced range.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum GridSpec {
    Explicit(Vec<f64>),
    Linear { start: f64, stop: f64, count: usize },
}

impl GridSpec {
    fn into_grid(self) -> VoigtResult<WavelengthGrid> {
        let values = match self {
            Self::Explicit(values) => values,
            Self::Linear { start, stop, count } => {
                linear_grid(start, stop, count).ok_or_else(|| {
                    VoigtError::input_validation(
                        "INPUT.GRID_RANGE",
                        format!("linear grid requires count >= 2, got {count}"),
                    )
                })?
            }
        };
        WavelengthGrid::new(values)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ModelRequest {
    grid: GridSpec,
    #[serde(default)]
    components: Vec<Component>,
    #[serde(default)]
    lines: Option<Vec<LineEntry>>,
    #[serde(default)]
    instrument: Option<InstrumentConfig>,
    #[serde(default)]
    fit_pixels: Option<FitPixelSet>,
    #[serde(default)]
    continuum: Option<Vec<f64>>,
}

/// Request document with every optional part resolved.
#[derive(Debug)]
pub(super) struct ResolvedRequest {
    pub grid: WavelengthGrid,
    pub components: Vec<Component>,
    pub lines: LineList,
    pub instrument: InstrumentConfig,
    pub fit_pixels: FitPixelSet,
    pub continuum: Option<Vec<f64>>,
}

/// Reads a request; files named by `--lines` / `--instrument` replace the inline sections.
pub(super) fn load_request(
    path: &Path,
    lines_path: Option<&Path>,
    instrument_path: Option<&Path>,
) -> VoigtResult<ResolvedRequest> {
    let source = fs::read_to_string(path).map_err(|error| {
        VoigtError::io_system(
            "IO.REQUEST_READ",
            format!("failed to read request '{}': {error}", path.display()),
        )
    })?;
    let request: ModelRequest = serde_json::from_str(&source).map_err(|error| {
        VoigtError::input_validation(
            "INPUT.REQUEST_PARSE",
            format!("failed to parse request '{}': {error}", path.display()),
        )
    })?;

    let grid = request.grid.into_grid()?;
    let lines = match (lines_path, request.lines) {
        (Some(path), _) => load_line_list(path)?,
        (None, Some(entries)) => LineList::new(entries)?,
        (None, None) => LineList::common_uv(),
    };
    let instrument = match (instrument_path, request.instrument) {
        (Some(path), _) => load_instrument_config(path)?,
        (None, Some(config)) => config,
        (None, None) => {
            return Err(VoigtError::configuration(
                "CONFIG.MISSING_INSTRUMENT",
                "request has no instrument section and no --instrument file was given",
            ));
        }
    };
    let fit_pixels = request
        .fit_pixels
        .unwrap_or_else(|| FitPixelSet::all(grid.len()));

    Ok(ResolvedRequest {
        grid,
        components: request.components,
        lines,
        instrument,
        fit_pixels,
        continuum: request.continuum,
    })
}

/// `wavelength flux` rows, one per grid point.
pub(super) fn render_flux_table(grid: &[f64], flux: &[f64]) -> String {
    let mut table = String::with_capacity(grid.len() * 32);
    for (wavelength, flux) in grid.iter().zip(flux) {
        table.push_str(&format!("{wavelength:.6} {flux:.10}\n"));
    }
    table
}
