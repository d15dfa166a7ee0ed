use super::CliError;
use super::helpers::{load_request, render_flux_table, ResolvedRequest};
use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use voigt_core::modules::{GroupingWarning, WavelengthCluster};
use voigt_core::{Component, FitRegion, FitSession, LineList};

#[derive(clap::Args)]
pub(super) struct RequestArgs {
    /// Request document (grid, components, lines, instrument, fitPixels)
    #[arg(long)]
    request: PathBuf,

    /// Line list JSON replacing the request's `lines` section
    #[arg(long)]
    lines: Option<PathBuf>,

    /// Instrument configuration JSON replacing the request's `instrument` section
    #[arg(long)]
    instrument: Option<PathBuf>,
}

impl RequestArgs {
    fn load(&self) -> Result<ResolvedRequest, CliError> {
        Ok(load_request(
            &self.request,
            self.lines.as_deref(),
            self.instrument.as_deref(),
        )?)
    }
}

#[derive(clap::Args)]
pub(super) struct ModelArgs {
    #[command(flatten)]
    request: RequestArgs,

    /// Write output here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Emit flux and convolved Jacobian rows as JSON
    #[arg(long)]
    jacobian: bool,
}

#[derive(clap::Args)]
pub(super) struct RegionsArgs {
    #[command(flatten)]
    request: RequestArgs,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JacobianReport<'a> {
    wavelength: &'a [f64],
    flux: Vec<f64>,
    d_column_density: Vec<Vec<f64>>,
    d_velocity: Vec<Vec<f64>>,
    d_b_value: Vec<Vec<f64>>,
}

#[derive(Serialize)]
struct RegionReport<'a> {
    regions: &'a [FitRegion],
    wavelengths: Vec<[f64; 2]>,
    settings: &'a [usize],
    clusters: &'a [WavelengthCluster],
    warnings: &'a [GroupingWarning],
}

/// Request parts that vary per evaluation rather than per session.
struct ResolvedExtras {
    components: Vec<Component>,
    continuum: Option<Vec<f64>>,
}

fn open_session(request: ResolvedRequest) -> Result<(FitSession<LineList>, ResolvedExtras), CliError> {
    let extras = ResolvedExtras {
        components: request.components,
        continuum: request.continuum,
    };
    let session = FitSession::new(
        request.grid,
        request.instrument,
        request.fit_pixels,
        request.lines,
    )?;
    Ok((session, extras))
}

pub(super) fn run_model_command(args: ModelArgs) -> Result<i32, CliError> {
    let (mut session, extras) = open_session(args.request.load()?)?;

    let rendered = if args.jacobian {
        if extras.continuum.is_some() {
            return Err(CliError::Usage(
                "--jacobian does not support requests with a continuum".to_string(),
            ));
        }
        let jacobian = session.model_flux_with_jacobian(&extras.components)?;
        let report = JacobianReport {
            wavelength: session.grid().as_slice(),
            flux: jacobian.flux,
            d_column_density: jacobian.d_column_density,
            d_velocity: jacobian.d_velocity,
            d_b_value: jacobian.d_b_value,
        };
        serde_json::to_string_pretty(&report).context("failed to serialize Jacobian report")?
    } else {
        let flux = match &extras.continuum {
            Some(continuum) => session.model_flux_with_continuum(&extras.components, continuum)?,
            None => session.model_flux(&extras.components)?,
        };
        render_flux_table(session.grid(), &flux)
    };

    info!(
        pixels = session.grid().len(),
        components = extras.components.len(),
        "evaluated model"
    );
    emit(&rendered, args.output.as_deref())?;
    Ok(0)
}

pub(super) fn run_regions_command(args: RegionsArgs) -> Result<i32, CliError> {
    let (mut session, _) = open_session(args.request.load()?)?;
    let grid = session.grid().clone();
    let grouping = session.grouping()?;

    let report = RegionReport {
        regions: &grouping.regions,
        wavelengths: grouping
            .regions
            .iter()
            .map(|region| [grid[region.start], grid[region.end]])
            .collect(),
        settings: &grouping.settings,
        clusters: &grouping.clusters,
        warnings: &grouping.warnings,
    };
    let rendered =
        serde_json::to_string_pretty(&report).context("failed to serialize region report")?;
    emit(&rendered, None)?;
    Ok(0)
}

fn emit(rendered: &str, output: Option<&Path>) -> Result<(), CliError> {
    match output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("failed to write output '{}'", path.display()))?,
        None => {
            print!("{rendered}");
            if !rendered.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}
