//! Fit session: the state a fitter keeps while it perturbs component parameters.
//!
//! Region grouping, clustering and kernel interpolation depend only on the
//! grid, the fit pixels and the instrument configuration. They are computed on
//! first use and reused until one of those inputs changes.

use crate::common::config::InstrumentConfig;
use crate::domain::{Component, FitPixelSet, FitRegion, VoigtError, VoigtResult, WavelengthGrid};
use crate::modules::convolution::ConvolutionEngine;
use crate::modules::lines::LineDataSource;
use crate::modules::lsf::{assign_kernels, DefaultLsfProvider, LsfKernel, LsfProvider};
use crate::modules::profile::{ProfileJacobian, ProfileModel};
use crate::modules::regions::{
    drop_straddling_regions, GroupingWarning, RegionGrouper, WavelengthCluster,
};
use serde::Serialize;
use tracing::info;

/// Cached output of region grouping and kernel assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionGrouping {
    pub regions: Vec<FitRegion>,
    pub clusters: Vec<WavelengthCluster>,
    #[serde(skip)]
    pub kernels: Vec<LsfKernel>,
    /// Instrument setting index per region.
    pub settings: Vec<usize>,
    pub warnings: Vec<GroupingWarning>,
}

pub struct FitSession<S, P = DefaultLsfProvider> {
    grid: WavelengthGrid,
    config: InstrumentConfig,
    fit_pixels: FitPixelSet,
    model: ProfileModel<S>,
    provider: P,
    engine: ConvolutionEngine,
    grouping: Option<RegionGrouping>,
}

impl<S> FitSession<S, DefaultLsfProvider>
where
    S: LineDataSource,
{
    pub fn new(
        grid: WavelengthGrid,
        config: InstrumentConfig,
        fit_pixels: FitPixelSet,
        source: S,
    ) -> VoigtResult<Self> {
        Self::with_provider(grid, config, fit_pixels, source, DefaultLsfProvider::new())
    }
}

impl<S, P> FitSession<S, P>
where
    S: LineDataSource,
    P: LsfProvider,
{
    pub fn with_provider(
        grid: WavelengthGrid,
        config: InstrumentConfig,
        fit_pixels: FitPixelSet,
        source: S,
        provider: P,
    ) -> VoigtResult<Self> {
        config.validate()?;
        check_fit_pixels(&fit_pixels, grid.len())?;
        Ok(Self {
            grid,
            config,
            fit_pixels,
            model: ProfileModel::new(source),
            provider,
            engine: ConvolutionEngine::new(),
            grouping: None,
        })
    }

    pub fn grid(&self) -> &WavelengthGrid {
        &self.grid
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn fit_pixels(&self) -> &FitPixelSet {
        &self.fit_pixels
    }

    pub fn is_grouped(&self) -> bool {
        self.grouping.is_some()
    }

    pub fn cached_line_count(&self) -> usize {
        self.model.cached_line_count()
    }

    pub fn set_fit_pixels(&mut self, fit_pixels: FitPixelSet) -> VoigtResult<()> {
        check_fit_pixels(&fit_pixels, self.grid.len())?;
        self.fit_pixels = fit_pixels;
        self.invalidate_grouping();
        Ok(())
    }

    pub fn set_instrument_config(&mut self, config: InstrumentConfig) -> VoigtResult<()> {
        config.validate()?;
        self.config = config;
        self.invalidate_grouping();
        Ok(())
    }

    pub fn set_grid(&mut self, grid: WavelengthGrid, fit_pixels: FitPixelSet) -> VoigtResult<()> {
        check_fit_pixels(&fit_pixels, grid.len())?;
        self.grid = grid;
        self.fit_pixels = fit_pixels;
        self.invalidate_grouping();
        Ok(())
    }

    pub fn invalidate_grouping(&mut self) {
        self.grouping = None;
    }

    /// Forgets resolved atomic data, e.g. after the line list has been edited.
    pub fn clear_atomic_cache(&mut self) {
        self.model.clear_cache();
    }

    pub fn grouping(&mut self) -> VoigtResult<&RegionGrouping> {
        if self.grouping.is_none() {
            let grouping = self.build_grouping()?;
            info!(
                regions = grouping.regions.len(),
                clusters = grouping.clusters.len(),
                warnings = grouping.warnings.len(),
                "built convolution regions"
            );
            self.grouping = Some(grouping);
        }
        self.grouping
            .as_ref()
            .ok_or_else(|| VoigtError::internal("RUN.GROUPING", "region grouping was not cached"))
    }

    fn build_grouping(&self) -> VoigtResult<RegionGrouping> {
        let grouper = RegionGrouper::new(&self.grid, self.config.thresholds);
        let regions = grouper.compute_regions(&self.fit_pixels)?;
        let (regions, mut warnings) = drop_straddling_regions(regions, &self.grid, &self.config);
        let clusters = if regions.is_empty() {
            Vec::new()
        } else {
            grouper.cluster_regions(&regions)?
        };

        let sources = self.provider.build_lsf_objects(&self.config.settings)?;
        let assignment = assign_kernels(&regions, &self.grid, &self.config, &sources)?;
        warnings.extend(assignment.warnings);

        Ok(RegionGrouping {
            regions,
            clusters,
            kernels: assignment.kernels,
            settings: assignment.settings,
            warnings,
        })
    }

    /// Intrinsic transmitted flux over the whole grid.
    pub fn unconvolved_flux(&mut self, components: &[Component]) -> VoigtResult<Vec<f64>> {
        self.model.evaluate(&self.grid, components)
    }

    pub fn optical_depth(&mut self, components: &[Component]) -> VoigtResult<Vec<f64>> {
        self.model.optical_depth(&self.grid, components)
    }

    /// Flux convolved with the instrumental LSF inside every fit region.
    pub fn model_flux(&mut self, components: &[Component]) -> VoigtResult<Vec<f64>> {
        let flux = self.model.evaluate(&self.grid, components)?;
        self.convolve(&flux)
    }

    /// As [`Self::model_flux`], with the intrinsic flux multiplied by `continuum` before convolving.
    pub fn model_flux_with_continuum(
        &mut self,
        components: &[Component],
        continuum: &[f64],
    ) -> VoigtResult<Vec<f64>> {
        if continuum.len() != self.grid.len() {
            return Err(VoigtError::input_validation(
                "INPUT.CONTINUUM",
                format!(
                    "continuum has {} points but the grid has {}",
                    continuum.len(),
                    self.grid.len()
                ),
            ));
        }
        let flux: Vec<f64> = self
            .model
            .evaluate(&self.grid, components)?
            .into_iter()
            .zip(continuum)
            .map(|(flux, continuum)| flux * continuum)
            .collect();
        self.convolve(&flux)
    }

    /// Convolved flux with every Jacobian row convolved by the same kernels.
    pub fn model_flux_with_jacobian(
        &mut self,
        components: &[Component],
    ) -> VoigtResult<ProfileJacobian> {
        let intrinsic = self.model.evaluate_with_jacobian(&self.grid, components)?;
        let engine = self.engine;
        let grouping = self.grouping()?;
        let convolve_rows = |rows: &[Vec<f64>]| -> VoigtResult<Vec<Vec<f64>>> {
            rows.iter()
                .map(|row| engine.convolve_derivative(row, &grouping.regions, &grouping.kernels))
                .collect()
        };

        Ok(ProfileJacobian {
            flux: engine.convolve(&intrinsic.flux, &grouping.regions, &grouping.kernels)?,
            d_column_density: convolve_rows(&intrinsic.d_column_density)?,
            d_velocity: convolve_rows(&intrinsic.d_velocity)?,
            d_b_value: convolve_rows(&intrinsic.d_b_value)?,
        })
    }

    fn convolve(&mut self, flux: &[f64]) -> VoigtResult<Vec<f64>> {
        let engine = self.engine;
        let grouping = self.grouping()?;
        engine.convolve(flux, &grouping.regions, &grouping.kernels)
    }
}

fn check_fit_pixels(fit_pixels: &FitPixelSet, grid_len: usize) -> VoigtResult<()> {
    match fit_pixels.max_index() {
        Some(index) if index >= grid_len => Err(VoigtError::input_validation(
            "INPUT.FIT_PIXELS",
            format!("fit pixel {index} lies outside the {grid_len}-pixel wavelength grid"),
        )),
        _ => Ok(()),
    }
}
