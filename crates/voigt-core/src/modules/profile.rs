//! Unconvolved Voigt optical depth, transmitted flux and analytic Jacobians.

use crate::common::constants::{
    column_to_tau_constant, ANGSTROM_TO_CM, KMS_TO_ANGSTROM_PER_S, LN_10, PI, SPEED_OF_LIGHT_KMS,
};
use crate::domain::{AtomicTransition, Component, VoigtError, VoigtResult};
use crate::modules::lines::{AtomicDataCache, LineDataSource};
use crate::numerics::{voigt_h, voigt_h_with_jacobian};

/// Flux and its partial derivatives, one Jacobian row per component.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileJacobian {
    pub flux: Vec<f64>,
    /// d flux / d log10 N
    pub d_column_density: Vec<Vec<f64>>,
    /// d flux / d velocity offset (km/s)
    pub d_velocity: Vec<Vec<f64>>,
    /// d flux / d b (km/s)
    pub d_b_value: Vec<Vec<f64>>,
}

/// Per-component quantities that do not depend on the wavelength.
#[derive(Debug, Clone, Copy)]
struct LineGeometry {
    rest_wavelength: f64,
    doppler_width: f64,
    damping_parameter: f64,
    redshift_factor: f64,
    velocity_shift: f64,
    /// Optical depth per unit H(x, a).
    tau_scale: f64,
    b_value: f64,
}

impl LineGeometry {
    fn new(component: &Component, transition: &AtomicTransition) -> Self {
        let lam0 = transition.rest_wavelength;
        let doppler_width = component.b_value * lam0 / SPEED_OF_LIGHT_KMS;
        let damping_parameter = transition.damping
            / (4.0
                * PI
                * (SPEED_OF_LIGHT_KMS * KMS_TO_ANGSTROM_PER_S / (lam0 * lam0) * doppler_width));
        let multiplier = column_to_tau_constant()
            * (lam0 * ANGSTROM_TO_CM).powi(2)
            * 1.0e8
            * transition.oscillator_strength;
        let tau_scale = multiplier * 10f64.powf(component.log_column_density) / doppler_width;

        Self {
            rest_wavelength: lam0,
            doppler_width,
            damping_parameter,
            redshift_factor: 1.0 + component.redshift,
            velocity_shift: lam0 * component.velocity_offset / SPEED_OF_LIGHT_KMS,
            tau_scale,
            b_value: component.b_value,
        }
    }

    fn detuning(&self, wavelength: f64) -> f64 {
        let rest_frame = wavelength / self.redshift_factor;
        (rest_frame - self.rest_wavelength - self.velocity_shift) / self.doppler_width
    }
}

pub fn validate_components(components: &[Component]) -> VoigtResult<()> {
    for (index, component) in components.iter().enumerate() {
        let finite = [
            component.line_id,
            component.log_column_density,
            component.b_value,
            component.redshift,
            component.velocity_offset,
        ]
        .iter()
        .all(|value| value.is_finite());
        if !finite {
            return Err(VoigtError::input_validation(
                "INPUT.COMPONENT",
                format!("component {index} has non-finite parameters: {component:?}"),
            ));
        }
        if component.b_value <= 0.0 {
            return Err(VoigtError::input_validation(
                "INPUT.COMPONENT",
                format!(
                    "component {index} requires b > 0 km/s, got {}",
                    component.b_value
                ),
            ));
        }
        if component.redshift <= -1.0 {
            return Err(VoigtError::input_validation(
                "INPUT.COMPONENT",
                format!(
                    "component {index} requires redshift > -1, got {}",
                    component.redshift
                ),
            ));
        }
    }
    Ok(())
}

/// Total optical depth; `transitions` is aligned with `components`.
pub fn optical_depth(
    grid: &[f64],
    components: &[Component],
    transitions: &[AtomicTransition],
) -> Vec<f64> {
    let mut tau_total = vec![0.0; grid.len()];
    for (component, transition) in components.iter().zip(transitions) {
        let line = LineGeometry::new(component, transition);
        for (tau, &wavelength) in tau_total.iter_mut().zip(grid) {
            let x = line.detuning(wavelength);
            *tau += line.tau_scale * voigt_h(x, line.damping_parameter);
        }
    }
    tau_total
}

pub fn transmitted_flux(
    grid: &[f64],
    components: &[Component],
    transitions: &[AtomicTransition],
) -> Vec<f64> {
    optical_depth(grid, components, transitions)
        .into_iter()
        .map(|tau| (-tau).exp())
        .collect()
}

pub fn transmitted_flux_with_jacobian(
    grid: &[f64],
    components: &[Component],
    transitions: &[AtomicTransition],
) -> ProfileJacobian {
    let mut tau_total = vec![0.0; grid.len()];
    let mut d_column_density = Vec::with_capacity(components.len());
    let mut d_velocity = Vec::with_capacity(components.len());
    let mut d_b_value = Vec::with_capacity(components.len());

    for (component, transition) in components.iter().zip(transitions) {
        let line = LineGeometry::new(component, transition);
        let a = line.damping_parameter;
        let b = line.b_value;
        let dx_dv = -line.rest_wavelength / (SPEED_OF_LIGHT_KMS * line.doppler_width);
        let da_db = -a / b;

        let mut column_row = vec![0.0; grid.len()];
        let mut velocity_row = vec![0.0; grid.len()];
        let mut b_row = vec![0.0; grid.len()];
        for (index, &wavelength) in grid.iter().enumerate() {
            let x = line.detuning(wavelength);
            let kernel = voigt_h_with_jacobian(x, a);
            let tau = line.tau_scale * kernel.value;
            let dx_db = -x / b;

            column_row[index] = tau * LN_10;
            velocity_row[index] = line.tau_scale * dx_dv * kernel.d_dx;
            b_row[index] =
                -tau / b + line.tau_scale * (dx_db * kernel.d_dx + da_db * kernel.d_da);
            tau_total[index] += tau;
        }

        d_column_density.push(column_row);
        d_velocity.push(velocity_row);
        d_b_value.push(b_row);
    }

    let flux: Vec<f64> = tau_total.iter().map(|tau| (-tau).exp()).collect();
    for row in d_column_density
        .iter_mut()
        .chain(d_velocity.iter_mut())
        .chain(d_b_value.iter_mut())
    {
        for (value, &flux) in row.iter_mut().zip(&flux) {
            *value *= -flux;
        }
    }

    ProfileJacobian {
        flux,
        d_column_density,
        d_velocity,
        d_b_value,
    }
}

/// Forward model over a fixed line data source, caching transitions per line id.
#[derive(Debug, Clone)]
pub struct ProfileModel<S> {
    source: S,
    cache: AtomicDataCache,
}

impl<S> ProfileModel<S>
where
    S: LineDataSource,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: AtomicDataCache::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cached_line_count(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn transitions(&mut self, components: &[Component]) -> VoigtResult<Vec<AtomicTransition>> {
        validate_components(components)?;
        Ok(self.cache.resolve(&self.source, components)?)
    }

    pub fn optical_depth(&mut self, grid: &[f64], components: &[Component]) -> VoigtResult<Vec<f64>> {
        let transitions = self.transitions(components)?;
        Ok(optical_depth(grid, components, &transitions))
    }

    pub fn evaluate(&mut self, grid: &[f64], components: &[Component]) -> VoigtResult<Vec<f64>> {
        let transitions = self.transitions(components)?;
        Ok(transmitted_flux(grid, components, &transitions))
    }

    pub fn evaluate_with_jacobian(
        &mut self,
        grid: &[f64],
        components: &[Component],
    ) -> VoigtResult<ProfileJacobian> {
        let transitions = self.transitions(components)?;
        Ok(transmitted_flux_with_jacobian(
            grid,
            components,
            &transitions,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{ProfileModel, transmitted_flux, transmitted_flux_with_jacobian};
    use crate::domain::{AtomicTransition, Component, VoigtErrorCategory};
    use crate::modules::lines::LineList;
    use crate::numerics::linear_grid;

    const LYA: AtomicTransition = AtomicTransition::new(1215.6701, 0.4164, 6.265e8);

    fn lya_grid() -> Vec<f64> {
        linear_grid(1213.0, 1218.0, 200).expect("grid")
    }

    #[test]
    fn flux_is_bounded_and_unity_far_from_line() {
        let grid = lya_grid();
        let component = Component::new(1215.67, 14.0, 20.0, 0.0, 0.0);
        let flux = transmitted_flux(&grid, &[component], &[LYA]);

        for (index, value) in flux.iter().copied().enumerate() {
            assert!(
                value > 0.0 && value <= 1.0,
                "flux[{index}] = {value} outside (0, 1]"
            );
        }
        assert!(flux[0] > 0.999);
        assert!(flux[flux.len() - 1] > 0.999);

        let no_lines = transmitted_flux(&grid, &[], &[]);
        assert!(no_lines.iter().all(|value| *value == 1.0));
    }

    #[test]
    fn absorption_deepens_with_column_density() {
        let grid = lya_grid();
        let mut previous_minimum = 1.0;
        for log_n in [-5.0, 11.0, 12.5, 13.5, 14.5] {
            let component = Component::new(1215.67, log_n, 20.0, 0.0, 0.0);
            let flux = transmitted_flux(&grid, &[component], &[LYA]);
            let minimum = flux.iter().copied().fold(f64::INFINITY, f64::min);
            assert!(
                minimum < previous_minimum || (log_n == -5.0 && minimum <= 1.0),
                "minimum flux {minimum} at log N = {log_n} did not drop below {previous_minimum}"
            );
            if log_n == -5.0 {
                assert!(minimum > 1.0 - 1.0e-12);
            }
            previous_minimum = minimum;
        }
    }

    #[test]
    fn redshift_and_velocity_shift_the_trough() {
        let grid = linear_grid(1330.0, 1345.0, 600).expect("grid");
        let z = 0.1;
        let shifted = Component::new(1215.67, 14.0, 15.0, z, 0.0);
        let flux = transmitted_flux(&grid, &[shifted], &[LYA]);
        let centre = grid[argmin(&flux)];
        assert!(
            (centre - 1215.6701 * (1.0 + z)).abs() < 0.03,
            "trough at {centre}"
        );

        let with_velocity = shifted.with_velocity_offset(300.0);
        let flux = transmitted_flux(&grid, &[with_velocity], &[LYA]);
        let moved = grid[argmin(&flux)];
        let expected = 1215.6701 * (1.0 + 300.0 / 299_792.458) * (1.0 + z);
        assert!((moved - expected).abs() < 0.03, "trough at {moved}");
    }

    #[test]
    fn jacobian_path_reproduces_forward_flux_exactly() {
        let grid = lya_grid();
        let components = [
            Component::new(1215.67, 13.8, 22.0, 0.0, -15.0),
            Component::new(1215.67, 13.1, 9.0, 0.0, 40.0),
        ];
        let flux = transmitted_flux(&grid, &components, &[LYA, LYA]);
        let jacobian = transmitted_flux_with_jacobian(&grid, &components, &[LYA, LYA]);

        assert_eq!(flux, jacobian.flux);
        assert_eq!(jacobian.d_column_density.len(), 2);
        assert_eq!(jacobian.d_velocity[1].len(), grid.len());
        assert_eq!(jacobian.d_b_value[0].len(), grid.len());
    }

    #[test]
    fn model_resolves_line_data_once_and_validates_components() {
        let mut model = ProfileModel::new(LineList::common_uv());
        let grid = lya_grid();
        let component = Component::new(1215.67, 13.0, 20.0, 0.0, 0.0);

        model.evaluate(&grid, &[component]).expect("evaluate");
        model
            .evaluate_with_jacobian(&grid, &[component, component])
            .expect("evaluate with jacobian");
        assert_eq!(model.cached_line_count(), 1);

        let error = model
            .evaluate(&grid, &[component.with_b_value(0.0)])
            .expect_err("b = 0 should fail");
        assert_eq!(error.category(), VoigtErrorCategory::InputValidationError);

        let error = model
            .evaluate(&grid, &[Component::new(1300.0, 13.0, 20.0, 0.0, 0.0)])
            .expect_err("unknown line should fail");
        assert_eq!(error.placeholder(), "CONFIG.UNKNOWN_LINE");

        model.clear_cache();
        assert_eq!(model.cached_line_count(), 0);
    }

    fn argmin(values: &[f64]) -> usize {
        values
            .iter()
            .enumerate()
            .min_by(|lhs, rhs| lhs.1.total_cmp(rhs.1))
            .map(|(index, _)| index)
            .expect("non-empty")
    }
}
