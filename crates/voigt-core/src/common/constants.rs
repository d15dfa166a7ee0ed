//! Physical constants shared by the profile kernels.
//!
//! Optical-depth prefactors are evaluated in cgs units; velocities are carried
//! in km/s and wavelengths in Angstrom.

pub const PI: f64 = std::f64::consts::PI;
pub const SQRT_PI: f64 = 1.772_453_850_905_516_027_298_167_483_341_145_f64;
pub const LN_10: f64 = std::f64::consts::LN_10;

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT_KMS: f64 = 299_792.458_f64;
/// Speed of light in cm/s.
pub const SPEED_OF_LIGHT_CGS: f64 = 2.997_924_58e10_f64;
/// Elementary charge in esu.
pub const ELECTRON_CHARGE_ESU: f64 = 4.803_204_712_570_263e-10_f64;
/// Electron mass in grams.
pub const ELECTRON_MASS_CGS: f64 = 9.109_383_701_5e-28_f64;

/// Angstrom to centimetre.
pub const ANGSTROM_TO_CM: f64 = 1.0e-8;
/// Converts c in km/s into Angstrom/s.
pub const KMS_TO_ANGSTROM_PER_S: f64 = 1.0e13;

/// sqrt(pi) e^2 / (m_e c^2), the classical prefactor of the line optical depth.
pub fn column_to_tau_constant() -> f64 {
    SQRT_PI * ELECTRON_CHARGE_ESU * ELECTRON_CHARGE_ESU
        / ELECTRON_MASS_CGS
        / (SPEED_OF_LIGHT_CGS * SPEED_OF_LIGHT_CGS)
}
