//! Forward model for fitting Voigt absorption profiles to ultraviolet spectra.
//!
//! The crate evaluates intrinsic Voigt optical depths (with analytic
//! Jacobians), groups fit pixels into convolution regions and convolves each
//! region with its instrumental line-spread function. [`modules::FitSession`]
//! ties the pieces together and owns the caches that stay valid while a fitter
//! perturbs component parameters.

pub mod common;
pub mod domain;
pub mod modules;
pub mod numerics;

pub use domain::{
    Component, FitPixelSet, FitRegion, VoigtError, VoigtErrorCategory, VoigtResult,
    WavelengthGrid,
};
pub use modules::{FitSession, LineList};
