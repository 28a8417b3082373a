//! Quantities derived from [`Settings`] once per configuration.

use std::f64::consts::LN_10;

use crate::{
    config::Settings,
    error::KernelError,
};

/// Number of Runge-Kutta stages per frame.
pub const RK_STAGES: usize = 6;

/// Tapering window applied to the stencils on both sides of a line.
#[derive(Clone, Debug, PartialEq)]
pub struct Window {
    /// Number of stencil points on each side.
    pub length: usize,

    /// Exponent of the decay, `(patch_error - 40) / 20 + 1`.
    pub alpha: f64,

    /// `2 * length + 1` window coefficients for `x` in `-length..=length`.
    pub coefficients: Vec<f64>,
}

impl Window {
    /// Shorter windows let the solution of rigid rooms grow without bound
    /// over a few hundred frames.
    pub const MIN_STABLE_LENGTH: usize = 16;

    pub fn from_patch_error(patch_error: f64) -> Result<Self, KernelError> {
        let length = (((0.7 * patch_error - 17.0) / 2.0).round_ties_even() * 2.0).round_ties_even();
        if !(length >= 1.0) {
            return Err(KernelError::invalid(format!(
                "patch error {patch_error} results in an empty window"
            )));
        }
        let length = length as usize;
        let alpha = (patch_error - 40.0) / 20.0 + 1.0;

        let coefficients = (0..=2 * length)
            .map(|i| {
                let x = (i as f64 - length as f64) / length as f64;
                (-alpha * LN_10 * x.powi(6)).exp()
            })
            .collect();

        Ok(Self {
            length,
            alpha,
            coefficients,
        })
    }

    pub fn is_stable(&self) -> bool {
        self.length >= Self::MIN_STABLE_LENGTH
    }

    /// Coefficients for the stencil below the line.
    pub fn lower(&self) -> &[f64] {
        &self.coefficients[..self.length]
    }

    /// Coefficients for the stencil above the line.
    pub fn upper(&self) -> &[f64] {
        &self.coefficients[self.length + 1..]
    }
}

/// Damping factors for a PML layer.
///
/// Both are ordered with the attenuation increasing with the index, i.e.
/// away from the domain the layer is attached to.
#[derive(Clone, Debug, PartialEq)]
pub struct PmlFactors {
    /// Per pressure cell, `n` entries.
    pub pressure: Vec<f64>,

    /// Per velocity point, `n + 1` entries.
    pub velocity: Vec<f64>,
}

impl PmlFactors {
    pub fn new(cells: usize, max_attenuation: f64, time_step: f64) -> Self {
        let n = cells as f64;
        let factor = |x: f64| (-max_attenuation * (x / n).powi(4) * time_step).exp();

        Self {
            pressure: (0..cells).map(|i| factor(i as f64 + 0.5)).collect(),
            velocity: (0..=cells).map(|i| factor(i as f64)).collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DerivedSettings {
    pub grid_spacing: f64,
    pub time_step: f64,
    pub frame_count: usize,
    pub window: Window,

    /// Width of the gaussian pulse emitted by speakers.
    pub band_width: f64,

    pub rk_alpha: [f64; RK_STAGES],
    pub pml: PmlFactors,
    pub sound_speed: f64,
    pub density: f64,
}

impl DerivedSettings {
    pub fn new(settings: &Settings) -> Result<Self, KernelError> {
        settings.validate()?;

        let time_step = settings.cfl * settings.grid_spacing / settings.sound_speed;
        let frame_count = (settings.render_time / time_step).ceil() as usize;
        let window = Window::from_patch_error(settings.patch_error)?;
        if !window.is_stable() {
            tracing::warn!(
                patch_error = settings.patch_error,
                window_length = window.length,
                min_length = Window::MIN_STABLE_LENGTH,
                "stencil window is too short for long runs"
            );
        }
        let band_width = 3e-6 * (settings.sound_speed / settings.grid_spacing).powi(2);
        let rk_alpha = rk_alpha(&settings.rk_coefficients)?;
        let pml = PmlFactors::new(settings.pml_cells, settings.pml_attenuation, time_step);

        Ok(Self {
            grid_spacing: settings.grid_spacing,
            time_step,
            frame_count,
            window,
            band_width,
            rk_alpha,
            pml,
            sound_speed: settings.sound_speed,
            density: settings.density,
        })
    }
}

/// Stage factors of the low-storage Runge-Kutta scheme.
///
/// `alpha[i] = c[i] / prod(alpha[i+1..])`, computed from the last stage
/// backwards.
pub fn rk_alpha(coefficients: &[f64]) -> Result<[f64; RK_STAGES], KernelError> {
    if coefficients.len() != RK_STAGES {
        return Err(KernelError::invalid(format!(
            "expected {RK_STAGES} runge-kutta coefficients, got {}",
            coefficients.len()
        )));
    }

    let mut alpha = [0.0; RK_STAGES];
    let mut product = 1.0;
    for i in (0..RK_STAGES).rev() {
        alpha[i] = coefficients[i] / product;
        product *= alpha[i];
    }

    if alpha.iter().any(|a| !a.is_finite()) {
        return Err(KernelError::invalid("runge-kutta coefficients must be non-zero"));
    }

    Ok(alpha)
}

/// Converts a length in metres to whole grid cells, rounding ties to even.
pub fn round_to_cells(metres: f64, grid_spacing: f64) -> i64 {
    (metres / grid_spacing).round_ties_even() as i64
}
