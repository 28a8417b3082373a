use std::{
    f64::consts::PI,
    sync::Arc,
};

use num::Complex;
use pstd_util::{
    cache::SharedCache,
    power_of_two_exponent,
};

/// Wavenumbers and spectral derivative factors for one grid resolution.
#[derive(Clone, Debug)]
pub struct GridDiscretization {
    pub grid_spacing: f64,
    pub exponent: u32,
    pub wave_numbers: Vec<f64>,
    pub complex_factors: Vec<Complex<f64>>,
    /// Derivative of a pressure line, evaluated on the staggered velocity
    /// points.
    pub pressure_deriv_factors: Vec<Complex<f64>>,
    /// Derivative of a velocity line, evaluated on the pressure points.
    pub velocity_deriv_factors: Vec<Complex<f64>>,
}

impl GridDiscretization {
    pub fn new(grid_spacing: f64, exponent: u32) -> Self {
        let wave_numbers = discretize_wave_numbers(grid_spacing, exponent);
        let half = wave_numbers.len() / 2;

        let complex_factors = (0..wave_numbers.len())
            .map(|i| {
                if i <= half {
                    Complex::i()
                }
                else {
                    -Complex::i()
                }
            })
            .collect::<Vec<_>>();

        let shifted = |sign: f64| {
            wave_numbers
                .iter()
                .zip(&complex_factors)
                .map(|(&k, &cf)| (cf * (sign * k * grid_spacing / 2.0)).exp() * cf * k)
                .collect::<Vec<_>>()
        };

        let pressure_deriv_factors = shifted(-1.0);
        let velocity_deriv_factors = shifted(1.0);

        Self {
            grid_spacing,
            exponent,
            wave_numbers,
            complex_factors,
            pressure_deriv_factors,
            velocity_deriv_factors,
        }
    }

    /// Number of spectral points, `2^exponent`.
    pub fn len(&self) -> usize {
        self.wave_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wave_numbers.is_empty()
    }

    /// Factors that shift a line by `offset` grid cells when applied in the
    /// spectral domain.
    pub fn shift_factors(&self, offset: f64) -> Vec<Complex<f64>> {
        self.wave_numbers
            .iter()
            .zip(&self.complex_factors)
            .map(|(&k, &cf)| (cf * (k * offset * self.grid_spacing)).exp())
            .collect()
    }
}

/// Wavenumbers for a line of `2^exponent` points.
///
/// The first half (including the midpoint) runs linearly from `0` to `π/dx`,
/// the second half mirrors back down towards the smallest non-zero
/// wavenumber.
pub fn discretize_wave_numbers(grid_spacing: f64, exponent: u32) -> Vec<f64> {
    let exponent = exponent.max(1);
    let half = 1usize << (exponent - 1);
    let max_wave_number = PI / grid_spacing;
    let delta = max_wave_number / half as f64;

    let mut wave_numbers = Vec::with_capacity(2 * half);
    wave_numbers.extend(linspace(0.0, max_wave_number, half + 1));
    wave_numbers.extend(linspace(max_wave_number - delta, delta, half - 1));
    wave_numbers
}

fn linspace(start: f64, stop: f64, num: usize) -> impl Iterator<Item = f64> {
    let step = if num > 1 {
        (stop - start) / (num - 1) as f64
    }
    else {
        0.0
    };

    (0..num).map(move |i| {
        if num > 1 && i == num - 1 {
            stop
        }
        else {
            start + i as f64 * step
        }
    })
}

#[derive(Debug, Default)]
pub struct DiscretizationCache {
    cache: SharedCache<(u64, u32), GridDiscretization>,
}

impl DiscretizationCache {
    /// Returns the discretization for lines of `point_count` points, rounded
    /// up to the next power of two.
    ///
    /// All point counts with the same `ceil(log2(point_count))` share one
    /// entry.
    pub fn get_discretization(
        &self,
        grid_spacing: f64,
        point_count: usize,
    ) -> Arc<GridDiscretization> {
        let exponent = power_of_two_exponent(point_count).max(1);
        self.cache
            .get_or_insert_with((grid_spacing.to_bits(), exponent), || {
                tracing::debug!(grid_spacing, exponent, "computing grid discretization");
                GridDiscretization::new(grid_spacing, exponent)
            })
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
