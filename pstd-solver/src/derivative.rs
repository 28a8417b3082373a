//! Spatial derivatives of grid lines, computed in the wavenumber domain.
//!
//! A line is extended by `W` points on both sides, built from the
//! neighbouring domain's data and the line's own values mirrored at the
//! interface, weighted by the interface's reflection and transmission
//! coefficients. The extended line is tapered with a window, transformed,
//! multiplied by the derivative factors and transformed back.

use nalgebra::DMatrix;
use num::{
    Complex,
    Zero,
};
use pstd_util::nearest_power_of_two;

use crate::{
    config::Axis,
    derived::Window,
    domain::{
        Quantity,
        RhoMatrix,
    },
    error::KernelError,
    wisdom::Wisdom,
};

/// A set of parallel lines read out of a field array.
#[derive(Clone, Copy, Debug)]
pub enum Lines<'a> {
    /// Lines along `axis`, starting at line `offset` across the axis.
    Matrix {
        matrix: &'a DMatrix<f64>,
        axis: Axis,
        offset: usize,
    },

    /// Lines of zeros.
    Zeros { len: usize },
}

impl<'a> Lines<'a> {
    pub fn along(matrix: &'a DMatrix<f64>, axis: Axis, offset: usize) -> Self {
        Self::Matrix {
            matrix,
            axis,
            offset,
        }
    }

    /// Number of values per line.
    pub fn line_len(&self) -> usize {
        match self {
            Self::Matrix { matrix, axis, .. } => {
                match axis {
                    Axis::X => matrix.ncols(),
                    Axis::Y => matrix.nrows(),
                }
            }
            Self::Zeros { len } => *len,
        }
    }

    /// Number of lines available from `offset` on.
    pub fn available(&self) -> usize {
        match self {
            Self::Matrix {
                matrix,
                axis,
                offset,
            } => {
                let lines = match axis {
                    Axis::X => matrix.nrows(),
                    Axis::Y => matrix.ncols(),
                };
                lines.saturating_sub(*offset)
            }
            Self::Zeros { .. } => usize::MAX,
        }
    }

    pub fn get(&self, line: usize, index: usize) -> f64 {
        match self {
            Self::Matrix {
                matrix,
                axis,
                offset,
            } => {
                match axis {
                    Axis::X => matrix[(offset + line, index)],
                    Axis::Y => matrix[(index, offset + line)],
                }
            }
            Self::Zeros { .. } => 0.0,
        }
    }
}

/// Everything besides the data that determines a derivative pass.
#[derive(Clone, Copy, Debug)]
pub struct Stencil<'a> {
    pub window: &'a Window,
    pub quantity: Quantity,
    pub rho: &'a RhoMatrix,

    /// Spectral factors, at least `fft_length / 2 + 1` of them.
    pub factors: &'a [Complex<f64>],
}

/// Transform length used for a domain that is `cells` long along the
/// derivative axis.
///
/// This is the same for pressure (`cells` values per line) and velocity
/// (`cells + 1` values per line).
pub fn transform_length(window_length: usize, cells: usize) -> usize {
    nearest_power_of_two(2 * window_length + cells + 1)
}

/// Computes the derivative of `count` lines and writes them into `dest`.
///
/// Output lines run along `axis` in `dest`, starting at line `dest_offset`.
/// Every line of `own` yields [`Quantity::output_len`] values.
#[allow(clippy::too_many_arguments)]
pub fn windowed_derivative(
    wisdom: &Wisdom,
    stencil: &Stencil,
    count: usize,
    own: Lines,
    lower: Lines,
    upper: Lines,
    dest: &mut DMatrix<f64>,
    axis: Axis,
    dest_offset: usize,
) -> Result<(), KernelError> {
    if count == 0 {
        return Ok(());
    }

    let w = stencil.window.length;
    let shift = stencil.quantity.shift();
    let own_len = own.line_len();
    let out_len = stencil.quantity.output_len(own_len);
    let lower_len = lower.line_len();
    let extended_len = 2 * w + own_len;

    let fft_length = nearest_power_of_two(
        extended_len
            + match stencil.quantity {
                Quantity::Pressure => 1,
                Quantity::Velocity => 0,
            },
    );

    assert!(own_len >= w + 1, "line too short for the stencil");
    assert!(lower_len >= w + shift, "lower neighbour too short for the stencil");
    assert!(upper.line_len() >= w + shift, "upper neighbour too short for the stencil");
    assert!(
        own.available() >= count && lower.available() >= count && upper.available() >= count,
        "not enough lines"
    );
    assert!(stencil.factors.len() >= fft_length / 2 + 1, "too few factors");

    let (dest_len, dest_lines) = match axis {
        Axis::X => (dest.ncols(), dest.nrows()),
        Axis::Y => (dest.nrows(), dest.ncols()),
    };
    assert_eq!(dest_len, out_len, "derivative shape mismatch");
    assert!(dest_offset + count <= dest_lines, "derivative shape mismatch");

    let plan = wisdom.plans.get_plan(fft_length, count)?;

    let rho = stencil.rho;
    let window_lower = stencil.window.lower();
    let window_upper = stencil.window.upper();

    let mut input = vec![0.0; fft_length * count];
    for (line, buffer) in input.chunks_exact_mut(fft_length).enumerate() {
        for j in 0..w {
            buffer[j] = (rho.lower_transmission() * lower.get(line, lower_len - w - shift + j)
                + rho.lower_reflection() * own.get(line, w - 1 + shift - j))
                * window_lower[j];
        }
        for i in 0..own_len {
            buffer[w + i] = own.get(line, i);
        }
        for j in 0..w {
            buffer[w + own_len + j] = (rho.upper_transmission() * upper.get(line, j + shift)
                + rho.upper_reflection() * own.get(line, own_len - 1 - shift - j))
                * window_upper[j];
        }
    }

    let spectrum_len = plan.spectrum_len();
    let mut spectrum = vec![Complex::zero(); spectrum_len * count];
    plan.forward(&input, &mut spectrum);

    for line in spectrum.chunks_exact_mut(spectrum_len) {
        for (bin, factor) in line.iter_mut().zip(stencil.factors) {
            *bin *= *factor;
        }
    }

    plan.inverse(&spectrum, &mut input);

    for (line, buffer) in input.chunks_exact(fft_length).enumerate() {
        let values = &buffer[w..w + out_len];
        match axis {
            Axis::X => {
                for (i, value) in values.iter().enumerate() {
                    dest[(dest_offset + line, i)] = *value;
                }
            }
            Axis::Y => {
                for (i, value) in values.iter().enumerate() {
                    dest[(i, dest_offset + line)] = *value;
                }
            }
        }
    }

    Ok(())
}
