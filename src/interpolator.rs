//! Spline primitives shared by the tricubic interpolator: natural cubic
//! splines along one axis and bicubic Hermite surfaces over a 2D lattice.

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
    #[error("No data to interpolate")]
    NoData,

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Knots along {axis} are not strictly increasing at index {index}")]
    NonMonotonic { axis: char, index: usize },

    #[error("Need at least 2 knots along {axis}, got {len}")]
    TooFewSamples { axis: char, len: usize },

    #[error("{axis} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        axis: char,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Interpolation cancelled")]
    Cancelled,
}

/// Checks that `knots` has at least two strictly increasing entries.
pub(crate) fn check_knots(knots: &[f64], axis: char) -> Result<(), InterpolationError> {
    if knots.is_empty() {
        return Err(InterpolationError::NoData);
    }
    check_order(knots, axis)?;
    if knots.len() < 2 {
        return Err(InterpolationError::TooFewSamples {
            axis,
            len: knots.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_order(knots: &[f64], axis: char) -> Result<(), InterpolationError> {
    match knots.windows(2).position(|w| !(w[0] < w[1])) {
        Some(index) => Err(InterpolationError::NonMonotonic {
            axis,
            index: index + 1,
        }),
        None => Ok(()),
    }
}

/// Index of the knot interval holding `value`. A value equal to the last
/// knot belongs to the last interval.
pub(crate) fn search_index(knots: &[f64], value: f64, axis: char) -> Result<usize, InterpolationError> {
    let n = knots.len();
    let (min, max) = (knots[0], knots[n - 1]);
    if !(value >= min && value <= max) {
        return Err(InterpolationError::OutOfRange {
            axis,
            value,
            min,
            max,
        });
    }
    let above = knots.partition_point(|&k| k <= value);
    Ok(above.saturating_sub(1).min(n - 2))
}

/// Next index along an axis of length `len`, saturating at the end.
#[inline]
pub(crate) fn next_index(i: usize, len: usize) -> usize {
    (i + 1).min(len - 1)
}

/// Previous index, saturating at zero.
#[inline]
pub(crate) fn previous_index(i: usize) -> usize {
    i.saturating_sub(1)
}

/// Cubic Hermite weights on a cell of width `w` at local coordinate `t`.
///
/// `[corner][order]`: corner 0/1 is the cell start/end, order 0 weights the
/// value and order 1 weights the first derivative.
#[inline]
pub(crate) fn hermite(t: f64, w: f64) -> [[f64; 2]; 2] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        [2.0 * t3 - 3.0 * t2 + 1.0, (t3 - 2.0 * t2 + t) * w],
        [-2.0 * t3 + 3.0 * t2, (t3 - t2) * w],
    ]
}

/// Derivatives of the [`hermite`] weights with respect to the physical
/// coordinate.
#[inline]
pub(crate) fn hermite_slope(t: f64, w: f64) -> [[f64; 2]; 2] {
    let t2 = t * t;
    [
        [(6.0 * t2 - 6.0 * t) / w, 3.0 * t2 - 4.0 * t + 1.0],
        [(-6.0 * t2 + 6.0 * t) / w, 3.0 * t2 - 2.0 * t],
    ]
}

/// Locates `value` in `knots`, returning the cell, its local coordinate in
/// `[0, 1]` and its width.
#[inline]
pub(crate) fn locate(knots: &[f64], value: f64, axis: char) -> Result<(usize, f64, f64), InterpolationError> {
    let i = search_index(knots, value, axis)?;
    let w = knots[i + 1] - knots[i];
    Ok((i, (value - knots[i]) / w, w))
}

/// Natural cubic spline through `(x[i], y[i])`.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    knots: Vec<f64>,
    // y + b t + c t^2 + d t^3 per interval, t measured from the left knot
    coefficients: Vec<[f64; 4]>,
}

impl CubicSpline {
    /// Spline with zero second derivative at both ends. With two knots it
    /// is the straight line between them.
    pub fn natural(x: &[f64], y: &[f64]) -> Result<Self, InterpolationError> {
        if x.len() != y.len() {
            return Err(InterpolationError::DimensionMismatch {
                expected: x.len(),
                found: y.len(),
            });
        }
        check_knots(x, 'x')?;

        let n = x.len() - 1;
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

        let mut mu = vec![0.0; n];
        let mut z = vec![0.0; n + 1];
        for i in 1..n {
            let g = 2.0 * (x[i + 1] - x[i - 1]) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / g;
            z[i] = (3.0 * (y[i + 1] * h[i - 1] - y[i] * (x[i + 1] - x[i - 1]) + y[i - 1] * h[i])
                / (h[i - 1] * h[i])
                - h[i - 1] * z[i - 1])
                / g;
        }

        let mut c = vec![0.0; n + 1];
        let mut coefficients = vec![[0.0; 4]; n];
        for j in (0..n).rev() {
            c[j] = z[j] - mu[j] * c[j + 1];
            let b = (y[j + 1] - y[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
            let d = (c[j + 1] - c[j]) / (3.0 * h[j]);
            coefficients[j] = [y[j], b, c[j], d];
        }

        Ok(Self {
            knots: x.to_vec(),
            coefficients,
        })
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn value(&self, x: f64) -> Result<f64, InterpolationError> {
        let j = search_index(&self.knots, x, 'x')?;
        let t = x - self.knots[j];
        let [a, b, c, d] = self.coefficients[j];
        Ok(a + t * (b + t * (c + t * d)))
    }

    pub fn derivative(&self, x: f64) -> Result<f64, InterpolationError> {
        let j = search_index(&self.knots, x, 'x')?;
        let t = x - self.knots[j];
        let [_, b, c, d] = self.coefficients[j];
        Ok(b + t * (2.0 * c + 3.0 * t * d))
    }
}

/// Bicubic Hermite surface over a rectilinear `(x, y)` lattice, matching the
/// sampled values, first partials and cross partial at every node.
///
/// First partials come from natural cubic splines along each lattice line;
/// the cross partial is a centred difference clamped at the lattice edges.
#[derive(Debug, Clone)]
pub struct BicubicSurface {
    x: Vec<f64>,
    y: Vec<f64>,
    f: Array2<f64>,
    dfdx: Array2<f64>,
    dfdy: Array2<f64>,
    d2fdxdy: Array2<f64>,
}

impl BicubicSurface {
    pub fn interpolate(x: &[f64], y: &[f64], f: ArrayView2<f64>) -> Result<Self, InterpolationError> {
        if x.is_empty() || y.is_empty() || f.is_empty() {
            return Err(InterpolationError::NoData);
        }
        let (nx, ny) = f.dim();
        if nx != x.len() {
            return Err(InterpolationError::DimensionMismatch {
                expected: x.len(),
                found: nx,
            });
        }
        if ny != y.len() {
            return Err(InterpolationError::DimensionMismatch {
                expected: y.len(),
                found: ny,
            });
        }
        check_knots(x, 'x')?;
        check_knots(y, 'y')?;

        let mut dfdx = Array2::zeros((nx, ny));
        for j in 0..ny {
            let line: Vec<f64> = f.column(j).to_vec();
            let spline = CubicSpline::natural(x, &line)?;
            for i in 0..nx {
                dfdx[[i, j]] = spline.derivative(x[i])?;
            }
        }

        let mut dfdy = Array2::zeros((nx, ny));
        for i in 0..nx {
            let line: Vec<f64> = f.row(i).to_vec();
            let spline = CubicSpline::natural(y, &line)?;
            for j in 0..ny {
                dfdy[[i, j]] = spline.derivative(y[j])?;
            }
        }

        let mut d2fdxdy = Array2::zeros((nx, ny));
        for i in 0..nx {
            let (ni, pi) = (next_index(i, nx), previous_index(i));
            for j in 0..ny {
                let (nj, pj) = (next_index(j, ny), previous_index(j));
                d2fdxdy[[i, j]] = (f[[ni, nj]] - f[[ni, pj]] - f[[pi, nj]] + f[[pi, pj]])
                    / ((x[ni] - x[pi]) * (y[nj] - y[pj]));
            }
        }

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            f: f.to_owned(),
            dfdx,
            dfdy,
            d2fdxdy,
        })
    }

    pub fn value(&self, x: f64, y: f64) -> Result<f64, InterpolationError> {
        self.evaluate(x, y, false, false)
    }

    pub fn partial_x(&self, x: f64, y: f64) -> Result<f64, InterpolationError> {
        self.evaluate(x, y, true, false)
    }

    pub fn partial_y(&self, x: f64, y: f64) -> Result<f64, InterpolationError> {
        self.evaluate(x, y, false, true)
    }

    pub fn partial_xy(&self, x: f64, y: f64) -> Result<f64, InterpolationError> {
        self.evaluate(x, y, true, true)
    }

    fn evaluate(&self, x: f64, y: f64, diff_x: bool, diff_y: bool) -> Result<f64, InterpolationError> {
        let (i, t, wx) = locate(&self.x, x, 'x')?;
        let (j, u, wy) = locate(&self.y, y, 'y')?;
        let bx = if diff_x { hermite_slope(t, wx) } else { hermite(t, wx) };
        let by = if diff_y { hermite_slope(u, wy) } else { hermite(u, wy) };

        // [order_x][order_y]
        let nodes = [[&self.f, &self.dfdy], [&self.dfdx, &self.d2fdxdy]];
        let mut sum = 0.0;
        for a in 0..2 {
            for b in 0..2 {
                for (ox, row) in nodes.iter().enumerate() {
                    for (oy, arr) in row.iter().enumerate() {
                        sum += arr[[i + a, j + b]] * bx[a][ox] * by[b][oy];
                    }
                }
            }
        }
        Ok(sum)
    }
}
