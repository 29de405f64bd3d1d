use log::{debug, warn};
use ndarray::{Array3, ArrayView3, Axis};

use crate::interpolator::{
    BicubicSurface, InterpolationError, check_order, hermite, locate, next_index, previous_index,
};
use crate::progress::{Progress, cancelled};

/// Builds tricubic spline interpolants over a rectilinear 3D lattice.
pub struct TricubicInterpolator;

/// Step counter shared by the phases of [`TricubicInterpolator::interpolate`].
struct Steps<'a> {
    progress: Option<&'a dyn Progress>,
    step: usize,
}

impl<'a> Steps<'a> {
    fn start(progress: Option<&'a dyn Progress>, max: usize) -> Self {
        if let Some(p) = progress {
            p.set_range(0, max);
        }
        Self { progress, step: 0 }
    }

    fn message(&self, message: &str) {
        if let Some(p) = self.progress {
            p.set_message(message);
        }
    }

    fn advance(&mut self) -> Result<(), InterpolationError> {
        if cancelled(self.progress) {
            warn!("Tricubic interpolation cancelled at step {}", self.step);
            return Err(InterpolationError::Cancelled);
        }
        self.step += 1;
        if let Some(p) = self.progress {
            p.update(self.step);
        }
        Ok(())
    }
}

impl TricubicInterpolator {
    /// Computes an interpolating function for samples `f[[i, j, k]]` taken at
    /// `(x[i], y[j], z[k])`.
    ///
    /// Progress runs over `4 * nx + 2 * ny + 2 * nz` steps; cancellation is
    /// checked once per step.
    pub fn interpolate(
        x: &[f64],
        y: &[f64],
        z: &[f64],
        f: ArrayView3<f64>,
        progress: Option<&dyn Progress>,
    ) -> Result<InterpolatingFunction, InterpolationError> {
        if x.is_empty() || y.is_empty() || z.is_empty() || f.is_empty() {
            return Err(InterpolationError::NoData);
        }
        let (nx, ny, nz) = (x.len(), y.len(), z.len());
        for (expected, found) in [(nx, f.dim().0), (ny, f.dim().1), (nz, f.dim().2)] {
            if expected != found {
                return Err(InterpolationError::DimensionMismatch { expected, found });
            }
        }
        check_order(x, 'x')?;
        check_order(y, 'y')?;
        check_order(z, 'z')?;
        for (axis, len) in [('x', nx), ('y', ny), ('z', nz)] {
            if len < 2 {
                return Err(InterpolationError::TooFewSamples { axis, len });
            }
        }

        let mut steps = Steps::start(progress, 4 * nx + 2 * ny + 2 * nz);
        steps.message("Computing bicubic splines:");

        // f_xy[[k, i, j]] and f_zx[[j, k, i]] both hold f[[i, j, k]]
        let mut f_xy = Array3::<f64>::zeros((nz, nx, ny));
        let mut f_zx = Array3::<f64>::zeros((ny, nz, nx));
        for i in 0..nx {
            let layer = f.index_axis(Axis(0), i);
            f_xy.index_axis_mut(Axis(1), i).assign(&layer.t());
            f_zx.index_axis_mut(Axis(2), i).assign(&layer);
            steps.advance()?;
        }

        let mut x_layers = Vec::with_capacity(nx);
        for i in 0..nx {
            x_layers.push(BicubicSurface::interpolate(y, z, f.index_axis(Axis(0), i))?);
            steps.advance()?;
        }
        let mut y_layers = Vec::with_capacity(ny);
        for j in 0..ny {
            y_layers.push(BicubicSurface::interpolate(z, x, f_zx.index_axis(Axis(0), j))?);
            steps.advance()?;
        }
        let mut z_layers = Vec::with_capacity(nz);
        for k in 0..nz {
            z_layers.push(BicubicSurface::interpolate(x, y, f_xy.index_axis(Axis(0), k))?);
            steps.advance()?;
        }

        steps.message("Computing derivatives:");
        let shape = (nx, ny, nz);
        let mut fx = Array3::zeros(shape);
        let mut fy = Array3::zeros(shape);
        let mut fxy = Array3::zeros(shape);
        for (k, surface) in z_layers.iter().enumerate() {
            for i in 0..nx {
                for j in 0..ny {
                    fx[[i, j, k]] = surface.partial_x(x[i], y[j])?;
                    fy[[i, j, k]] = surface.partial_y(x[i], y[j])?;
                    fxy[[i, j, k]] = surface.partial_xy(x[i], y[j])?;
                }
            }
            steps.advance()?;
        }

        let mut fz = Array3::zeros(shape);
        let mut fyz = Array3::zeros(shape);
        for (i, surface) in x_layers.iter().enumerate() {
            for j in 0..ny {
                for k in 0..nz {
                    fz[[i, j, k]] = surface.partial_y(y[j], z[k])?;
                    fyz[[i, j, k]] = surface.partial_xy(y[j], z[k])?;
                }
            }
            steps.advance()?;
        }

        let mut fzx = Array3::zeros(shape);
        for (j, surface) in y_layers.iter().enumerate() {
            for k in 0..nz {
                for i in 0..nx {
                    fzx[[i, j, k]] = surface.partial_xy(z[k], x[i])?;
                }
            }
            steps.advance()?;
        }

        let mut fxyz = Array3::zeros(shape);
        for i in 0..nx {
            let (ni, pi) = (next_index(i, nx), previous_index(i));
            for j in 0..ny {
                let (nj, pj) = (next_index(j, ny), previous_index(j));
                for k in 0..nz {
                    let (nk, pk) = (next_index(k, nz), previous_index(k));
                    fxyz[[i, j, k]] = (f[[ni, nj, nk]] - f[[ni, pj, nk]] - f[[pi, nj, nk]]
                        + f[[pi, pj, nk]]
                        - f[[ni, nj, pk]]
                        + f[[ni, pj, pk]]
                        + f[[pi, nj, pk]]
                        - f[[pi, pj, pk]])
                        / ((x[ni] - x[pi]) * (y[nj] - y[pj]) * (z[nk] - z[pk]));
                }
            }
            steps.advance()?;
        }

        steps.message("Creating splines:");
        debug!("Tricubic interpolant built over {nx}x{ny}x{nz} knots");

        Ok(InterpolatingFunction {
            x: x.to_vec(),
            y: y.to_vec(),
            z: z.to_vec(),
            derivatives: [f.to_owned(), fx, fy, fxy, fz, fzx, fyz, fxyz],
        })
    }

    /// Like [`interpolate`](Self::interpolate), for samples given as nested
    /// vectors `f[i][j][k]`. Ragged input is a dimension mismatch.
    pub fn interpolate_nested(
        x: &[f64],
        y: &[f64],
        z: &[f64],
        f: &[Vec<Vec<f64>>],
        progress: Option<&dyn Progress>,
    ) -> Result<InterpolatingFunction, InterpolationError> {
        if f.is_empty() || x.is_empty() || y.is_empty() || z.is_empty() {
            return Err(InterpolationError::NoData);
        }
        if f.len() != x.len() {
            return Err(InterpolationError::DimensionMismatch {
                expected: x.len(),
                found: f.len(),
            });
        }
        let mut flat = Vec::with_capacity(x.len() * y.len() * z.len());
        for plane in f {
            if plane.len() != y.len() {
                return Err(InterpolationError::DimensionMismatch {
                    expected: y.len(),
                    found: plane.len(),
                });
            }
            for line in plane {
                if line.len() != z.len() {
                    return Err(InterpolationError::DimensionMismatch {
                        expected: z.len(),
                        found: line.len(),
                    });
                }
                flat.extend_from_slice(line);
            }
        }
        // Lengths were checked above, so the shape always matches.
        let samples = Array3::from_shape_vec((x.len(), y.len(), z.len()), flat).map_err(|_| {
            InterpolationError::DimensionMismatch {
                expected: x.len() * y.len() * z.len(),
                found: 0,
            }
        })?;
        Self::interpolate(x, y, z, samples.view(), progress)
    }
}

/// Piecewise tricubic function matching the sampled values and the partial
/// derivatives `Fx, Fy, Fz, Fxy, Fzx, Fyz, Fxyz` at every lattice node.
#[derive(Debug, Clone)]
pub struct InterpolatingFunction {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    // Indexed by ox + 2 * oy + 4 * oz, the derivative order along each axis.
    derivatives: [Array3<f64>; 8],
}

impl InterpolatingFunction {
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// Bounds of the definition box as `[min, max]` per axis.
    pub fn bounds(&self) -> [[f64; 2]; 3] {
        [&self.x, &self.y, &self.z].map(|k| [k[0], k[k.len() - 1]])
    }

    pub fn is_valid_point(&self, x: f64, y: f64, z: f64) -> bool {
        self.bounds()
            .iter()
            .zip([x, y, z])
            .all(|([min, max], v)| v >= *min && v <= *max)
    }

    /// Node values of the partial derivative of order `[ox, oy, oz]`, each 0
    /// or 1. `[0, 0, 0]` is the samples themselves, `[1, 1, 1]` is Fxyz.
    pub fn derivative(&self, order: [usize; 3]) -> Option<ArrayView3<'_, f64>> {
        let [ox, oy, oz] = order;
        (ox < 2 && oy < 2 && oz < 2).then(|| self.derivatives[ox + 2 * oy + 4 * oz].view())
    }

    /// Evaluates the function. Points outside the knot box, or NaN, are
    /// [`InterpolationError::OutOfRange`].
    pub fn value(&self, x: f64, y: f64, z: f64) -> Result<f64, InterpolationError> {
        let (i, t, wx) = locate(&self.x, x, 'x')?;
        let (j, u, wy) = locate(&self.y, y, 'y')?;
        let (k, v, wz) = locate(&self.z, z, 'z')?;
        let (bx, by, bz) = (hermite(t, wx), hermite(u, wy), hermite(v, wz));

        let mut sum = 0.0;
        for (order, field) in self.derivatives.iter().enumerate() {
            let (ox, oy, oz) = (order & 1, (order >> 1) & 1, (order >> 2) & 1);
            for a in 0..2 {
                for b in 0..2 {
                    let wab = bx[a][ox] * by[b][oy];
                    for c in 0..2 {
                        sum += field[[i + a, j + b, k + c]] * wab * bz[c][oz];
                    }
                }
            }
        }
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancellationToken, ProgressTracker};

    fn sum_field() -> Array3<f64> {
        Array3::from_shape_fn((3, 3, 3), |(i, j, k)| (i + j + k) as f64)
    }

    #[test]
    fn test_linear_field_is_reproduced() {
        let knots = [0.0, 1.0, 2.0];
        let f = sum_field();
        let function =
            TricubicInterpolator::interpolate(&knots, &knots, &knots, f.view(), None).unwrap();

        assert_eq!(function.value(1.0, 1.0, 1.0).unwrap(), 3.0);
        assert!((function.value(0.5, 0.5, 0.5).unwrap() - 1.5).abs() < 1e-10);
        assert!((function.value(2.0, 0.25, 1.75).unwrap() - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_knot_values_are_exact() {
        let x = [0.0, 0.5, 2.0, 2.5];
        let y = [-1.0, 0.0, 1.0];
        let z = [0.0, 3.0];
        let f = Array3::from_shape_fn((4, 3, 2), |(i, j, k)| {
            ((i * 7 + j * 3 + k * 5) % 4) as f64 - 1.5
        });
        let function = TricubicInterpolator::interpolate(&x, &y, &z, f.view(), None).unwrap();
        for ((i, j, k), expected) in f.indexed_iter() {
            let v = function.value(x[i], y[j], z[k]).unwrap();
            assert!((v - expected).abs() < 1e-12, "node {i},{j},{k}: {v} vs {expected}");
        }
    }

    #[test]
    fn test_points_outside_the_box_are_out_of_range() {
        let knots = [0.0, 1.0, 2.0];
        let f = sum_field();
        let function =
            TricubicInterpolator::interpolate(&knots, &knots, &knots, f.view(), None).unwrap();
        assert!(matches!(
            function.value(2.5, 1.0, 1.0),
            Err(InterpolationError::OutOfRange { axis: 'x', .. })
        ));
        assert!(function.value(1.0, f64::NAN, 1.0).is_err());
        assert!(!function.is_valid_point(0.0, -0.1, 0.0));
    }

    #[test]
    fn test_invalid_inputs_fail_before_any_progress() {
        let tracker = ProgressTracker::new();
        let f = sum_field();

        let err = TricubicInterpolator::interpolate(
            &[0.0, 2.0, 1.0],
            &[0.0, 1.0, 2.0],
            &[0.0, 1.0, 2.0],
            f.view(),
            Some(&tracker),
        )
        .unwrap_err();
        assert_eq!(err, InterpolationError::NonMonotonic { axis: 'x', index: 2 });

        let err = TricubicInterpolator::interpolate(
            &[0.0, 1.0],
            &[0.0, 1.0, 2.0],
            &[0.0, 1.0, 2.0],
            f.view(),
            Some(&tracker),
        )
        .unwrap_err();
        assert_eq!(
            err,
            InterpolationError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
        assert_eq!(tracker.range(), (0, 0));
    }

    #[test]
    fn test_ragged_nested_input_is_rejected() {
        let knots = vec![0.0, 1.0];
        let mut f = vec![vec![vec![0.0; 2]; 2]; 2];
        f[1][0].push(1.0);
        let err = TricubicInterpolator::interpolate_nested(&knots, &knots, &knots, &f, None)
            .unwrap_err();
        assert_eq!(
            err,
            InterpolationError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_two_knot_axes_are_accepted_single_knot_axes_are_not() {
        let f = Array3::from_shape_fn((2, 2, 2), |(i, j, k)| (i * 4 + j * 2 + k) as f64);
        let knots = [0.0, 1.0];
        let function =
            TricubicInterpolator::interpolate(&knots, &knots, &knots, f.view(), None).unwrap();
        assert!((function.value(0.5, 0.5, 0.5).unwrap() - 3.5).abs() < 1e-10);

        let flat = Array3::<f64>::zeros((1, 2, 2));
        let err = TricubicInterpolator::interpolate(&[0.0], &knots, &knots, flat.view(), None)
            .unwrap_err();
        assert_eq!(err, InterpolationError::TooFewSamples { axis: 'x', len: 1 });
    }

    #[test]
    fn test_progress_covers_every_phase() {
        let tracker = ProgressTracker::new();
        let f = Array3::<f64>::zeros((3, 4, 5));
        let (x, y, z) = ([0.0, 1.0, 2.0], [0.0, 1.0, 2.0, 3.0], [0.0, 1.0, 2.0, 3.0, 4.0]);
        TricubicInterpolator::interpolate(&x, &y, &z, f.view(), Some(&tracker)).unwrap();
        assert_eq!(tracker.range(), (0, 4 * 3 + 2 * 4 + 2 * 5));
        assert_eq!(tracker.value(), 30);
        assert_eq!(tracker.message(), "Creating splines:");
    }

    #[test]
    fn test_cancelled_token_aborts() {
        let token = CancellationToken::new();
        token.cancel();
        let tracker = ProgressTracker::with_token(token);
        let knots = [0.0, 1.0, 2.0];
        let f = sum_field();
        let err = TricubicInterpolator::interpolate(&knots, &knots, &knots, f.view(), Some(&tracker))
            .unwrap_err();
        assert_eq!(err, InterpolationError::Cancelled);
        assert_eq!(tracker.value(), 0);
    }
}
