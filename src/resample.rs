use log::{debug, error, info, warn};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::enums::{Axis, ResampleMethod};
use crate::grid::GridGeometry;
use crate::interpolator::InterpolationError;
use crate::progress::{Progress, cancelled};
use crate::tricubic::{InterpolatingFunction, TricubicInterpolator};
use crate::volume::{ScalarField, Volume, VolumeError};

/// Grid-space distance below which a point counts as sitting on a voxel
/// centre.
const COINCIDENT: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleParams {
    pub method: ResampleMethod,
    /// Value assigned to target voxels with no source data.
    pub default_value: f64,
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self {
            method: ResampleMethod::NearestNeighbour,
            default_value: 0.0,
        }
    }
}

impl ResampleParams {
    pub fn new(method: ResampleMethod, default_value: f64) -> Self {
        Self {
            method,
            default_value,
        }
    }
}

/// Per-voxel sampler of the source column.
enum Sampler {
    Nearest,
    Trilinear,
    Tricubic(InterpolatingFunction),
}

/// Resamples `source_column` of `source` onto `target_column` of `target`.
///
/// Target voxels are visited in linear order and take the value of the
/// source at their midpoint; voxels the source does not cover get
/// `params.default_value`. Both columns must already exist. When cancelled,
/// voxels written so far keep their new values.
pub fn map_volume_to_volume<S, T>(
    source: &Volume<S>,
    target: &mut Volume<T>,
    source_column: &str,
    target_column: &str,
    params: &ResampleParams,
    progress: Option<&dyn Progress>,
) -> Result<(), VolumeError>
where
    S: GridGeometry,
    T: GridGeometry,
{
    target
        .require_column(target_column)
        .inspect_err(|e| error!("Cannot map volume to volume: {e}"))?;
    let s_column = source
        .require_column(source_column)
        .inspect_err(|e| error!("Cannot map volume to volume: {e}"))?;

    let start = Instant::now();
    info!(
        "Mapping '{}.{}' to '{}.{}' by {}",
        source.name(),
        source_column,
        target.name(),
        target_column,
        params.method
    );

    let grid_source = source.grid();
    let sampler = match params.method {
        ResampleMethod::NearestNeighbour => Sampler::Nearest,
        ResampleMethod::Trilinear => Sampler::Trilinear,
        ResampleMethod::Tricubic => {
            if let Some(p) = progress {
                p.set_message("Computing interpolating function:");
            }
            let values = s_column.to_f64_array().permuted_axes([2, 1, 0]);
            let function = TricubicInterpolator::interpolate(
                &grid_source.axis_centres(Axis::S),
                &grid_source.axis_centres(Axis::T),
                &grid_source.axis_centres(Axis::R),
                values.view(),
                progress,
            )
            .inspect_err(|e| {
                if matches!(e, InterpolationError::Cancelled) {
                    warn!("Mapping volume to volume cancelled while building interpolant");
                }
            })?;
            if let Some(p) = progress {
                p.set_message("Mapping volume to volume:");
            }
            Sampler::Tricubic(function)
        }
    };

    let (grid_target, t_column) = target.grid_and_column_mut(target_column)?;
    let [n_s, n_t, n_r] = grid_target.dims();
    let row = n_t * n_r;
    let n_target = grid_target.voxel_count();

    if let Some(p) = progress {
        p.set_range(0, n_s);
    }

    let mut step = 0;
    for index in 0..n_target {
        if index % row == 0 && cancelled(progress) {
            warn!("Mapping volume to volume cancelled after {index} of {n_target} voxels");
            return Err(VolumeError::Cancelled);
        }

        let midpoint = grid_target.midpoint_at(index);
        let value = match &sampler {
            Sampler::Nearest => nearest(grid_source, s_column, &midpoint),
            Sampler::Trilinear => trilinear(grid_source, s_column, &midpoint),
            Sampler::Tricubic(function) => tricubic(grid_source, function, &midpoint),
        };
        t_column.set(index, value.unwrap_or(params.default_value));

        if (index + 1) % row == 0 {
            step += 1;
            if let Some(p) = progress {
                p.update(step);
            }
        }
    }

    info!("Mapped {} voxels in {:.2?}", n_target, start.elapsed());
    Ok(())
}

/// Enclosing-voxel mapping; the same as nearest-neighbour resampling.
pub fn map_volume_to_volume_ev<S, T>(
    source: &Volume<S>,
    target: &mut Volume<T>,
    source_column: &str,
    target_column: &str,
    default_value: f64,
    progress: Option<&dyn Progress>,
) -> Result<(), VolumeError>
where
    S: GridGeometry,
    T: GridGeometry,
{
    let params = ResampleParams::new(ResampleMethod::NearestNeighbour, default_value);
    map_volume_to_volume(source, target, source_column, target_column, &params, progress)
}

fn nearest<G: GridGeometry>(grid: &G, column: &ScalarField, point: &Point3<f64>) -> Option<f64> {
    grid.enclosing_voxel(point).map(|voxel| column.get_voxel(voxel))
}

/// Blends the (up to) eight source voxels whose centres bracket `point`.
///
/// Along each axis the bracket runs from the enclosing voxel towards the
/// side of its centre the point lies on. At the grid edge the bracket
/// collapses onto a single voxel and that axis is not interpolated.
fn trilinear<G: GridGeometry>(grid: &G, column: &ScalarField, point: &Point3<f64>) -> Option<f64> {
    let voxel = grid.enclosing_voxel(point)?;
    let g = grid.to_grid_space(point);
    let delta = g - grid.grid_midpoint(voxel);
    if delta.norm() < COINCIDENT {
        return Some(column.get_voxel(voxel));
    }

    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut frac = [0.0f64; 3];
    for axis in Axis::ALL {
        let a = axis.index();
        let n = grid.size(axis);
        let (l, h) = if delta[a] < 0.0 {
            (voxel[a].saturating_sub(1), voxel[a])
        } else {
            (voxel[a], (voxel[a] + 1).min(n - 1))
        };
        lo[a] = l;
        hi[a] = h;
        if l != h {
            let size = grid.voxel_size(axis);
            let c_lo = (l as f64 + 0.5) * size;
            frac[a] = (g[a] - c_lo) / ((h - l) as f64 * size);
        }
    }

    let at = |s: usize, t: usize, r: usize| column.get_voxel([s, t, r]);
    let [dx, dy, dz] = frac;
    let blend_x = |t: usize, r: usize| at(lo[0], t, r) * (1.0 - dx) + at(hi[0], t, r) * dx;
    let c0 = blend_x(lo[1], lo[2]) * (1.0 - dy) + blend_x(hi[1], lo[2]) * dy;
    let c1 = blend_x(lo[1], hi[2]) * (1.0 - dy) + blend_x(hi[1], hi[2]) * dy;
    Some(c0 * (1.0 - dz) + c1 * dz)
}

fn tricubic<G: GridGeometry>(
    grid: &G,
    function: &InterpolatingFunction,
    point: &Point3<f64>,
) -> Option<f64> {
    if !grid.contains(point) {
        return None;
    }
    let g = grid.to_grid_space(point);
    match function.value(g.x, g.y, g.z) {
        Ok(v) => Some(v),
        Err(e) => {
            // Between the outermost voxel centres and the grid faces.
            debug!("Tricubic sample at {point:?} outside interpolant: {e}");
            None
        }
    }
}
