use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::enums::Axis;
use crate::grid::GridGeometry;
use crate::progress::{Progress, cancelled};
use crate::volume::{Volume, VolumeError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    /// Full width at half maximum of the kernel, in world units.
    pub fwhm: f64,
    /// Neighbours at or beyond this distance are ignored. Zero or negative
    /// means unbounded.
    pub max_radius: f64,
    /// Value written where the whole neighbourhood is zero.
    pub default_value: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            fwhm: 2.0,
            max_radius: 6.0,
            default_value: 0.0,
        }
    }
}

impl SmoothingParams {
    pub fn sigma(&self) -> f64 {
        fwhm_to_sigma(self.fwhm)
    }
}

pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / (2.0 * (2.0 * std::f64::consts::LN_2).sqrt())
}

/// Smooths `source_column` with a Gaussian kernel into `target_column`.
///
/// The target is created with the source's type when absent. Source and
/// target may be the same column. If cancelled, a target created by this
/// call is removed again; an existing target keeps the voxels written so far.
pub fn smooth_gaussian<G: GridGeometry>(
    volume: &mut Volume<G>,
    source_column: &str,
    target_column: &str,
    params: &SmoothingParams,
    progress: Option<&dyn Progress>,
) -> Result<(), VolumeError> {
    if !(params.fwhm.is_finite() && params.fwhm > 0.0) {
        return Err(VolumeError::InvalidParameter(format!(
            "fwhm must be positive, got {}",
            params.fwhm
        )));
    }
    let sigma = params.sigma();
    let max_radius = if params.max_radius <= 0.0 {
        f64::MAX
    } else {
        params.max_radius
    };

    let source = volume
        .require_column(source_column)
        .inspect_err(|e| error!("Cannot smooth volume: {e}"))?;
    let data_type = source.data_type();
    let values = source.to_f64_array();

    let start = Instant::now();
    info!(
        "Smoothing '{}.{}' into '{}' (fwhm {}, sigma {:.4}, max radius {})",
        volume.name(),
        source_column,
        target_column,
        params.fwhm,
        sigma,
        params.max_radius
    );

    let created = !volume.has_column(target_column);
    if created {
        volume.add_column(target_column, data_type);
    }

    let (grid, target) = volume.grid_and_column_mut(target_column)?;
    let dims = grid.dims();
    let radius = Axis::ALL.map(|axis| {
        // Saturates for an unbounded radius.
        (max_radius / grid.voxel_size(axis)).ceil() as usize
    });
    let window = |i: usize, axis: Axis| {
        let a = axis.index();
        (
            i.saturating_sub(radius[a]),
            i.saturating_add(radius[a]).min(dims[a] - 1),
        )
    };
    let two_sigma_sq = 2.0 * sigma * sigma;

    if let Some(p) = progress {
        p.set_range(0, dims[0]);
        p.update(0);
    }

    let mut aborted = false;
    'slices: for s in 0..dims[0] {
        let (s0, s1) = window(s, Axis::S);
        for t in 0..dims[1] {
            let (t0, t1) = window(t, Axis::T);
            for r in 0..dims[2] {
                if cancelled(progress) {
                    aborted = true;
                    break 'slices;
                }
                let (r0, r1) = window(r, Axis::R);
                let centre = grid.voxel_midpoint([s, t, r]);

                let mut nonzero = false;
                let mut sum = 0.0;
                let mut denom = 0.0;
                for ss in s0..=s1 {
                    for tt in t0..=t1 {
                        for rr in r0..=r1 {
                            let v = values[[rr, tt, ss]];
                            nonzero |= v != 0.0;
                            let dist = (grid.voxel_midpoint([ss, tt, rr]) - centre).norm();
                            if dist < max_radius {
                                // The pdf's normalising constant cancels in the mean.
                                let g = (-dist * dist / two_sigma_sq).exp();
                                sum += v * g;
                                denom += g;
                            }
                        }
                    }
                }

                let value = if nonzero && denom > 0.0 {
                    sum / denom
                } else {
                    params.default_value
                };
                target.set_voxel([s, t, r], value);
            }
        }
        if let Some(p) = progress {
            p.update(s + 1);
        }
    }

    if aborted {
        warn!("Gaussian smoothing of '{}' cancelled", volume.name());
        if created {
            volume.remove_column(target_column);
        }
        return Err(VolumeError::Cancelled);
    }

    target.update_limits();
    info!("Smoothed {} voxels in {:.2?}", grid.voxel_count(), start.elapsed());
    Ok(())
}
