//! Common helpers for volume-resample integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::Point3;
use volume_resample::{DataType, Grid3, GridGeometry, Progress, Volume};

/// Volume whose `column` holds `f` evaluated at every voxel midpoint.
pub fn volume_from_fn(
    name: &str,
    grid: Grid3,
    column: &str,
    data_type: DataType,
    f: impl Fn(&Point3<f64>) -> f64,
) -> Volume {
    let mut volume = Volume::new(name, grid);
    let values: Vec<f64> = (0..volume.grid().voxel_count())
        .map(|i| f(&volume.grid().midpoint_at(i)))
        .collect();
    let field = volume.add_column(column, data_type);
    for (index, v) in values.into_iter().enumerate() {
        field.set(index, v);
    }
    volume
}

/// Volume with `column` filled with `value`.
pub fn constant_volume(dims: [usize; 3], column: &str, value: f64) -> Volume {
    let grid = Grid3::unit(dims).unwrap();
    volume_from_fn("constant", grid, column, DataType::Float64, |_| value)
}

/// Empty target volume with a single `column` preset to `fill`.
pub fn target_volume(grid: Grid3, column: &str, fill: f64) -> Volume {
    volume_from_fn("target", grid, column, DataType::Float64, |_| fill)
}

/// Sets the voxels in the half-open box `[from, to)` of `column` to `value`.
pub fn fill_box(volume: &mut Volume, column: &str, from: [usize; 3], to: [usize; 3], value: f64) {
    let field = volume.column_mut(column).unwrap();
    for s in from[0]..to[0] {
        for t in from[1]..to[1] {
            for r in from[2]..to[2] {
                field.set_voxel([s, t, r], value);
            }
        }
    }
}

pub fn column_values(volume: &Volume, column: &str) -> Vec<f64> {
    let field = volume.column(column).unwrap();
    (0..field.len()).map(|i| field.get(i)).collect()
}

/// Progress that reports cancellation once it has been polled `allowed`
/// times.
#[derive(Debug, Default)]
pub struct CancelAfter {
    allowed: usize,
    polls: AtomicUsize,
    updates: AtomicUsize,
}

impl CancelAfter {
    pub fn new(allowed: usize) -> Self {
        Self {
            allowed,
            ..Self::default()
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl Progress for CancelAfter {
    fn set_range(&self, _min: usize, _max: usize) {}

    fn update(&self, _value: usize) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst) >= self.allowed
    }
}
