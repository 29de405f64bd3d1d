//! # Volume-resample library
//!
//! This crate provides resampling and filtering of scalar data defined on
//! regular 3D voxel grids. A [`Volume`] couples a grid with any number of
//! named scalar columns (`u8`, `i32`, `f16`, `f32` or `f64` per voxel) and
//! supports the following operations:
//!  - Mapping a column of one volume onto the grid of another by nearest
//!    neighbour, tri-linear or tri-cubic interpolation
//!  - Gaussian smoothing of a column, parameterised by its FWHM
//!  - Labelling of 6-connected supra-threshold blobs
//!
//! The tri-cubic mapping is backed by [`TricubicInterpolator`], which builds
//! a piecewise tricubic spline over any rectilinear lattice and can be used
//! on its own.
//!
//! All operations are blocking and accept an optional [`Progress`] observer
//! which receives progress updates and can cancel the operation. A [`Worker`]
//! runs them one at a time on tokio's blocking thread pool for async callers.
//!
//! Grids are placed in world space by a base point and three (not
//! necessarily orthogonal) axes. Voxels are indexed by `[s, t, r]` or by a
//! linear index in which S varies fastest.
//!
//! # Examples
//!
//! ## Resampling a volume onto a finer grid
//!
//! ```
//! # use volume_resample::{DataType, Grid3, GridGeometry, ResampleMethod, ResampleParams, Volume};
//! let mut source = Volume::new("coarse", Grid3::new([4, 4, 4], [8.0, 8.0, 8.0]).unwrap());
//! let n = source.grid().voxel_count();
//! let values = source.add_column("intensity", DataType::Float32);
//! for index in 0..n {
//!     values.set(index, index as f64);
//! }
//!
//! let mut target = Volume::new("fine", Grid3::new([8, 8, 8], [8.0, 8.0, 8.0]).unwrap());
//! target.add_column("intensity", DataType::Float32);
//!
//! let params = ResampleParams::new("tri-linear".parse::<ResampleMethod>().unwrap(), 0.0);
//! volume_resample::map_volume_to_volume(
//!     &source, &mut target, "intensity", "intensity", &params, None,
//! )
//! .unwrap();
//! ```

pub mod blobs;
pub mod enums;
pub mod grid;
pub mod interpolator;
pub mod progress;
pub mod resample;
pub mod smoothing;
pub mod tricubic;
pub mod volume;
pub mod worker;

pub use blobs::{
    BlobParams, RegionMaximum, RoiCentroid, extract_blobs, extract_blobs_into, find_maxima,
    roi_centroids,
};
pub use enums::{Axis, DataType, ResampleMethod};
pub use grid::{Grid3, GridGeometry};
pub use interpolator::InterpolationError;
pub use progress::{CancellationToken, ChannelProgress, Progress, ProgressEvent, ProgressTracker};
pub use resample::{ResampleParams, map_volume_to_volume, map_volume_to_volume_ev};
pub use smoothing::{SmoothingParams, smooth_gaussian};
pub use tricubic::{InterpolatingFunction, TricubicInterpolator};
pub use volume::{ScalarField, Volume, VolumeError};
pub use worker::Worker;
