use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use bytemuck::Pod;
use half::f16;
use ndarray::Array3;
use rayon::prelude::*;
use thiserror::Error;

use crate::enums::DataType;
use crate::grid::{Grid3, GridGeometry};
use crate::interpolator::InterpolationError;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("No column '{name}' in volume '{volume}'")]
    MissingColumn { name: String, volume: String },

    #[error("Unsupported interpolation method '{0}'")]
    UnsupportedMethod(String),

    #[error("Column has {found} voxels, grid has {expected}")]
    ColumnLength { expected: usize, found: usize },

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Interpolation error: {0}")]
    Interpolation(InterpolationError),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Worker error: {0}")]
    Worker(String),
}

impl VolumeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VolumeError::Cancelled)
    }
}

impl From<InterpolationError> for VolumeError {
    fn from(err: InterpolationError) -> Self {
        match err {
            InterpolationError::Cancelled => VolumeError::Cancelled,
            other => VolumeError::Interpolation(other),
        }
    }
}

/// Storage element of a [`ScalarField`].
pub trait Element: Pod + Send + Sync {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl Element for u8 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        // `as` saturates and maps NaN to 0
        value.round() as u8
    }
}

impl Element for i32 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value.round() as i32
    }
}

impl Element for f16 {
    #[inline]
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }
}

impl Element for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Element for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ColumnValues {
    UInt8(Array3<u8>),
    Int32(Array3<i32>),
    Float16(Array3<f16>),
    Float32(Array3<f32>),
    Float64(Array3<f64>),
}

macro_rules! with_values {
    ($values:expr, $arr:ident => $body:expr) => {
        match $values {
            ColumnValues::UInt8($arr) => $body,
            ColumnValues::Int32($arr) => $body,
            ColumnValues::Float16($arr) => $body,
            ColumnValues::Float32($arr) => $body,
            ColumnValues::Float64($arr) => $body,
        }
    };
}

/// Splits a linear voxel index into the `[r, t, s]` array index of a
/// column with shape `(nR, nT, nS)`.
#[inline]
fn unravel(dim: (usize, usize, usize), index: usize) -> [usize; 3] {
    let (_, n_t, n_s) = dim;
    let r = index / (n_t * n_s);
    let residual = index - r * n_t * n_s;
    [r, residual / n_s, residual % n_s]
}

fn range_of<T: Element>(values: &Array3<T>) -> Option<(f64, f64)> {
    values
        .par_iter()
        .map(|v| v.to_f64())
        .filter(|v| !v.is_nan())
        .fold(
            || None,
            |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            },
        )
        .reduce(
            || None,
            |a, b| match (a, b) {
                (Some((lo_a, hi_a)), Some((lo_b, hi_b))) => Some((lo_a.min(lo_b), hi_a.max(hi_b))),
                (a, None) => a,
                (None, b) => b,
            },
        )
}

/// A per-voxel scalar column. Values are held with shape `(nR, nT, nS)` so
/// the contiguous element order matches the grid's linear voxel index.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    values: ColumnValues,
    limits: Option<(f64, f64)>,
}

impl ScalarField {
    /// A zero-filled column for a grid with the given (S, T, R) dimensions.
    pub fn zeros(data_type: DataType, dims: [usize; 3]) -> Self {
        let shape = (dims[2], dims[1], dims[0]);
        let values = match data_type {
            DataType::UInt8 => ColumnValues::UInt8(Array3::zeros(shape)),
            DataType::Int32 => ColumnValues::Int32(Array3::zeros(shape)),
            DataType::Float16 => ColumnValues::Float16(Array3::from_elem(shape, f16::ZERO)),
            DataType::Float32 => ColumnValues::Float32(Array3::zeros(shape)),
            DataType::Float64 => ColumnValues::Float64(Array3::zeros(shape)),
        };
        Self {
            values,
            limits: None,
        }
    }

    /// Builds a column of `data_type` from `(nR, nT, nS)` values.
    pub fn from_array(values: &Array3<f64>, data_type: DataType) -> Self {
        let values = match data_type {
            DataType::UInt8 => ColumnValues::UInt8(values.mapv(u8::from_f64)),
            DataType::Int32 => ColumnValues::Int32(values.mapv(i32::from_f64)),
            DataType::Float16 => ColumnValues::Float16(values.mapv(f16::from_f64)),
            DataType::Float32 => ColumnValues::Float32(values.mapv(f32::from_f64)),
            DataType::Float64 => ColumnValues::Float64(values.to_owned()),
        };
        Self {
            values,
            limits: None,
        }
    }

    /// Integer label column.
    pub fn from_labels(labels: Array3<i32>) -> Self {
        Self {
            values: ColumnValues::Int32(labels),
            limits: None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match &self.values {
            ColumnValues::UInt8(_) => DataType::UInt8,
            ColumnValues::Int32(_) => DataType::Int32,
            ColumnValues::Float16(_) => DataType::Float16,
            ColumnValues::Float32(_) => DataType::Float32,
            ColumnValues::Float64(_) => DataType::Float64,
        }
    }

    /// Array shape `(nR, nT, nS)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        with_values!(&self.values, arr => arr.dim())
    }

    pub fn len(&self) -> usize {
        with_values!(&self.values, arr => arr.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at linear voxel `index`.
    pub fn get(&self, index: usize) -> f64 {
        with_values!(&self.values, arr => arr[unravel(arr.dim(), index)].to_f64())
    }

    /// Stores `value` at linear voxel `index`, coerced to the column type.
    pub fn set(&mut self, index: usize, value: f64) {
        with_values!(&mut self.values, arr => {
            let idx = unravel(arr.dim(), index);
            arr[idx] = Element::from_f64(value);
        })
    }

    /// Value at voxel `[s, t, r]`.
    pub fn get_voxel(&self, voxel: [usize; 3]) -> f64 {
        let [s, t, r] = voxel;
        with_values!(&self.values, arr => arr[[r, t, s]].to_f64())
    }

    pub fn set_voxel(&mut self, voxel: [usize; 3], value: f64) {
        let [s, t, r] = voxel;
        with_values!(&mut self.values, arr => arr[[r, t, s]] = Element::from_f64(value))
    }

    /// Copy of the column as `f64` with shape `(nR, nT, nS)`.
    pub fn to_f64_array(&self) -> Array3<f64> {
        with_values!(&self.values, arr => arr.mapv(Element::to_f64))
    }

    /// Minimum and maximum non-NaN value, or `None` for an empty or all-NaN
    /// column.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        with_values!(&self.values, arr => range_of(arr))
    }

    /// Recomputes the cached data limits.
    pub fn update_limits(&mut self) {
        self.limits = self.value_range();
    }

    pub fn limits(&self) -> Option<(f64, f64)> {
        self.limits
    }

    /// Raw little-endian bytes of the typed storage, e.g. for texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        with_values!(&self.values, arr => {
            arr.as_slice_memory_order()
                .map(bytemuck::cast_slice)
                .unwrap_or(&[])
        })
    }
}

/// A grid together with its named scalar columns.
#[derive(Clone, Debug)]
pub struct Volume<G = Grid3> {
    name: String,
    grid: G,
    columns: BTreeMap<String, ScalarField>,
}

impl<G: GridGeometry> Volume<G> {
    pub fn new(name: impl Into<String>, grid: G) -> Self {
        Self {
            name: name.into(),
            grid,
            columns: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &G {
        &self.grid
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&ScalarField> {
        self.columns.get(name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ScalarField> {
        self.columns.get_mut(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Looks up `name`, failing with [`VolumeError::MissingColumn`].
    pub fn require_column(&self, name: &str) -> Result<&ScalarField, VolumeError> {
        self.columns.get(name).ok_or_else(|| self.missing(name))
    }

    pub fn require_column_mut(&mut self, name: &str) -> Result<&mut ScalarField, VolumeError> {
        self.grid_and_column_mut(name).map(|(_, column)| column)
    }

    /// The grid alongside a writable column, for writers that walk the grid.
    pub fn grid_and_column_mut(
        &mut self,
        name: &str,
    ) -> Result<(&G, &mut ScalarField), VolumeError> {
        let Self {
            name: volume,
            grid,
            columns,
        } = self;
        match columns.get_mut(name) {
            Some(column) => Ok((grid, column)),
            None => Err(VolumeError::MissingColumn {
                name: name.to_string(),
                volume: volume.clone(),
            }),
        }
    }

    fn missing(&self, name: &str) -> VolumeError {
        VolumeError::MissingColumn {
            name: name.to_string(),
            volume: self.name.clone(),
        }
    }

    /// Adds a zero-filled column, replacing any column of the same name.
    pub fn add_column(&mut self, name: impl Into<String>, data_type: DataType) -> &mut ScalarField {
        let field = ScalarField::zeros(data_type, self.grid.dims());
        match self.columns.entry(name.into()) {
            Entry::Occupied(mut entry) => {
                entry.insert(field);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(field),
        }
    }

    /// Inserts `field` under `name`, replacing any column of the same name.
    /// Fails when the field does not cover exactly this volume's grid.
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        field: ScalarField,
    ) -> Result<(), VolumeError> {
        let [n_s, n_t, n_r] = self.grid.dims();
        if field.dim() != (n_r, n_t, n_s) {
            return Err(VolumeError::ColumnLength {
                expected: self.grid.voxel_count(),
                found: field.len(),
            });
        }
        self.columns.insert(name.into(), field);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<ScalarField> {
        self.columns.remove(name)
    }
}
