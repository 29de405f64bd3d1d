use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::enums::Axis;
use crate::volume::VolumeError;

/// Tolerance, in voxel units, for points sitting on a grid boundary.
pub(crate) const EDGE_TOLERANCE: f64 = 1e-6;

/// Geometry of a regular lattice of voxels along the S, T and R axes.
///
/// Voxels are addressed either by `[s, t, r]` or by a linear index in which S
/// varies fastest: `r * nS * nT + t * nS + s`. Grid space is the frame spanned
/// by the (unit) S, T, R axes with its origin at the grid's base point, in
/// physical units.
pub trait GridGeometry {
    /// Number of voxels along (S, T, R).
    fn dims(&self) -> [usize; 3];

    /// Physical length of the grid along `axis`.
    fn extent(&self, axis: Axis) -> f64;

    /// World-space midpoint of `voxel`.
    fn voxel_midpoint(&self, voxel: [usize; 3]) -> Point3<f64>;

    /// Expresses a world-space point in grid space.
    fn to_grid_space(&self, point: &Point3<f64>) -> Point3<f64>;

    /// Expresses a world-space displacement in grid-space components.
    fn to_grid_vector(&self, vector: &Vector3<f64>) -> Vector3<f64>;

    fn size(&self, axis: Axis) -> usize {
        self.dims()[axis.index()]
    }

    fn voxel_count(&self) -> usize {
        self.dims().iter().product()
    }

    /// Physical width of one voxel along `axis`.
    fn voxel_size(&self, axis: Axis) -> f64 {
        self.extent(axis) / self.size(axis) as f64
    }

    fn index_of(&self, voxel: [usize; 3]) -> usize {
        let [n_s, n_t, _] = self.dims();
        voxel[2] * n_s * n_t + voxel[1] * n_s + voxel[0]
    }

    fn voxel_of(&self, index: usize) -> [usize; 3] {
        let [n_s, n_t, _] = self.dims();
        let r = index / (n_s * n_t);
        let residual = index - r * n_s * n_t;
        let t = residual / n_s;
        [residual - t * n_s, t, r]
    }

    fn midpoint_at(&self, index: usize) -> Point3<f64> {
        self.voxel_midpoint(self.voxel_of(index))
    }

    /// Midpoint of `voxel` in grid space.
    fn grid_midpoint(&self, voxel: [usize; 3]) -> Point3<f64> {
        Point3::new(
            (voxel[0] as f64 + 0.5) * self.voxel_size(Axis::S),
            (voxel[1] as f64 + 0.5) * self.voxel_size(Axis::T),
            (voxel[2] as f64 + 0.5) * self.voxel_size(Axis::R),
        )
    }

    /// Grid-space coordinates of the voxel centres along `axis`.
    fn axis_centres(&self, axis: Axis) -> Vec<f64> {
        let step = self.voxel_size(axis);
        (0..self.size(axis))
            .map(|i| (i as f64 + 0.5) * step)
            .collect()
    }

    /// Voxel whose cell contains `point`, or `None` when the point lies
    /// outside the grid.
    fn enclosing_voxel(&self, point: &Point3<f64>) -> Option<[usize; 3]> {
        let g = self.to_grid_space(point);
        let mut voxel = [0usize; 3];
        for axis in Axis::ALL {
            let n = self.size(axis);
            let pos = g[axis.index()] / self.voxel_size(axis);
            // Also rejects NaN.
            if !(pos >= -EDGE_TOLERANCE && pos <= n as f64 + EDGE_TOLERANCE) {
                return None;
            }
            voxel[axis.index()] = (pos.floor().max(0.0) as usize).min(n - 1);
        }
        Some(voxel)
    }

    fn contains(&self, point: &Point3<f64>) -> bool {
        self.enclosing_voxel(point).is_some()
    }

    /// Face-adjacent neighbours of the voxel at `index`, ordered
    /// S-, S+, T-, T+, R-, R+. Diagonal neighbours are not returned.
    fn neighbours(&self, index: usize) -> Vec<usize> {
        let [n_s, n_t, n_r] = self.dims();
        let [s, t, r] = self.voxel_of(index);
        let mut nbrs = Vec::with_capacity(6);
        if s > 0 {
            nbrs.push(self.index_of([s - 1, t, r]));
        }
        if s + 1 < n_s {
            nbrs.push(self.index_of([s + 1, t, r]));
        }
        if t > 0 {
            nbrs.push(self.index_of([s, t - 1, r]));
        }
        if t + 1 < n_t {
            nbrs.push(self.index_of([s, t + 1, r]));
        }
        if r > 0 {
            nbrs.push(self.index_of([s, t, r - 1]));
        }
        if r + 1 < n_r {
            nbrs.push(self.index_of([s, t, r + 1]));
        }
        nbrs
    }
}

/// A regular grid placed in world space by a base point (the outer corner of
/// voxel `[0, 0, 0]`) and three axis directions.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid3 {
    dims: [usize; 3],
    extents: [f64; 3],
    base: Point3<f64>,
    axes: Matrix3<f64>,
    world_to_grid: Matrix3<f64>,
}

impl Grid3 {
    /// Axis-aligned grid with its base point at the world origin.
    pub fn new(dims: [usize; 3], extents: [f64; 3]) -> Result<Self, VolumeError> {
        if dims.contains(&0) {
            return Err(VolumeError::InvalidGrid(format!(
                "grid dimensions must be non-zero, got {dims:?}"
            )));
        }
        if extents.iter().any(|e| !e.is_finite() || *e <= 0.0) {
            return Err(VolumeError::InvalidGrid(format!(
                "grid extents must be positive, got {extents:?}"
            )));
        }
        Ok(Self {
            dims,
            extents,
            base: Point3::origin(),
            axes: Matrix3::identity(),
            world_to_grid: Matrix3::identity(),
        })
    }

    /// Grid with unit voxels, i.e. extents equal to `dims`.
    pub fn unit(dims: [usize; 3]) -> Result<Self, VolumeError> {
        Self::new(dims, dims.map(|n| n as f64))
    }

    pub fn with_base(mut self, base: Point3<f64>) -> Self {
        self.base = base;
        self
    }

    /// Orients the grid. The axes are normalised; they need not be
    /// orthogonal but must be linearly independent.
    pub fn with_axes(
        mut self,
        s_axis: Vector3<f64>,
        t_axis: Vector3<f64>,
        r_axis: Vector3<f64>,
    ) -> Result<Self, VolumeError> {
        for (axis, direction) in Axis::ALL.into_iter().zip([&s_axis, &t_axis, &r_axis]) {
            let norm = direction.norm();
            if !norm.is_finite() || norm <= 0.0 {
                return Err(VolumeError::InvalidGrid(format!(
                    "{axis} axis has length {norm}"
                )));
            }
        }
        let axes = Matrix3::from_columns(&[
            s_axis.normalize(),
            t_axis.normalize(),
            r_axis.normalize(),
        ]);
        let world_to_grid = axes.try_inverse().ok_or_else(|| {
            VolumeError::InvalidGrid("grid axes are degenerate".to_string())
        })?;
        self.axes = axes;
        self.world_to_grid = world_to_grid;
        Ok(self)
    }

    pub fn base(&self) -> Point3<f64> {
        self.base
    }

    pub fn axis_direction(&self, axis: Axis) -> Vector3<f64> {
        self.axes.column(axis.index()).into_owned()
    }

    /// Homogeneous grid-space to world-space transform.
    pub fn basis_transform(&self) -> Matrix4<f64> {
        let mut m = self.axes.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.base.coords);
        m
    }
}

impl GridGeometry for Grid3 {
    fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn extent(&self, axis: Axis) -> f64 {
        self.extents[axis.index()]
    }

    fn voxel_midpoint(&self, voxel: [usize; 3]) -> Point3<f64> {
        self.base + self.axes * self.grid_midpoint(voxel).coords
    }

    fn to_grid_space(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.world_to_grid * (point - self.base))
    }

    fn to_grid_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.world_to_grid * vector
    }
}
