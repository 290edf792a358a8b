use crate::geometry::AffineTransform;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, ArrayView2, s};

/// Placement of a voxel grid in the patient coordinate system.
///
/// Index triples are `(i, j, k)` = (column, row, slice), matching
/// `P = S + (di*i)X + (dj*j)Y + (dk*k)Z`.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGeometry {
    /// Position of the first voxel of the first slice.
    pub origin: [f64; 3],
    /// (column spacing, row spacing, slice spacing)
    pub spacing: [f64; 3],
    /// Row cosines, column cosines and slice normal, flattened.
    pub direction: [f64; 9],
    /// (columns, rows, slices)
    pub size: [usize; 3],
}

impl VolumeGeometry {
    pub fn axis(&self, axis: usize) -> Vector3<f64> {
        Vector3::new(
            self.direction[axis * 3],
            self.direction[axis * 3 + 1],
            self.direction[axis * 3 + 2],
        )
    }

    fn index_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&[
            self.axis(0) * self.spacing[0],
            self.axis(1) * self.spacing[1],
            self.axis(2) * self.spacing[2],
        ])
    }

    /// The affine map from continuous voxel index to physical position.
    pub fn index_transform(&self) -> AffineTransform {
        AffineTransform::new(self.index_matrix(), Vector3::from(self.origin))
    }

    /// Physical position of a (possibly fractional) voxel index.
    pub fn index_to_physical(&self, index: [f64; 3]) -> [f64; 3] {
        let p = Vector3::from(self.origin) + self.index_matrix() * Vector3::from(index);
        [p.x, p.y, p.z]
    }

    /// Continuous voxel index of a physical point, or `None` when the
    /// direction cosines and spacings do not span 3D space.
    pub fn physical_to_index(&self, point: [f64; 3]) -> Option<[f64; 3]> {
        let inverse = self.index_matrix().try_inverse()?;
        let v = inverse * (Vector3::from(point) - Vector3::from(self.origin));
        Some([v.x, v.y, v.z])
    }

    /// Physical position of the centre of slice `k`.
    pub fn slice_centre(&self, k: usize) -> [f64; 3] {
        self.index_to_physical([
            (self.size[0] as f64 - 1.0) / 2.0,
            (self.size[1] as f64 - 1.0) / 2.0,
            k as f64,
        ])
    }

    /// Index of the slice whose plane is closest to `point`, clamped to the
    /// stack.
    pub fn nearest_slice(&self, point: [f64; 3]) -> Option<usize> {
        let index = self.physical_to_index(point)?;
        let last = self.size[2].checked_sub(1)?;
        Some(index[2].round().clamp(0.0, last as f64) as usize)
    }

    /// The `(slices, rows, columns)` shape of arrays laid out on this grid.
    pub fn array_shape(&self) -> (usize, usize, usize) {
        (self.size[2], self.size[1], self.size[0])
    }
}

/// Dense voxel data on a [`VolumeGeometry`], stored `(slices, rows, columns)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    pub data: Array3<T>,
    pub geometry: VolumeGeometry,
}

impl<T: Clone + Default> Volume<T> {
    /// Wrap `data`; the geometry size is taken from the array shape.
    pub fn new(data: Array3<T>, mut geometry: VolumeGeometry) -> Self {
        let (depth, height, width) = data.dim();
        geometry.size = [width, height, depth];
        Self { data, geometry }
    }

    pub fn zeros(geometry: VolumeGeometry) -> Self {
        let data = Array3::from_elem(geometry.array_shape(), T::default());
        Self { data, geometry }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<T> {
        &mut self.data
    }

    pub fn slice(&self, index: usize) -> Option<ArrayView2<'_, T>> {
        self.is_valid_index(index)
            .then(|| self.data.slice(s![index, .., ..]))
    }

    fn is_valid_index(&self, index: usize) -> bool {
        index < self.data.dim().0
    }
}
