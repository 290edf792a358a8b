use crate::{
    enums::Interpolation,
    error::CopyError,
    geometry::AffineTransform,
    volume::{Volume, VolumeGeometry},
};
use ndarray::{Array3, ArrayView3, Axis, Zip};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Tolerance on continuous indices at the edge of the source grid.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Voxel types the resampler reads and writes.
pub trait Sample: Copy + Default + Send + Sync {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl Sample for u8 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, u8::MAX as f64) as u8
    }
}

impl Sample for u16 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, u16::MAX as f64) as u16
    }
}

impl Sample for f32 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

/// Maps a volume onto another voxel grid.
pub trait Resampler {
    /// Resample `image` onto `reference`.
    ///
    /// `transform` maps physical points of the reference grid into the
    /// physical space of `image`. Voxels falling outside `image` are 0.
    fn resample<T: Sample>(
        &self,
        image: &Volume<T>,
        reference: &VolumeGeometry,
        interpolation: Interpolation,
        transform: &AffineTransform,
    ) -> Result<Volume<T>, CopyError>;

    /// Resample a labelmap. Always nearest neighbour so no new label values
    /// appear.
    fn resample_labelmap(
        &self,
        labelmap: &Volume<u8>,
        reference: &VolumeGeometry,
        transform: &AffineTransform,
    ) -> Result<Volume<u8>, CopyError> {
        self.resample(labelmap, reference, Interpolation::NearestNeighbor, transform)
    }
}

/// CPU resampler, parallel over output voxels.
#[derive(Debug, Default)]
pub struct VoxelResampler {
    pool: Option<ThreadPool>,
}

impl VoxelResampler {
    /// Use the global rayon pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a dedicated pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, CopyError> {
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(Self { pool: Some(pool) })
    }
}

impl Resampler for VoxelResampler {
    fn resample<T: Sample>(
        &self,
        image: &Volume<T>,
        reference: &VolumeGeometry,
        interpolation: Interpolation,
        transform: &AffineTransform,
    ) -> Result<Volume<T>, CopyError> {
        // reference index -> physical -> image physical -> image index
        let to_image_index = image
            .geometry
            .index_transform()
            .inverse()
            .ok_or(CopyError::DegenerateGeometry)?;
        let mapping = reference
            .index_transform()
            .then(transform)
            .then(&to_image_index);

        debug!(
            ?interpolation,
            from = ?image.geometry.size,
            to = ?reference.size,
            "Resampling volume"
        );

        let kernel = Kernel::new(image.data.view(), interpolation);
        let mut data = Array3::from_elem(reference.array_shape(), T::default());
        let mut run = || {
            Zip::indexed(&mut data).par_for_each(|(k, j, i), voxel| {
                let index = mapping.apply([i as f64, j as f64, k as f64]);
                if let Some(value) = kernel.sample(index) {
                    *voxel = value;
                }
            })
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }

        Ok(Volume::new(data, reference.clone()))
    }
}

enum Kernel<'a, T> {
    Nearest(ArrayView3<'a, T>),
    Linear(ArrayView3<'a, T>),
    BSpline(Array3<f64>),
}

impl<'a, T: Sample> Kernel<'a, T> {
    fn new(data: ArrayView3<'a, T>, interpolation: Interpolation) -> Self {
        match interpolation {
            Interpolation::NearestNeighbor => Self::Nearest(data),
            Interpolation::Linear => Self::Linear(data),
            Interpolation::BSpline => Self::BSpline(bspline_coefficients(data)),
        }
    }

    /// Value at continuous `(column, row, slice)` index, or `None` outside
    /// the grid.
    fn sample(&self, index: [f64; 3]) -> Option<T> {
        match self {
            Self::Nearest(data) => {
                let (k, j, i) = (
                    nearest(index[2], data.len_of(Axis(0)))?,
                    nearest(index[1], data.len_of(Axis(1)))?,
                    nearest(index[0], data.len_of(Axis(2)))?,
                );
                Some(data[[k, j, i]])
            }
            Self::Linear(data) => trilinear(data, index).map(T::from_f64),
            Self::BSpline(coefficients) => cubic_bspline(coefficients, index).map(T::from_f64),
        }
    }
}

fn inside(x: f64, len: usize) -> bool {
    len > 0 && x >= -EDGE_TOLERANCE && x <= (len - 1) as f64 + EDGE_TOLERANCE
}

fn nearest(x: f64, len: usize) -> Option<usize> {
    let rounded = x.round();
    (rounded >= 0.0 && rounded < len as f64).then_some(rounded as usize)
}

/// Lower neighbour and weight of the upper one along one axis.
#[inline]
fn linear_axis(x: f64, len: usize) -> (usize, usize, f64) {
    let x = x.clamp(0.0, (len - 1) as f64);
    let x0 = (x.floor() as usize).min(len - 1);
    let x1 = (x0 + 1).min(len - 1);
    (x0, x1, x - x0 as f64)
}

fn trilinear<T: Sample>(data: &ArrayView3<'_, T>, index: [f64; 3]) -> Option<f64> {
    let (depth, height, width) = data.dim();
    if !(inside(index[0], width) && inside(index[1], height) && inside(index[2], depth)) {
        return None;
    }

    let (x0, x1, dx) = linear_axis(index[0], width);
    let (y0, y1, dy) = linear_axis(index[1], height);
    let (z0, z1, dz) = linear_axis(index[2], depth);

    let plane = |z: usize| {
        let v00 = data[[z, y0, x0]].to_f64();
        let v01 = data[[z, y0, x1]].to_f64();
        let v10 = data[[z, y1, x0]].to_f64();
        let v11 = data[[z, y1, x1]].to_f64();
        let v0 = v00.mul_add(1.0 - dx, v01 * dx);
        let v1 = v10.mul_add(1.0 - dx, v11 * dx);
        v0.mul_add(1.0 - dy, v1 * dy)
    };

    Some(plane(z0).mul_add(1.0 - dz, plane(z1) * dz))
}

/// Interpolating cubic B-spline coefficients, computed separably along each
/// axis with mirror boundaries.
fn bspline_coefficients<T: Sample>(data: ArrayView3<'_, T>) -> Array3<f64> {
    let mut coefficients = data.mapv(|v| v.to_f64());
    for axis in 0..3 {
        for mut lane in coefficients.lanes_mut(Axis(axis)) {
            let mut line = lane.to_vec();
            prefilter_line(&mut line);
            for (dst, src) in lane.iter_mut().zip(line) {
                *dst = src;
            }
        }
    }
    coefficients
}

fn prefilter_line(c: &mut [f64]) {
    let n = c.len();
    if n < 2 {
        return;
    }

    let z = 3.0_f64.sqrt() - 2.0;
    let lambda = (1.0 - z) * (1.0 - 1.0 / z);
    c.iter_mut().for_each(|v| *v *= lambda);

    c[0] = causal_initial(c, z);
    for k in 1..n {
        c[k] += z * c[k - 1];
    }

    c[n - 1] = (z / (z * z - 1.0)) * (c[n - 1] + z * c[n - 2]);
    for k in (0..n - 1).rev() {
        c[k] = z * (c[k + 1] - c[k]);
    }
}

fn causal_initial(c: &[f64], z: f64) -> f64 {
    let n = c.len();
    let horizon = (1e-10_f64.ln() / z.abs().ln()).ceil() as usize;

    if horizon < n {
        let mut zn = z;
        let mut sum = c[0];
        for &value in &c[1..horizon] {
            sum += zn * value;
            zn *= z;
        }
        return sum;
    }

    let iz = 1.0 / z;
    let mut zn = z;
    let mut z2n = z.powi(n as i32 - 1);
    let mut sum = c[0] + z2n * c[n - 1];
    z2n *= z2n * iz;
    for &value in &c[1..n - 1] {
        sum += (zn + z2n) * value;
        zn *= z;
        z2n *= iz;
    }
    sum / (1.0 - zn * zn)
}

fn mirror(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let wrapped = index.rem_euclid(period);
    if wrapped >= len as isize {
        (period - wrapped) as usize
    } else {
        wrapped as usize
    }
}

/// Support indices and weights of the cubic B-spline at `x`.
fn bspline_axis(x: f64, len: usize) -> [(usize, f64); 4] {
    let base = x.floor();
    let t = x - base;
    let t2 = t * t;
    let t3 = t2 * t;
    let weights = [
        (1.0 - t).powi(3) / 6.0,
        (4.0 - 6.0 * t2 + 3.0 * t3) / 6.0,
        (1.0 + 3.0 * t + 3.0 * t2 - 3.0 * t3) / 6.0,
        t3 / 6.0,
    ];
    let base = base as isize;
    std::array::from_fn(|n| (mirror(base - 1 + n as isize, len), weights[n]))
}

fn cubic_bspline(coefficients: &Array3<f64>, index: [f64; 3]) -> Option<f64> {
    let (depth, height, width) = coefficients.dim();
    if !(inside(index[0], width) && inside(index[1], height) && inside(index[2], depth)) {
        return None;
    }

    let xs = bspline_axis(index[0], width);
    let ys = bspline_axis(index[1], height);
    let zs = bspline_axis(index[2], depth);

    let mut value = 0.0;
    for (z, wz) in zs {
        for (y, wy) in ys {
            let row: f64 = xs
                .iter()
                .map(|&(x, wx)| wx * coefficients[[z, y, x]])
                .sum();
            value += wz * wy * row;
        }
    }
    Some(value)
}
