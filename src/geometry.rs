use crate::{enums::GeometryCase, series::DicomSeries};
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

/// Default tolerance on direction cosines.
pub const DEFAULT_DIRECTION_EPSILON: f64 = 1e-6;

/// Selects how an annotation has to be carried from one series to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryClassifier {
    epsilon: f64,
}

impl Default for GeometryClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTION_EPSILON)
    }
}

impl GeometryClassifier {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Classify the relation between `source` and `target`.
    ///
    /// Frame of Reference UIDs are compared exactly, direction cosines within
    /// the configured epsilon (largest absolute component difference) and
    /// nominal spacings exactly.
    pub fn classify(&self, source: &DicomSeries, target: &DicomSeries) -> GeometryCase {
        let case = if source.is_same_series(target) {
            GeometryCase::WithinSeries
        } else if source.frame_of_reference_uid() != target.frame_of_reference_uid() {
            GeometryCase::DifferentFrameOfReference
        } else if !self.same_direction(&source.direction(), &target.direction()) {
            GeometryCase::SameFrameOfReferenceDifferentOrientation
        } else if source.nominal_spacing() != target.nominal_spacing() {
            GeometryCase::SameOrientationDifferentSpacing
        } else {
            GeometryCase::SameGeometry
        };

        debug!(
            source = source.series_instance_uid(),
            target = target.series_instance_uid(),
            %case,
            "Classified geometry"
        );
        case
    }

    fn same_direction(&self, a: &[f64; 9], b: &[f64; 9]) -> bool {
        let max_diff = a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max);
        max_diff < self.epsilon
    }
}

/// Physical-space transform `p' = M p + t`, mapping destination points into
/// the source space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub matrix: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(matrix: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            matrix,
            translation,
        }
    }

    /// Build from 12 row-major parameters: the 3x3 matrix followed by the
    /// translation.
    pub fn from_parameters(parameters: &[f64; 12]) -> Self {
        Self {
            matrix: Matrix3::from_row_slice(&parameters[..9]),
            translation: Vector3::new(parameters[9], parameters[10], parameters[11]),
        }
    }

    pub fn from_translation(offset: [f64; 3]) -> Self {
        Self {
            matrix: Matrix3::identity(),
            translation: Vector3::from(offset),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        let p = self.matrix * Vector3::from(point) + self.translation;
        [p.x, p.y, p.z]
    }

    /// `next` applied after `self`.
    pub fn then(&self, next: &Self) -> Self {
        Self {
            matrix: next.matrix * self.matrix,
            translation: next.matrix * self.translation + next.translation,
        }
    }

    /// The transform mapping the other way, if the matrix is invertible.
    pub fn inverse(&self) -> Option<Self> {
        let matrix = self.matrix.try_inverse()?;
        Some(Self {
            matrix,
            translation: -(matrix * self.translation),
        })
    }
}
