use serde::Deserialize;
use std::fmt;

/// How the annotation of a source slice has to be transformed to be valid at
/// a destination slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryCase {
    WithinSeries,
    SameGeometry,
    SameOrientationDifferentSpacing,
    SameFrameOfReferenceDifferentOrientation,
    DifferentFrameOfReference,
}

impl GeometryCase {
    /// Whether the annotation can be copied slice for slice, without building
    /// and resampling a labelmap.
    pub fn is_direct(self) -> bool {
        matches!(self, Self::WithinSeries | Self::SameGeometry)
    }
}

impl fmt::Display for GeometryCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WithinSeries => "within series",
            Self::SameGeometry => "same geometry",
            Self::SameOrientationDifferentSpacing => "same orientation, different spacing",
            Self::SameFrameOfReferenceDifferentOrientation => {
                "same frame of reference, different orientation"
            }
            Self::DifferentFrameOfReference => "different frame of reference",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Mandatory for masks and labelmaps.
    NearestNeighbor,
    #[default]
    Linear,
    BSpline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    #[default]
    Identity,
    Affine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoiModality {
    /// RTSTRUCT
    Contour,
    /// SEG
    Segmentation,
}

impl RoiModality {
    /// The DICOM Modality attribute value.
    pub fn as_dicom_str(self) -> &'static str {
        match self {
            Self::Contour => "RTSTRUCT",
            Self::Segmentation => "SEG",
        }
    }
}

impl fmt::Display for RoiModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_dicom_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Position along the slice normal.
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}
