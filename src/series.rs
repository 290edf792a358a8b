use crate::volume::VolumeGeometry;
use nalgebra::Vector3;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("series contains no slices")]
    Empty,

    #[error("SOP Instance UID {0} occurs more than once in the series")]
    DuplicateSopInstanceUid(String),
}

/// Header information of one image slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceRecord {
    pub sop_instance_uid: String,
    pub sop_class_uid: String,
    pub frame_of_reference_uid: String,
    pub image_position: [f64; 3],
    /// Row cosines followed by column cosines.
    pub image_orientation: [f64; 6],
    /// (row spacing, column spacing) as stored in PixelSpacing.
    pub pixel_spacing: [f64; 2],
    pub slice_thickness: Option<f64>,
    pub rows: usize,
    pub columns: usize,
    pub instance_number: Option<i32>,
}

impl SliceRecord {
    pub fn row_cosines(&self) -> Vector3<f64> {
        Vector3::new(
            self.image_orientation[0],
            self.image_orientation[1],
            self.image_orientation[2],
        )
    }

    pub fn column_cosines(&self) -> Vector3<f64> {
        Vector3::new(
            self.image_orientation[3],
            self.image_orientation[4],
            self.image_orientation[5],
        )
    }

    pub fn normal(&self) -> Vector3<f64> {
        self.row_cosines().cross(&self.column_cosines())
    }

    /// Signed distance of the slice along its own normal.
    pub fn position_along_normal(&self) -> f64 {
        self.normal().dot(&Vector3::from(self.image_position))
    }
}

/// Spatially ordered slices of one DICOM series.
///
/// Ordinal slice indices are positions in this order. Lookups from SOP
/// Instance UID to ordinal go through a hash index built once on creation.
#[derive(Debug, Clone)]
pub struct DicomSeries {
    series_instance_uid: String,
    study_instance_uid: String,
    slices: Vec<SliceRecord>,
    uid_index: HashMap<String, usize>,
}

impl PartialEq for DicomSeries {
    // The index is derived from the slices.
    fn eq(&self, other: &Self) -> bool {
        self.series_instance_uid == other.series_instance_uid
            && self.study_instance_uid == other.study_instance_uid
            && self.slices == other.slices
    }
}

impl DicomSeries {
    pub fn new(
        series_instance_uid: impl Into<String>,
        study_instance_uid: impl Into<String>,
        slices: Vec<SliceRecord>,
    ) -> Result<Self, SeriesError> {
        if slices.is_empty() {
            return Err(SeriesError::Empty);
        }

        let mut uid_index = HashMap::with_capacity(slices.len());
        for (ordinal, slice) in slices.iter().enumerate() {
            if uid_index
                .insert(slice.sop_instance_uid.clone(), ordinal)
                .is_some()
            {
                return Err(SeriesError::DuplicateSopInstanceUid(
                    slice.sop_instance_uid.clone(),
                ));
            }
        }

        Ok(Self {
            series_instance_uid: series_instance_uid.into(),
            study_instance_uid: study_instance_uid.into(),
            slices,
            uid_index,
        })
    }

    pub fn series_instance_uid(&self) -> &str {
        &self.series_instance_uid
    }

    pub fn study_instance_uid(&self) -> &str {
        &self.study_instance_uid
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn slices(&self) -> &[SliceRecord] {
        &self.slices
    }

    pub fn slice(&self, ordinal: usize) -> Option<&SliceRecord> {
        self.slices.get(ordinal)
    }

    /// Ordinal slice index of the slice with the given SOP Instance UID.
    pub fn ordinal_of(&self, sop_instance_uid: &str) -> Option<usize> {
        self.uid_index.get(sop_instance_uid).copied()
    }

    pub fn sop_instance_uids(&self) -> Vec<&str> {
        self.slices
            .iter()
            .map(|slice| slice.sop_instance_uid.as_str())
            .collect()
    }

    fn first(&self) -> &SliceRecord {
        // `new` rejects empty series
        &self.slices[0]
    }

    pub fn frame_of_reference_uid(&self) -> &str {
        &self.first().frame_of_reference_uid
    }

    /// Row cosines, column cosines and slice normal.
    pub fn direction(&self) -> [f64; 9] {
        let first = self.first();
        let (x, y) = (first.row_cosines(), first.column_cosines());
        let mut z = first.normal();
        if self.slices.len() > 1 && self.stack_offset() < 0.0 {
            z = -z;
        }
        [x.x, x.y, x.z, y.x, y.y, y.z, z.x, z.y, z.z]
    }

    /// Nominal voxel spacing: PixelSpacing column and row spacing followed by
    /// SliceThickness, falling back to the measured slice distance when the
    /// thickness is absent.
    pub fn nominal_spacing(&self) -> [f64; 3] {
        let first = self.first();
        let thickness = first
            .slice_thickness
            .unwrap_or_else(|| self.slice_distance());
        [first.pixel_spacing[1], first.pixel_spacing[0], thickness]
    }

    // Projection of the first-to-last slice offset on the first slice normal.
    fn stack_offset(&self) -> f64 {
        let first = self.first();
        let last = &self.slices[self.slices.len() - 1];
        first.normal().dot(
            &(Vector3::from(last.image_position) - Vector3::from(first.image_position)),
        )
    }

    /// Mean distance between neighbouring slices along the normal.
    pub fn slice_distance(&self) -> f64 {
        if self.slices.len() < 2 {
            return self.first().slice_thickness.unwrap_or(1.0);
        }
        self.stack_offset().abs() / (self.slices.len() - 1) as f64
    }

    /// The voxel grid spanned by the slices.
    pub fn geometry(&self) -> VolumeGeometry {
        let first = self.first();
        VolumeGeometry {
            origin: first.image_position,
            spacing: [
                first.pixel_spacing[1],
                first.pixel_spacing[0],
                self.slice_distance(),
            ],
            direction: self.direction(),
            size: [first.columns, first.rows, self.slices.len()],
        }
    }

    /// Whether `self` and `other` describe the same slices.
    pub fn is_same_series(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.series_instance_uid == other.series_instance_uid
                && self.slices.len() == other.slices.len()
                && self
                    .slices
                    .iter()
                    .zip(&other.slices)
                    .all(|(a, b)| a.sop_instance_uid == b.sop_instance_uid))
    }
}
