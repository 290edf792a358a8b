use crate::{
    enums::SortBy,
    series::{DicomSeries, SeriesError, SliceRecord},
    volume::Volume,
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, OpenFileOptions, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use rayon::prelude::*;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

const ORIENTATION_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Error)]
pub enum SeriesLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Slice {uid} does not belong to the series: {reason}")]
    InconsistentSeries { uid: String, reason: &'static str },

    #[error("Could not decode pixel data of slice {uid}")]
    UndecodablePixelData { uid: String },

    #[error("Invalid series: {0}")]
    Series(#[from] SeriesError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory traversal error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

pub struct SeriesLoader;

impl SeriesLoader {
    /// Build a series from already opened DICOM objects.
    ///
    /// Objects lacking the attributes of a [`SliceRecord`] are skipped, so a
    /// structure set stored next to its images does not end up in the series.
    ///
    /// # Errors
    ///
    /// Returns error if no valid images are found or the slices disagree on
    /// Series Instance UID, Frame of Reference, orientation or dimensions
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<DicomSeries, SeriesLoaderError> {
        let mut images = Vec::with_capacity(dicom_objects.len());
        for dicom_object in dicom_objects {
            match Self::extract_slice_record(dicom_object) {
                Some(record) => images.push((record, dicom_object)),
                None => warn!("Skipping DICOM object without image plane attributes"),
            }
        }

        let Some(&(_, first)) = images.first() else {
            return Err(SeriesLoaderError::NoValidImages);
        };
        let (series_uid, study_uid) = Self::get_series_identity(first);
        if let Some((record, _)) = images.iter().find(|(_, dicom_object)| {
            Self::get_string(dicom_object, tags::SERIES_INSTANCE_UID).unwrap_or_default()
                != series_uid
        }) {
            return Err(SeriesLoaderError::InconsistentSeries {
                uid: record.sop_instance_uid.clone(),
                reason: "different Series Instance UID",
            });
        }

        let mut records: Vec<_> = images.into_iter().map(|(record, _)| record).collect();
        Self::sort_records(&mut records, sort_by);
        Self::validate_records(&records)?;
        debug!(series_uid, slices = records.len(), "Loaded series");

        Ok(DicomSeries::new(series_uid, study_uid, records)?)
    }

    /// Load a series from file paths, reading headers only
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        sort_by: SortBy,
    ) -> Result<DicomSeries, SeriesLoaderError> {
        let objects: Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| {
                OpenFileOptions::new()
                    .read_until(tags::PIXEL_DATA)
                    .open_file(path.as_ref())
            })
            .collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a series from a directory tree containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<DicomSeries, SeriesLoaderError> {
        let paths = Self::find_dicom_files(path.as_ref())?;
        Self::load_from_file_paths(&paths, sort_by)
    }

    /// Load a series together with its decoded pixel data.
    ///
    /// The volume is laid out `(slices, rows, columns)` in series order and
    /// carries the series geometry.
    pub fn load_volume(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<(DicomSeries, Volume<u16>), SeriesLoaderError> {
        let paths = Self::find_dicom_files(path.as_ref())?;
        let objects: Result<Vec<_>, _> = paths.par_iter().map(open_file).collect();
        let objects = objects?;

        let series = Self::load_from_dicom_objects(&objects, sort_by)?;

        let by_uid: HashMap<_, _> = objects
            .iter()
            .filter_map(|object| {
                Some((Self::get_string(object, tags::SOP_INSTANCE_UID)?, object))
            })
            .collect();

        let mut images = Vec::with_capacity(series.len());
        for record in series.slices() {
            let object = by_uid
                .get(&record.sop_instance_uid)
                .ok_or(SeriesLoaderError::NoValidImages)?;
            let image = Self::decode_image(object).ok_or_else(|| {
                SeriesLoaderError::UndecodablePixelData {
                    uid: record.sop_instance_uid.clone(),
                }
            })?;
            images.push(image);
        }

        Self::validate_dimensions(&images)?;

        let volume = Volume::new(Self::build_volume_array(&images), series.geometry());
        Ok((series, volume))
    }

    /// Files below `path` whose name contains ".dcm", in file-name order.
    pub fn find_dicom_files(path: &Path) -> Result<Vec<PathBuf>, SeriesLoaderError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            let is_dicom = entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.to_ascii_lowercase().contains(".dcm"));
            if is_dicom {
                paths.push(entry.into_path());
            }
        }

        if paths.is_empty() {
            return Err(SeriesLoaderError::NoValidImages);
        }
        Ok(paths)
    }

    pub(crate) fn get_string(
        dicom_object: &InMemDicomObject,
        tag: dicom::core::Tag,
    ) -> Option<String> {
        let value = dicom_object.element(tag).ok()?.to_str().ok()?;
        let value = value.trim_end_matches(['\0', ' ']);
        (!value.is_empty()).then(|| value.to_string())
    }

    fn get_floats<const N: usize>(
        dicom_object: &InMemDicomObject,
        tag: dicom::core::Tag,
    ) -> Option<[f64; N]> {
        let values = dicom_object.element(tag).ok()?.to_multi_float64().ok()?;
        values.get(..N)?.try_into().ok()
    }

    fn extract_slice_record(dicom_object: &InMemDicomObject) -> Option<SliceRecord> {
        Some(SliceRecord {
            sop_instance_uid: Self::get_string(dicom_object, tags::SOP_INSTANCE_UID)?,
            sop_class_uid: Self::get_string(dicom_object, tags::SOP_CLASS_UID)
                .unwrap_or_default(),
            frame_of_reference_uid: Self::get_string(
                dicom_object,
                tags::FRAME_OF_REFERENCE_UID,
            )?,
            image_position: Self::get_floats(dicom_object, tags::IMAGE_POSITION_PATIENT)?,
            image_orientation: Self::get_floats(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)?,
            pixel_spacing: Self::get_floats(dicom_object, tags::PIXEL_SPACING)?,
            slice_thickness: dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()
                .and_then(|element| element.to_float64().ok()),
            rows: dicom_object.element(tags::ROWS).ok()?.to_int::<usize>().ok()?,
            columns: dicom_object
                .element(tags::COLUMNS)
                .ok()?
                .to_int::<usize>()
                .ok()?,
            instance_number: dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()
                .and_then(|element| element.to_int::<i32>().ok()),
        })
    }

    fn get_series_identity(dicom_object: &InMemDicomObject) -> (String, String) {
        (
            Self::get_string(dicom_object, tags::SERIES_INSTANCE_UID).unwrap_or_default(),
            Self::get_string(dicom_object, tags::STUDY_INSTANCE_UID).unwrap_or_default(),
        )
    }

    fn sort_records(records: &mut [SliceRecord], sort_by: SortBy) {
        match sort_by {
            SortBy::ImagePositionPatient => records.sort_by(|a, b| {
                a.position_along_normal()
                    .total_cmp(&b.position_along_normal())
            }),
            SortBy::InstanceNumber => records.sort_by_key(|record| record.instance_number),
            SortBy::None => {}
        }
    }

    fn validate_records(records: &[SliceRecord]) -> Result<(), SeriesLoaderError> {
        let first = &records[0];
        for record in &records[1..] {
            if record.frame_of_reference_uid != first.frame_of_reference_uid {
                return Err(SeriesLoaderError::InconsistentSeries {
                    uid: record.sop_instance_uid.clone(),
                    reason: "different Frame of Reference UID",
                });
            }
            let max_diff = record
                .image_orientation
                .iter()
                .zip(&first.image_orientation)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            if max_diff > ORIENTATION_TOLERANCE {
                return Err(SeriesLoaderError::InconsistentSeries {
                    uid: record.sop_instance_uid.clone(),
                    reason: "different image orientation",
                });
            }
            if (record.rows, record.columns) != (first.rows, first.columns) {
                return Err(SeriesLoaderError::InconsistentDimensions);
            }
        }
        Ok(())
    }

    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<u16>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn validate_dimensions(images: &[Array2<u16>]) -> Result<(), SeriesLoaderError> {
        let first_dim = images
            .first()
            .ok_or(SeriesLoaderError::NoValidImages)?
            .dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(SeriesLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(images: &[Array2<u16>]) -> Array3<u16> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<u16>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }
}
