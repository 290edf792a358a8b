use crate::{
    enums::RoiModality,
    labelmap::{pack_bits, unpack_bits},
    roi::{Annotations, Contour, ImageReference, RoiObject, SegmentFrame, Segmentation},
    series::DicomSeries,
    series_loader::SeriesLoader,
};
use chrono::{DateTime, Utc};
use dicom::{
    core::{DataElement, PrimitiveValue, Tag, VR, value::DataSetSequence, value::Value},
    object::{FileMetaTableBuilder, InMemDicomObject, mem::InMemElement, open_file},
};
use dicom_dictionary_std::{tags, uids};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum RoiIoError {
    #[error("Unsupported ROI modality: {0:?}")]
    UnsupportedModality(Option<String>),

    #[error("Missing attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Malformed attribute {name}: {reason}")]
    MalformedAttribute {
        name: &'static str,
        reason: String,
    },

    #[error("Could not build file meta group: {0}")]
    FileMeta(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM read error: {0}")]
    Read(#[from] dicom::object::ReadError),

    #[error("DICOM write error: {0}")]
    Write(#[from] dicom::object::WriteError),
}

// Referenced Frame of Reference -> RT Referenced Study -> RT Referenced Series
const RTS_REFERENCED_SERIES: [Tag; 3] = [
    tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
    tags::RT_REFERENCED_STUDY_SEQUENCE,
    tags::RT_REFERENCED_SERIES_SEQUENCE,
];
const RTS_REFERENCED_STUDY: [Tag; 2] = [
    tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
    tags::RT_REFERENCED_STUDY_SEQUENCE,
];
const RTS_FRAME_OF_REFERENCE: [Tag; 1] = [tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE];
const RTS_ROI_CONTOUR: [Tag; 1] = [tags::ROI_CONTOUR_SEQUENCE];
const SEG_REFERENCED_SERIES: [Tag; 1] = [tags::REFERENCED_SERIES_SEQUENCE];
const SEG_SOURCE_IMAGE: [Tag; 2] = [tags::DERIVATION_IMAGE_SEQUENCE, tags::SOURCE_IMAGE_SEQUENCE];
const SEG_PIXEL_MEASURES: [Tag; 2] = [
    tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
    tags::PIXEL_MEASURES_SEQUENCE,
];
const SEG_PLANE_ORIENTATION: [Tag; 2] = [
    tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
    tags::PLANE_ORIENTATION_SEQUENCE,
];

/// Reads RTSTRUCT and SEG files into [`RoiObject`]s.
///
/// Only the first ROI of a structure set is modelled.
pub struct RoiLoader;

impl RoiLoader {
    /// Load an RTSTRUCT or SEG file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is neither RTSTRUCT nor SEG,
    /// or lacks the attributes tying it to an image series
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<RoiObject, RoiIoError> {
        let object = open_file(path.as_ref())?.into_inner();
        let roi = Self::from_dicom(object)?;
        debug!(
            modality = %roi.modality(),
            entries = roi.len(),
            "Loaded ROI"
        );
        Ok(roi)
    }

    pub fn from_dicom(mut object: InMemDicomObject) -> Result<RoiObject, RoiIoError> {
        let modality = SeriesLoader::get_string(&object, tags::MODALITY);
        match modality.as_deref() {
            Some("RTSTRUCT") => Self::read_rtstruct(object),
            Some("SEG") => {
                let pixel_data = object.take_element(tags::PIXEL_DATA).ok();
                Self::read_seg(object, pixel_data)
            }
            _ => Err(RoiIoError::UnsupportedModality(modality)),
        }
    }

    fn read_rtstruct(object: InMemDicomObject) -> Result<RoiObject, RoiIoError> {
        let referenced_series = nested_item(&object, &RTS_REFERENCED_SERIES)
            .ok_or(RoiIoError::MissingAttribute("RTReferencedSeriesSequence"))?;
        let image_refs = items(referenced_series, tags::CONTOUR_IMAGE_SEQUENCE)
            .iter()
            .map(read_image_reference)
            .collect::<Result<Vec<_>, _>>()?;

        let contours = nested_item(&object, &RTS_ROI_CONTOUR)
            .map(|roi_contour| items(roi_contour, tags::CONTOUR_SEQUENCE))
            .unwrap_or_default()
            .iter()
            .map(read_contour)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RoiObject {
            sop_instance_uid: required_string(&object, tags::SOP_INSTANCE_UID, "SOPInstanceUID")?,
            series_instance_uid: required_string(
                &object,
                tags::SERIES_INSTANCE_UID,
                "SeriesInstanceUID",
            )?,
            frame_of_reference_uid: nested_item(&object, &RTS_FRAME_OF_REFERENCE)
                .and_then(|item| SeriesLoader::get_string(item, tags::FRAME_OF_REFERENCE_UID))
                .ok_or(RoiIoError::MissingAttribute("FrameOfReferenceUID"))?,
            referenced_study_uid: nested_item(&object, &RTS_REFERENCED_STUDY)
                .and_then(|item| SeriesLoader::get_string(item, tags::REFERENCED_SOP_INSTANCE_UID))
                .unwrap_or_default(),
            referenced_series_uid: required_string(
                referenced_series,
                tags::SERIES_INSTANCE_UID,
                "SeriesInstanceUID",
            )?,
            image_refs,
            annotations: Annotations::Contours(contours),
            dataset: object,
        })
    }

    fn read_seg(
        object: InMemDicomObject,
        pixel_data: Option<InMemElement>,
    ) -> Result<RoiObject, RoiIoError> {
        let referenced_series = nested_item(&object, &SEG_REFERENCED_SERIES)
            .ok_or(RoiIoError::MissingAttribute("ReferencedSeriesSequence"))?;
        let image_refs = items(referenced_series, tags::REFERENCED_INSTANCE_SEQUENCE)
            .iter()
            .map(read_image_reference)
            .collect::<Result<Vec<_>, _>>()?;

        let rows = required_int(&object, tags::ROWS, "Rows")?;
        let columns = required_int(&object, tags::COLUMNS, "Columns")?;
        let functional_groups = items(&object, tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE);
        let number_of_frames = object
            .element(tags::NUMBER_OF_FRAMES)
            .ok()
            .and_then(|e| e.to_int::<usize>().ok())
            .unwrap_or(functional_groups.len());
        if number_of_frames != functional_groups.len() {
            return Err(RoiIoError::MalformedAttribute {
                name: "NumberOfFrames",
                reason: format!(
                    "{number_of_frames} frames but {} functional group items",
                    functional_groups.len()
                ),
            });
        }

        let masks = match pixel_data {
            Some(element) if number_of_frames > 0 => {
                let bytes = element.to_bytes().map_err(|e| RoiIoError::MalformedAttribute {
                    name: "PixelData",
                    reason: e.to_string(),
                })?;
                let bits_allocated = object
                    .element(tags::BITS_ALLOCATED)
                    .ok()
                    .and_then(|e| e.to_int::<u16>().ok())
                    .unwrap_or(1);
                decode_masks(&bytes, bits_allocated, number_of_frames, rows, columns)?
            }
            Some(_) => Vec::new(),
            None if number_of_frames == 0 => Vec::new(),
            None => return Err(RoiIoError::MissingAttribute("PixelData")),
        };

        let frames = functional_groups
            .iter()
            .zip(masks)
            .map(|(group, mask)| read_frame(group, mask))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RoiObject {
            sop_instance_uid: required_string(&object, tags::SOP_INSTANCE_UID, "SOPInstanceUID")?,
            series_instance_uid: required_string(
                &object,
                tags::SERIES_INSTANCE_UID,
                "SeriesInstanceUID",
            )?,
            frame_of_reference_uid: required_string(
                &object,
                tags::FRAME_OF_REFERENCE_UID,
                "FrameOfReferenceUID",
            )?,
            referenced_study_uid: SeriesLoader::get_string(&object, tags::STUDY_INSTANCE_UID)
                .unwrap_or_default(),
            referenced_series_uid: required_string(
                referenced_series,
                tags::SERIES_INSTANCE_UID,
                "SeriesInstanceUID",
            )?,
            image_refs,
            annotations: Annotations::Segmentation(Segmentation {
                rows,
                columns,
                frames,
            }),
            dataset: object,
        })
    }
}

/// Writes [`RoiObject`]s back to DICOM.
pub struct RoiSaver;

impl RoiSaver {
    /// The DICOM data set of `roi`: its template attributes with every
    /// modelled value written on top.
    pub fn to_dicom(roi: &RoiObject) -> InMemDicomObject {
        let mut object = roi.dataset.clone();
        let modality = roi.modality();

        if SeriesLoader::get_string(&object, tags::SOP_CLASS_UID).is_none() {
            let sop_class = match modality {
                RoiModality::Contour => uids::RT_STRUCTURE_SET_STORAGE,
                RoiModality::Segmentation => uids::SEGMENTATION_STORAGE,
            };
            object.put(string_element(tags::SOP_CLASS_UID, VR::UI, sop_class));
        }
        object.put(string_element(tags::MODALITY, VR::CS, modality.as_dicom_str()));
        object.put(string_element(tags::SOP_INSTANCE_UID, VR::UI, &roi.sop_instance_uid));
        object.put(string_element(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            &roi.series_instance_uid,
        ));

        let image_refs: Vec<_> = roi.image_refs.iter().map(image_reference_item).collect();
        match &roi.annotations {
            Annotations::Contours(contours) => {
                Self::write_rtstruct(&mut object, roi, image_refs, contours)
            }
            Annotations::Segmentation(segmentation) => {
                Self::write_seg(&mut object, roi, image_refs, segmentation)
            }
        }
        object
    }

    /// Overwrite the shared pixel measures and plane orientation of a SEG
    /// data set with the geometry of `series`.
    pub(crate) fn write_series_geometry(dataset: &mut InMemDicomObject, series: &DicomSeries) {
        let Some(first) = series.slices().first() else {
            return;
        };
        let thickness = series.nominal_spacing()[2];
        with_nested_item(dataset, &SEG_PIXEL_MEASURES, |item| {
            item.put(decimal_element(tags::PIXEL_SPACING, &first.pixel_spacing));
            item.put(decimal_element(tags::SLICE_THICKNESS, &[thickness]));
            item.put(decimal_element(
                tags::SPACING_BETWEEN_SLICES,
                &[series.slice_distance()],
            ));
        });
        with_nested_item(dataset, &SEG_PLANE_ORIENTATION, |item| {
            item.put(decimal_element(
                tags::IMAGE_ORIENTATION_PATIENT,
                &first.image_orientation,
            ));
        });
    }

    fn write_rtstruct(
        object: &mut InMemDicomObject,
        roi: &RoiObject,
        image_refs: Vec<InMemDicomObject>,
        contours: &[Contour],
    ) {
        if !roi.referenced_study_uid.is_empty() {
            object.put(string_element(
                tags::STUDY_INSTANCE_UID,
                VR::UI,
                &roi.referenced_study_uid,
            ));
        }
        with_nested_item(object, &[tags::STRUCTURE_SET_ROI_SEQUENCE], |item| {
            item.put(string_element(
                tags::REFERENCED_FRAME_OF_REFERENCE_UID,
                VR::UI,
                &roi.frame_of_reference_uid,
            ));
        });
        with_nested_item(object, &RTS_FRAME_OF_REFERENCE, |item| {
            item.put(string_element(
                tags::FRAME_OF_REFERENCE_UID,
                VR::UI,
                &roi.frame_of_reference_uid,
            ));
        });
        with_nested_item(object, &RTS_REFERENCED_STUDY, |item| {
            item.put(string_element(
                tags::REFERENCED_SOP_INSTANCE_UID,
                VR::UI,
                &roi.referenced_study_uid,
            ));
        });
        with_nested_item(object, &RTS_REFERENCED_SERIES, |item| {
            item.put(string_element(
                tags::SERIES_INSTANCE_UID,
                VR::UI,
                &roi.referenced_series_uid,
            ));
            item.put(sequence_element(tags::CONTOUR_IMAGE_SEQUENCE, image_refs));
        });

        let contour_items = contours.iter().map(contour_item).collect();
        with_nested_item(object, &RTS_ROI_CONTOUR, |item| {
            item.put(sequence_element(tags::CONTOUR_SEQUENCE, contour_items));
        });
    }

    fn write_seg(
        object: &mut InMemDicomObject,
        roi: &RoiObject,
        image_refs: Vec<InMemDicomObject>,
        segmentation: &Segmentation,
    ) {
        object.put(string_element(
            tags::FRAME_OF_REFERENCE_UID,
            VR::UI,
            &roi.frame_of_reference_uid,
        ));
        if !roi.referenced_study_uid.is_empty() {
            object.put(string_element(
                tags::STUDY_INSTANCE_UID,
                VR::UI,
                &roi.referenced_study_uid,
            ));
        }
        with_nested_item(object, &SEG_REFERENCED_SERIES, |item| {
            item.put(string_element(
                tags::SERIES_INSTANCE_UID,
                VR::UI,
                &roi.referenced_series_uid,
            ));
            item.put(sequence_element(tags::REFERENCED_INSTANCE_SEQUENCE, image_refs));
        });

        let groups = segmentation.frames.iter().map(frame_item).collect();
        object.put(sequence_element(
            tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE,
            groups,
        ));

        let masks: Vec<Array2<bool>> = segmentation.frames.iter().map(|f| f.mask.clone()).collect();
        object.put(string_element(
            tags::NUMBER_OF_FRAMES,
            VR::IS,
            &segmentation.frames.len().to_string(),
        ));
        object.put(DataElement::new(
            tags::ROWS,
            VR::US,
            PrimitiveValue::from(segmentation.rows as u16),
        ));
        object.put(DataElement::new(
            tags::COLUMNS,
            VR::US,
            PrimitiveValue::from(segmentation.columns as u16),
        ));
        for tag in [tags::BITS_ALLOCATED, tags::BITS_STORED] {
            object.put(DataElement::new(tag, VR::US, PrimitiveValue::from(1_u16)));
        }
        object.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(0_u16)));
        object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::U8(pack_bits(&masks).into()),
        ));
    }

    /// Write `roi` to `path` as Explicit VR Little Endian.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(roi: &RoiObject, path: impl AsRef<Path>) -> Result<PathBuf, RoiIoError> {
        let object = Self::to_dicom(roi);
        let sop_class_uid = SeriesLoader::get_string(&object, tags::SOP_CLASS_UID)
            .ok_or(RoiIoError::MissingAttribute("SOPClassUID"))?;
        let meta = FileMetaTableBuilder::new()
            .media_storage_sop_class_uid(sop_class_uid)
            .media_storage_sop_instance_uid(roi.sop_instance_uid.as_str())
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .build()
            .map_err(|e| RoiIoError::FileMeta(e.to_string()))?;

        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        object.with_exact_meta(meta).write_to_file(&path)?;
        Ok(path)
    }

    /// Save `roi` under a timestamped name derived from `source_path`.
    ///
    /// Labels and the file name get `"{prefix}_from_"` prepended when a
    /// prefix is given; creation date and time are stamped with `now`.
    pub fn export(
        roi: &RoiObject,
        source_path: &Path,
        name_prefix: Option<&str>,
        export_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, RoiIoError> {
        let mut stamped = roi.clone();
        Self::stamp(&mut stamped, name_prefix, now);

        let source_name = source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(RoiIoError::MissingAttribute("source file name"))?;
        let file_name = match name_prefix {
            Some(prefix) => format!("{}_{prefix}_from_{source_name}", now.format("%Y%m%d_%H%M%S")),
            None => format!("{}_{source_name}", now.format("%Y%m%d_%H%M%S")),
        };

        let path = Self::save(&stamped, export_dir.join(file_name))?;
        info!(path = %path.display(), "Exported ROI");
        Ok(path)
    }

    fn stamp(roi: &mut RoiObject, name_prefix: Option<&str>, now: DateTime<Utc>) {
        let date = now.format("%Y%m%d").to_string();
        let time = now.format("%H%M%S").to_string();
        let dataset = &mut roi.dataset;
        let prefixed = |object: &InMemDicomObject, tag: Tag| {
            let prefix = name_prefix?;
            let current = SeriesLoader::get_string(object, tag).unwrap_or_default();
            Some(format!("{prefix}_from_{current}"))
        };

        let (date_tag, time_tag, labels): (_, _, &[(Tag, VR)]) = match roi.annotations.modality() {
            RoiModality::Contour => (
                tags::STRUCTURE_SET_DATE,
                tags::STRUCTURE_SET_TIME,
                &[(tags::STRUCTURE_SET_LABEL, VR::SH)],
            ),
            RoiModality::Segmentation => (
                tags::CONTENT_DATE,
                tags::CONTENT_TIME,
                &[
                    (tags::CONTENT_LABEL, VR::CS),
                    (tags::CONTENT_DESCRIPTION, VR::LO),
                    (tags::SERIES_DESCRIPTION, VR::LO),
                ],
            ),
        };
        dataset.put(string_element(date_tag, VR::DA, &date));
        dataset.put(string_element(time_tag, VR::TM, &time));
        for &(tag, vr) in labels {
            if let Some(label) = prefixed(&*dataset, tag) {
                dataset.put(string_element(tag, vr, &label));
            }
        }

        if roi.annotations.modality() == RoiModality::Contour {
            with_nested_item(dataset, &[tags::STRUCTURE_SET_ROI_SEQUENCE], |item| {
                if let Some(name) = prefixed(&*item, tags::ROI_NAME) {
                    item.put(string_element(tags::ROI_NAME, VR::LO, &name));
                }
            });
        }
    }
}

fn nested_item<'a>(object: &'a InMemDicomObject, path: &[Tag]) -> Option<&'a InMemDicomObject> {
    path.iter()
        .try_fold(object, |item, &tag| item.element(tag).ok()?.items()?.first())
}

fn items(object: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.items())
        .unwrap_or_default()
}

/// Run `f` on the first item of the sequence at `path`, creating missing
/// sequences and items on the way.
fn with_nested_item<F>(object: &mut InMemDicomObject, path: &[Tag], f: F)
where
    F: FnOnce(&mut InMemDicomObject),
{
    let Some((&tag, rest)) = path.split_first() else {
        f(object);
        return;
    };
    let mut element = object
        .take_element(tag)
        .ok()
        .filter(|element| element.items().is_some())
        .unwrap_or_else(|| sequence_element(tag, Vec::new()));
    if let Some(items) = element.items_mut() {
        if items.is_empty() {
            items.push(InMemDicomObject::new_empty());
        }
        with_nested_item(&mut items[0], rest, f);
    }
    object.put(element);
}

fn sequence_element(tag: Tag, items: Vec<InMemDicomObject>) -> InMemElement {
    let mut element = DataElement::new(tag, VR::SQ, Value::Sequence(DataSetSequence::empty()));
    if let Some(sequence) = element.items_mut() {
        sequence.extend(items);
    }
    element
}

fn string_element(tag: Tag, vr: VR, value: &str) -> InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

/// Decimal String values are limited to 16 characters.
fn format_decimal(value: f64) -> String {
    let text = value.to_string();
    if text.len() <= 16 {
        return text;
    }
    (0..=14)
        .rev()
        .map(|precision| format!("{value:.precision$}"))
        .find(|text| text.len() <= 16)
        .unwrap_or_else(|| format!("{value:.6e}"))
}

fn decimal_element(tag: Tag, values: &[f64]) -> InMemElement {
    DataElement::new(
        tag,
        VR::DS,
        PrimitiveValue::Strs(values.iter().copied().map(format_decimal).collect()),
    )
}

fn required_string(
    object: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<String, RoiIoError> {
    SeriesLoader::get_string(object, tag).ok_or(RoiIoError::MissingAttribute(name))
}

fn required_int(
    object: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<usize, RoiIoError> {
    object
        .element(tag)
        .map_err(|_| RoiIoError::MissingAttribute(name))?
        .to_int::<usize>()
        .map_err(|e| RoiIoError::MalformedAttribute {
            name,
            reason: e.to_string(),
        })
}

fn read_image_reference(item: &InMemDicomObject) -> Result<ImageReference, RoiIoError> {
    Ok(ImageReference {
        sop_class_uid: SeriesLoader::get_string(item, tags::REFERENCED_SOP_CLASS_UID)
            .unwrap_or_default(),
        sop_instance_uid: required_string(
            item,
            tags::REFERENCED_SOP_INSTANCE_UID,
            "ReferencedSOPInstanceUID",
        )?,
    })
}

fn image_reference_item(image: &ImageReference) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        string_element(tags::REFERENCED_SOP_CLASS_UID, VR::UI, &image.sop_class_uid),
        string_element(
            tags::REFERENCED_SOP_INSTANCE_UID,
            VR::UI,
            &image.sop_instance_uid,
        ),
    ])
}

fn read_contour(item: &InMemDicomObject) -> Result<Contour, RoiIoError> {
    let image = items(item, tags::CONTOUR_IMAGE_SEQUENCE)
        .first()
        .ok_or(RoiIoError::MissingAttribute("ContourImageSequence"))
        .and_then(read_image_reference)?;
    let data = item
        .element(tags::CONTOUR_DATA)
        .ok()
        .map(|element| element.to_multi_float64())
        .transpose()
        .map_err(|e| RoiIoError::MalformedAttribute {
            name: "ContourData",
            reason: e.to_string(),
        })?
        .unwrap_or_default();
    if data.len() % 3 != 0 {
        return Err(RoiIoError::MalformedAttribute {
            name: "ContourData",
            reason: format!("{} values do not form point triples", data.len()),
        });
    }

    let mut attributes = item.clone();
    for tag in [
        tags::CONTOUR_IMAGE_SEQUENCE,
        tags::CONTOUR_GEOMETRIC_TYPE,
        tags::NUMBER_OF_CONTOUR_POINTS,
        tags::CONTOUR_NUMBER,
        tags::CONTOUR_DATA,
    ] {
        let _ = attributes.take_element(tag);
    }

    Ok(Contour {
        image,
        number: item
            .element(tags::CONTOUR_NUMBER)
            .ok()
            .and_then(|e| e.to_int::<u32>().ok())
            .unwrap_or(1),
        geometric_type: SeriesLoader::get_string(item, tags::CONTOUR_GEOMETRIC_TYPE)
            .unwrap_or_else(|| "CLOSED_PLANAR".to_string()),
        points: data.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect(),
        attributes,
    })
}

fn contour_item(contour: &Contour) -> InMemDicomObject {
    let mut item = contour.attributes.clone();
    item.put(sequence_element(
        tags::CONTOUR_IMAGE_SEQUENCE,
        vec![image_reference_item(&contour.image)],
    ));
    item.put(string_element(
        tags::CONTOUR_GEOMETRIC_TYPE,
        VR::CS,
        &contour.geometric_type,
    ));
    item.put(string_element(
        tags::NUMBER_OF_CONTOUR_POINTS,
        VR::IS,
        &contour.points.len().to_string(),
    ));
    item.put(string_element(
        tags::CONTOUR_NUMBER,
        VR::IS,
        &contour.number.to_string(),
    ));
    item.put(decimal_element(tags::CONTOUR_DATA, &contour.contour_data()));
    item
}

fn decode_masks(
    bytes: &[u8],
    bits_allocated: u16,
    number_of_frames: usize,
    rows: usize,
    columns: usize,
) -> Result<Vec<Array2<bool>>, RoiIoError> {
    let too_short = || RoiIoError::MalformedAttribute {
        name: "PixelData",
        reason: format!("too short for {number_of_frames} frames of {rows}x{columns}"),
    };
    match bits_allocated {
        1 => unpack_bits(bytes, number_of_frames, rows, columns).ok_or_else(too_short),
        8 => {
            let per_frame = rows * columns;
            if bytes.len() < per_frame * number_of_frames {
                return Err(too_short());
            }
            Ok(bytes
                .chunks_exact(per_frame)
                .take(number_of_frames)
                .map(|frame| {
                    Array2::from_shape_fn((rows, columns), |(r, c)| frame[r * columns + c] > 0)
                })
                .collect())
        }
        other => Err(RoiIoError::MalformedAttribute {
            name: "BitsAllocated",
            reason: format!("{other} bits per segmentation pixel are not supported"),
        }),
    }
}

fn read_frame(group: &InMemDicomObject, mask: Array2<bool>) -> Result<SegmentFrame, RoiIoError> {
    let source_image = nested_item(group, &SEG_SOURCE_IMAGE)
        .ok_or(RoiIoError::MissingAttribute("SourceImageSequence"))
        .and_then(read_image_reference)?;
    let frame_content = nested_item(group, &[tags::FRAME_CONTENT_SEQUENCE]);
    let image_position = nested_item(group, &[tags::PLANE_POSITION_SEQUENCE])
        .and_then(|item| item.element(tags::IMAGE_POSITION_PATIENT).ok())
        .and_then(|element| element.to_multi_float64().ok())
        .and_then(|values| <[f64; 3]>::try_from(values.get(..3)?).ok())
        .ok_or(RoiIoError::MissingAttribute("ImagePositionPatient"))?;

    Ok(SegmentFrame {
        source_image,
        image_position,
        in_stack_position: frame_content
            .and_then(|item| item.element(tags::IN_STACK_POSITION_NUMBER).ok())
            .and_then(|element| element.to_int::<u32>().ok())
            .unwrap_or(1),
        dimension_index: frame_content
            .and_then(|item| item.element(tags::DIMENSION_INDEX_VALUES).ok())
            .and_then(|element| element.to_multi_int::<u32>().ok())
            .unwrap_or_default(),
        mask,
        attributes: group.clone(),
    })
}

fn frame_item(frame: &SegmentFrame) -> InMemDicomObject {
    let mut item = frame.attributes.clone();
    with_nested_item(&mut item, &SEG_SOURCE_IMAGE, |source| {
        source.put(string_element(
            tags::REFERENCED_SOP_CLASS_UID,
            VR::UI,
            &frame.source_image.sop_class_uid,
        ));
        source.put(string_element(
            tags::REFERENCED_SOP_INSTANCE_UID,
            VR::UI,
            &frame.source_image.sop_instance_uid,
        ));
    });
    with_nested_item(&mut item, &[tags::FRAME_CONTENT_SEQUENCE], |content| {
        content.put(DataElement::new(
            tags::IN_STACK_POSITION_NUMBER,
            VR::UL,
            PrimitiveValue::from(frame.in_stack_position),
        ));
        content.put(DataElement::new(
            tags::DIMENSION_INDEX_VALUES,
            VR::UL,
            PrimitiveValue::U32(frame.dimension_index.iter().copied().collect()),
        ));
    });
    with_nested_item(&mut item, &[tags::PLANE_POSITION_SEQUENCE], |plane| {
        plane.put(decimal_element(
            tags::IMAGE_POSITION_PATIENT,
            &frame.image_position,
        ));
    });
    item
}
