use crate::{
    roi::{Annotations, Contour, ImageReference, RoiObject, SegmentFrame, Segmentation},
    series::{DicomSeries, SliceRecord},
};
use dicom::object::InMemDicomObject;
use ndarray::Array2;

pub(crate) const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
pub(crate) const ROWS: usize = 4;
pub(crate) const COLUMNS: usize = 4;

/// Axial stack of `n` slices, `spacing` mm apart, with UIDs `{series_uid}.{k}`.
pub(crate) fn axial_series(
    series_uid: &str,
    frame_of_reference: &str,
    n: usize,
    spacing: f64,
) -> DicomSeries {
    let slices = (0..n)
        .map(|k| SliceRecord {
            sop_instance_uid: format!("{series_uid}.{k}"),
            sop_class_uid: CT_IMAGE_STORAGE.to_string(),
            frame_of_reference_uid: frame_of_reference.to_string(),
            image_position: [0.0, 0.0, k as f64 * spacing],
            image_orientation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            pixel_spacing: [1.0, 1.0],
            slice_thickness: Some(spacing),
            rows: ROWS,
            columns: COLUMNS,
            instance_number: Some(k as i32 + 1),
        })
        .collect();
    DicomSeries::new(series_uid, "1.0", slices).unwrap()
}

pub(crate) fn image_of(series: &DicomSeries, k: usize) -> ImageReference {
    let slice = series.slice(k).unwrap();
    ImageReference::new(&slice.sop_class_uid, &slice.sop_instance_uid)
}

fn scaffold(
    series: &DicomSeries,
    image_refs: Vec<ImageReference>,
    annotations: Annotations,
) -> RoiObject {
    RoiObject {
        sop_instance_uid: "9.1".to_string(),
        series_instance_uid: "9.2".to_string(),
        frame_of_reference_uid: series.frame_of_reference_uid().to_string(),
        referenced_study_uid: series.study_instance_uid().to_string(),
        referenced_series_uid: series.series_instance_uid().to_string(),
        image_refs,
        annotations,
        dataset: InMemDicomObject::new_empty(),
    }
}

/// RTSTRUCT with one square contour on each of `slices`.
pub(crate) fn contour_roi(series: &DicomSeries, slices: &[usize]) -> RoiObject {
    let contours = slices
        .iter()
        .map(|&k| {
            let z = series.slice(k).unwrap().image_position[2];
            let size = 1.0 + k as f64;
            Contour::new(
                image_of(series, k),
                vec![[0.0, 0.0, z], [size, 0.0, z], [size, size, z], [0.0, size, z]],
            )
        })
        .collect();
    let image_refs = slices.iter().map(|&k| image_of(series, k)).collect();
    scaffold(series, image_refs, Annotations::Contours(contours))
}

/// A mask with a single foreground pixel whose position encodes `k`.
pub(crate) fn marker_mask(k: usize) -> Array2<bool> {
    let mut mask = Array2::from_elem((ROWS, COLUMNS), false);
    mask[[k % ROWS, (k / ROWS) % COLUMNS]] = true;
    mask
}

/// SEG with one marker frame on each of `slices`.
pub(crate) fn seg_roi(series: &DicomSeries, slices: &[usize]) -> RoiObject {
    let frames = slices
        .iter()
        .map(|&k| {
            SegmentFrame::new(
                image_of(series, k),
                series.slice(k).unwrap().image_position,
                marker_mask(k),
            )
        })
        .collect();
    let image_refs = slices.iter().map(|&k| image_of(series, k)).collect();
    scaffold(
        series,
        image_refs,
        Annotations::Segmentation(Segmentation {
            rows: ROWS,
            columns: COLUMNS,
            frames,
        }),
    )
}
