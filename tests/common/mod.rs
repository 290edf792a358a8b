#![allow(dead_code)]

use dicom::object::InMemDicomObject;
use dicom_roi_copy::{
    DicomSeries, RoiObject,
    roi::{Annotations, Contour, ImageReference, SegmentFrame, Segmentation},
    series::SliceRecord,
};
use ndarray::Array2;

pub const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";
pub const ROWS: usize = 6;
pub const COLUMNS: usize = 5;

/// Stack of `n` slices along `normal`, `spacing` mm apart, with slice UIDs
/// `{series_uid}.{k}`.
pub fn series(
    series_uid: &str,
    frame_of_reference: &str,
    n: usize,
    spacing: f64,
    orientation: [f64; 6],
) -> DicomSeries {
    let row = [orientation[0], orientation[1], orientation[2]];
    let column = [orientation[3], orientation[4], orientation[5]];
    let normal = [
        row[1] * column[2] - row[2] * column[1],
        row[2] * column[0] - row[0] * column[2],
        row[0] * column[1] - row[1] * column[0],
    ];
    let slices = (0..n)
        .map(|k| SliceRecord {
            sop_instance_uid: format!("{series_uid}.{k}"),
            sop_class_uid: MR_IMAGE_STORAGE.to_string(),
            frame_of_reference_uid: frame_of_reference.to_string(),
            image_position: normal.map(|c| c * k as f64 * spacing),
            image_orientation: orientation,
            pixel_spacing: [1.0, 1.0],
            slice_thickness: Some(spacing),
            rows: ROWS,
            columns: COLUMNS,
            instance_number: Some(k as i32 + 1),
        })
        .collect();
    DicomSeries::new(series_uid, "7.7", slices).unwrap()
}

pub fn axial(series_uid: &str, frame_of_reference: &str, n: usize, spacing: f64) -> DicomSeries {
    series(
        series_uid,
        frame_of_reference,
        n,
        spacing,
        [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
    )
}

pub fn image(series: &DicomSeries, k: usize) -> ImageReference {
    let slice = series.slice(k).unwrap();
    ImageReference::new(&slice.sop_class_uid, &slice.sop_instance_uid)
}

fn roi(series: &DicomSeries, slices: &[usize], annotations: Annotations) -> RoiObject {
    RoiObject {
        sop_instance_uid: "2.25.1".to_string(),
        series_instance_uid: "2.25.2".to_string(),
        frame_of_reference_uid: series.frame_of_reference_uid().to_string(),
        referenced_study_uid: series.study_instance_uid().to_string(),
        referenced_series_uid: series.series_instance_uid().to_string(),
        image_refs: slices.iter().map(|&k| image(series, k)).collect(),
        annotations,
        dataset: InMemDicomObject::new_empty(),
    }
}

/// Triangle on slice `k` whose size depends on `k`.
pub fn triangle(series: &DicomSeries, k: usize) -> Vec<[f64; 3]> {
    let [x, y, z] = series.slice(k).unwrap().image_position;
    let size = 0.5 + k as f64;
    vec![[x, y, z], [x + size, y, z], [x, y + size, z]]
}

pub fn rtstruct(series: &DicomSeries, slices: &[usize]) -> RoiObject {
    let contours = slices
        .iter()
        .map(|&k| Contour::new(image(series, k), triangle(series, k)))
        .collect();
    roi(series, slices, Annotations::Contours(contours))
}

/// Rectangle mask covering rows `0..=k % ROWS` of the first column.
pub fn mask(k: usize) -> Array2<bool> {
    Array2::from_shape_fn((ROWS, COLUMNS), |(r, c)| c == 0 && r <= k % ROWS)
}

pub fn seg(series: &DicomSeries, slices: &[usize]) -> RoiObject {
    let frames = slices
        .iter()
        .map(|&k| {
            SegmentFrame::new(
                image(series, k),
                series.slice(k).unwrap().image_position,
                mask(k),
            )
        })
        .collect();
    roi(
        series,
        slices,
        Annotations::Segmentation(Segmentation {
            rows: ROWS,
            columns: COLUMNS,
            frames,
        }),
    )
}

pub fn annotated_slices(roi: &RoiObject, series: &DicomSeries) -> Vec<usize> {
    roi.image_refs
        .iter()
        .map(|image| series.ordinal_of(&image.sop_instance_uid).unwrap())
        .collect()
}
