mod common;

use common::{annotated_slices, axial, mask, rtstruct, seg, series, triangle};
use dicom_roi_copy::{
    AffineTransform, CopyError, CrossSeriesCopy, GeometryCase, GeometryClassifier, RoiCopier,
    TransformKind,
    config::CopyConfig,
    correspondence::build_correspondence,
    labelmap::{assemble_dense_volume, extract_sparse_frames},
    sequence::{extend_by_one, insert_slice_index_sorted},
};

#[test]
fn correspondence_matches_annotated_slices() {
    let series = axial("3.1", "3.9", 12, 2.0);
    for slices in [vec![0], vec![1, 4, 5, 11], vec![0, 2, 3, 7, 8]] {
        for roi in [rtstruct(&series, &slices), seg(&series, &slices)] {
            let correspondence = build_correspondence(&roi, &series).unwrap();
            assert_eq!(correspondence.image_ref_to_slice, slices);
            assert_eq!(correspondence.annotation_to_slice, slices);
        }
    }
}

#[test]
fn foreign_image_reference_is_reported() {
    let series = axial("3.1", "3.9", 6, 2.0);
    let other = axial("3.2", "3.9", 6, 2.0);
    let roi = rtstruct(&other, &[2]);
    assert!(matches!(
        build_correspondence(&roi, &series),
        Err(CopyError::Correspondence { uid }) if uid == "3.2.2"
    ));
}

#[test]
fn extension_appends_one_entry_to_both_sequences() {
    let series = axial("3.1", "3.9", 8, 2.0);
    for roi in [rtstruct(&series, &[1, 6]), seg(&series, &[1, 6])] {
        let extended = extend_by_one(&roi);
        assert_eq!(extended.image_refs.len(), roi.image_refs.len() + 1);
        assert_eq!(extended.annotations.len(), roi.annotations.len() + 1);
        assert_eq!(extended.image_refs[..2], roi.image_refs[..]);
        match (extended.contours(), roi.contours()) {
            (Some(after), Some(before)) => assert_eq!(after[..2], before[..]),
            _ => assert_eq!(
                extended.segmentation().unwrap().frames[..2],
                roi.segmentation().unwrap().frames[..]
            ),
        }
    }
}

#[test]
fn insertion_keeps_indices_sorted() {
    assert_eq!(insert_slice_index_sorted(&[2, 5, 9], 7).unwrap(), [2, 5, 7, 9]);
    assert_eq!(insert_slice_index_sorted(&[2, 5, 9], 0).unwrap(), [0, 2, 5, 9]);
    assert_eq!(insert_slice_index_sorted(&[], 3).unwrap(), [3]);
    assert!(matches!(
        insert_slice_index_sorted(&[2, 5, 9], 5),
        Err(CopyError::DuplicateSliceIndex { slice: 5 })
    ));
}

#[test]
fn copy_onto_itself_keeps_structure() {
    let series = axial("3.1", "3.9", 10, 2.0);
    let copier = RoiCopier::default();
    for roi in [rtstruct(&series, &[2, 4, 8]), seg(&series, &[2, 4, 8])] {
        let copied = copier.copy_within_series(&series, &roi, 4, 4).unwrap();
        assert_eq!(copied.len(), roi.len());
        assert_eq!(annotated_slices(&copied, &series), [2, 4, 8]);
        assert_eq!(copied.image_refs, roi.image_refs);
        match copied.contours() {
            Some(contours) => assert_eq!(contours[1].points, triangle(&series, 4)),
            None => assert_eq!(copied.segmentation().unwrap().frames[1].mask, mask(4)),
        }
        assert_ne!(copied.sop_instance_uid, roi.sop_instance_uid);
    }
}

#[test]
fn copy_to_empty_slice_preserves_other_entries() {
    let series = axial("3.1", "3.9", 12, 2.0);
    let copier = RoiCopier::default();

    let roi = rtstruct(&series, &[3, 5]);
    let copied = copier.copy_within_series(&series, &roi, 3, 10).unwrap();
    assert_eq!(annotated_slices(&copied, &series), [3, 5, 10]);
    let contours = copied.contours().unwrap();
    assert_eq!(contours[1].points, triangle(&series, 5));
    assert_eq!(contours[2].points, triangle(&series, 3));
    assert_eq!(contours[2].image.sop_instance_uid, "3.1.10");

    let roi = seg(&series, &[3, 5]);
    let copied = copier.copy_within_series(&series, &roi, 3, 10).unwrap();
    let frames = &copied.segmentation().unwrap().frames;
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[1].mask, mask(5));
    assert_eq!(frames[2].mask, mask(3));
    assert_eq!(frames[2].source_image.sop_instance_uid, "3.1.10");
    assert_eq!(frames[2].image_position, [0.0, 0.0, 20.0]);
}

#[test]
fn missing_source_slice_aborts_without_changes() {
    let series = axial("3.1", "3.9", 50, 1.0);
    let roi = rtstruct(&series, &[3, 5]);
    let snapshot = roi.clone();

    let result = RoiCopier::default().copy_within_series(&series, &roi, 42, 0);
    assert!(matches!(result, Err(CopyError::SliceNotAnnotated { slice: 42 })));
    assert_eq!(roi, snapshot);
}

#[test]
fn destination_outside_series_is_rejected() {
    let series = axial("3.1", "3.9", 6, 1.0);
    let roi = seg(&series, &[1]);
    assert!(matches!(
        RoiCopier::default().copy_within_series(&series, &roi, 1, 6),
        Err(CopyError::SliceOutOfRange { slice: 6, len: 6 })
    ));
}

#[test]
fn dense_volume_gives_back_sparse_frames() {
    let frames: Vec<_> = [0, 3, 4, 9].iter().map(|&k| mask(k)).collect();
    let indices = [0, 3, 4, 9];
    let dense = assemble_dense_volume(&frames, &indices, 10, (common::ROWS, common::COLUMNS))
        .unwrap();
    assert_eq!(dense.dim(), (10, common::ROWS, common::COLUMNS));
    assert!(!dense.index_axis(ndarray::Axis(0), 1).iter().any(|&v| v));
    assert_eq!(extract_sparse_frames(dense.view(), &indices).unwrap(), frames);
}

#[test]
fn classifier_is_deterministic_and_tolerant() {
    let classifier = GeometryClassifier::default();
    let source = axial("3.1", "3.9", 8, 2.0);
    let nearly = series("3.2", "3.9", 8, 2.0, [1.0, 4e-7, 0.0, 0.0, 1.0, -3e-7]);
    let thinner = series("3.3", "3.9", 8, 1.0, [1.0, 4e-7, 0.0, 0.0, 1.0, 0.0]);
    let elsewhere = axial("3.4", "4.0", 8, 2.0);

    for _ in 0..3 {
        assert_eq!(classifier.classify(&source, &source), GeometryCase::WithinSeries);
        assert_eq!(classifier.classify(&source, &nearly), GeometryCase::SameGeometry);
        assert_eq!(classifier.classify(&nearly, &source), GeometryCase::SameGeometry);
        assert_eq!(
            classifier.classify(&source, &thinner),
            GeometryCase::SameOrientationDifferentSpacing
        );
        assert_eq!(
            classifier.classify(&source, &elsewhere),
            GeometryCase::DifferentFrameOfReference
        );
    }
}

#[test]
fn segmentation_is_resampled_onto_finer_series() {
    let source_series = axial("3.1", "3.9", 4, 3.0);
    let target_series = axial("3.2", "3.9", 7, 2.0);
    let source = seg(&source_series, &[2]);
    let target = seg(&target_series, &[0, 5]);

    let request = CrossSeriesCopy::new(&source_series, &source, 2, &target_series)
        .with_target_roi(&target);
    let copied = RoiCopier::default().copy_across_series(&request).unwrap();

    // z = 6 in both series
    assert_eq!(annotated_slices(&copied, &target_series), [0, 3, 5]);
    let frames = &copied.segmentation().unwrap().frames;
    assert_eq!(frames[0].mask, mask(0));
    assert_eq!(frames[1].mask, mask(2));
    assert_eq!(frames[1].image_position, [0.0, 0.0, 6.0]);
    assert_eq!(frames[2].mask, mask(5));
    assert_eq!(copied.referenced_series_uid, "3.2");
    assert_ne!(copied.series_instance_uid, target.series_instance_uid);
}

#[test]
fn contour_is_resliced_onto_other_orientation() {
    let source_series = axial("3.1", "3.9", 5, 2.0);
    let coronal = series("3.2", "3.9", 6, 1.0, [1.0, 0.0, 0.0, 0.0, 0.0, -1.0]);
    let source = rtstruct(&source_series, &[3]);
    let copier = RoiCopier::default();
    assert_eq!(
        copier.classify(&source_series, &coronal),
        GeometryCase::SameFrameOfReferenceDifferentOrientation
    );

    let request = CrossSeriesCopy::new(&source_series, &source, 3, &coronal);
    let copied = copier.copy_across_series(&request).unwrap();

    assert_eq!(annotated_slices(&copied, &coronal), [1]);
    let points = &copied.contours().unwrap()[0].points;
    assert_eq!(points.len(), 3);
    assert!(points.iter().all(|p| (p[1] - 1.0).abs() < 1e-9));
    assert!((points[1][0] - 3.5).abs() < 1e-9);
    assert!(points.iter().all(|p| (p[2] - 6.0).abs() < 1e-9));
}

#[test]
fn modalities_must_match_across_series() {
    let source_series = axial("3.1", "3.9", 4, 2.0);
    let target_series = axial("3.2", "3.9", 4, 2.0);
    let source = rtstruct(&source_series, &[1]);
    let target = seg(&target_series, &[2]);
    let request =
        CrossSeriesCopy::new(&source_series, &source, 1, &target_series).with_target_roi(&target);
    assert!(matches!(
        RoiCopier::default().copy_across_series(&request),
        Err(CopyError::ModalityMismatch { .. })
    ));
}

#[test]
fn descending_structure_set_comes_out_ascending() {
    let series = axial("3.1", "3.9", 12, 2.0);
    let roi = rtstruct(&series, &[9, 5, 2]);
    let copied = RoiCopier::default().copy_within_series(&series, &roi, 2, 7).unwrap();

    assert_eq!(annotated_slices(&copied, &series), [2, 5, 7, 9]);
    let contours = copied.contours().unwrap();
    assert_eq!(contours[0].points, triangle(&series, 2));
    assert_eq!(contours[1].points, triangle(&series, 5));
    assert_eq!(contours[3].points, triangle(&series, 9));
    for (image, contour) in copied.image_refs.iter().zip(contours) {
        assert_eq!(image, &contour.image);
    }
}

#[test]
fn disagreeing_sequences_abort_the_copy() {
    let series = axial("3.1", "3.9", 8, 2.0);
    let mut roi = rtstruct(&series, &[2, 5]);
    roi.image_refs.reverse();

    assert!(matches!(
        RoiCopier::default().copy_within_series(&series, &roi, 2, 6),
        Err(CopyError::SequenceMismatch { .. })
    ));
}

#[test]
fn registered_segmentation_crosses_frames_of_reference() {
    let source_series = axial("3.1", "3.9", 6, 2.0);
    let target_series = axial("3.2", "4.0", 6, 2.0);
    let source = seg(&source_series, &[3]);
    let copier = RoiCopier::default();
    assert_eq!(
        copier.classify(&source_series, &target_series),
        GeometryCase::DifferentFrameOfReference
    );

    // target z = source z - 4
    let request = CrossSeriesCopy::new(&source_series, &source, 3, &target_series)
        .with_registration(AffineTransform::from_translation([0.0, 0.0, 4.0]));
    let copied = copier.copy_across_series(&request).unwrap();

    assert_eq!(annotated_slices(&copied, &target_series), [1]);
    let frame = &copied.segmentation().unwrap().frames[0];
    assert_eq!(frame.mask, mask(3));
    assert_eq!(frame.image_position, [0.0, 0.0, 2.0]);
    assert_eq!(copied.frame_of_reference_uid, "4.0");
}

#[test]
fn affine_transforms_require_a_registration() {
    let copier = RoiCopier::new(CopyConfig {
        transform: TransformKind::Affine,
        ..Default::default()
    })
    .unwrap();
    let source_series = axial("3.1", "3.9", 4, 3.0);
    let thinner = axial("3.2", "3.9", 7, 2.0);
    let source = seg(&source_series, &[2]);

    let request = CrossSeriesCopy::new(&source_series, &source, 2, &thinner);
    assert!(matches!(
        copier.copy_across_series(&request),
        Err(CopyError::GeometryCaseUnsupported {
            case: GeometryCase::SameOrientationDifferentSpacing,
            ..
        })
    ));

    let registered = request.with_registration(AffineTransform::identity());
    assert_eq!(
        annotated_slices(&copier.copy_across_series(&registered).unwrap(), &thinner),
        [3]
    );

    let twin = axial("3.3", "3.9", 4, 3.0);
    let request = CrossSeriesCopy::new(&source_series, &source, 2, &twin);
    assert_eq!(
        annotated_slices(&copier.copy_across_series(&request).unwrap(), &twin),
        [2]
    );
}
