use crate::{
    enums::RoiModality,
    error::CopyError,
    roi::{Annotations, Contour, ImageReference, RoiObject, SegmentFrame},
    sequence::{extend_by_one, insert_slice_index_sorted},
    series::DicomSeries,
    uid::UidGenerator,
};
use tracing::debug;

/// The annotation written to the destination slice.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Contour(Contour),
    Frame(SegmentFrame),
}

impl Payload {
    /// Entry `position` of `annotations`.
    pub fn from_entry(annotations: &Annotations, position: usize) -> Option<Self> {
        match annotations {
            Annotations::Contours(contours) => contours.get(position).cloned().map(Self::Contour),
            Annotations::Segmentation(segmentation) => segmentation
                .frames
                .get(position)
                .cloned()
                .map(Self::Frame),
        }
    }

    pub fn modality(&self) -> RoiModality {
        match self {
            Self::Contour(_) => RoiModality::Contour,
            Self::Frame(_) => RoiModality::Segmentation,
        }
    }
}

/// One slice-to-slice copy, resolved against verified slice index lists.
///
/// `source_slices` and `target_slices` are the Image-Reference-to-slice lists
/// of `source` and `target` before any extension.
#[derive(Debug, Clone, Copy)]
pub struct SliceCopy<'a> {
    pub source: &'a RoiObject,
    pub source_slices: &'a [usize],
    pub from_slice: usize,
    pub target: &'a RoiObject,
    pub target_series: &'a DicomSeries,
    pub target_slices: &'a [usize],
    pub to_slice: usize,
}

impl SliceCopy<'_> {
    /// Sequence position of `from_slice` in the source ROI.
    pub fn source_position(&self) -> Result<usize, CopyError> {
        self.source_slices
            .iter()
            .position(|&s| s == self.from_slice)
            .ok_or(CopyError::SliceNotAnnotated {
                slice: self.from_slice,
            })
    }

    /// The source entry at `from_slice`.
    pub fn source_payload(&self) -> Result<Payload, CopyError> {
        let position = self.source_position()?;
        Payload::from_entry(&self.source.annotations, position).ok_or(
            CopyError::SliceNotAnnotated {
                slice: self.from_slice,
            },
        )
    }

    /// Build the rewritten copy of the target ROI.
    ///
    /// `payload` replaces the source entry, e.g. with a resampled frame;
    /// `None` copies the source entry as is. The returned object has fresh
    /// SOP Instance and Series Instance UIDs; neither input is modified.
    pub fn rewrite(
        &self,
        payload: Option<Payload>,
        uids: &dyn UidGenerator,
    ) -> Result<RoiObject, CopyError> {
        let payload = match payload {
            Some(payload) => {
                self.source_position()?;
                payload
            }
            None => self.source_payload()?,
        };
        if payload.modality() != self.target.modality() {
            return Err(CopyError::ModalityMismatch {
                source_modality: payload.modality(),
                target_modality: self.target.modality(),
            });
        }

        let len = self.target_series.len();
        if self.to_slice >= len {
            return Err(CopyError::SliceOutOfRange {
                slice: self.to_slice,
                len,
            });
        }

        let annotated = self.target_slices.contains(&self.to_slice);
        let (mut roi, slices) = if annotated {
            let mut sorted = self.target_slices.to_vec();
            sorted.sort_unstable();
            (self.target.clone(), sorted)
        } else {
            (
                extend_by_one(self.target),
                insert_slice_index_sorted(self.target_slices, self.to_slice)?,
            )
        };

        debug!(
            from_slice = self.from_slice,
            to_slice = self.to_slice,
            extended = !annotated,
            slices = ?slices,
            "Rewriting ROI"
        );

        let images = slices
            .iter()
            .map(|&slice| self.image_reference(slice))
            .collect::<Result<Vec<_>, _>>()?;

        match (&mut roi.annotations, payload) {
            (Annotations::Contours(contours), Payload::Contour(copied)) => {
                let previous = self.target.contours().unwrap_or_default();
                let mut rewritten = Vec::with_capacity(images.len());
                for (position, (image, &slice)) in images.iter().zip(&slices).enumerate() {
                    let mut entry = if slice == self.to_slice {
                        copied.clone()
                    } else {
                        self.target_entry(previous, slice)?.clone()
                    };
                    entry.image = image.clone();
                    entry.number = position as u32 + 1;
                    rewritten.push(entry);
                }
                *contours = rewritten;
            }
            (Annotations::Segmentation(segmentation), Payload::Frame(copied)) => {
                let shape = (segmentation.rows, segmentation.columns);
                if copied.mask.dim() != shape {
                    return Err(CopyError::FrameShape {
                        expected: shape,
                        found: copied.mask.dim(),
                    });
                }
                let previous = self
                    .target
                    .segmentation()
                    .map(|s| s.frames.as_slice())
                    .unwrap_or_default();
                let mut rewritten = Vec::with_capacity(images.len());
                for (position, (image, &slice)) in images.iter().zip(&slices).enumerate() {
                    let mut frame = if slice == self.to_slice {
                        copied.clone()
                    } else {
                        self.target_entry(previous, slice)?.clone()
                    };
                    let stack_position = position as u32 + 1;
                    frame.source_image = image.clone();
                    frame.in_stack_position = stack_position;
                    match frame.dimension_index.last_mut() {
                        Some(last) => *last = stack_position,
                        None => frame.dimension_index.push(stack_position),
                    }
                    if let Some(record) = self.target_series.slice(slice) {
                        frame.image_position = record.image_position;
                    }
                    rewritten.push(frame);
                }
                segmentation.frames = rewritten;
            }
            (_, payload) => {
                return Err(CopyError::ModalityMismatch {
                    source_modality: payload.modality(),
                    target_modality: self.target.modality(),
                });
            }
        }

        roi.image_refs = images;
        roi.frame_of_reference_uid = self.target_series.frame_of_reference_uid().to_string();
        roi.referenced_study_uid = self.target_series.study_instance_uid().to_string();
        roi.referenced_series_uid = self.target_series.series_instance_uid().to_string();
        roi.sop_instance_uid = uids.new_uid();
        roi.series_instance_uid = uids.new_uid();

        Ok(roi)
    }

    /// The entry of the unextended target annotating `slice`.
    fn target_entry<'e, E>(&self, entries: &'e [E], slice: usize) -> Result<&'e E, CopyError> {
        self.target_slices
            .iter()
            .position(|&s| s == slice)
            .and_then(|position| entries.get(position))
            .ok_or(CopyError::SliceNotAnnotated { slice })
    }

    fn image_reference(&self, slice: usize) -> Result<ImageReference, CopyError> {
        self.target_series
            .slice(slice)
            .map(|record| ImageReference::new(&record.sop_class_uid, &record.sop_instance_uid))
            .ok_or(CopyError::SliceOutOfRange {
                slice,
                len: self.target_series.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{axial_series, contour_roi, marker_mask, seg_roi};
    use crate::uid::DicomUidGenerator;

    #[test]
    fn contour_is_inserted_in_slice_order() {
        let series = axial_series("1.1", "1.5", 12, 2.0);
        let roi = contour_roi(&series, &[2, 5, 9]);
        let slices = [2, 5, 9];
        let copy = SliceCopy {
            source: &roi,
            source_slices: &slices,
            from_slice: 2,
            target: &roi,
            target_series: &series,
            target_slices: &slices,
            to_slice: 7,
        };
        let out = copy.rewrite(None, &DicomUidGenerator).unwrap();

        let uids: Vec<_> = out.image_refs.iter().map(|i| i.sop_instance_uid.as_str()).collect();
        assert_eq!(uids, ["1.1.2", "1.1.5", "1.1.7", "1.1.9"]);
        let contours = out.contours().unwrap();
        assert_eq!(contours[2].points, roi.contours().unwrap()[0].points);
        assert_eq!(contours[2].image.sop_instance_uid, "1.1.7");
        assert_eq!(contours[3].points, roi.contours().unwrap()[2].points);
        let numbers: Vec<_> = contours.iter().map(|c| c.number).collect();
        assert_eq!(numbers, [1, 2, 3, 4]);
        assert_ne!(out.sop_instance_uid, roi.sop_instance_uid);
        assert_ne!(out.series_instance_uid, roi.series_instance_uid);
    }

    #[test]
    fn descending_target_comes_out_ascending() {
        let series = axial_series("1.1", "1.5", 12, 2.0);
        let roi = contour_roi(&series, &[9, 5, 2]);
        let slices = [9, 5, 2];
        let mut copy = SliceCopy {
            source: &roi,
            source_slices: &slices,
            from_slice: 2,
            target: &roi,
            target_series: &series,
            target_slices: &slices,
            to_slice: 7,
        };
        let out = copy.rewrite(None, &DicomUidGenerator).unwrap();

        let uids: Vec<_> = out.image_refs.iter().map(|i| i.sop_instance_uid.as_str()).collect();
        assert_eq!(uids, ["1.1.2", "1.1.5", "1.1.7", "1.1.9"]);
        let before = roi.contours().unwrap();
        let contours = out.contours().unwrap();
        assert_eq!(contours[0].points, before[2].points);
        assert_eq!(contours[1].points, before[1].points);
        assert_eq!(contours[2].points, before[2].points);
        assert_eq!(contours[3].points, before[0].points);
        for (contour, image) in contours.iter().zip(&out.image_refs) {
            assert_eq!(&contour.image, image);
        }

        // overwriting an annotated slice also sorts
        copy.from_slice = 9;
        copy.to_slice = 5;
        let out = copy.rewrite(None, &DicomUidGenerator).unwrap();
        let uids: Vec<_> = out.image_refs.iter().map(|i| i.sop_instance_uid.as_str()).collect();
        assert_eq!(uids, ["1.1.2", "1.1.5", "1.1.9"]);
        assert_eq!(out.contours().unwrap()[1].points, before[0].points);
    }

    #[test]
    fn annotated_destination_is_overwritten_in_place() {
        let series = axial_series("1.1", "1.5", 12, 2.0);
        let roi = seg_roi(&series, &[2, 5, 9]);
        let slices = [2, 5, 9];
        let copy = SliceCopy {
            source: &roi,
            source_slices: &slices,
            from_slice: 9,
            target: &roi,
            target_series: &series,
            target_slices: &slices,
            to_slice: 2,
        };
        let out = copy.rewrite(None, &DicomUidGenerator).unwrap();
        let frames = &out.segmentation().unwrap().frames;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].mask, marker_mask(9));
        assert_eq!(frames[0].image_position, [0.0, 0.0, 4.0]);
        assert_eq!(frames[0].source_image.sop_instance_uid, "1.1.2");
        assert_eq!(frames[1].mask, marker_mask(5));
        let stack: Vec<_> = frames.iter().map(|f| f.in_stack_position).collect();
        assert_eq!(stack, [1, 2, 3]);
        assert_eq!(frames[2].dimension_index, [1, 1, 3]);
    }

    #[test]
    fn errors_leave_inputs_untouched() {
        let series = axial_series("1.1", "1.5", 12, 2.0);
        let roi = contour_roi(&series, &[2, 5]);
        let snapshot = roi.clone();
        let slices = [2, 5];
        let mut copy = SliceCopy {
            source: &roi,
            source_slices: &slices,
            from_slice: 3,
            target: &roi,
            target_series: &series,
            target_slices: &slices,
            to_slice: 4,
        };
        assert!(matches!(
            copy.rewrite(None, &DicomUidGenerator),
            Err(CopyError::SliceNotAnnotated { slice: 3 })
        ));
        copy.from_slice = 2;
        copy.to_slice = 12;
        assert!(matches!(
            copy.rewrite(None, &DicomUidGenerator),
            Err(CopyError::SliceOutOfRange { slice: 12, len: 12 })
        ));
        assert_eq!(roi, snapshot);
    }

    #[test]
    fn contour_cannot_be_written_into_segmentation() {
        let series = axial_series("1.1", "1.5", 6, 2.0);
        let source = contour_roi(&series, &[1]);
        let target = seg_roi(&series, &[3]);
        let copy = SliceCopy {
            source: &source,
            source_slices: &[1],
            from_slice: 1,
            target: &target,
            target_series: &series,
            target_slices: &[3],
            to_slice: 1,
        };
        assert!(matches!(
            copy.rewrite(None, &DicomUidGenerator),
            Err(CopyError::ModalityMismatch {
                source_modality: RoiModality::Contour,
                target_modality: RoiModality::Segmentation,
            })
        ));
    }
}
