use crate::{error::CopyError, roi::RoiObject};
use tracing::debug;

/// Copy of `roi` with the last entry of both sequences duplicated.
///
/// The new entries only provide structure; the rewriter overwrites their
/// references and payload. An ROI without entries gains a blank one.
pub fn extend_by_one(roi: &RoiObject) -> RoiObject {
    let mut extended = roi.clone();
    let last = extended.image_refs.last().cloned().unwrap_or_default();
    extended.image_refs.push(last);
    extended.annotations.push_copy_of_last();
    extended
}

/// Insert `slice` into `indices` and return the list in ascending order.
///
/// `indices` may come in any order; structure sets often list their contours
/// from the last slice to the first.
///
/// # Errors
///
/// `CopyError::DuplicateSliceIndex` when `slice` is already present; an
/// annotated destination is overwritten in place instead of being extended.
pub fn insert_slice_index_sorted(indices: &[usize], slice: usize) -> Result<Vec<usize>, CopyError> {
    if indices.contains(&slice) {
        return Err(CopyError::DuplicateSliceIndex { slice });
    }
    let mut sorted = Vec::with_capacity(indices.len() + 1);
    sorted.extend_from_slice(indices);
    sorted.push(slice);
    sorted.sort_unstable();
    Ok(sorted)
}

/// Copy of `roi` without the entries whose payload is empty.
///
/// # Errors
///
/// `CopyError::SequenceLength` when the two sequences are not of equal
/// length and can no longer be filtered in lock step.
pub fn compact(roi: &RoiObject) -> Result<RoiObject, CopyError> {
    if roi.image_refs.len() != roi.annotations.len() {
        return Err(CopyError::SequenceLength {
            image_refs: roi.image_refs.len(),
            annotations: roi.annotations.len(),
        });
    }
    let keep: Vec<bool> = (0..roi.annotations.len())
        .map(|i| !roi.annotations.is_entry_empty(i))
        .collect();

    let mut compacted = roi.clone();
    let mut flags = keep.iter();
    compacted
        .image_refs
        .retain(|_| flags.next().copied().unwrap_or(true));
    compacted.annotations.retain_by_index(&keep);

    debug!(
        removed = keep.iter().filter(|&&k| !k).count(),
        remaining = compacted.annotations.len(),
        "Compacted ROI sequences"
    );
    Ok(compacted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::Annotations;
    use crate::test_support::{axial_series, contour_roi, seg_roi};

    #[test]
    fn insertion_keeps_ascending_order() {
        assert_eq!(insert_slice_index_sorted(&[2, 5, 9], 7).unwrap(), vec![2, 5, 7, 9]);
        assert_eq!(insert_slice_index_sorted(&[2, 5, 9], 0).unwrap(), vec![0, 2, 5, 9]);
        assert_eq!(insert_slice_index_sorted(&[2, 5, 9], 12).unwrap(), vec![2, 5, 9, 12]);
        assert_eq!(insert_slice_index_sorted(&[], 3).unwrap(), vec![3]);
    }

    #[test]
    fn insertion_sorts_descending_input() {
        assert_eq!(insert_slice_index_sorted(&[9, 5, 2], 7).unwrap(), vec![2, 5, 7, 9]);
        assert!(matches!(
            insert_slice_index_sorted(&[9, 5, 2], 2),
            Err(CopyError::DuplicateSliceIndex { slice: 2 })
        ));
    }

    #[test]
    fn duplicate_index_is_rejected() {
        assert!(matches!(
            insert_slice_index_sorted(&[2, 5, 9], 5),
            Err(CopyError::DuplicateSliceIndex { slice: 5 })
        ));
    }

    #[test]
    fn extension_duplicates_last_entry_only() {
        let series = axial_series("1.1", "1.5", 10, 2.0);
        let roi = seg_roi(&series, &[1, 3, 8]);
        let extended = extend_by_one(&roi);

        assert_eq!(extended.image_refs.len(), 4);
        assert_eq!(extended.annotations.len(), 4);
        assert_eq!(extended.image_refs[..3], roi.image_refs[..]);
        assert_eq!(extended.image_refs[3], roi.image_refs[2]);
        let (Annotations::Segmentation(before), Annotations::Segmentation(after)) =
            (&roi.annotations, &extended.annotations)
        else {
            unreachable!()
        };
        assert_eq!(after.frames[..3], before.frames[..]);
        assert_eq!(after.frames[3], before.frames[2]);
    }

    #[test]
    fn compaction_removes_empty_entries_in_lock_step() {
        let series = axial_series("1.1", "1.5", 10, 2.0);
        let mut roi = contour_roi(&series, &[1, 3, 8]);
        if let Annotations::Contours(contours) = &mut roi.annotations {
            contours[1].points.clear();
        }
        let compacted = compact(&roi).unwrap();
        assert_eq!(
            compacted.image_refs,
            vec![roi.image_refs[0].clone(), roi.image_refs[2].clone()]
        );
        assert_eq!(compacted.annotations.len(), 2);
        assert_eq!(roi.annotations.len(), 3);
    }

    #[test]
    fn compaction_refuses_unpaired_sequences() {
        let series = axial_series("1.1", "1.5", 10, 2.0);
        let mut roi = contour_roi(&series, &[1, 3, 8]);
        roi.image_refs.pop();
        assert!(matches!(
            compact(&roi),
            Err(CopyError::SequenceLength { image_refs: 2, annotations: 3 })
        ));
    }
}
