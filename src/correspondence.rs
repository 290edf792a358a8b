use crate::{error::CopyError, roi::RoiObject, series::DicomSeries};
use tracing::debug;

/// Ordinal slice positions referenced by each entry of an ROI's two
/// parallel sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correspondence {
    /// Entry `i` is the slice referenced by Image-Reference Sequence entry `i`.
    pub image_ref_to_slice: Vec<usize>,
    /// Entry `i` is the slice referenced by Annotation Sequence entry `i`.
    pub annotation_to_slice: Vec<usize>,
}

impl Correspondence {
    pub fn is_consistent(&self) -> bool {
        verify_correspondence(&self.image_ref_to_slice, &self.annotation_to_slice)
    }

    /// The slice index list, or `SequenceMismatch` when the two sequences
    /// disagree.
    pub fn verified(self) -> Result<Vec<usize>, CopyError> {
        if self.is_consistent() {
            Ok(self.image_ref_to_slice)
        } else {
            Err(CopyError::SequenceMismatch {
                image_refs: self.image_ref_to_slice,
                annotations: self.annotation_to_slice,
            })
        }
    }

    /// Sequence position of the entry annotating `slice`.
    pub fn position_of(&self, slice: usize) -> Option<usize> {
        self.image_ref_to_slice.iter().position(|&s| s == slice)
    }
}

/// Resolve every referenced SOP Instance UID of `roi` against `series`.
///
/// # Errors
///
/// `CopyError::Correspondence` for the first UID that is not part of the
/// series.
pub fn build_correspondence(
    roi: &RoiObject,
    series: &DicomSeries,
) -> Result<Correspondence, CopyError> {
    let resolve = |uid: &str| {
        series
            .ordinal_of(uid)
            .ok_or_else(|| CopyError::Correspondence {
                uid: uid.to_string(),
            })
    };

    let image_ref_to_slice = roi
        .image_refs
        .iter()
        .map(|image| resolve(&image.sop_instance_uid))
        .collect::<Result<Vec<_>, _>>()?;
    let annotation_to_slice = roi
        .annotations
        .referenced_images()
        .into_iter()
        .map(|image| resolve(&image.sop_instance_uid))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        ?image_ref_to_slice,
        ?annotation_to_slice,
        series = series.series_instance_uid(),
        "Built slice correspondence"
    );

    Ok(Correspondence {
        image_ref_to_slice,
        annotation_to_slice,
    })
}

/// Whether both index lists reference the same slices in the same order.
pub fn verify_correspondence(image_ref_to_slice: &[usize], annotation_to_slice: &[usize]) -> bool {
    image_ref_to_slice == annotation_to_slice
}
