use crate::{
    enums::{GeometryCase, RoiModality},
    roi_io::RoiIoError,
    series_loader::SeriesLoaderError,
};
use thiserror::Error;

/// Errors raised while copying an ROI between slices or series.
///
/// All of them are detected before the new object is handed back, so a failed
/// request never leaves a partially rewritten ROI behind.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("ROI references SOP Instance UID {uid} which is not part of the series")]
    Correspondence { uid: String },

    #[error(
        "image reference sequence points at slices {image_refs:?} but annotation sequence \
         points at slices {annotations:?}"
    )]
    SequenceMismatch {
        image_refs: Vec<usize>,
        annotations: Vec<usize>,
    },

    #[error("{image_refs} image references do not pair with {annotations} annotations")]
    SequenceLength {
        image_refs: usize,
        annotations: usize,
    },

    #[error("slice {slice} has no annotation to copy")]
    SliceNotAnnotated { slice: usize },

    #[error("slice {slice} is out of range for a series of {len} slices")]
    SliceOutOfRange { slice: usize, len: usize },

    #[error("slice {slice} is already present in the index list")]
    DuplicateSliceIndex { slice: usize },

    #[error("cannot copy a {source_modality} ROI into a {target_modality} ROI")]
    ModalityMismatch {
        source_modality: RoiModality,
        target_modality: RoiModality,
    },

    #[error("copy strategy for case \"{case}\" is not available: {reason}")]
    GeometryCaseUnsupported {
        case: GeometryCase,
        reason: &'static str,
    },

    #[error("resampled annotation for target slice {slice} is empty")]
    EmptyResampledPayload { slice: usize },

    #[error("{frames} frames cannot be placed at {indices} slice positions")]
    FrameCount { frames: usize, indices: usize },

    #[error("frame has shape {found:?}, expected {expected:?}")]
    FrameShape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("series geometry is degenerate (direction cosines or spacing are singular)")]
    DegenerateGeometry,

    #[error("failed to build resampler thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("series loader error: {0}")]
    Series(#[from] SeriesLoaderError),

    #[error("ROI I/O error: {0}")]
    RoiIo(#[from] RoiIoError),
}
