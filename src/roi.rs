use crate::enums::RoiModality;
use dicom::object::InMemDicomObject;
use ndarray::Array2;

/// A reference to one image slice by SOP Class and SOP Instance UID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReference {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
}

impl ImageReference {
    pub fn new(sop_class_uid: impl Into<String>, sop_instance_uid: impl Into<String>) -> Self {
        Self {
            sop_class_uid: sop_class_uid.into(),
            sop_instance_uid: sop_instance_uid.into(),
        }
    }
}

/// One entry of an RTSTRUCT Contour Sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    /// The slice the contour is drawn on.
    pub image: ImageReference,
    pub number: u32,
    pub geometric_type: String,
    /// Points in the patient coordinate system.
    pub points: Vec<[f64; 3]>,
    /// Further attributes of the item, written back unchanged.
    pub attributes: InMemDicomObject,
}

impl Contour {
    pub fn new(image: ImageReference, points: Vec<[f64; 3]>) -> Self {
        Self {
            image,
            number: 1,
            geometric_type: "CLOSED_PLANAR".to_string(),
            points,
            attributes: InMemDicomObject::new_empty(),
        }
    }

    /// Flat `x, y, z, x, y, z, ...` list as stored in ContourData.
    pub fn contour_data(&self) -> Vec<f64> {
        self.points.iter().flatten().copied().collect()
    }
}

/// One frame of a SEG object together with its per-frame functional groups.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFrame {
    /// The slice the frame was derived from.
    pub source_image: ImageReference,
    pub image_position: [f64; 3],
    pub in_stack_position: u32,
    pub dimension_index: Vec<u32>,
    pub mask: Array2<bool>,
    /// Further attributes of the functional groups item, written back with
    /// the modelled values applied on top.
    pub attributes: InMemDicomObject,
}

impl SegmentFrame {
    pub fn new(source_image: ImageReference, image_position: [f64; 3], mask: Array2<bool>) -> Self {
        Self {
            source_image,
            image_position,
            in_stack_position: 1,
            dimension_index: vec![1, 1, 1],
            mask,
            attributes: InMemDicomObject::new_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub rows: usize,
    pub columns: usize,
    pub frames: Vec<SegmentFrame>,
}

/// The Annotation Sequence of an ROI object, parallel to its Image-Reference
/// Sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotations {
    Contours(Vec<Contour>),
    Segmentation(Segmentation),
}

impl Annotations {
    pub fn modality(&self) -> RoiModality {
        match self {
            Self::Contours(_) => RoiModality::Contour,
            Self::Segmentation(_) => RoiModality::Segmentation,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Contours(contours) => contours.len(),
            Self::Segmentation(segmentation) => segmentation.frames.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The image each entry overlays, in sequence order.
    pub fn referenced_images(&self) -> Vec<&ImageReference> {
        match self {
            Self::Contours(contours) => contours.iter().map(|c| &c.image).collect(),
            Self::Segmentation(segmentation) => segmentation
                .frames
                .iter()
                .map(|f| &f.source_image)
                .collect(),
        }
    }

    pub(crate) fn set_referenced_image(&mut self, index: usize, image: ImageReference) {
        match self {
            Self::Contours(contours) => contours[index].image = image,
            Self::Segmentation(segmentation) => segmentation.frames[index].source_image = image,
        }
    }

    /// Whether entry `index` carries no contour points or no foreground
    /// pixel.
    pub fn is_entry_empty(&self, index: usize) -> bool {
        match self {
            Self::Contours(contours) => contours[index].points.is_empty(),
            Self::Segmentation(segmentation) => !segmentation.frames[index].mask.iter().any(|&v| v),
        }
    }

    /// Duplicate the last entry, or append a blank one to an empty sequence.
    pub(crate) fn push_copy_of_last(&mut self) {
        match self {
            Self::Contours(contours) => {
                let entry = contours
                    .last()
                    .cloned()
                    .unwrap_or_else(|| Contour::new(ImageReference::default(), Vec::new()));
                contours.push(entry);
            }
            Self::Segmentation(segmentation) => {
                let entry = segmentation.frames.last().cloned().unwrap_or_else(|| {
                    SegmentFrame::new(
                        ImageReference::default(),
                        [0.0; 3],
                        Array2::from_elem((segmentation.rows, segmentation.columns), false),
                    )
                });
                segmentation.frames.push(entry);
            }
        }
    }

    pub(crate) fn retain_by_index(&mut self, keep: &[bool]) {
        let mut index = 0;
        let mut next = || {
            let kept = keep[index];
            index += 1;
            kept
        };
        match self {
            Self::Contours(contours) => contours.retain(|_| next()),
            Self::Segmentation(segmentation) => segmentation.frames.retain(|_| next()),
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Self::Contours(contours) => contours.clear(),
            Self::Segmentation(segmentation) => segmentation.frames.clear(),
        }
    }
}

/// An RTSTRUCT or SEG object reduced to the parts that tie it to a series.
///
/// `image_refs` is the Image-Reference Sequence (Contour Image Sequence or
/// Referenced Instance Sequence) and must stay parallel to `annotations`.
/// Attributes not modelled here live in `dataset` and are written back when
/// the object is saved.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiObject {
    pub sop_instance_uid: String,
    pub series_instance_uid: String,
    pub frame_of_reference_uid: String,
    pub referenced_study_uid: String,
    pub referenced_series_uid: String,
    pub image_refs: Vec<ImageReference>,
    pub annotations: Annotations,
    pub dataset: InMemDicomObject,
}

impl RoiObject {
    pub fn modality(&self) -> RoiModality {
        self.annotations.modality()
    }

    pub fn len(&self) -> usize {
        self.image_refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_refs.is_empty() && self.annotations.is_empty()
    }

    pub fn contours(&self) -> Option<&[Contour]> {
        match &self.annotations {
            Annotations::Contours(contours) => Some(contours),
            Annotations::Segmentation(_) => None,
        }
    }

    pub fn segmentation(&self) -> Option<&Segmentation> {
        match &self.annotations {
            Annotations::Contours(_) => None,
            Annotations::Segmentation(segmentation) => Some(segmentation),
        }
    }
}
