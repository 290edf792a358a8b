use crate::{
    config::CopyConfig,
    correspondence::build_correspondence,
    enums::{GeometryCase, RoiModality, TransformKind},
    error::CopyError,
    geometry::{AffineTransform, GeometryClassifier},
    labelmap::labelmap_volume,
    resample::{Resampler, Sample, VoxelResampler},
    rewrite::{Payload, SliceCopy},
    roi::{Annotations, Contour, RoiObject, SegmentFrame, Segmentation},
    roi_io::RoiSaver,
    series::DicomSeries,
    uid::{DicomUidGenerator, UidGenerator},
    volume::Volume,
};
use nalgebra::Vector3;
use tracing::{debug, info, instrument};

/// A request to copy the annotation of one slice into another series.
#[derive(Debug, Clone, Copy)]
pub struct CrossSeriesCopy<'a> {
    pub source_series: &'a DicomSeries,
    pub source_roi: &'a RoiObject,
    pub from_slice: usize,
    pub target_series: &'a DicomSeries,
    /// Existing annotation of the target series to copy into; a new one is
    /// started when absent.
    pub target_roi: Option<&'a RoiObject>,
    /// Destination slice. Defaults to `from_slice` for direct copies and to
    /// the nearest target slice otherwise.
    pub to_slice: Option<usize>,
    /// Overrides the classified geometry case.
    pub geometry_case: Option<GeometryCase>,
    /// Maps target physical points into the source physical space.
    pub registration: Option<AffineTransform>,
}

impl<'a> CrossSeriesCopy<'a> {
    pub fn new(
        source_series: &'a DicomSeries,
        source_roi: &'a RoiObject,
        from_slice: usize,
        target_series: &'a DicomSeries,
    ) -> Self {
        Self {
            source_series,
            source_roi,
            from_slice,
            target_series,
            target_roi: None,
            to_slice: None,
            geometry_case: None,
            registration: None,
        }
    }

    pub fn with_target_roi(mut self, target_roi: &'a RoiObject) -> Self {
        self.target_roi = Some(target_roi);
        self
    }

    pub fn with_to_slice(mut self, to_slice: usize) -> Self {
        self.to_slice = Some(to_slice);
        self
    }

    pub fn with_geometry_case(mut self, case: GeometryCase) -> Self {
        self.geometry_case = Some(case);
        self
    }

    pub fn with_registration(mut self, registration: AffineTransform) -> Self {
        self.registration = Some(registration);
        self
    }
}

/// Copies ROI annotations between slices and series.
///
/// Every copy returns a new [`RoiObject`] with fresh identity; the inputs are
/// only read.
pub struct RoiCopier<R = VoxelResampler> {
    config: CopyConfig,
    classifier: GeometryClassifier,
    resampler: R,
    uids: Box<dyn UidGenerator>,
}

impl Default for RoiCopier<VoxelResampler> {
    fn default() -> Self {
        Self::with_parts(
            CopyConfig::default(),
            VoxelResampler::new(),
            Box::new(DicomUidGenerator),
        )
    }
}

impl RoiCopier<VoxelResampler> {
    /// # Errors
    ///
    /// Returns error if the resampler thread pool cannot be built
    pub fn new(config: CopyConfig) -> Result<Self, CopyError> {
        let resampler = match config.resampler_threads {
            Some(threads) => VoxelResampler::with_threads(threads)?,
            None => VoxelResampler::new(),
        };
        Ok(Self::with_parts(config, resampler, Box::new(DicomUidGenerator)))
    }
}

impl<R: Resampler> RoiCopier<R> {
    pub fn with_parts(config: CopyConfig, resampler: R, uids: Box<dyn UidGenerator>) -> Self {
        Self {
            classifier: GeometryClassifier::new(config.direction_epsilon),
            config,
            resampler,
            uids,
        }
    }

    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    /// How an annotation would be carried from `source` to `target`.
    pub fn classify(&self, source: &DicomSeries, target: &DicomSeries) -> GeometryCase {
        self.classifier.classify(source, target)
    }

    /// Resample an intensity volume onto the grid of `target` with the
    /// configured interpolation. Without a registration both grids are taken
    /// to share a patient coordinate system.
    pub fn resample_volume<T: Sample>(
        &self,
        image: &Volume<T>,
        target: &DicomSeries,
        registration: Option<AffineTransform>,
    ) -> Result<Volume<T>, CopyError> {
        self.resampler.resample(
            image,
            &target.geometry(),
            self.config.intensity_interpolation,
            &registration.unwrap_or_default(),
        )
    }

    /// Copy the annotation on `from_slice` to `to_slice` of the same series.
    ///
    /// An annotation already on `to_slice` is replaced; otherwise a new entry
    /// is inserted in slice order.
    ///
    /// # Errors
    ///
    /// Returns error if the ROI does not match the series, `from_slice` is not
    /// annotated or `to_slice` is outside the series
    #[instrument(skip_all, fields(from_slice = from_slice, to_slice = to_slice))]
    pub fn copy_within_series(
        &self,
        series: &DicomSeries,
        roi: &RoiObject,
        from_slice: usize,
        to_slice: usize,
    ) -> Result<RoiObject, CopyError> {
        let slices = build_correspondence(roi, series)?.verified()?;
        let copy = SliceCopy {
            source: roi,
            source_slices: &slices,
            from_slice,
            target: roi,
            target_series: series,
            target_slices: &slices,
            to_slice,
        };
        let copied = copy.rewrite(None, self.uids.as_ref())?;
        info!(entries = copied.len(), "Copied annotation within series");
        Ok(copied)
    }

    /// Copy the annotation on `request.from_slice` into the target series.
    ///
    /// # Errors
    ///
    /// Returns error if either ROI does not match its series, the modalities
    /// differ, the source slice is not annotated, the destination slice is
    /// outside the target series, a registration is missing where one is
    /// needed, or resampling leaves nothing to copy
    #[instrument(skip_all, fields(from_slice = request.from_slice))]
    pub fn copy_across_series(
        &self,
        request: &CrossSeriesCopy<'_>,
    ) -> Result<RoiObject, CopyError> {
        let source_slices =
            build_correspondence(request.source_roi, request.source_series)?.verified()?;

        let scaffold;
        let target = match request.target_roi {
            Some(target) => target,
            None => {
                scaffold = self.scaffold(request.source_roi, request.target_series);
                &scaffold
            }
        };
        if request.source_roi.modality() != target.modality() {
            return Err(CopyError::ModalityMismatch {
                source_modality: request.source_roi.modality(),
                target_modality: target.modality(),
            });
        }
        let target_slices = build_correspondence(target, request.target_series)?.verified()?;

        let case = request.geometry_case.unwrap_or_else(|| {
            self.classify(request.source_series, request.target_series)
        });
        info!(%case, "Copying annotation across series");

        let mut copy = SliceCopy {
            source: request.source_roi,
            source_slices: &source_slices,
            from_slice: request.from_slice,
            target,
            target_series: request.target_series,
            target_slices: &target_slices,
            to_slice: request.to_slice.unwrap_or(request.from_slice),
        };

        let payload = if case.is_direct() {
            None
        } else {
            let transform = self.registration_for(case, request.registration)?;
            let (payload, to_slice) = self.mapped_payload(&copy, request, &transform)?;
            copy.to_slice = to_slice;
            Some(payload)
        };

        copy.rewrite(payload, self.uids.as_ref())
    }

    fn registration_for(
        &self,
        case: GeometryCase,
        registration: Option<AffineTransform>,
    ) -> Result<AffineTransform, CopyError> {
        match (registration, case, self.config.transform) {
            (Some(registration), _, _) => Ok(registration),
            (None, GeometryCase::DifferentFrameOfReference, _) => {
                Err(CopyError::GeometryCaseUnsupported {
                    case,
                    reason: "a registration transform between the frames of reference is required",
                })
            }
            (None, _, TransformKind::Affine) => Err(CopyError::GeometryCaseUnsupported {
                case,
                reason: "affine transforms are configured but no registration was supplied",
            }),
            (None, _, TransformKind::Identity) => Ok(AffineTransform::identity()),
        }
    }

    /// Map the source entry into the target grid and pick the destination
    /// slice.
    fn mapped_payload(
        &self,
        copy: &SliceCopy<'_>,
        request: &CrossSeriesCopy<'_>,
        transform: &AffineTransform,
    ) -> Result<(Payload, usize), CopyError> {
        let to_target = transform.inverse().ok_or(CopyError::DegenerateGeometry)?;
        let target_geometry = request.target_series.geometry();
        let len = request.target_series.len();
        let checked = |slice: usize| {
            if slice < len {
                Ok(slice)
            } else {
                Err(CopyError::SliceOutOfRange { slice, len })
            }
        };

        match copy.source_payload()? {
            Payload::Frame(frame) => {
                let source_geometry = request.source_series.geometry();
                let to_slice = match request.to_slice {
                    Some(slice) => checked(slice)?,
                    None => {
                        let centre = source_geometry.slice_centre(copy.from_slice);
                        target_geometry
                            .nearest_slice(to_target.apply(centre))
                            .ok_or(CopyError::DegenerateGeometry)?
                    }
                };

                let labelmap = labelmap_volume(
                    std::slice::from_ref(&frame.mask),
                    &[copy.from_slice],
                    request.source_series,
                )?;
                let resampled =
                    self.resampler
                        .resample_labelmap(&labelmap, &target_geometry, transform)?;
                let mask = resampled
                    .slice(to_slice)
                    .ok_or(CopyError::SliceOutOfRange { slice: to_slice, len })?
                    .mapv(|label| label > 0);
                if !mask.iter().any(|&v| v) {
                    return Err(CopyError::EmptyResampledPayload { slice: to_slice });
                }

                debug!(to_slice, "Resampled source frame onto target grid");
                Ok((Payload::Frame(SegmentFrame { mask, ..frame }), to_slice))
            }
            Payload::Contour(contour) => {
                let mapped: Vec<_> = contour.points.iter().map(|&p| to_target.apply(p)).collect();
                if mapped.is_empty() {
                    return Err(CopyError::EmptyResampledPayload {
                        slice: request.to_slice.unwrap_or(copy.from_slice),
                    });
                }
                let to_slice = match request.to_slice {
                    Some(slice) => checked(slice)?,
                    None => target_geometry
                        .nearest_slice(centroid(&mapped))
                        .ok_or(CopyError::DegenerateGeometry)?,
                };

                let plane = request
                    .target_series
                    .slice(to_slice)
                    .ok_or(CopyError::SliceOutOfRange { slice: to_slice, len })?;
                let normal = plane.normal().normalize();
                let origin = Vector3::from(plane.image_position);
                let points = mapped
                    .into_iter()
                    .map(|p| {
                        let p = Vector3::from(p);
                        let q = p - normal * normal.dot(&(p - origin));
                        [q.x, q.y, q.z]
                    })
                    .collect();

                debug!(to_slice, "Projected source contour onto target slice");
                Ok((Payload::Contour(Contour { points, ..contour }), to_slice))
            }
        }
    }

    /// An ROI of the source's kind referencing `series`, without entries.
    fn scaffold(&self, source: &RoiObject, series: &DicomSeries) -> RoiObject {
        let annotations = match source.modality() {
            RoiModality::Contour => Annotations::Contours(Vec::new()),
            RoiModality::Segmentation => {
                let (_, rows, columns) = series.geometry().array_shape();
                Annotations::Segmentation(Segmentation {
                    rows,
                    columns,
                    frames: Vec::new(),
                })
            }
        };
        let mut scaffold = source.clone();
        scaffold.sop_instance_uid = self.uids.new_uid();
        scaffold.series_instance_uid = self.uids.new_uid();
        scaffold.frame_of_reference_uid = series.frame_of_reference_uid().to_string();
        scaffold.referenced_study_uid = series.study_instance_uid().to_string();
        scaffold.referenced_series_uid = series.series_instance_uid().to_string();
        scaffold.image_refs.clear();
        scaffold.annotations = annotations;
        if scaffold.modality() == RoiModality::Segmentation {
            RoiSaver::write_series_geometry(&mut scaffold.dataset, series);
        }
        scaffold
    }
}

fn centroid(points: &[[f64; 3]]) -> [f64; 3] {
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc: Vector3<f64>, p| acc + Vector3::from(*p));
    let c = sum / points.len() as f64;
    [c.x, c.y, c.z]
}
