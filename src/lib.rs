//! # DICOM ROI copy library
//!
//! This crate copies regions of interest between slices of a DICOM series and
//! between series. Two ROI representations are supported:
//!  - RTSTRUCT: planar contours in patient coordinates
//!  - SEG: binary segmentation frames
//!
//! Series are loaded from a folder where each ".dcm" file is read from, in
//! parallel using rayon. An ROI is bound to its series by matching the
//! Referenced SOP Instance UIDs against the slices, which gives the
//! correspondence between sequence positions and ordinal slice indices.
//!
//! Copies never modify their inputs. Each copy returns a new ROI object with
//! fresh SOP Instance and Series Instance UIDs, whose sequences stay in
//! ascending slice order. How an annotation is carried to another series
//! depends on the geometry of the two series:
//!  - Same series or same geometry: entries are copied directly
//!  - Different spacing or orientation within a Frame of Reference: SEG frames
//!    are resampled with nearest neighbour, contours re-sliced
//!  - Different Frame of Reference: as above, through a caller supplied
//!    registration transform
//!
//! # Examples
//!
//! ## Copying a contour to another slice
//!
//! Copy the contour on slice 3 of an RTSTRUCT to slice 10 of the same series
//! and export it next to the source file.
//!
//! ```no_run
//! # use dicom_roi_copy::{RoiCopier, RoiLoader, RoiSaver, SeriesLoader, SortBy};
//! # use std::path::Path;
//! let series = SeriesLoader::load_from_directory("dicom", SortBy::ImagePositionPatient)
//!     .expect("should have loaded files from directory");
//! let roi = RoiLoader::load("rtstruct.dcm").expect("should have loaded the RTSTRUCT");
//! let copied = RoiCopier::default()
//!     .copy_within_series(&series, &roi, 3, 10)
//!     .expect("should have copied slice 3 to slice 10");
//! let source = Path::new("rtstruct.dcm");
//! RoiSaver::export(&copied, source, Some("copy"), Path::new("."), chrono::Utc::now())
//!     .expect("should have written the copy");
//! ```

pub mod config;
pub mod copy;
pub mod correspondence;
pub mod enums;
pub mod error;
pub mod geometry;
pub mod labelmap;
pub mod resample;
pub mod rewrite;
pub mod roi;
pub mod roi_io;
pub mod sequence;
pub mod series;
pub mod series_loader;
pub mod uid;
pub mod volume;

#[cfg(test)]
mod test_support;

pub use copy::{CrossSeriesCopy, RoiCopier};
pub use enums::{GeometryCase, Interpolation, RoiModality, SortBy, TransformKind};
pub use error::CopyError;
pub use geometry::{AffineTransform, GeometryClassifier};
pub use roi::RoiObject;
pub use roi_io::{RoiLoader, RoiSaver};
pub use series::DicomSeries;
pub use series_loader::SeriesLoader;
