use crate::{error::CopyError, series::DicomSeries, volume::Volume};
use ndarray::{Array2, Array3, ArrayView3, Axis, s};

/// Place sparse mask frames on the full slice axis.
///
/// Returns a zero-filled `(total_slices, rows, columns)` array with
/// `dense[frame_to_slice[i]] = frames[i]`.
///
/// # Errors
///
/// * `CopyError::FrameCount` if `frames` and `frame_to_slice` differ in length
/// * `CopyError::SliceOutOfRange` for an index outside `0..total_slices`
/// * `CopyError::FrameShape` for a frame that is not `(rows, columns)`
pub fn assemble_dense_volume(
    frames: &[Array2<bool>],
    frame_to_slice: &[usize],
    total_slices: usize,
    (rows, columns): (usize, usize),
) -> Result<Array3<bool>, CopyError> {
    if frames.len() != frame_to_slice.len() {
        return Err(CopyError::FrameCount {
            frames: frames.len(),
            indices: frame_to_slice.len(),
        });
    }

    let mut dense = Array3::from_elem((total_slices, rows, columns), false);
    for (frame, &slice) in frames.iter().zip(frame_to_slice) {
        if slice >= total_slices {
            return Err(CopyError::SliceOutOfRange {
                slice,
                len: total_slices,
            });
        }
        if frame.dim() != (rows, columns) {
            return Err(CopyError::FrameShape {
                expected: (rows, columns),
                found: frame.dim(),
            });
        }
        dense.slice_mut(s![slice, .., ..]).assign(frame);
    }
    Ok(dense)
}

/// Read back the frames at `frame_to_slice` from a dense stack.
///
/// # Errors
///
/// `CopyError::SliceOutOfRange` for an index past the last slice.
pub fn extract_sparse_frames(
    dense: ArrayView3<'_, bool>,
    frame_to_slice: &[usize],
) -> Result<Vec<Array2<bool>>, CopyError> {
    let total = dense.len_of(Axis(0));
    frame_to_slice
        .iter()
        .map(|&slice| {
            if slice < total {
                Ok(dense.index_axis(Axis(0), slice).to_owned())
            } else {
                Err(CopyError::SliceOutOfRange { slice, len: total })
            }
        })
        .collect()
}

/// Dense `u8` labelmap of a SEG frame stack on the voxel grid of `series`.
pub fn labelmap_volume(
    frames: &[Array2<bool>],
    frame_to_slice: &[usize],
    series: &DicomSeries,
) -> Result<Volume<u8>, CopyError> {
    let geometry = series.geometry();
    let (_, rows, columns) = geometry.array_shape();
    let dense = assemble_dense_volume(frames, frame_to_slice, series.len(), (rows, columns))?;
    Ok(Volume::new(dense.mapv(u8::from), geometry))
}

/// Pack frames into a SEG BINARY PixelData stream.
///
/// Pixels are taken frame by frame in row-major order, eight per byte with
/// the first pixel in the least significant bit. Frames are not byte
/// aligned, and the result is padded to an even length.
pub fn pack_bits(frames: &[Array2<bool>]) -> Vec<u8> {
    let total: usize = frames.iter().map(|f| f.len()).sum();
    let mut bytes = vec![0u8; total.div_ceil(8)];
    for (bit, value) in frames.iter().flat_map(|f| f.iter()).enumerate() {
        if *value {
            bytes[bit / 8] |= 1 << (bit % 8);
        }
    }
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
}

/// Inverse of [`pack_bits`]; `None` if `bytes` is too short for the frames.
pub fn unpack_bits(
    bytes: &[u8],
    number_of_frames: usize,
    rows: usize,
    columns: usize,
) -> Option<Vec<Array2<bool>>> {
    let per_frame = rows * columns;
    if bytes.len() * 8 < per_frame * number_of_frames {
        return None;
    }
    let frames = (0..number_of_frames)
        .map(|frame| {
            let offset = frame * per_frame;
            Array2::from_shape_fn((rows, columns), |(r, c)| {
                let bit = offset + r * columns + c;
                (bytes[bit / 8] >> (bit % 8)) & 1 == 1
            })
        })
        .collect();
    Some(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{COLUMNS, ROWS, axial_series, marker_mask};

    #[test]
    fn dense_sparse_round_trip() {
        let frames: Vec<_> = [0, 3, 4, 9].iter().map(|&k| marker_mask(k)).collect();
        let indices = [0, 3, 4, 9];
        let dense = assemble_dense_volume(&frames, &indices, 10, (ROWS, COLUMNS)).unwrap();

        assert_eq!(dense.dim(), (10, ROWS, COLUMNS));
        assert!(!dense.index_axis(Axis(0), 5).iter().any(|&v| v));
        assert_eq!(extract_sparse_frames(dense.view(), &indices).unwrap(), frames);
    }

    #[test]
    fn assembly_rejects_bad_input() {
        let frames = vec![marker_mask(1)];
        assert!(matches!(
            assemble_dense_volume(&frames, &[10], 10, (ROWS, COLUMNS)),
            Err(CopyError::SliceOutOfRange { slice: 10, len: 10 })
        ));
        assert!(matches!(
            assemble_dense_volume(&frames, &[1, 2], 10, (ROWS, COLUMNS)),
            Err(CopyError::FrameCount { frames: 1, indices: 2 })
        ));
        assert!(matches!(
            assemble_dense_volume(&frames, &[1], 10, (ROWS + 1, COLUMNS)),
            Err(CopyError::FrameShape { .. })
        ));
    }

    #[test]
    fn labelmap_takes_series_geometry() {
        let series = axial_series("1.1", "1.5", 6, 2.5);
        let labelmap = labelmap_volume(&[marker_mask(2)], &[2], &series).unwrap();
        assert_eq!(labelmap.dim(), (6, ROWS, COLUMNS));
        assert_eq!(labelmap.geometry.spacing, [1.0, 1.0, 2.5]);
        assert_eq!(labelmap.data.iter().map(|&v| v as usize).sum::<usize>(), 1);
    }

    #[test]
    fn bits_are_packed_lsb_first_and_padded() {
        let mut frame = Array2::from_elem((3, 3), false);
        frame[[0, 0]] = true;
        frame[[0, 2]] = true;
        frame[[2, 2]] = true;
        let bytes = pack_bits(&[frame.clone(), frame.clone()]);
        // 18 bits -> 3 bytes -> padded to 4
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes[0], 0b0000_0101);
        // pixel 8 of frame 0, then pixels 0 and 2 of frame 1 at bits 9 and 11
        assert_eq!(bytes[1], 0b0000_1011);
        assert_eq!(unpack_bits(&bytes, 2, 3, 3).unwrap(), vec![frame.clone(), frame]);
        assert!(unpack_bits(&bytes, 4, 3, 3).is_none());
    }
}
