//! Small host-side helpers: checked array copies and a reusable scratch
//! buffer.

use crate::error::LinalgCoreError;
use bytemuck::{Pod, Zeroable};

/// Copies a 1-D array into another, checking lengths.
pub fn copy_1d<T: Copy>(src: &[T], dst: &mut [T]) -> Result<(), LinalgCoreError> {
    if src.len() != dst.len() {
        return Err(LinalgCoreError::InvalidDimensions(format!(
            "source length ({}) does not match destination length ({})",
            src.len(),
            dst.len()
        )));
    }
    dst.copy_from_slice(src);
    Ok(())
}

/// Copies a 2-D block between strided arrays.
///
/// `rows` contiguous elements are copied per column, for `cols` columns;
/// `src_ld` and `dst_ld` are the distances between the first elements of two
/// consecutive columns (the leading dimensions). Row-major callers pass
/// their extents swapped.
pub fn copy_2d<T: Copy>(
    src: &[T],
    src_ld: usize,
    dst: &mut [T],
    dst_ld: usize,
    rows: usize,
    cols: usize,
) -> Result<(), LinalgCoreError> {
    if rows == 0 || cols == 0 {
        return Ok(());
    }
    if src_ld < rows || dst_ld < rows {
        return Err(LinalgCoreError::InvalidDimensions(format!(
            "leading dimensions ({}, {}) must be at least the column height ({})",
            src_ld, dst_ld, rows
        )));
    }
    let src_needed = (cols - 1) * src_ld + rows;
    let dst_needed = (cols - 1) * dst_ld + rows;
    if src.len() < src_needed || dst.len() < dst_needed {
        return Err(LinalgCoreError::InvalidDimensions(format!(
            "array lengths ({}, {}) too small for a {}x{} block with leading dimensions ({}, {})",
            src.len(),
            dst.len(),
            rows,
            cols,
            src_ld,
            dst_ld
        )));
    }
    for col in 0..cols {
        let src_start = col * src_ld;
        let dst_start = col * dst_ld;
        dst[dst_start..dst_start + rows].copy_from_slice(&src[src_start..src_start + rows]);
    }
    Ok(())
}

/// A reusable scratch buffer.
///
/// Capacity is retained across [`clear`](BufferHelper::clear) calls so
/// repeated numerical operations can reuse the same backing storage without
/// reallocating. Not synchronized; callers coordinate cross-thread access.
#[derive(Debug, Default)]
pub struct BufferHelper<T: Pod> {
    data: Vec<T>,
}

impl<T: Pod> BufferHelper<T> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Returns a zero-initialized slice of `len` elements, growing the
    /// backing storage as needed.
    pub fn request(&mut self, len: usize) -> &mut [T] {
        self.data.clear();
        self.data.resize(len, T::zeroed());
        &mut self.data[..]
    }

    /// Resets the logical length to zero without releasing capacity.
    ///
    /// Idempotent: clearing an already-empty buffer is a no-op.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Current logical length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Capacity currently reserved, in elements.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// The currently occupied portion of the buffer.
    pub fn contents(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the currently occupied portion of the buffer.
    pub fn contents_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_1d_checks_lengths() {
        let src = [1.0f64, 2.0, 3.0];
        let mut dst = [0.0f64; 3];
        copy_1d(&src, &mut dst).unwrap();
        assert_eq!(dst, src);

        let mut short = [0.0f64; 2];
        assert!(copy_1d(&src, &mut short).is_err());
    }

    #[test]
    fn test_copy_2d_strided_block() {
        // A 2x2 block out of a 3x3 column-major array into a tight 2x2 one.
        let src = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let mut dst = [0.0f64; 4];
        copy_2d(&src, 3, &mut dst, 2, 2, 2).unwrap();
        assert_eq!(dst, [1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_copy_2d_rejects_bad_leading_dimension() {
        let src = [1.0f64; 4];
        let mut dst = [0.0f64; 4];
        assert!(copy_2d(&src, 1, &mut dst, 2, 2, 2).is_err());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut helper: BufferHelper<f64> = BufferHelper::new();
        helper.request(8).copy_from_slice(&[1.0; 8]);
        let capacity = helper.capacity();

        helper.clear();
        assert!(helper.is_empty());
        assert_eq!(helper.capacity(), capacity);

        helper.clear();
        assert!(helper.is_empty());
        assert_eq!(helper.capacity(), capacity);
    }

    #[test]
    fn test_reuse_never_observes_stale_data() {
        let mut helper: BufferHelper<f64> = BufferHelper::new();
        helper.request(4).copy_from_slice(&[7.0; 4]);
        helper.clear();

        let fresh = helper.request(4);
        assert_eq!(fresh, &[0.0; 4]);
    }

    #[test]
    fn test_request_retains_capacity() {
        let mut helper: BufferHelper<f32> = BufferHelper::with_capacity(16);
        let capacity = helper.capacity();
        helper.request(8);
        helper.clear();
        helper.request(4);
        assert_eq!(helper.len(), 4);
        assert!(helper.capacity() >= capacity.min(16));
    }
}
