//! Sparse matrix handle in Compressed Sparse Row (CSR) format.
//!
//! A [`Sparse`] matrix owns its value and index storage, either in host
//! memory or on an accelerator device. Device-resident index buffers use
//! `u32` entries. `clone_from` deep-copies all backing buffers.

use crate::dense::Dense;
use crate::error::LinalgCoreError;
use crate::memory::{DeviceBuffer, ResourceManager};
use crate::scalar::Scalar;
use crate::stream::DeviceStream;
use crate::traits::Matrix;
use crate::types::{Location, Order};
use crate::utilities;

#[derive(Debug, Clone)]
enum SparseStorage<T: Scalar> {
    Host {
        /// Non-zero values of the matrix.
        values: Vec<T>,
        /// Column indices corresponding to the values.
        col_indices: Vec<usize>,
        /// Pointers to the start of each row in `values` and `col_indices`.
        /// The length of this vector is `rows + 1`; the last entry is the
        /// total number of non-zero elements (nnz).
        row_ptr: Vec<usize>,
    },
    Device {
        nnz: usize,
        values: DeviceBuffer<T>,
        col_indices: DeviceBuffer<u32>,
        row_ptr: DeviceBuffer<u32>,
    },
}

/// Sparse matrix in CSR format with host or device resident storage.
///
/// Invariant: index buffer lengths are consistent with the declared nnz and
/// `row_ptr` has `rows + 1` entries.
#[derive(Debug, Clone)]
pub struct Sparse<T: Scalar> {
    rows: usize,
    cols: usize,
    storage: SparseStorage<T>,
}

/// One non-zero entry as a (row, column, value) coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet<T: Scalar> {
    row: usize,
    col: usize,
    value: T,
}

impl<T: Scalar> Triplet<T> {
    pub fn new(row: usize, col: usize, value: T) -> Self {
        Triplet { row, col, value }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn value(&self) -> T {
        self.value
    }
}

impl<T: Scalar> Sparse<T> {
    /// Creates a new empty host matrix with the given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        Sparse {
            rows,
            cols,
            storage: SparseStorage::Host {
                values: Vec::new(),
                col_indices: Vec::new(),
                row_ptr: vec![0; rows + 1],
            },
        }
    }

    /// Builds a host matrix from (row, column, value) coordinates.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: Vec<Triplet<T>>,
    ) -> Result<Self, LinalgCoreError> {
        // Sort the triplets by row and then by column
        let mut coords = triplets;
        coords.sort_unstable_by_key(|t| (t.row, t.col));

        // Count non-zeros per row
        let mut row_ptr = vec![0usize; rows + 1];
        for t in &coords {
            if t.row >= rows {
                return Err(LinalgCoreError::InvalidDimensions(
                    "row index out of bounds".to_string(),
                ));
            }
            row_ptr[t.row + 1] += 1;
        }
        // Convert counts to cumulative row pointers
        for i in 1..=rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        let nnz = coords.len();
        let mut values = vec![T::default(); nnz];
        let mut col_indices = vec![0usize; nnz];
        // Temporary copy of row_ptr to keep track of positions while filling
        let mut next = row_ptr.clone();
        for t in &coords {
            if t.col >= cols {
                return Err(LinalgCoreError::InvalidDimensions(
                    "column index out of bounds".to_string(),
                ));
            }
            let pos = next[t.row];
            values[pos] = t.value;
            col_indices[pos] = t.col;
            next[t.row] += 1;
        }

        Ok(Sparse {
            rows,
            cols,
            storage: SparseStorage::Host {
                values,
                col_indices,
                row_ptr,
            },
        })
    }

    /// Creates a host matrix from CSR components.
    /// Performs basic validation.
    pub fn from_csr(
        rows: usize,
        cols: usize,
        values: Vec<T>,
        col_indices: Vec<usize>,
        row_ptr: Vec<usize>,
    ) -> Result<Self, LinalgCoreError> {
        // Basic validation
        if row_ptr.len() != rows + 1 {
            return Err(LinalgCoreError::InvalidDimensions(
                "row_ptr length must be rows + 1".to_string(),
            ));
        }
        if values.len() != col_indices.len() {
            return Err(LinalgCoreError::InvalidDimensions(
                "values and col_indices must have the same length".to_string(),
            ));
        }
        if let Some(&last_ptr) = row_ptr.last() {
            if last_ptr != values.len() {
                return Err(LinalgCoreError::InvalidDimensions(
                    "last element of row_ptr must equal the number of non-zero values".to_string(),
                ));
            }
        }
        if col_indices.iter().any(|&c| c >= cols) {
            return Err(LinalgCoreError::InvalidDimensions(
                "column index out of bounds".to_string(),
            ));
        }

        Ok(Sparse {
            rows,
            cols,
            storage: SparseStorage::Host {
                values,
                col_indices,
                row_ptr,
            },
        })
    }

    /// Builds a host matrix from the non-zero entries of a host-resident
    /// dense matrix.
    pub fn from_dense(dense: &Dense<T>) -> Result<Self, LinalgCoreError> {
        if !dense.location().is_host() {
            return Err(LinalgCoreError::UnsupportedOperation(
                "building a sparse matrix requires a host-resident dense source".to_string(),
            ));
        }
        let rows = dense.rows();
        let cols = dense.cols();
        let mut triplets = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                if let Some(value) = dense.get(row, col) {
                    if value != T::default() {
                        triplets.push(Triplet::new(row, col, value));
                    }
                }
            }
        }
        Self::from_triplets(rows, cols, triplets)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the dimensions of the matrix (rows, cols).
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Returns the number of non-zero elements.
    pub fn nnz(&self) -> usize {
        match &self.storage {
            SparseStorage::Host { values, .. } => values.len(),
            SparseStorage::Device { nnz, .. } => *nnz,
        }
    }

    /// The current location of the matrix.
    pub fn location(&self) -> Location {
        match &self.storage {
            SparseStorage::Host { .. } => Location::Host,
            SparseStorage::Device { values, .. } => Location::Device(values.device()),
        }
    }

    /// Gets the value at a specific row and column.
    /// This is inefficient for sparse matrices, primarily for testing and
    /// debugging; returns `None` for device-resident matrices.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.rows || col >= self.cols {
            return None; // Out of bounds
        }
        match &self.storage {
            SparseStorage::Host {
                values,
                col_indices,
                row_ptr,
            } => {
                let row_start = row_ptr[row];
                let row_end = row_ptr[row + 1];

                // Search within the specific row's non-zero elements
                for i in row_start..row_end {
                    if col_indices[i] == col {
                        return Some(values[i]);
                    }
                }

                // If not found among non-zeros, it's implicitly zero
                None
            }
            SparseStorage::Device { .. } => None,
        }
    }

    /// Non-zero values of a host-resident matrix.
    pub fn values(&self) -> Option<&[T]> {
        match &self.storage {
            SparseStorage::Host { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Column indices of a host-resident matrix.
    pub fn col_indices(&self) -> Option<&[usize]> {
        match &self.storage {
            SparseStorage::Host { col_indices, .. } => Some(col_indices),
            _ => None,
        }
    }

    /// Row pointers of a host-resident matrix.
    pub fn row_ptr(&self) -> Option<&[usize]> {
        match &self.storage {
            SparseStorage::Host { row_ptr, .. } => Some(row_ptr),
            _ => None,
        }
    }

    /// Iterates the non-zero entries of a host-resident matrix.
    ///
    /// Device-resident matrices yield no entries; read them back first.
    pub fn iter(&self) -> SparseIter<'_, T> {
        match &self.storage {
            SparseStorage::Host {
                values,
                col_indices,
                row_ptr,
            } => SparseIter {
                values,
                col_indices,
                row_ptr,
                row: 0,
                pos: 0,
            },
            SparseStorage::Device { .. } => {
                log::debug!("iterating a device-resident sparse matrix yields no entries");
                SparseIter {
                    values: &[],
                    col_indices: &[],
                    row_ptr: &[],
                    row: 0,
                    pos: 0,
                }
            }
        }
    }

    /// Deep, shape-preserving copy of `source` into this handle.
    ///
    /// All backing buffers are copied; destination storage is reused when
    /// its sizes and location match and reallocated otherwise.
    pub fn clone_from(&mut self, source: &Sparse<T>) -> Result<(), LinalgCoreError> {
        match &source.storage {
            SparseStorage::Host {
                values,
                col_indices,
                row_ptr,
            } => {
                let reuse = matches!(&self.storage, SparseStorage::Host {
                        values: v,
                        row_ptr: r,
                        ..
                    } if v.len() == values.len() && r.len() == row_ptr.len());
                if reuse {
                    if let SparseStorage::Host {
                        values: v,
                        col_indices: c,
                        row_ptr: r,
                    } = &mut self.storage
                    {
                        utilities::copy_1d(values, v)?;
                        utilities::copy_1d(col_indices, c)?;
                        utilities::copy_1d(row_ptr, r)?;
                    }
                    log::trace!(
                        "clone_from reused host storage for {} non-zero entries",
                        values.len()
                    );
                } else {
                    self.storage = SparseStorage::Host {
                        values: values.clone(),
                        col_indices: col_indices.clone(),
                        row_ptr: row_ptr.clone(),
                    };
                }
            }
            SparseStorage::Device {
                nnz,
                values,
                col_indices,
                row_ptr,
            } => {
                self.storage = SparseStorage::Device {
                    nnz: *nnz,
                    values: values.duplicate()?,
                    col_indices: col_indices.duplicate()?,
                    row_ptr: row_ptr.duplicate()?,
                };
            }
        }
        self.rows = source.rows;
        self.cols = source.cols;
        Ok(())
    }

    /// In-place (non-reallocating) copy of `source` into this handle.
    ///
    /// Fails with [`LinalgCoreError::ShapeMismatch`] if the destination's
    /// shape or non-zero count differs.
    pub fn copy_from(&mut self, source: &Sparse<T>) -> Result<(), LinalgCoreError> {
        if self.rows != source.rows || self.cols != source.cols || self.nnz() != source.nnz() {
            return Err(LinalgCoreError::ShapeMismatch(format!(
                "cannot copy a {}x{} matrix with {} non-zeros into a {}x{} destination \
                 with {} non-zeros in place",
                source.rows,
                source.cols,
                source.nnz(),
                self.rows,
                self.cols,
                self.nnz()
            )));
        }
        match (&mut self.storage, &source.storage) {
            (
                SparseStorage::Host {
                    values: dv,
                    col_indices: dc,
                    row_ptr: dr,
                },
                SparseStorage::Host {
                    values: sv,
                    col_indices: sc,
                    row_ptr: sr,
                },
            ) => {
                utilities::copy_1d(sv, dv)?;
                utilities::copy_1d(sc, dc)?;
                utilities::copy_1d(sr, dr)
            }
            (
                SparseStorage::Device {
                    values: dv,
                    col_indices: dc,
                    row_ptr: dr,
                    ..
                },
                SparseStorage::Device {
                    values: sv,
                    col_indices: sc,
                    row_ptr: sr,
                    ..
                },
            ) => {
                dv.copy_contents_from(sv)?;
                dc.copy_contents_from(sc)?;
                dr.copy_contents_from(sr)
            }
            _ => Err(LinalgCoreError::UnsupportedOperation(
                "in-place copy requires source and destination in the same location".to_string(),
            )),
        }
    }

    /// Moves the matrix to the stream's device, returning a device-resident
    /// handle with `u32` index buffers.
    pub fn to_device(
        &self,
        manager: &ResourceManager,
        stream: &DeviceStream,
    ) -> Result<Sparse<T>, LinalgCoreError> {
        match &self.storage {
            SparseStorage::Host {
                values,
                col_indices,
                row_ptr,
            } => {
                if values.is_empty() {
                    return Err(LinalgCoreError::UnsupportedOperation(
                        "cannot move a sparse matrix with no non-zero entries to the device"
                            .to_string(),
                    ));
                }
                // Convert indices to u32 for device compatibility
                let col_indices_u32: Vec<u32> = col_indices.iter().map(|&x| x as u32).collect();
                let row_ptr_u32: Vec<u32> = row_ptr.iter().map(|&x| x as u32).collect();

                let values_buffer = manager.upload(stream, values)?;
                let col_indices_buffer = manager.upload(stream, &col_indices_u32)?;
                let row_ptr_buffer = manager.upload(stream, &row_ptr_u32)?;

                Ok(Sparse {
                    rows: self.rows,
                    cols: self.cols,
                    storage: SparseStorage::Device {
                        nnz: values.len(),
                        values: values_buffer,
                        col_indices: col_indices_buffer,
                        row_ptr: row_ptr_buffer,
                    },
                })
            }
            SparseStorage::Device { .. } => {
                log::debug!("matrix is already device-resident");
                Ok(self.clone())
            }
        }
    }

    /// Reads the matrix back to host memory.
    pub fn to_host(
        &self,
        manager: &ResourceManager,
        stream: &DeviceStream,
    ) -> Result<Sparse<T>, LinalgCoreError> {
        match &self.storage {
            SparseStorage::Device {
                values,
                col_indices,
                row_ptr,
                ..
            } => {
                let values = manager.download(stream, values)?;
                let col_indices_u32 = manager.download(stream, col_indices)?;
                let row_ptr_u32 = manager.download(stream, row_ptr)?;
                Ok(Sparse {
                    rows: self.rows,
                    cols: self.cols,
                    storage: SparseStorage::Host {
                        values,
                        col_indices: col_indices_u32.iter().map(|&x| x as usize).collect(),
                        row_ptr: row_ptr_u32.iter().map(|&x| x as usize).collect(),
                    },
                })
            }
            SparseStorage::Host { .. } => Ok(self.clone()),
        }
    }

    /// Adds a sub-block of this matrix to a host-resident dense matrix.
    ///
    /// Row/column bounds are half-open. An empty destination is reallocated
    /// to the block shape and zero-filled; a non-empty one must match it.
    /// Values are accumulated into the destination.
    pub fn add_block_to_dense(
        &self,
        dst: &mut Dense<T>,
        first_row: usize,
        last_row: usize,
        first_col: usize,
        last_col: usize,
    ) -> Result<(), LinalgCoreError> {
        if dst.is_transposed() {
            return Err(LinalgCoreError::UnsupportedOperation(
                "assignment to transposed dense matrices is not supported".to_string(),
            ));
        }
        if first_row > last_row || last_row > self.rows {
            return Err(LinalgCoreError::InvalidDimensions(
                "requested row range is not contained in the source matrix".to_string(),
            ));
        }
        if first_col > last_col || last_col > self.cols {
            return Err(LinalgCoreError::InvalidDimensions(
                "requested column range is not contained in the source matrix".to_string(),
            ));
        }

        let (values, col_indices, row_ptr) = match &self.storage {
            SparseStorage::Host {
                values,
                col_indices,
                row_ptr,
            } => (values, col_indices, row_ptr),
            SparseStorage::Device { .. } => {
                return Err(LinalgCoreError::UnsupportedOperation(
                    "block accumulation requires a host-resident sparse matrix".to_string(),
                ))
            }
        };

        let block_rows = last_row - first_row;
        let block_cols = last_col - first_col;
        if dst.is_empty() {
            dst.reallocate(block_rows, block_cols)?;
        } else if dst.rows() != block_rows || dst.cols() != block_cols {
            return Err(LinalgCoreError::InvalidDimensions(
                "matrix dimension mismatch".to_string(),
            ));
        }

        let dst_ld = dst.leading_dimension();
        let dst_order = dst.order();
        let dst_data = dst.host_values_mut().ok_or_else(|| {
            LinalgCoreError::UnsupportedOperation(
                "block accumulation requires a host-resident dense destination".to_string(),
            )
        })?;

        for row_in in first_row..last_row {
            for index in row_ptr[row_in]..row_ptr[row_in + 1] {
                let col_in = col_indices[index];
                if col_in < first_col {
                    continue;
                } else if col_in < last_col {
                    let row_out = row_in - first_row;
                    let col_out = col_in - first_col;
                    let array_pos = match dst_order {
                        Order::ColMajor => col_out * dst_ld + row_out,
                        Order::RowMajor => row_out * dst_ld + col_out,
                    };
                    dst_data[array_pos] = dst_data[array_pos] + values[index];
                } else {
                    // Column indices within a row are sorted.
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Iterator over the non-zero entries of a host-resident [`Sparse`] matrix.
pub struct SparseIter<'a, T: Scalar> {
    values: &'a [T],
    col_indices: &'a [usize],
    row_ptr: &'a [usize],
    row: usize,
    pos: usize,
}

impl<'a, T: Scalar> Iterator for SparseIter<'a, T> {
    type Item = Triplet<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.row + 1 < self.row_ptr.len() {
            if self.pos < self.row_ptr[self.row + 1] {
                let index = self.pos;
                self.pos += 1;
                return Some(Triplet {
                    row: self.row,
                    col: self.col_indices[index],
                    value: self.values[index],
                });
            }
            self.row += 1;
        }
        None
    }
}

impl<T: Scalar> Matrix for Sparse<T> {
    type Value = T;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HostRuntime;
    use std::sync::Arc;

    fn host_setup() -> (Arc<HostRuntime>, ResourceManager) {
        let runtime = Arc::new(HostRuntime::new());
        let rt: Arc<dyn crate::runtime::AcceleratorRuntime> = runtime.clone();
        let manager = ResourceManager::with_runtime(rt);
        (runtime, manager)
    }

    #[test]
    fn test_sparse_new() {
        let matrix: Sparse<f64> = Sparse::new(3, 4);
        assert_eq!(matrix.dims(), (3, 4));
        assert_eq!(matrix.nnz(), 0);
        assert_eq!(matrix.row_ptr().unwrap(), &[0, 0, 0, 0]); // rows + 1 entries
        assert!(matrix.values().unwrap().is_empty());
        assert!(matrix.col_indices().unwrap().is_empty());
    }

    #[test]
    fn test_sparse_from_csr_valid() {
        let rows = 3;
        let cols = 4;
        let values = vec![1.0f64, 2.0, 3.0, 4.0, 5.0];
        let col_indices = vec![0, 2, 1, 3, 2];
        let row_ptr = vec![0, 2, 4, 5]; // nnz per row: 2, 2, 1

        let matrix = Sparse::from_csr(
            rows,
            cols,
            values.clone(),
            col_indices.clone(),
            row_ptr.clone(),
        );

        assert!(matrix.is_ok());
        let matrix = matrix.unwrap();

        assert_eq!(matrix.dims(), (rows, cols));
        assert_eq!(matrix.nnz(), 5);
        assert_eq!(matrix.values().unwrap(), &values[..]);
        assert_eq!(matrix.col_indices().unwrap(), &col_indices[..]);
        assert_eq!(matrix.row_ptr().unwrap(), &row_ptr[..]);
    }

    #[test]
    fn test_sparse_from_csr_invalid_row_ptr_len() {
        let matrix = Sparse::from_csr(3, 4, vec![1.0f64], vec![0], vec![0, 1]); // row_ptr too short
        assert!(matrix.is_err());
        match matrix.err().unwrap() {
            LinalgCoreError::InvalidDimensions(msg) => assert!(msg.contains("row_ptr length")),
            _ => panic!("expected InvalidDimensions error"),
        }
    }

    #[test]
    fn test_sparse_from_csr_invalid_last_row_ptr() {
        let matrix = Sparse::from_csr(3, 4, vec![1.0f64, 2.0], vec![0, 1], vec![0, 1, 1, 1]); // last ptr != nnz
        assert!(matrix.is_err());
        match matrix.err().unwrap() {
            LinalgCoreError::InvalidDimensions(msg) => {
                assert!(msg.contains("last element of row_ptr"))
            }
            _ => panic!("expected InvalidDimensions error"),
        }
    }

    #[test]
    fn test_sparse_from_csr_invalid_col_index() {
        let matrix = Sparse::from_csr(2, 3, vec![1.0f64, 2.0], vec![0, 3], vec![0, 1, 2]); // col index 3 >= cols 3
        assert!(matrix.is_err());
        match matrix.err().unwrap() {
            LinalgCoreError::InvalidDimensions(msg) => {
                assert!(msg.contains("column index out of bounds"))
            }
            _ => panic!("expected InvalidDimensions error"),
        }
    }

    #[test]
    fn test_sparse_from_csr_mismatch_values_indices() {
        let matrix = Sparse::from_csr(2, 3, vec![1.0f64, 2.0], vec![0], vec![0, 1, 1]); // values len != indices len
        assert!(matrix.is_err());
        match matrix.err().unwrap() {
            LinalgCoreError::InvalidDimensions(msg) => {
                assert!(msg.contains("values and col_indices"))
            }
            _ => panic!("expected InvalidDimensions error"),
        }
    }

    #[test]
    fn test_sparse_get() {
        // Example matrix:
        // [ 1.0, 0.0, 2.0, 0.0 ]
        // [ 0.0, 3.0, 0.0, 4.0 ]
        // [ 0.0, 0.0, 5.0, 0.0 ]
        let rows = 3;
        let cols = 4;
        let values = vec![1.0f64, 2.0, 3.0, 4.0, 5.0];
        let col_indices = vec![0, 2, 1, 3, 2];
        let row_ptr = vec![0, 2, 4, 5];
        let matrix = Sparse::from_csr(rows, cols, values, col_indices, row_ptr).unwrap();

        // Existing values
        assert_eq!(matrix.get(0, 0), Some(1.0));
        assert_eq!(matrix.get(0, 2), Some(2.0));
        assert_eq!(matrix.get(1, 1), Some(3.0));
        assert_eq!(matrix.get(1, 3), Some(4.0));
        assert_eq!(matrix.get(2, 2), Some(5.0));

        // Implicit zeros
        assert_eq!(matrix.get(0, 1), None);
        assert_eq!(matrix.get(1, 0), None);
        assert_eq!(matrix.get(2, 3), None);

        // Out of bounds
        assert_eq!(matrix.get(3, 0), None);
        assert_eq!(matrix.get(0, 4), None);
    }

    #[test]
    fn test_sparse_from_triplets_sorts_and_fills() {
        let triplets = vec![
            Triplet::new(1, 1, 3.0f64),
            Triplet::new(0, 0, 1.0),
            Triplet::new(0, 2, 2.0),
        ];
        let matrix = Sparse::from_triplets(2, 3, triplets).unwrap();
        assert_eq!(matrix.nnz(), 3);
        assert_eq!(matrix.get(0, 0), Some(1.0));
        assert_eq!(matrix.get(0, 2), Some(2.0));
        assert_eq!(matrix.get(1, 1), Some(3.0));

        let bad = Sparse::from_triplets(2, 3, vec![Triplet::new(2, 0, 1.0f64)]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_sparse_from_dense() {
        let dense = Dense::from_vec(vec![1.0f64, 0.0, 0.0, 2.0], 2, 2).unwrap();
        let sparse = Sparse::from_dense(&dense).unwrap();
        assert_eq!(sparse.nnz(), 2);
        assert_eq!(sparse.get(0, 0), Some(1.0));
        assert_eq!(sparse.get(1, 1), Some(2.0));
        assert_eq!(sparse.get(0, 1), None);
    }

    #[test]
    fn test_sparse_iter_yields_triplets() {
        let matrix = Sparse::from_csr(
            2,
            3,
            vec![1.0f64, 2.0, 3.0],
            vec![0, 2, 1],
            vec![0, 2, 3],
        )
        .unwrap();
        let triplets: Vec<_> = matrix.iter().collect();
        assert_eq!(
            triplets,
            vec![
                Triplet::new(0, 0, 1.0),
                Triplet::new(0, 2, 2.0),
                Triplet::new(1, 1, 3.0),
            ]
        );
    }

    #[test]
    fn test_clone_from_is_deep() {
        let source = Sparse::from_csr(
            2,
            2,
            vec![1.0f64, 2.0],
            vec![0, 1],
            vec![0, 1, 2],
        )
        .unwrap();

        // Resizing case: empty destination.
        let mut dest = Sparse::new(0, 0);
        dest.clone_from(&source).unwrap();
        assert_eq!(dest.dims(), (2, 2));
        assert_eq!(dest.nnz(), 2);

        // Non-resizing case: matching storage is reused, and mutating the
        // source afterwards does not change the destination.
        let mut source = source;
        let mut second = Sparse::from_csr(
            2,
            2,
            vec![9.0f64, 9.0],
            vec![0, 1],
            vec![0, 1, 2],
        )
        .unwrap();
        second.clone_from(&source).unwrap();

        source.copy_from(
            &Sparse::from_csr(2, 2, vec![7.0f64, 7.0], vec![0, 1], vec![0, 1, 2]).unwrap(),
        )
        .unwrap();
        assert_eq!(second.get(0, 0), Some(1.0));
        assert_eq!(second.get(1, 1), Some(2.0));
    }

    #[test]
    fn test_copy_from_requires_matching_shape() {
        let source =
            Sparse::from_csr(2, 2, vec![1.0f64], vec![0], vec![0, 1, 1]).unwrap();
        let mut wrong = Sparse::new(2, 2);
        match wrong.copy_from(&source) {
            Err(LinalgCoreError::ShapeMismatch(_)) => {}
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_add_block_to_dense() {
        // [ 1.0, 0.0, 2.0 ]
        // [ 0.0, 3.0, 0.0 ]
        let matrix = Sparse::from_csr(
            2,
            3,
            vec![1.0f64, 2.0, 3.0],
            vec![0, 2, 1],
            vec![0, 2, 3],
        )
        .unwrap();

        let mut dense = Dense::new();
        matrix.add_block_to_dense(&mut dense, 0, 2, 0, 3).unwrap();
        assert_eq!(dense.dims(), (2, 3));
        assert_eq!(dense.get(0, 0), Some(1.0));
        assert_eq!(dense.get(0, 2), Some(2.0));
        assert_eq!(dense.get(1, 1), Some(3.0));
        assert_eq!(dense.get(1, 0), Some(0.0));

        // Accumulation adds on top of existing contents.
        matrix.add_block_to_dense(&mut dense, 0, 2, 0, 3).unwrap();
        assert_eq!(dense.get(0, 0), Some(2.0));

        // Sub-block.
        let mut block = Dense::new();
        matrix.add_block_to_dense(&mut block, 0, 1, 1, 3).unwrap();
        assert_eq!(block.dims(), (1, 2));
        assert_eq!(block.get(0, 1), Some(2.0));

        // Range validation.
        let mut out = Dense::new();
        assert!(matrix.add_block_to_dense(&mut out, 0, 3, 0, 3).is_err());
    }

    #[test]
    fn test_device_round_trip() {
        let (runtime, manager) = host_setup();
        let stream = DeviceStream::new(&manager).unwrap();

        let source = Sparse::from_csr(
            2,
            3,
            vec![1.0f64, 2.0, 3.0],
            vec![0, 2, 1],
            vec![0, 2, 3],
        )
        .unwrap();

        let on_device = source.to_device(&manager, &stream).unwrap();
        assert_eq!(on_device.location(), Location::Device(0));
        assert_eq!(on_device.nnz(), 3);
        assert_eq!(runtime.live_allocations(), 3);

        let back = on_device.to_host(&manager, &stream).unwrap();
        assert_eq!(back.values().unwrap(), source.values().unwrap());
        assert_eq!(back.col_indices().unwrap(), source.col_indices().unwrap());
        assert_eq!(back.row_ptr().unwrap(), source.row_ptr().unwrap());
    }

    #[test]
    fn test_device_clone_from_is_deep() {
        let (runtime, manager) = host_setup();
        let stream = DeviceStream::new(&manager).unwrap();

        let host = Sparse::from_csr(
            2,
            2,
            vec![1.0f64, 2.0],
            vec![0, 1],
            vec![0, 1, 2],
        )
        .unwrap();
        let source = host.to_device(&manager, &stream).unwrap();

        let mut dest = Sparse::new(0, 0);
        dest.clone_from(&source).unwrap();
        assert_eq!(runtime.live_allocations(), 6);

        let back = dest.to_host(&manager, &stream).unwrap();
        assert_eq!(back.values().unwrap(), host.values().unwrap());
    }
}
