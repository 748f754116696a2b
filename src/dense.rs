//! Dense matrix handle.
//!
//! A [`Dense`] matrix owns its element storage, either in host memory or on
//! an accelerator device via a [`DeviceBuffer`]. Copies at the matrix level
//! are value-semantic: `clone_from` is a deep, shape-preserving copy and
//! `copy_from` its in-place variant. Buffer sharing between handles (via
//! `Clone` of a device-resident matrix) is an internal optimization, not an
//! observable aliasing contract.

use crate::error::LinalgCoreError;
use crate::memory::{DeviceBuffer, ResourceManager};
use crate::scalar::{Scalar, ScalarKind};
use crate::stream::DeviceStream;
use crate::traits::Matrix;
use crate::types::{Location, Order};
use crate::utilities;

#[derive(Debug, Clone)]
enum DenseStorage<T: Scalar> {
    Empty,
    Host(Vec<T>),
    Device(DeviceBuffer<T>),
}

/// Dense matrix with host or device resident storage.
///
/// Invariant: the element buffer holds at least `rows * cols` elements for
/// the declared storage order.
#[derive(Debug, Clone)]
pub struct Dense<T: Scalar> {
    rows: usize,
    cols: usize,
    order: Order,
    transposed: bool,
    properties: u8,
    storage: DenseStorage<T>,
}

impl<T: Scalar> Default for Dense<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> Dense<T> {
    /// Creates an empty matrix.
    ///
    /// Empty matrices are initialized suitably by all operations that have
    /// output parameters, `clone_from` in particular.
    pub fn new() -> Self {
        Self {
            rows: 0,
            cols: 0,
            order: Order::ColMajor,
            transposed: false,
            properties: 0,
            storage: DenseStorage::Empty,
        }
    }

    /// Creates a zero-filled host matrix.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self, LinalgCoreError> {
        if rows == 0 || cols == 0 {
            return Err(LinalgCoreError::InvalidDimensions(
                "rows or cols must not be zero for this constructor, use the empty \
                 constructor instead"
                    .to_string(),
            ));
        }
        Ok(Self {
            rows,
            cols,
            order: Order::ColMajor,
            transposed: false,
            properties: 0,
            storage: DenseStorage::Host(vec![T::default(); rows * cols]),
        })
    }

    /// Creates a host matrix from existing data in column-major order.
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self, LinalgCoreError> {
        Self::from_vec_with_order(data, rows, cols, Order::ColMajor)
    }

    /// Creates a host matrix from existing data in the given order.
    pub fn from_vec_with_order(
        data: Vec<T>,
        rows: usize,
        cols: usize,
        order: Order,
    ) -> Result<Self, LinalgCoreError> {
        if data.len() != rows * cols {
            return Err(LinalgCoreError::InvalidDimensions(format!(
                "data length ({}) does not match dimensions ({}x{})",
                data.len(),
                rows,
                cols
            )));
        }
        if rows == 0 || cols == 0 {
            return Err(LinalgCoreError::InvalidDimensions(
                "rows or cols must not be zero for this constructor, use the empty \
                 constructor instead"
                    .to_string(),
            ));
        }
        Ok(Self {
            rows,
            cols,
            order,
            transposed: false,
            properties: 0,
            storage: DenseStorage::Host(data),
        })
    }

    /// Returns the number of rows in the matrix.
    pub fn rows(&self) -> usize {
        if self.transposed {
            self.cols
        } else {
            self.rows
        }
    }

    /// Returns the number of columns in the matrix.
    pub fn cols(&self) -> usize {
        if self.transposed {
            self.rows
        } else {
            self.cols
        }
    }

    /// Distance between the first elements of two consecutive major
    /// vectors (columns for `ColMajor`, rows for `RowMajor`).
    pub fn leading_dimension(&self) -> usize {
        match self.order {
            Order::ColMajor => self.rows,
            Order::RowMajor => self.cols,
        }
    }

    /// The storage order.
    pub fn order(&self) -> Order {
        self.order
    }

    /// The current location of the matrix.
    pub fn location(&self) -> Location {
        match &self.storage {
            DenseStorage::Device(buffer) => Location::Device(buffer.device()),
            _ => Location::Host,
        }
    }

    /// The scalar kind of the elements.
    pub fn kind(&self) -> ScalarKind {
        T::KIND
    }

    /// Marks the matrix as transposed; `rows`/`cols` accessors swap.
    pub fn transpose(&mut self) {
        self.transposed = !self.transposed;
    }

    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Sets a property flag (see [`crate::types::property`]).
    pub fn set_property(&mut self, flag: u8) {
        self.properties |= flag;
    }

    /// Unsets a property flag.
    pub fn unset_property(&mut self, flag: u8) {
        self.properties &= !flag;
    }

    /// Checks a property flag.
    pub fn has_property(&self, flag: u8) -> bool {
        self.properties & flag != 0
    }

    /// Frees all storage and sets the matrix to empty.
    pub fn unlink(&mut self) {
        self.storage = DenseStorage::Empty;
        self.rows = 0;
        self.cols = 0;
        self.transposed = false;
        self.properties = 0;
    }

    /// Allocates new zero-filled host storage for an already constructed
    /// matrix. The storage order is retained; no data is copied.
    pub fn reallocate(&mut self, rows: usize, cols: usize) -> Result<(), LinalgCoreError> {
        if rows == 0 || cols == 0 {
            return Err(LinalgCoreError::InvalidDimensions(
                "rows or cols must not be zero, use unlink() instead".to_string(),
            ));
        }
        self.storage = DenseStorage::Host(vec![T::default(); rows * cols]);
        self.rows = rows;
        self.cols = cols;
        Ok(())
    }

    /// Allocates new host storage matching another matrix's shape and order.
    pub fn reallocate_like(&mut self, other: &Dense<T>) -> Result<(), LinalgCoreError> {
        self.order = other.order;
        self.reallocate(other.rows, other.cols)
    }

    /// Physical element index of the logical position `(row, col)`.
    fn index(&self, row: usize, col: usize) -> usize {
        let (pr, pc) = if self.transposed { (col, row) } else { (row, col) };
        match self.order {
            Order::ColMajor => pc * self.leading_dimension() + pr,
            Order::RowMajor => pr * self.leading_dimension() + pc,
        }
    }

    /// The value at `(row, col)` for host-resident matrices.
    ///
    /// Returns `None` out of bounds and for device-resident matrices; read
    /// those back with [`to_host`](Dense::to_host) first.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        let index = self.index(row, col);
        match &self.storage {
            DenseStorage::Host(data) => data.get(index).copied(),
            _ => None,
        }
    }

    /// Sets the value at `(row, col)` for host-resident matrices.
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<(), LinalgCoreError> {
        if row >= self.rows() || col >= self.cols() {
            return Err(LinalgCoreError::InvalidDimensions(format!(
                "position ({}, {}) out of bounds for a {}x{} matrix",
                row,
                col,
                self.rows(),
                self.cols()
            )));
        }
        let index = self.index(row, col);
        match &mut self.storage {
            DenseStorage::Host(data) => {
                data[index] = value;
                Ok(())
            }
            _ => Err(LinalgCoreError::UnsupportedOperation(
                "element writes require a host-resident matrix".to_string(),
            )),
        }
    }

    /// The element slice of a host-resident matrix.
    pub fn host_values(&self) -> Option<&[T]> {
        match &self.storage {
            DenseStorage::Host(data) => Some(data),
            _ => None,
        }
    }

    /// The mutable element slice of a host-resident matrix.
    pub fn host_values_mut(&mut self) -> Option<&mut [T]> {
        match &mut self.storage {
            DenseStorage::Host(data) => Some(data),
            _ => None,
        }
    }

    fn copy_layout_from(&mut self, source: &Dense<T>) {
        self.rows = source.rows;
        self.cols = source.cols;
        self.order = source.order;
        self.transposed = source.transposed;
        self.properties = source.properties;
    }

    /// Deep, shape-preserving copy of `source` into this handle.
    ///
    /// Destination storage is reused when its capacity and location match
    /// and reallocated otherwise; shape, order, scalar kind and property
    /// flags are copied. Mutating the source afterwards never changes this
    /// matrix.
    pub fn clone_from(&mut self, source: &Dense<T>) -> Result<(), LinalgCoreError> {
        match &source.storage {
            DenseStorage::Empty => {
                self.unlink();
                self.order = source.order;
                Ok(())
            }
            DenseStorage::Host(data) => {
                let needed = source.rows * source.cols;
                let reuse = matches!(&self.storage, DenseStorage::Host(existing)
                    if existing.len() == needed);
                if reuse {
                    if let DenseStorage::Host(existing) = &mut self.storage {
                        utilities::copy_1d(data, existing)?;
                    }
                    log::trace!("clone_from reused host storage of {} element(s)", needed);
                } else {
                    self.storage = DenseStorage::Host(data.clone());
                }
                self.copy_layout_from(source);
                Ok(())
            }
            DenseStorage::Device(buffer) => {
                let reuse = matches!(&self.storage, DenseStorage::Device(existing)
                    if existing.len() == buffer.len()
                        && existing.device() == buffer.device()
                        && existing.handle_count() == 1);
                if reuse {
                    if let DenseStorage::Device(existing) = &self.storage {
                        existing.copy_contents_from(buffer)?;
                    }
                    log::trace!(
                        "clone_from reused device storage of {} element(s)",
                        buffer.len()
                    );
                } else {
                    self.storage = DenseStorage::Device(buffer.duplicate()?);
                }
                self.copy_layout_from(source);
                Ok(())
            }
        }
    }

    /// In-place (non-reallocating) copy of `source` into this handle.
    ///
    /// Fails with [`LinalgCoreError::ShapeMismatch`] if the destination is
    /// incompatibly sized.
    pub fn copy_from(&mut self, source: &Dense<T>) -> Result<(), LinalgCoreError> {
        if self.rows != source.rows || self.cols != source.cols {
            return Err(LinalgCoreError::ShapeMismatch(format!(
                "cannot copy a {}x{} matrix into a {}x{} destination in place",
                source.rows(),
                source.cols(),
                self.rows(),
                self.cols()
            )));
        }
        if self.order != source.order || self.transposed != source.transposed {
            return Err(LinalgCoreError::UnsupportedOperation(
                "in-place copy requires matching storage order and transposition".to_string(),
            ));
        }
        match (&mut self.storage, &source.storage) {
            (DenseStorage::Empty, DenseStorage::Empty) => Ok(()),
            (DenseStorage::Host(dst), DenseStorage::Host(src)) => utilities::copy_1d(src, dst),
            (DenseStorage::Device(dst), DenseStorage::Device(src)) => dst.copy_contents_from(src),
            _ => Err(LinalgCoreError::UnsupportedOperation(
                "in-place copy requires source and destination in the same location".to_string(),
            )),
        }
    }

    /// Copies a sub-block of a host-resident matrix into this handle.
    ///
    /// Row/column bounds are half-open. An empty destination is reallocated
    /// to the block shape; a non-empty one must match it exactly.
    pub fn copy_block_from(
        &mut self,
        source: &Dense<T>,
        first_row: usize,
        last_row: usize,
        first_col: usize,
        last_col: usize,
    ) -> Result<(), LinalgCoreError> {
        if source.transposed || self.transposed {
            return Err(LinalgCoreError::UnsupportedOperation(
                "block copies on transposed matrices are not supported".to_string(),
            ));
        }
        if first_row > last_row
            || first_col > last_col
            || last_row > source.rows()
            || last_col > source.cols()
        {
            return Err(LinalgCoreError::InvalidDimensions(format!(
                "block ({}:{},{}:{}) not contained in a matrix of size {}x{}",
                first_row,
                last_row,
                first_col,
                last_col,
                source.rows(),
                source.cols()
            )));
        }
        let block_rows = last_row - first_row;
        let block_cols = last_col - first_col;
        if self.is_empty() {
            self.order = source.order;
            self.reallocate(block_rows, block_cols)?;
        } else if self.rows() != block_rows || self.cols() != block_cols {
            return Err(LinalgCoreError::ShapeMismatch(format!(
                "destination is {}x{} but the requested block is {}x{}",
                self.rows(),
                self.cols(),
                block_rows,
                block_cols
            )));
        } else if self.order != source.order {
            return Err(LinalgCoreError::UnsupportedOperation(
                "block copies require matching storage orders".to_string(),
            ));
        }
        let src_ld = source.leading_dimension();
        let dst_ld = self.leading_dimension();
        let src_data = source.host_values().ok_or_else(|| {
            LinalgCoreError::UnsupportedOperation(
                "block copies require host-resident matrices".to_string(),
            )
        })?;
        let order = self.order;
        let dst_data = match &mut self.storage {
            DenseStorage::Host(data) => data,
            _ => {
                return Err(LinalgCoreError::UnsupportedOperation(
                    "block copies require host-resident matrices".to_string(),
                ))
            }
        };
        match order {
            Order::ColMajor => {
                let offset = first_col * src_ld + first_row;
                utilities::copy_2d(
                    &src_data[offset..],
                    src_ld,
                    dst_data,
                    dst_ld,
                    block_rows,
                    block_cols,
                )
            }
            Order::RowMajor => {
                let offset = first_row * src_ld + first_col;
                utilities::copy_2d(
                    &src_data[offset..],
                    src_ld,
                    dst_data,
                    dst_ld,
                    block_cols,
                    block_rows,
                )
            }
        }
    }

    /// Moves the matrix to the stream's device, returning a device-resident
    /// handle. A matrix that is already device-resident is returned as a
    /// shared handle.
    pub fn to_device(
        &self,
        manager: &ResourceManager,
        stream: &DeviceStream,
    ) -> Result<Dense<T>, LinalgCoreError> {
        match &self.storage {
            DenseStorage::Empty => Err(LinalgCoreError::InvalidDimensions(
                "cannot move an empty matrix to the device".to_string(),
            )),
            DenseStorage::Host(data) => {
                let buffer = manager.upload(stream, data)?;
                Ok(Dense {
                    rows: self.rows,
                    cols: self.cols,
                    order: self.order,
                    transposed: self.transposed,
                    properties: self.properties,
                    storage: DenseStorage::Device(buffer),
                })
            }
            DenseStorage::Device(_) => {
                log::debug!("matrix is already device-resident");
                Ok(self.clone())
            }
        }
    }

    /// Reads the matrix back to host memory, returning a host-resident
    /// handle. A host-resident matrix is returned as a copy.
    pub fn to_host(
        &self,
        manager: &ResourceManager,
        stream: &DeviceStream,
    ) -> Result<Dense<T>, LinalgCoreError> {
        match &self.storage {
            DenseStorage::Device(buffer) => {
                let data = manager.download(stream, buffer)?;
                Ok(Dense {
                    rows: self.rows,
                    cols: self.cols,
                    order: self.order,
                    transposed: self.transposed,
                    properties: self.properties,
                    storage: DenseStorage::Host(data),
                })
            }
            _ => Ok(self.clone()),
        }
    }
}

impl<T: Scalar> Matrix for Dense<T> {
    type Value = T;

    fn dims(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }
}
