//! # linalg-core
//!
//! Accelerator resource and stream lifecycle management for a numerical
//! linear-algebra stack: shared-ownership device buffers, in-order execution
//! streams, generic real/complex scalar dispatch, dense and sparse matrix
//! handles, uniform checking of native library status codes, and aggregation
//! of distributed operation status.
//!
//! The compute backend is pluggable: the host runtime is always available,
//! and the `cuda` feature adds a CUDA-backed runtime.

// Declare modules
pub mod dense;
pub mod distributed;
pub mod error;
pub mod memory;
pub mod runtime;
pub mod scalar;
pub mod sparse;
pub mod status;
pub mod stream;
pub mod traits;
pub mod types;
pub mod utilities;

// Re-export public types
pub use dense::Dense;
pub use distributed::{construct_status, DistributedStatus, ProcessStatus, RawStatus};
pub use error::LinalgCoreError;
pub use memory::{DeviceBuffer, ResourceManager, TransferStats};
pub use runtime::{AcceleratorRuntime, DeviceId, DevicePtr, HostRuntime, QueueHandle};
pub use scalar::{cast, cast_complex, kind_of, ComplexScalar, RealScalar, Scalar, ScalarKind};
pub use sparse::{Sparse, Triplet};
pub use status::{check_blas, check_runtime, check_sparse, NativeCode};
pub use stream::{DeviceStream, StreamSpec};
pub use traits::Matrix;
pub use types::{Location, Order};
pub use utilities::BufferHelper;

#[cfg(feature = "cuda")]
pub use runtime::CudaRuntime;
