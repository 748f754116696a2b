use thiserror::Error;

/// Crate-level error type.
///
/// Native accelerator-library failures enter this taxonomy exclusively
/// through the checkers in [`crate::status`]; no raw status code is
/// propagated past that boundary unexamined.
#[derive(Error, Debug)]
pub enum LinalgCoreError {
    #[error("device error: {0}")]
    DeviceError(String),

    #[error("device out of memory: {0}")]
    OutOfDeviceMemory(String),

    #[error("dense algebra call failed: {detail} (native code {code})")]
    DenseAlgebraError { code: i32, detail: String },

    #[error("accelerator runtime call failed: {detail} (native code {code})")]
    AcceleratorRuntimeError { code: i32, detail: String },

    #[error("sparse algebra call failed: {detail} (native code {code})")]
    SparseAlgebraError { code: i32, detail: String },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid matrix dimensions: {0}")]
    InvalidDimensions(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("internal error: {0}")]
    Internal(String),
}
