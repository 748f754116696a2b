//! Uniform checking of native accelerator-library status codes.
//!
//! Three native call families report integer status codes: the dense-algebra
//! library, the low-level accelerator runtime, and the sparse-algebra
//! library. The checkers below are the single point where those codes cross
//! into [`LinalgCoreError`]; callers of native routines must funnel every
//! returned code through the matching `check_*` function.

use crate::error::LinalgCoreError;

/// Raw status code as returned by the native call families.
pub type NativeCode = i32;

/// Success code shared by all three native families.
pub const NATIVE_SUCCESS: NativeCode = 0;

/// Runtime-family code reported when a device allocation fails.
pub const RUNTIME_OUT_OF_MEMORY: NativeCode = 2;

/// Human-readable description of a dense-algebra status code.
pub fn describe_blas(code: NativeCode) -> &'static str {
    match code {
        0 => "success",
        1 => "library not initialized",
        3 => "resource allocation failed",
        7 => "invalid value",
        8 => "architecture mismatch",
        11 => "memory mapping error",
        13 => "execution failed",
        14 => "internal error",
        15 => "operation not supported",
        16 => "license error",
        _ => "unrecognized dense algebra status",
    }
}

/// Human-readable description of an accelerator-runtime status code.
pub fn describe_runtime(code: NativeCode) -> &'static str {
    match code {
        0 => "success",
        1 => "invalid value",
        2 => "out of memory",
        3 => "not initialized",
        4 => "deinitialized",
        100 => "no device detected",
        101 => "invalid device ordinal",
        700 => "illegal address",
        702 => "launch timed out",
        _ => "unrecognized runtime status",
    }
}

/// Human-readable description of a sparse-algebra status code.
pub fn describe_sparse(code: NativeCode) -> &'static str {
    match code {
        0 => "success",
        1 => "library not initialized",
        2 => "resource allocation failed",
        3 => "invalid value",
        4 => "architecture mismatch",
        5 => "memory mapping error",
        6 => "execution failed",
        7 => "internal error",
        8 => "matrix type not supported",
        10 => "insufficient resources",
        _ => "unrecognized sparse algebra status",
    }
}

/// Checks a status code returned by a dense-algebra routine.
///
/// No-op on success; otherwise produces a
/// [`LinalgCoreError::DenseAlgebraError`] carrying the native code.
pub fn check_blas(code: NativeCode) -> Result<(), LinalgCoreError> {
    if code == NATIVE_SUCCESS {
        return Ok(());
    }
    Err(LinalgCoreError::DenseAlgebraError {
        code,
        detail: describe_blas(code).to_string(),
    })
}

/// Checks a status code returned by a low-level accelerator runtime routine.
///
/// No-op on success. The family's allocation-failure code maps to
/// [`LinalgCoreError::OutOfDeviceMemory`] so allocation paths surface it
/// directly; every other failure becomes a
/// [`LinalgCoreError::AcceleratorRuntimeError`] carrying the native code.
pub fn check_runtime(code: NativeCode) -> Result<(), LinalgCoreError> {
    if code == NATIVE_SUCCESS {
        return Ok(());
    }
    if code == RUNTIME_OUT_OF_MEMORY {
        return Err(LinalgCoreError::OutOfDeviceMemory(format!(
            "accelerator runtime reported insufficient memory (native code {})",
            code
        )));
    }
    Err(LinalgCoreError::AcceleratorRuntimeError {
        code,
        detail: describe_runtime(code).to_string(),
    })
}

/// Checks a status code returned by a sparse-algebra routine.
///
/// No-op on success; otherwise produces a
/// [`LinalgCoreError::SparseAlgebraError`] carrying the native code.
pub fn check_sparse(code: NativeCode) -> Result<(), LinalgCoreError> {
    if code == NATIVE_SUCCESS {
        return Ok(());
    }
    Err(LinalgCoreError::SparseAlgebraError {
        code,
        detail: describe_sparse(code).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_success_is_noop() {
        assert!(check_blas(NATIVE_SUCCESS).is_ok());
        assert!(check_runtime(NATIVE_SUCCESS).is_ok());
        assert!(check_sparse(NATIVE_SUCCESS).is_ok());
    }

    #[test]
    fn test_check_blas_preserves_code() {
        for code in [1, 3, 7, 8, 11, 13, 14, 15, 16, 42] {
            match check_blas(code) {
                Err(LinalgCoreError::DenseAlgebraError { code: c, .. }) => assert_eq!(c, code),
                other => panic!("expected DenseAlgebraError, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_check_runtime_preserves_code() {
        for code in [1, 3, 100, 101, 700, 702, 999] {
            match check_runtime(code) {
                Err(LinalgCoreError::AcceleratorRuntimeError { code: c, .. }) => {
                    assert_eq!(c, code)
                }
                other => panic!("expected AcceleratorRuntimeError, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_check_runtime_maps_out_of_memory() {
        match check_runtime(RUNTIME_OUT_OF_MEMORY) {
            Err(LinalgCoreError::OutOfDeviceMemory(msg)) => {
                assert!(msg.contains(&RUNTIME_OUT_OF_MEMORY.to_string()))
            }
            other => panic!("expected OutOfDeviceMemory, got {:?}", other),
        }
    }

    #[test]
    fn test_check_sparse_preserves_code() {
        for code in [1, 2, 3, 4, 5, 6, 7, 8, 10, 77] {
            match check_sparse(code) {
                Err(LinalgCoreError::SparseAlgebraError { code: c, .. }) => assert_eq!(c, code),
                other => panic!("expected SparseAlgebraError, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_descriptions_for_known_codes() {
        assert_eq!(describe_runtime(2), "out of memory");
        assert_eq!(describe_blas(13), "execution failed");
        assert_eq!(describe_sparse(8), "matrix type not supported");
    }
}
