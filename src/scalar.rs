//! Generic scalar kinds and type-safe casts between real and complex
//! representations at single and double precision.
//!
//! Dispatch is resolved by the statically requested target type, never by
//! runtime inspection of the source value: [`cast`] accepts any supported
//! target kind (the imaginary part is implicitly zero), while
//! [`cast_complex`] is only callable for complex targets, so an unsupported
//! target/source pairing is rejected at compile time.

use bytemuck::Pod;
use num_complex::{Complex32, Complex64};
use num_traits::{Float, Num, Zero};
use std::fmt::Debug;

/// Enum of supported scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Single precision floating point, real.
    Single,
    /// Double precision floating point, real.
    Double,
    /// Single precision floating point, complex.
    ComplexSingle,
    /// Double precision floating point, complex.
    ComplexDouble,
}

impl ScalarKind {
    pub fn is_complex(self) -> bool {
        matches!(self, ScalarKind::ComplexSingle | ScalarKind::ComplexDouble)
    }

    pub fn is_real(self) -> bool {
        !self.is_complex()
    }

    /// Size of one element of this kind in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            ScalarKind::Single => 4,
            ScalarKind::Double => 8,
            ScalarKind::ComplexSingle => 8,
            ScalarKind::ComplexDouble => 16,
        }
    }

    /// The real kind underlying this kind (identity for real kinds).
    pub fn real_kind(self) -> ScalarKind {
        match self {
            ScalarKind::Single | ScalarKind::ComplexSingle => ScalarKind::Single,
            ScalarKind::Double | ScalarKind::ComplexDouble => ScalarKind::Double,
        }
    }
}

mod sealed {
    use num_complex::{Complex32, Complex64};

    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for Complex32 {}
    impl Sealed for Complex64 {}
}

/// Element type of matrices and device buffers.
///
/// The set of implementors is closed: `f32`, `f64`, [`Complex32`] and
/// [`Complex64`], one per [`ScalarKind`] member.
pub trait Scalar:
    sealed::Sealed + Pod + Num + Debug + Default + PartialEq + Send + Sync + 'static
{
    /// The real scalar underlying this kind (`f32` or `f64`).
    type Real: RealScalar;

    /// The kind tag corresponding to this type.
    const KIND: ScalarKind;

    /// Builds a value from real and imaginary parts.
    ///
    /// Real kinds discard the imaginary part; the public cast entry points
    /// only reach this with a zero imaginary part for real targets.
    fn from_parts(re: Self::Real, im: Self::Real) -> Self;

    /// The real part of the value.
    fn real_part(&self) -> Self::Real;

    /// The imaginary part of the value (zero for real kinds).
    fn imag_part(&self) -> Self::Real;
}

/// Real scalar kinds (`f32`, `f64`), with infallible precision conversion.
pub trait RealScalar: Scalar + Float {
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
}

/// Complex scalar kinds ([`Complex32`], [`Complex64`]).
///
/// Only these targets accept an explicit imaginary part in a cast.
pub trait ComplexScalar: Scalar {}

impl Scalar for f32 {
    type Real = f32;
    const KIND: ScalarKind = ScalarKind::Single;

    fn from_parts(re: f32, _im: f32) -> Self {
        re
    }

    fn real_part(&self) -> f32 {
        *self
    }

    fn imag_part(&self) -> f32 {
        0.0
    }
}

impl RealScalar for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f64 {
    type Real = f64;
    const KIND: ScalarKind = ScalarKind::Double;

    fn from_parts(re: f64, _im: f64) -> Self {
        re
    }

    fn real_part(&self) -> f64 {
        *self
    }

    fn imag_part(&self) -> f64 {
        0.0
    }
}

impl RealScalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl Scalar for Complex32 {
    type Real = f32;
    const KIND: ScalarKind = ScalarKind::ComplexSingle;

    fn from_parts(re: f32, im: f32) -> Self {
        Complex32::new(re, im)
    }

    fn real_part(&self) -> f32 {
        self.re
    }

    fn imag_part(&self) -> f32 {
        self.im
    }
}

impl ComplexScalar for Complex32 {}

impl Scalar for Complex64 {
    type Real = f64;
    const KIND: ScalarKind = ScalarKind::ComplexDouble;

    fn from_parts(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }

    fn real_part(&self) -> f64 {
        self.re
    }

    fn imag_part(&self) -> f64 {
        self.im
    }
}

impl ComplexScalar for Complex64 {}

/// Returns the [`ScalarKind`] corresponding to the type parameter.
pub fn kind_of<T: Scalar>() -> ScalarKind {
    T::KIND
}

/// Casts a real value into the requested target kind.
///
/// The imaginary part of a complex target is exactly zero. Precision is
/// widened or narrowed through `f64`, so a narrowing cast loses at most the
/// precision the target cannot represent and never gains any.
pub fn cast<T: Scalar, U: RealScalar>(real: U) -> T {
    let re = <T::Real as RealScalar>::from_f64(real.to_f64());
    T::from_parts(re, <T::Real as Zero>::zero())
}

/// Casts a real/imaginary pair into the requested complex kind.
pub fn cast_complex<T: ComplexScalar, U: RealScalar, V: RealScalar>(real: U, imag: V) -> T {
    let re = <T::Real as RealScalar>::from_f64(real.to_f64());
    let im = <T::Real as RealScalar>::from_f64(imag.to_f64());
    T::from_parts(re, im)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of() {
        assert_eq!(kind_of::<f32>(), ScalarKind::Single);
        assert_eq!(kind_of::<f64>(), ScalarKind::Double);
        assert_eq!(kind_of::<Complex32>(), ScalarKind::ComplexSingle);
        assert_eq!(kind_of::<Complex64>(), ScalarKind::ComplexDouble);
    }

    #[test]
    fn test_kind_queries() {
        assert!(ScalarKind::ComplexDouble.is_complex());
        assert!(ScalarKind::Single.is_real());
        assert_eq!(ScalarKind::ComplexSingle.real_kind(), ScalarKind::Single);
        assert_eq!(ScalarKind::ComplexDouble.size_bytes(), 16);
        assert_eq!(ScalarKind::Single.size_bytes(), 4);
    }

    #[test]
    fn test_cast_real_to_complex_zero_imag() {
        let z: Complex64 = cast(3.5f64);
        assert_eq!(z.re, 3.5);
        assert_eq!(z.im, 0.0);

        let c: Complex32 = cast(2.25f64);
        assert_eq!(c.re, 2.25f32);
        assert_eq!(c.im, 0.0f32);
    }

    #[test]
    fn test_cast_widening_is_exact() {
        let x: f64 = cast(1.5f32);
        assert_eq!(x, 1.5f64);

        // Every f32 is exactly representable as f64.
        let v = 0.1f32;
        let widened: f64 = cast(v);
        assert_eq!(widened, v as f64);
    }

    #[test]
    fn test_cast_narrowing_matches_native_rounding() {
        let v = core::f64::consts::PI;
        let narrowed: f32 = cast(v);
        assert_eq!(narrowed, v as f32);

        // Round-tripping through single precision loses once, then is stable.
        let once: f32 = cast(v);
        let back: f64 = cast(once);
        let twice: f32 = cast(back);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_cast_complex_parts() {
        let z: Complex64 = cast_complex(1.0f64, -2.0f64);
        assert_eq!(z.re, 1.0);
        assert_eq!(z.im, -2.0);

        // Mixed source precisions narrow independently.
        let c: Complex32 = cast_complex(1.0f64, 0.5f32);
        assert_eq!(c.re, 1.0f32);
        assert_eq!(c.im, 0.5f32);
    }

    #[test]
    fn test_scalar_parts_accessors() {
        let z = Complex64::new(4.0, 5.0);
        assert_eq!(z.real_part(), 4.0);
        assert_eq!(z.imag_part(), 5.0);

        let x = 7.0f64;
        assert_eq!(x.real_part(), 7.0);
        assert_eq!(x.imag_part(), 0.0);
    }
}
