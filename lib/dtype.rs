//! Closed set of supported element types, their runtime tags, and the
//! promotion/casting rules between them.

use std::fmt;
use ndarray as nd;
use ndarray_linalg as la;
use num_complex::{ Complex32 as C32, Complex64 as C64 };

/// Runtime tag for an element type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Float32,
    Float64,
    Complex64,
    Complex128,
}

/// Casting policy applied when converting between element types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Casting {
    /// Any cast within a kind or from real to complex; never complex to real.
    SameKind,
    /// Anything goes; complex to real discards the imaginary part.
    Unsafe,
}

impl DType {
    pub fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    pub fn is_real(self) -> bool { !self.is_complex() }

    fn is_double(self) -> bool {
        matches!(self, Self::Float64 | Self::Complex128)
    }

    /// Smallest type to which both `self` and `other` can be safely cast.
    pub fn promote(self, other: Self) -> Self {
        match (self.is_complex() || other.is_complex(),
               self.is_double() || other.is_double())
        {
            (false, false) => Self::Float32,
            (false, true) => Self::Float64,
            (true, false) => Self::Complex64,
            (true, true) => Self::Complex128,
        }
    }

    /// Return `true` if values of type `self` may be cast to `to` under the
    /// given policy.
    pub fn can_cast(self, to: Self, casting: Casting) -> bool {
        match casting {
            Casting::Unsafe => true,
            Casting::SameKind => !(self.is_complex() && to.is_real()),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32 => write!(f, "float32"),
            Self::Float64 => write!(f, "float64"),
            Self::Complex64 => write!(f, "complex64"),
            Self::Complex128 => write!(f, "complex128"),
        }
    }
}

/// Element type of every matrix and state handled by the crate.
pub trait Element:
    la::Scalar + la::Lapack + nd::LinalgScalar + nd::ScalarOperand + 'static
{
    const DTYPE: DType;

    /// Machine epsilon of the underlying real type.
    const EPSILON: f64;

    fn to_c64(self) -> C64;

    /// Convert from `C64`, discarding the imaginary part for real types.
    fn from_c64(z: C64) -> Self;

    fn cast<U: Element>(self) -> U { U::from_c64(self.to_c64()) }

    /// Modulus as an `f64`.
    fn modulus(self) -> f64 { self.to_c64().norm() }

    /// Absolute tolerance below which a value is considered numerically zero.
    fn atol() -> f64 { 100.0 * Self::EPSILON }
}

impl Element for f32 {
    const DTYPE: DType = DType::Float32;
    const EPSILON: f64 = f32::EPSILON as f64;
    fn to_c64(self) -> C64 { C64::new(self as f64, 0.0) }
    fn from_c64(z: C64) -> Self { z.re as f32 }
}

impl Element for f64 {
    const DTYPE: DType = DType::Float64;
    const EPSILON: f64 = f64::EPSILON;
    fn to_c64(self) -> C64 { C64::new(self, 0.0) }
    fn from_c64(z: C64) -> Self { z.re }
}

impl Element for C32 {
    const DTYPE: DType = DType::Complex64;
    const EPSILON: f64 = f32::EPSILON as f64;
    fn to_c64(self) -> C64 { C64::new(self.re as f64, self.im as f64) }
    fn from_c64(z: C64) -> Self { C32::new(z.re as f32, z.im as f32) }
}

impl Element for C64 {
    const DTYPE: DType = DType::Complex128;
    const EPSILON: f64 = f64::EPSILON;
    fn to_c64(self) -> C64 { self }
    fn from_c64(z: C64) -> Self { z }
}

/// Type-level counterpart to [`DType::promote`].
pub trait Promote<U: Element>: Element {
    type Output: Element;
}

/// Shorthand for the promoted type of `T` and `U`.
pub type Promoted<T, U> = <T as Promote<U>>::Output;

macro_rules! impl_promote {
    ( $( $a:ty, $b:ty => $o:ty );* $(;)? ) => {
        $( impl Promote<$b> for $a { type Output = $o; } )*
    }
}

impl_promote!(
    f32, f32 => f32;
    f32, f64 => f64;
    f32, C32 => C32;
    f32, C64 => C64;
    f64, f32 => f64;
    f64, f64 => f64;
    f64, C32 => C64;
    f64, C64 => C64;
    C32, f32 => C32;
    C32, f64 => C64;
    C32, C32 => C32;
    C32, C64 => C64;
    C64, f32 => C64;
    C64, f64 => C64;
    C64, C32 => C64;
    C64, C64 => C64;
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_follows_kind_and_precision() {
        assert_eq!(DType::Float32.promote(DType::Float64), DType::Float64);
        assert_eq!(DType::Float64.promote(DType::Complex64), DType::Complex128);
        assert_eq!(DType::Float32.promote(DType::Complex64), DType::Complex64);
        assert_eq!(
            <Promoted<f64, C32> as Element>::DTYPE,
            DType::Float64.promote(DType::Complex64),
        );
    }

    #[test]
    fn same_kind_forbids_complex_to_real() {
        assert!(DType::Float32.can_cast(DType::Complex128, Casting::SameKind));
        assert!(DType::Float64.can_cast(DType::Float32, Casting::SameKind));
        assert!(!DType::Complex64.can_cast(DType::Float64, Casting::SameKind));
        assert!(DType::Complex64.can_cast(DType::Float64, Casting::Unsafe));
    }

    #[test]
    fn casts_go_through_c64() {
        let z = C64::new(1.5, -2.0);
        assert_eq!(z.cast::<f64>(), 1.5);
        assert_eq!(2.5_f32.cast::<C64>(), C64::new(2.5, 0.0));
        assert_eq!(z.cast::<C32>(), C32::new(1.5, -2.0));
    }
}
