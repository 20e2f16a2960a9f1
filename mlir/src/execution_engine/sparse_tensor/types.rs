/*!
# Overhead and primary element types

The storage scheme is parameterised over three types: `P` for positions, `C` for coordinates (both "overhead" types, always unsigned), and `V` for the stored values ("primary" type).  The traits in this file tie each Rust type to the runtime tag used across the opaque-pointer boundary.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/Float16bits.h>
*/

use std::fmt::{self, Debug, Display};

use bytemuck::{Pod, Zeroable};
use half::{bf16, f16};

use crate::dialect::sparse_tensor::ir::enums::{OverheadType, PrimaryType};

use super::arithmetic_utils::check_overflow_cast;

/// An unsigned integer type used to encode positions or coordinates.
pub trait Overhead:
    Copy + Debug + Default + Ord + Pod + Send + Sync + 'static
{
    const KIND: OverheadType;

    /// Narrows a `u64`, asserting (in debug builds) that nothing is lost.
    fn from_u64(x: u64) -> Self;

    fn to_u64(self) -> u64;

    fn wrap(slice: &[Self]) -> OverheadRef<'_>;

    fn unwrap(slice: OverheadRef<'_>) -> Option<&[Self]>;
}

/// An untyped view of one overhead array, tagged with its width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverheadRef<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
    U64(&'a [u64])
}

impl<'a> OverheadRef<'a> {
    pub fn kind(&self) -> OverheadType {
        match self {
            Self::U8(_) => OverheadType::U8,
            Self::U16(_) => OverheadType::U16,
            Self::U32(_) => OverheadType::U32,
            Self::U64(_) => OverheadType::U64
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U8(s) => s.len(),
            Self::U16(s) => s.len(),
            Self::U32(s) => s.len(),
            Self::U64(s) => s.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<u64> {
        match self {
            Self::U8(s) => s.get(i).map(|&x| x.to_u64()),
            Self::U16(s) => s.get(i).map(|&x| x.to_u64()),
            Self::U32(s) => s.get(i).map(|&x| x.to_u64()),
            Self::U64(s) => s.get(i).copied()
        }
    }

    /// Widens every entry to `u64`.
    pub fn to_u64_vec(&self) -> Vec<u64> {
        match self {
            Self::U8(s) => s.iter().map(|&x| x.to_u64()).collect(),
            Self::U16(s) => s.iter().map(|&x| x.to_u64()).collect(),
            Self::U32(s) => s.iter().map(|&x| x.to_u64()).collect(),
            Self::U64(s) => s.to_vec()
        }
    }

    /// The raw bytes behind the view.
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            Self::U8(s) => s,
            Self::U16(s) => bytemuck::cast_slice(s),
            Self::U32(s) => bytemuck::cast_slice(s),
            Self::U64(s) => bytemuck::cast_slice(s)
        }
    }
}

macro_rules! impl_overhead {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Overhead for $ty {
                const KIND: OverheadType = OverheadType::$kind;

                #[inline]
                fn from_u64(x: u64) -> Self {
                    check_overflow_cast::<$ty, u64>(x)
                }

                #[inline]
                fn to_u64(self) -> u64 {
                    u64::from(self)
                }

                #[inline]
                fn wrap(slice: &[Self]) -> OverheadRef<'_> {
                    OverheadRef::$kind(slice)
                }

                #[inline]
                fn unwrap(slice: OverheadRef<'_>) -> Option<&[Self]> {
                    match slice {
                        OverheadRef::$kind(s) => Some(s),
                        _ => None
                    }
                }
            }
        )*
    };
}

impl_overhead! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64
}

/// A numeric type that can be stored as the values of a sparse tensor.
pub trait Primary:
    Copy + Debug + Display + Default + PartialEq + Pod + Send + Sync + 'static
{
    const KIND: PrimaryType;

    #[inline]
    fn zero() -> Self {
        Self::default()
    }

    /// Converts a value read from a real-valued external file.  The
    /// external formats always store values as `f64`.
    fn from_real(x: f64) -> Self;

    /// Converts a value read from a complex-valued external file.
    fn from_complex(re: f64, im: f64) -> Self;

    /// The arbitrary value used for entries of a pattern tensor.
    fn pattern_value() -> Self;
}

macro_rules! impl_primary_real {
    ($($ty:ty => $kind:ident, |$x:ident| $conv:expr);* $(;)?) => {
        $(
            impl Primary for $ty {
                const KIND: PrimaryType = PrimaryType::$kind;

                #[inline]
                fn from_real($x: f64) -> Self {
                    $conv
                }

                #[inline]
                fn from_complex(re: f64, _im: f64) -> Self {
                    Self::from_real(re)
                }

                #[inline]
                fn pattern_value() -> Self {
                    Self::from_real(1.0)
                }
            }
        )*
    };
}

impl_primary_real! {
    f64 => F64, |x| x;
    f32 => F32, |x| x as f32;
    f16 => F16, |x| f16::from_f64(x);
    bf16 => BF16, |x| bf16::from_f64(x);
    i64 => I64, |x| x as i64;
    i32 => I32, |x| x as i32;
    i16 => I16, |x| x as i16;
    i8 => I8, |x| x as i8;
}

/// Generates a plain complex number with interleaved `re`/`im` parts.
macro_rules! impl_complex {
    ($name:ident, $float:ty, $kind:ident, $doc:literal) => {
        #[doc = $doc]
        #[repr(C)]
        #[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
        pub struct $name {
            pub re: $float,
            pub im: $float
        }

        impl $name {
            #[inline]
            pub const fn new(re: $float, im: $float) -> Self {
                Self { re, im }
            }
        }

        /// Printed as the two whitespace-separated parts, which is the
        /// layout of a complex entry in a Matrix Market file.
        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", self.re, self.im)
            }
        }

        impl Primary for $name {
            const KIND: PrimaryType = PrimaryType::$kind;

            #[inline]
            fn from_real(x: f64) -> Self {
                Self::new(x as $float, 0.0)
            }

            #[inline]
            fn from_complex(re: f64, im: f64) -> Self {
                Self::new(re as $float, im as $float)
            }

            #[inline]
            fn pattern_value() -> Self {
                Self::new(1.0, 1.0)
            }
        }
    };
}

impl_complex!(Complex64, f64, C64, "A complex number with `f64` parts (MLIR's `complex64`).");
impl_complex!(Complex32, f32, C32, "A complex number with `f32` parts (MLIR's `complex32`).");
