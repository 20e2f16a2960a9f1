/*!
# Enums for the SparseTensor dialect

Typedefs and enums shared between MLIR code for manipulating the IR, and the lightweight runtime support library for sparse tensor manipulations.  That is, all the enums are used to define the API of the runtime library and hence are also needed when generating calls into the runtime library.  Moveover, the `DimLevelType` enum is also used as the internal IR encoding of dimension level types, to avoid code duplication (e.g., for the predicates).

The runtime generates one storage specialisation per supported (position, coordinate, value) triple; see `execution_engine::sparse_tensor::type_matrix` for the x-macro that enumerates them.

Because this file defines a library which is a dependency of the runtime library itself, this file must not depend on any MLIR internals (e.g., operators, attributes, ArrayRefs, etc) lest the runtime library inherit those dependencies.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/Dialect/SparseTensor/IR/Enums.h>
*/

use std::fmt;

use crate::execution_engine::sparse_tensor::error_handling::Error;

/**
This type is used in the public API at all places where MLIR expects values with the built-in type 'index'. For now, we simply assume that type is 64-bit, but targets with different 'index' bit widths should link with an alternatively built runtime support library.
*/
pub type IndexType = u64;

const _: () = assert!(std::mem::size_of::<IndexType>() == std::mem::size_of::<u64>());

/// Encoding of overhead types (both position overhead and coordinate
/// overhead), for "overloading" `new_sparse_tensor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OverheadType {
    Index = 0,
    U64 = 1,
    U32 = 2,
    U16 = 3,
    U8 = 4
}

impl OverheadType {
    /// Rewrites `Index` to `U64`.  This is safe because `IndexType` is
    /// asserted to be 64 bits wide above.
    pub const fn normalise(self) -> Self {
        match self {
            Self::Index => Self::U64,
            other => other
        }
    }

    /// Width in bits of the encoded overhead.
    pub const fn bit_width(self) -> u32 {
        match self {
            Self::Index | Self::U64 => 64,
            Self::U32 => 32,
            Self::U16 => 16,
            Self::U8 => 8
        }
    }

    /// Largest value the overhead can hold.
    pub const fn max_value(self) -> u64 {
        match self {
            Self::Index | Self::U64 => u64::MAX,
            Self::U32 => u32::MAX as u64,
            Self::U16 => u16::MAX as u64,
            Self::U8 => u8::MAX as u64
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::U64 => "u64",
            Self::U32 => "u32",
            Self::U16 => "u16",
            Self::U8 => "u8"
        }
    }
}

impl fmt::Display for OverheadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for OverheadType {
    type Error = Error;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => Self::Index,
            1 => Self::U64,
            2 => Self::U32,
            3 => Self::U16,
            4 => Self::U8,
            _ => return Err(Error::UnknownOverheadType(tag))
        })
    }
}

/// Encoding of the elemental type, for "overloading" `new_sparse_tensor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PrimaryType {
    F64 = 1,
    F32 = 2,
    F16 = 3,
    BF16 = 4,
    I64 = 5,
    I32 = 6,
    I16 = 7,
    I8 = 8,
    C64 = 9,
    C32 = 10
}

impl PrimaryType {
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F64 | Self::F32 | Self::F16 | Self::BF16)
    }

    pub const fn is_integral(self) -> bool {
        matches!(self, Self::I64 | Self::I32 | Self::I16 | Self::I8)
    }

    pub const fn is_complex(self) -> bool {
        matches!(self, Self::C64 | Self::C32)
    }

    /// Whether values of this type can be stored losslessly in `f64`.
    pub const fn is_real(self) -> bool {
        self.is_float() || self.is_integral()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::I64 => "i64",
            Self::I32 => "i32",
            Self::I16 => "i16",
            Self::I8 => "i8",
            Self::C64 => "c64",
            Self::C32 => "c32"
        }
    }
}

impl fmt::Display for PrimaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for PrimaryType {
    type Error = Error;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        Ok(match tag {
            1 => Self::F64,
            2 => Self::F32,
            3 => Self::F16,
            4 => Self::BF16,
            5 => Self::I64,
            6 => Self::I32,
            7 => Self::I16,
            8 => Self::I8,
            9 => Self::C64,
            10 => Self::C32,
            _ => return Err(Error::UnknownPrimaryType(tag))
        })
    }
}

/// The actions performed by `new_sparse_tensor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Action {
    Empty = 0,
    // `new_sparse_tensor` no longer handles `FromFile=1`, so we leave this
    // number reserved to help catch any code that still needs updating.
    FromCOO = 2,
    SparseToSparse = 3,
    EmptyCOO = 4,
    ToCOO = 5,
    ToIterator = 6,
    Pack = 7
}

impl TryFrom<u32> for Action {
    type Error = Error;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => Self::Empty,
            2 => Self::FromCOO,
            3 => Self::SparseToSparse,
            4 => Self::EmptyCOO,
            5 => Self::ToCOO,
            6 => Self::ToIterator,
            7 => Self::Pack,
            _ => return Err(Error::UnknownAction(tag))
        })
    }
}

/**
This enum defines all the sparse representations supportable by the SparseTensor dialect.  We use a lightweight encoding to encode both the 'format' per se (dense, compressed, singleton) as well as the "properties" (ordered, unique).  The encoding is chosen for performance of the runtime library, and thus may change in future versions; consequently, client code should use the predicate functions defined below, rather than relying on knowledge about the particular binary encoding.

The `Undef` 'format' is a special value used internally for cases where we need to store an undefined or indeterminate `DimLevelType`.
It should not be used externally, since it does not indicate an actual/representable format.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DimLevelType {
    #[default]
    Undef = 0,           // 0b000_00
    Dense = 4,           // 0b001_00
    Compressed = 8,      // 0b010_00
    CompressedNu = 9,    // 0b010_01
    CompressedNo = 10,   // 0b010_10
    CompressedNuNo = 11, // 0b010_11
    Singleton = 16,      // 0b100_00
    SingletonNu = 17,    // 0b100_01
    SingletonNo = 18,    // 0b100_10
    SingletonNuNo = 19,  // 0b100_11
}

impl DimLevelType {
    /// Check that the `DimLevelType` contains a valid (possibly undefined) value.
    pub const fn is_valid(self) -> bool {
        let format = (self as u8) >> 2;
        let properties = (self as u8) & 3;
        // If undefined or dense, then must be unique and ordered.
        // Otherwise, the format must be one of the known ones.
        if format <= 1 {
            properties == 0
        } else {
            format == 2 || format == 4
        }
    }

    pub const fn is_undef(self) -> bool {
        matches!(self, Self::Undef)
    }

    pub const fn is_dense(self) -> bool {
        matches!(self, Self::Dense)
    }

    pub const fn is_compressed(self) -> bool {
        (self as u8) & 8 != 0
    }

    pub const fn is_singleton(self) -> bool {
        (self as u8) & 16 != 0
    }

    /// Check if the `DimLevelType` is ordered (regardless of storage format).
    pub const fn is_ordered(self) -> bool {
        (self as u8) & 2 == 0
    }

    /// Check if the `DimLevelType` is unique (regardless of storage format).
    pub const fn is_unique(self) -> bool {
        (self as u8) & 1 == 0
    }

    /// Only the format part of the level type.
    pub const fn format(self) -> Option<LevelFormat> {
        if self.is_dense() {
            Some(LevelFormat::Dense)
        } else if self.is_compressed() {
            Some(LevelFormat::Compressed)
        } else if self.is_singleton() {
            Some(LevelFormat::Singleton)
        } else {
            None
        }
    }
}

impl TryFrom<u8> for DimLevelType {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => Self::Undef,
            4 => Self::Dense,
            8 => Self::Compressed,
            9 => Self::CompressedNu,
            10 => Self::CompressedNo,
            11 => Self::CompressedNuNo,
            16 => Self::Singleton,
            17 => Self::SingletonNu,
            18 => Self::SingletonNo,
            19 => Self::SingletonNuNo,
            _ => return Err(Error::UnknownLevelType(tag))
        })
    }
}

impl std::str::FromStr for DimLevelType {
    type Err = Error;

    /// Parses the dialect's spelling, e.g. `compressed-nu-no`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "dense" => Self::Dense,
            "compressed" => Self::Compressed,
            "compressed-nu" => Self::CompressedNu,
            "compressed-no" => Self::CompressedNo,
            "compressed-nu-no" => Self::CompressedNuNo,
            "singleton" => Self::Singleton,
            "singleton-nu" => Self::SingletonNu,
            "singleton-no" => Self::SingletonNo,
            "singleton-nu-no" => Self::SingletonNuNo,
            other => return Err(Error::UnknownLevelTypeName(other.to_owned()))
        })
    }
}

impl fmt::Display for DimLevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Undef => "undef",
            Self::Dense => "dense",
            Self::Compressed => "compressed",
            Self::CompressedNu => "compressed-nu",
            Self::CompressedNo => "compressed-no",
            Self::CompressedNuNo => "compressed-nu-no",
            Self::Singleton => "singleton",
            Self::SingletonNu => "singleton-nu",
            Self::SingletonNo => "singleton-no",
            Self::SingletonNuNo => "singleton-nu-no"
        })
    }
}

/// This enum defines all the storage formats supported by the sparse compiler,
/// without the level properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LevelFormat {
    Dense = 4,      // 0b001_00
    Compressed = 8, // 0b010_00
    Singleton = 16, // 0b100_00
}
