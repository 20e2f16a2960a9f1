/*!
This file defines an extremely lightweight API for fatal errors (not arising from assertions).  The API does not attempt to be sophisticated in any way, it's just the usual "I give up" style of error reporting.

Alongside it lives the `Error` type for the few failures a caller can reasonably handle: malformed maps and files, and raw tags that do not decode.  Whether such an error is fatal is decided at the boundary (`sparse_tensor_runtime`), not here.

This file is part of the lightweight runtime support library for sparse tensor manipulations.  The functionality of the support library is meant to simplify benchmarking, testing, and debugging MLIR code operating on sparse tensors.  However, the provided functionality is **not** part of core MLIR itself.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/SparseTensor/ErrorHandling.h>
*/

use std::path::PathBuf;

use thiserror::Error;

use crate::dialect::sparse_tensor::ir::enums::{Action, DimLevelType, OverheadType, PrimaryType};

/// Result type alias using the runtime's `Error`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported combination of types: <P={pos}, C={crd}, V={val}>")]
    UnsupportedTypes {
        pos: OverheadType,
        crd: OverheadType,
        val: PrimaryType
    },

    #[error("action {action:?} requires {expected} as input")]
    MissingInput {
        action: Action,
        expected: &'static str
    },

    #[error("expected {expected}, got {got}")]
    UnexpectedOutput {
        expected: &'static str,
        got: &'static str
    },

    #[error("{what} holds {got} values, expected {expected}")]
    ValueTypeMismatch {
        what: &'static str,
        expected: PrimaryType,
        got: PrimaryType
    },

    #[error("unknown action: {0}")]
    UnknownAction(u32),

    #[error("unknown overhead type: {0}")]
    UnknownOverheadType(u32),

    #[error("unknown primary type: {0}")]
    UnknownPrimaryType(u32),

    #[error("unknown level type: {0}")]
    UnknownLevelType(u8),

    #[error("unknown level type name: {0:?}")]
    UnknownLevelTypeName(String),

    #[error("{what} has length {got}, expected {expected}")]
    RankMismatch {
        what: &'static str,
        expected: usize,
        got: usize
    },

    #[error("{what}[{index}] = {value} is out of range for rank {rank}")]
    MapOutOfRange {
        what: &'static str,
        index: usize,
        value: u64,
        rank: usize
    },

    #[error("{0} is not a permutation")]
    NotPermutation(&'static str),

    #[error("dim2lvl and lvl2dim are not mutual inverses at level {0}")]
    NotInverse(usize),

    #[error("level {lvl} has type {lvl_type}: {reason}")]
    InvalidLevelType {
        lvl: usize,
        lvl_type: DimLevelType,
        reason: &'static str
    },

    #[error("level {lvl} has size {size}, which {crd} coordinates cannot address")]
    OverheadTooNarrow {
        lvl: usize,
        size: u64,
        crd: OverheadType
    },

    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed header in {path}: {reason}")]
    MalformedHeader {
        path: PathBuf,
        reason: String
    },

    #[error("malformed element on line {line} of {path}: {reason}")]
    MalformedElement {
        path: PathBuf,
        line: usize,
        reason: String
    },

    #[error("tensor of type {file} cannot be read as {requested}")]
    IncompatibleValueType {
        file: &'static str,
        requested: PrimaryType
    },

    #[error("dimension {dim} has size {got} in the file but the shape requires {expected}")]
    ShapeMismatch {
        dim: usize,
        expected: u64,
        got: u64
    }
}

/**
Prints a diagnostic and terminates the process.

This is used for conditions that indicate a caller/compiler contract violation (an unsupported type triple, an unknown action), never for data errors a caller could recover from.
*/
#[macro_export]
macro_rules! sparse_tensor_fatal {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        ::tracing::error!(target: "sparse_tensor", "{}", message);
        eprintln!("SparseTensorUtils: {}", message);
        ::std::process::exit(1)
    }};
}

/// Unwraps `result` or dies with its diagnostic.
pub fn fatal_on_error<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => sparse_tensor_fatal!("{}", error)
    }
}
