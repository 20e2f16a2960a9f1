//! - include <https://github.com/llvm/llvm-project/tree/main/mlir/include/mlir/ExecutionEngine>
//! - lib <https://github.com/llvm/llvm-project/tree/main/mlir/lib/ExecutionEngine>

pub mod c_runner_utils;
pub mod sparse_tensor;
pub mod sparse_tensor_runtime;
