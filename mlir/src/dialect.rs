//! - include <https://github.com/llvm/llvm-project/tree/main/mlir/include/mlir/Dialect>
//! - lib <https://github.com/llvm/llvm-project/tree/main/mlir/lib/Dialect>

pub mod sparse_tensor;
