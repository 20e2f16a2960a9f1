/*!
- include <https://github.com/llvm/llvm-project/tree/main/mlir/include/mlir/ExecutionEngine/SparseTensor>
- lib <https://github.com/llvm/llvm-project/tree/main/mlir/lib/ExecutionEngine/SparseTensor>
*/

pub mod arithmetic_utils;
pub mod coo;
pub mod error_handling;
pub mod file;
pub mod map_ref;
pub mod permutation_ref;
pub mod storage;
pub mod type_matrix;
pub mod types;
