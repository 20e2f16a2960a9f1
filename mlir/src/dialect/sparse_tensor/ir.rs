/*!
- include <https://github.com/llvm/llvm-project/tree/main/mlir/include/mlir/Dialect/SparseTensor/IR>
*/

pub mod enums;
