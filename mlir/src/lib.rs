/*!
A runtime support library for MLIR sparse tensors.

- `dialect::sparse_tensor::ir::enums` holds the tags shared with compiler-generated code.
- `execution_engine::sparse_tensor` holds the coordinate scheme, the level storage scheme, the type-matrix dispatcher and the external file formats.
- `execution_engine::sparse_tensor_runtime` is the entry-point surface over memref descriptors.

<https://github.com/llvm/llvm-project/tree/main/mlir>
*/

pub mod dialect;
pub mod execution_engine;
