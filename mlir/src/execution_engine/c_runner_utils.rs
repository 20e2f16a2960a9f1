/*!
# Utils for Debugging MLIR Execution

This file declares basic classes and functions to manipulate structured MLIR types at runtime.  Only one-dimensional memrefs are modelled: every buffer crossing the sparse tensor runtime boundary is a vector, and the runtime only supports unit stride.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/CRunnerUtils.h>
- lib <https://github.com/llvm/llvm-project/blob/main/mlir/lib/ExecutionEngine/CRunnerUtils.cpp>
*/

/**
StridedMemRef descriptor type of rank 1, borrowing its allocation.  `data` is the whole allocation; the described elements start at `offset` and are `stride` apart.
*/
#[derive(Clone, Copy, Debug)]
pub struct StridedMemRefType<'a, T> {
    data: &'a [T],
    offset: usize,
    size: usize,
    stride: usize
}

impl<'a, T> StridedMemRefType<'a, T> {
    pub fn new(data: &'a [T], offset: usize, size: usize, stride: usize) -> Self {
        debug_assert!(
            size == 0 || offset + (size - 1) * stride < data.len(),
            "Memref exceeds its allocation"
        );
        Self {
            data,
            offset,
            size,
            stride
        }
    }

    /**
    Initialises the memref with the provided slice.  This is designed for functions which want to "return" a memref that aliases into memory owned by some other object (e.g., `SparseTensorStorage`), without doing any actual copying.
    */
    pub fn alias(data: &'a [T]) -> Self {
        Self::new(data, 0, data.len(), 1)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The described elements.  Asserts unit stride.
    pub fn payload(&self) -> &'a [T] {
        debug_assert_eq!(self.stride, 1, "Memref has non-trivial stride");
        &self.data[self.offset..self.offset + self.size]
    }
}

impl<'a, T> From<&'a [T]> for StridedMemRefType<'a, T> {
    fn from(data: &'a [T]) -> Self {
        Self::alias(data)
    }
}

/// As `StridedMemRefType`, for buffers the callee writes into.
#[derive(Debug)]
pub struct StridedMemRefTypeMut<'a, T> {
    data: &'a mut [T],
    offset: usize,
    size: usize,
    stride: usize
}

impl<'a, T> StridedMemRefTypeMut<'a, T> {
    pub fn new(data: &'a mut [T], offset: usize, size: usize, stride: usize) -> Self {
        debug_assert!(
            size == 0 || offset + (size - 1) * stride < data.len(),
            "Memref exceeds its allocation"
        );
        Self {
            data,
            offset,
            size,
            stride
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn payload(&self) -> &[T] {
        debug_assert_eq!(self.stride, 1, "Memref has non-trivial stride");
        &self.data[self.offset..self.offset + self.size]
    }

    /// The described elements.  Asserts unit stride.
    pub fn payload_mut(&mut self) -> &mut [T] {
        debug_assert_eq!(self.stride, 1, "Memref has non-trivial stride");
        &mut self.data[self.offset..self.offset + self.size]
    }
}

impl<'a, T> From<&'a mut [T]> for StridedMemRefTypeMut<'a, T> {
    fn from(data: &'a mut [T]) -> Self {
        let size = data.len();
        Self::new(data, 0, size, 1)
    }
}
