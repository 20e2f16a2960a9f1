/*!
# Permutation reference wrapper

This file is part of the lightweight runtime support library for sparse tensor manipulations.  The functionality of the support library is meant to simplify benchmarking, testing, and debugging MLIR code operating on sparse tensors.  However, the provided functionality is **not** part of core MLIR itself.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/SparseTensor/PermutationRef.h>
- lib <https://github.com/llvm/llvm-project/blob/main/mlir/lib/ExecutionEngine/SparseTensor/PermutationRef.cpp>
*/

use super::error_handling::{Error, Result};

/// Checks whether the `perm` array is a permutation of `[0 .. perm.len())`.
pub fn is_permutation(perm: &[u64]) -> bool {
    let len = perm.len();
    let mut seen = vec![false; len];
    for &j in perm {
        let Ok(j) = usize::try_from(j) else {
            return false;
        };
        if j >= len || seen[j] {
            return false;
        }
        seen[j] = true;
    }
    true
}

/**
A non-owning wrapper capturing the knowledge that `is_permutation` is true, to avoid needing to assert it repeatedly.
*/
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PermutationRef<'a> {
    perm: &'a [u64]
}

impl<'a> PermutationRef<'a> {
    /// Validates `perm` and wraps it.  `rank` is the length the caller
    /// expects the permutation to have.
    pub fn new(rank: usize, perm: &'a [u64]) -> Result<Self> {
        if perm.len() != rank {
            return Err(Error::RankMismatch {
                what: "permutation",
                expected: rank,
                got: perm.len()
            });
        }
        if !is_permutation(perm) {
            return Err(Error::NotPermutation("permutation"));
        }
        Ok(Self { perm })
    }

    pub fn size(&self) -> usize {
        self.perm.len()
    }

    pub fn as_slice(&self) -> &'a [u64] {
        self.perm
    }

    /// Entries were range-checked against `size` by `new`, so they fit.
    #[inline]
    pub fn at(&self, i: usize) -> usize {
        self.perm[i] as usize
    }

    /// Scatters `values` so that `out[perm[i]] = values[i]`.
    #[inline]
    pub fn push_forward<T: Copy>(&self, values: &[T], out: &mut [T]) {
        debug_assert_eq!(values.len(), self.size());
        debug_assert_eq!(out.len(), self.size());
        for (i, &v) in values.iter().enumerate() {
            out[self.at(i)] = v;
        }
    }

    /// Allocating form of `push_forward`.
    pub fn push_forward_vec<T: Copy + Default>(&self, values: &[T]) -> Vec<T> {
        let mut out = vec![T::default(); self.size()];
        self.push_forward(values, &mut out);
        out
    }

    /// Gathers `values` so that `out[i] = values[perm[i]]`.
    #[inline]
    pub fn permute<T: Copy>(&self, values: &[T], out: &mut [T]) {
        debug_assert_eq!(values.len(), self.size());
        debug_assert_eq!(out.len(), self.size());
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = values[self.at(i)];
        }
    }

    /**
    Constructs the inverse permutation.  This is equivalent to calling `push_forward` with `0..size` for the values.
    */
    pub fn inverse(&self) -> Vec<u64> {
        let mut out = vec![0; self.size()];
        for (i, &p) in self.perm.iter().enumerate() {
            out[p as usize] = i as u64;
        }
        out
    }
}
