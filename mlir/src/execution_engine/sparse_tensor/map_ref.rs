/*!
# Dimension/level map wrapper

A `MapRef` pairs the `dim2lvl` and `lvl2dim` arrays of a sparse tensor encoding and translates dimension coordinates and sizes into level space.  Only permutations are applied for now; maps whose ranks differ, or which are not mutual inverses, are representable so that callers can be told why they were rejected, but pushing coordinates through them is unsupported.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/SparseTensor/MapRef.h>
- lib <https://github.com/llvm/llvm-project/blob/main/mlir/lib/ExecutionEngine/SparseTensor/MapRef.cpp>
*/

use super::error_handling::{Error, Result};
use super::permutation_ref::is_permutation;

#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapRef<'a> {
    dim2lvl: &'a [u64],
    lvl2dim: &'a [u64],
    is_permutation: bool
}

impl<'a> MapRef<'a> {
    /**
    Validates the pair of arrays.

    Errors:
    - `dim2lvl` does not have length `dim_rank`, or `lvl2dim` does not have length `lvl_rank`.
    - an entry of `dim2lvl` is not a level, or an entry of `lvl2dim` is not a dimension.
    */
    pub fn new(
        dim_rank: usize,
        lvl_rank: usize,
        dim2lvl: &'a [u64],
        lvl2dim: &'a [u64]
    ) -> Result<Self> {
        check_len("dim2lvl", dim_rank, dim2lvl)?;
        check_len("lvl2dim", lvl_rank, lvl2dim)?;
        check_range("dim2lvl", dim2lvl, lvl_rank)?;
        check_range("lvl2dim", lvl2dim, dim_rank)?;
        let is_permutation = dim_rank == lvl_rank
            && is_permutation(lvl2dim)
            && lvl2dim
                .iter()
                .enumerate()
                .all(|(l, &d)| dim2lvl[d as usize] == l as u64);
        Ok(Self {
            dim2lvl,
            lvl2dim,
            is_permutation
        })
    }

    /// As `new`, but additionally requires the two arrays to be mutually
    /// inverse permutations.
    pub fn permutation(dim2lvl: &'a [u64], lvl2dim: &'a [u64]) -> Result<Self> {
        let map = Self::new(dim2lvl.len(), lvl2dim.len(), dim2lvl, lvl2dim)?;
        if map.is_permutation {
            return Ok(map);
        }
        if dim2lvl.len() != lvl2dim.len() {
            return Err(Error::RankMismatch {
                what: "lvl2dim",
                expected: dim2lvl.len(),
                got: lvl2dim.len()
            });
        }
        if !is_permutation(dim2lvl) {
            return Err(Error::NotPermutation("dim2lvl"));
        }
        if !is_permutation(lvl2dim) {
            return Err(Error::NotPermutation("lvl2dim"));
        }
        let level = lvl2dim
            .iter()
            .enumerate()
            .position(|(l, &d)| dim2lvl[d as usize] != l as u64)
            .unwrap_or_default();
        Err(Error::NotInverse(level))
    }

    pub fn dim_rank(&self) -> usize {
        self.dim2lvl.len()
    }

    pub fn lvl_rank(&self) -> usize {
        self.lvl2dim.len()
    }

    pub fn dim2lvl(&self) -> &'a [u64] {
        self.dim2lvl
    }

    pub fn lvl2dim(&self) -> &'a [u64] {
        self.lvl2dim
    }

    pub fn is_permutation(&self) -> bool {
        self.is_permutation
    }

    /// Translates dimension coordinates into level coordinates:
    /// `lvl_coords[dim2lvl[d]] = dim_coords[d]`.
    #[inline]
    pub fn push_forward<T: Copy>(&self, dim_coords: &[T], lvl_coords: &mut [T]) {
        self.assert_permutation();
        debug_assert_eq!(dim_coords.len(), self.dim_rank());
        debug_assert_eq!(lvl_coords.len(), self.lvl_rank());
        for (d, &c) in dim_coords.iter().enumerate() {
            lvl_coords[self.dim2lvl[d] as usize] = c;
        }
    }

    /// Level sizes implied by the dimension sizes under this map.
    pub fn lvl_sizes(&self, dim_sizes: &[u64]) -> Vec<u64> {
        let mut lvl_sizes = vec![0; self.lvl_rank()];
        self.push_forward(dim_sizes, &mut lvl_sizes);
        lvl_sizes
    }

    fn assert_permutation(&self) {
        if !self.is_permutation {
            crate::sparse_tensor_fatal!(
                "non-permutation dim/level maps are not supported: dim2lvl={:?} lvl2dim={:?}",
                self.dim2lvl,
                self.lvl2dim
            );
        }
    }
}

fn check_len(what: &'static str, rank: usize, map: &[u64]) -> Result<()> {
    if map.len() == rank {
        Ok(())
    } else {
        Err(Error::RankMismatch {
            what,
            expected: rank,
            got: map.len()
        })
    }
}

fn check_range(what: &'static str, map: &[u64], rank: usize) -> Result<()> {
    match map.iter().position(|&x| x >= rank as u64) {
        None => Ok(()),
        Some(index) => Err(Error::MapOutOfRange {
            what,
            index,
            value: map[index],
            rank
        })
    }
}
