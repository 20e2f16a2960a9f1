//! Common test utilities
#![allow(dead_code)]

use mlir_sparse_tensor::{
    dialect::sparse_tensor::ir::enums::{
        DimLevelType::{self, Compressed, Dense},
        OverheadType, PrimaryType
    },
    execution_engine::sparse_tensor::{
        coo::SparseTensorCoo,
        type_matrix::{SparseTensorEncoding, SparseTensorHandle, TypeTriple},
        types::Primary
    }
};

pub const CSR: [DimLevelType; 2] = [Dense, Compressed];
pub const DCSR: [DimLevelType; 2] = [Compressed, Compressed];

pub const F64_TRIPLE: TypeTriple = TypeTriple::new(OverheadType::U64, OverheadType::U64, PrimaryType::F64);

pub fn identity(rank: usize) -> Vec<u64> {
    (0..rank as u64).collect()
}

/// An encoding whose levels are the dimensions, in order.
pub fn identity_encoding<'a>(
    dim_sizes: &'a [u64],
    lvl_types: &'a [DimLevelType],
    identity: &'a [u64]
) -> SparseTensorEncoding<'a> {
    SparseTensorEncoding {
        dim_sizes,
        lvl_sizes: dim_sizes,
        lvl_types,
        dim2lvl: identity,
        lvl2dim: identity
    }
}

pub fn coo_from<V: Primary>(sizes: &[u64], entries: &[(Vec<u64>, V)]) -> SparseTensorCoo<V> {
    let mut coo = SparseTensorCoo::new(sizes, entries.len());
    for (coords, value) in entries {
        coo.add(coords, *value);
    }
    coo
}

/// The elements of `coo`, in its current order.
pub fn elements<V: Primary>(coo: &SparseTensorCoo<V>) -> Vec<(Vec<u64>, V)> {
    coo.iter().map(|e| (e.coords.to_vec(), e.value)).collect()
}

/// Positions and coordinates of every level, widened to `u64`.
pub fn overhead(tensor: &SparseTensorHandle) -> (Vec<Vec<u64>>, Vec<Vec<u64>>) {
    let lvl_rank = tensor.lvl_rank();
    let positions = (0..lvl_rank).map(|l| tensor.positions_ref(l).to_u64_vec()).collect();
    let coordinates = (0..lvl_rank).map(|l| tensor.coordinates_ref(l).to_u64_vec()).collect();
    (positions, coordinates)
}
