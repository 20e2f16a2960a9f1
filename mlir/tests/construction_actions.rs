//! Integration tests for the construction actions of the type-matrix
//! dispatcher: every provenance path, insertion modes and the support set.

mod common;

use mlir_sparse_tensor::{
    dialect::sparse_tensor::ir::enums::{
        Action,
        DimLevelType::{CompressedNu, Singleton},
        OverheadType, PrimaryType
    },
    execution_engine::sparse_tensor::{
        error_handling::Error,
        type_matrix::{
            new_sparse_tensor, try_new_sparse_tensor, ActionInput, SparseTensorEncoding,
            SparseTensorHandle, StorageValue, TypeTriple
        }
    }
};

use common::*;

fn from_coo(encoding: &SparseTensorEncoding<'_>, entries: &[(Vec<u64>, f64)]) -> SparseTensorHandle {
    let coo = coo_from(encoding.lvl_sizes, entries);
    new_sparse_tensor(encoding, F64_TRIPLE, Action::FromCOO, ActionInput::Coo(f64::wrap_coo(coo)))
        .into_tensor()
        .unwrap()
}

fn to_coo(encoding: &SparseTensorEncoding<'_>, tensor: &SparseTensorHandle) -> Vec<(Vec<u64>, f64)> {
    let coo = new_sparse_tensor(encoding, F64_TRIPLE, Action::ToCOO, ActionInput::Tensor(tensor))
        .into_coo()
        .unwrap();
    elements(&f64::into_coo(coo).unwrap())
}

#[test]
fn concrete_scenario() {
    let dim_sizes = [2, 3];
    let id = identity(2);
    let encoding = identity_encoding(&dim_sizes, &CSR, &id);
    let entries = vec![(vec![0, 1], 5.0), (vec![1, 2], 7.0)];
    let mut tensor = from_coo(&encoding, &entries);
    tensor.end_insert();
    assert_eq!(tensor.values::<f64>().len(), 2);
    assert_eq!(to_coo(&encoding, &tensor), entries);
}

#[test]
fn every_supported_triple_survives_empty_finalize_release() {
    let dim_sizes = [4, 5];
    let id = identity(2);
    let encoding = identity_encoding(&dim_sizes, &CSR, &id);
    for &triple in TypeTriple::SUPPORTED {
        let mut tensor = try_new_sparse_tensor(&encoding, triple, Action::Empty, ActionInput::None)
            .unwrap_or_else(|err| panic!("{}: {}", triple, err))
            .into_tensor()
            .unwrap();
        assert_eq!(tensor.type_triple(), triple);
        tensor.end_insert();
        assert!(tensor.is_finalized());
        assert_eq!(tensor.positions_ref(1).to_u64_vec(), vec![0; 5]);
        assert!(tensor.coordinates_ref(1).is_empty());
        drop(tensor);
    }
}

#[test]
fn triples_outside_the_support_set_are_rejected_by_name() {
    const WIDTHS: [OverheadType; 4] = [OverheadType::U64, OverheadType::U32, OverheadType::U16, OverheadType::U8];
    const VALUES: [PrimaryType; 10] = [
        PrimaryType::F64,
        PrimaryType::F32,
        PrimaryType::F16,
        PrimaryType::BF16,
        PrimaryType::I64,
        PrimaryType::I32,
        PrimaryType::I16,
        PrimaryType::I8,
        PrimaryType::C64,
        PrimaryType::C32
    ];
    let dim_sizes = [4, 5];
    let id = identity(2);
    let encoding = identity_encoding(&dim_sizes, &CSR, &id);
    let mut rejected = 0;
    for pos in WIDTHS {
        for crd in WIDTHS {
            for val in VALUES {
                let triple = TypeTriple::new(pos, crd, val);
                if triple.is_supported() {
                    continue;
                }
                let err = try_new_sparse_tensor(&encoding, triple, Action::Empty, ActionInput::None).unwrap_err();
                assert!(matches!(err, Error::UnsupportedTypes { .. }));
                assert!(err.to_string().contains(&triple.to_string()), "{}", err);
                rejected += 1;
            }
        }
    }
    assert_eq!(rejected, 4 * 4 * 10 - TypeTriple::SUPPORTED.len());
}

#[test]
fn expanded_and_lexicographic_insertion_agree() {
    let dim_sizes = [2, 3];
    let id = identity(2);
    let encoding = identity_encoding(&dim_sizes, &CSR, &id);
    let empty = || {
        new_sparse_tensor(&encoding, F64_TRIPLE, Action::Empty, ActionInput::None)
            .into_tensor()
            .unwrap()
    };

    let mut lex = empty();
    for (col, value) in [(0, 1.0), (1, 2.0), (2, 3.0)] {
        lex.lex_insert::<f64>(&[0, col], value);
    }
    lex.end_insert();

    let mut exp = empty();
    let mut values = [1.0, 2.0, 3.0];
    let mut filled = [true; 3];
    // Out of order on purpose; the runtime sorts the added list.
    let mut added = [2, 0, 1];
    exp.exp_insert::<f64>(&mut [0, 0], &mut values, &mut filled, &mut added, 3);
    exp.end_insert();

    assert_eq!(values, [0.0; 3]);
    assert_eq!(filled, [false; 3]);
    assert_eq!(overhead(&lex), overhead(&exp));
    assert_eq!(lex.values::<f64>(), exp.values::<f64>());
    assert_eq!(exp.positions::<u64>(1), &[0, 3, 3]);
}

#[test]
fn finalize_is_idempotent() {
    let dim_sizes = [3, 4];
    let id = identity(2);
    let encoding = identity_encoding(&dim_sizes, &DCSR, &id);
    let mut tensor = new_sparse_tensor(&encoding, F64_TRIPLE, Action::Empty, ActionInput::None)
        .into_tensor()
        .unwrap();
    tensor.lex_insert::<f64>(&[0, 3], 1.5);
    tensor.lex_insert::<f64>(&[2, 1], -2.0);
    tensor.end_insert();
    let first = (overhead(&tensor), tensor.values::<f64>().to_vec());
    tensor.end_insert();
    let second = (overhead(&tensor), tensor.values::<f64>().to_vec());
    assert_eq!(first, second);
    assert_eq!(first.0 .0, vec![vec![0, 2], vec![0, 1, 2]]);
}

#[test]
fn sparse_to_sparse_reorders_levels_and_narrows_overhead() {
    let dim_sizes = [2, 3];
    let id = identity(2);
    let csr = identity_encoding(&dim_sizes, &CSR, &id);
    let source = from_coo(&csr, &[(vec![0, 1], 5.0), (vec![1, 0], 2.0), (vec![1, 2], 7.0)]);

    let csc = SparseTensorEncoding {
        dim_sizes: &dim_sizes,
        lvl_sizes: &[3, 2],
        lvl_types: &DCSR,
        dim2lvl: &[1, 0],
        lvl2dim: &[1, 0]
    };
    let triple = TypeTriple::new(OverheadType::U16, OverheadType::U16, PrimaryType::F64);
    let target = new_sparse_tensor(&csc, triple, Action::SparseToSparse, ActionInput::Tensor(&source))
        .into_tensor()
        .unwrap();
    assert!(matches!(target, SparseTensorHandle::P16C16F64(_)));
    assert_eq!(target.lvl_size(0), 3);
    assert_eq!(target.positions::<u16>(0), &[0, 3]);
    assert_eq!(target.coordinates::<u16>(0), &[0, 1, 2]);
    assert_eq!(target.positions::<u16>(1), &[0, 1, 2, 3]);
    assert_eq!(target.coordinates::<u16>(1), &[1, 0, 1]);
    assert_eq!(target.values::<f64>(), &[2.0, 5.0, 7.0]);

    // Both export the same dimension-space elements.
    let mut a = to_coo(&csr, &source);
    let mut b = {
        let coo = new_sparse_tensor(&csr, triple, Action::ToCOO, ActionInput::Tensor(&target))
            .into_coo()
            .unwrap();
        elements(&f64::into_coo(coo).unwrap())
    };
    a.sort_by(|x, y| x.0.cmp(&y.0));
    b.sort_by(|x, y| x.0.cmp(&y.0));
    assert_eq!(a, b);
}

#[test]
fn pack_reproduces_the_supplied_buffers() {
    let dim_sizes = [3, 3];
    let id = identity(2);
    let encoding = identity_encoding(&dim_sizes, &CSR, &id);
    let positions: [u32; 4] = [0, 1, 1, 3];
    let coordinates: [u32; 3] = [2, 0, 1];
    let values: [f64; 3] = [1.0, 2.0, 3.0];
    let buffers: [&[u8]; 3] = [
        bytemuck::cast_slice(&positions),
        bytemuck::cast_slice(&coordinates),
        bytemuck::cast_slice(&values)
    ];
    let triple = TypeTriple::new(OverheadType::U32, OverheadType::U32, PrimaryType::F64);
    let tensor = new_sparse_tensor(&encoding, triple, Action::Pack, ActionInput::Buffers(&buffers))
        .into_tensor()
        .unwrap();
    assert!(tensor.is_finalized());
    assert_eq!(tensor.positions::<u32>(1), &positions);
    assert_eq!(tensor.coordinates::<u32>(1), &coordinates);
    assert_eq!(tensor.values::<f64>(), &values);
    assert_eq!(to_coo(&encoding, &tensor).len(), 3);
}

#[test]
fn pack_splits_an_array_of_structs_coo() {
    let dim_sizes = [2, 3];
    let id = identity(2);
    let lvl_types = [CompressedNu, Singleton];
    let encoding = identity_encoding(&dim_sizes, &lvl_types, &id);
    let positions: [u64; 2] = [0, 3];
    let aos: [u64; 6] = [0, 1, 1, 0, 1, 2];
    let values: [i32; 3] = [4, 5, 6];
    let buffers: [&[u8]; 3] = [
        bytemuck::cast_slice(&positions),
        bytemuck::cast_slice(&aos),
        bytemuck::cast_slice(&values)
    ];
    let triple = TypeTriple::new(OverheadType::Index, OverheadType::Index, PrimaryType::I32);
    let tensor = new_sparse_tensor(&encoding, triple, Action::Pack, ActionInput::Buffers(&buffers))
        .into_tensor()
        .unwrap();
    assert_eq!(tensor.positions::<u64>(0), &positions);
    assert_eq!(tensor.coordinates::<u64>(0), &[0, 1, 1]);
    assert_eq!(tensor.coordinates::<u64>(1), &[1, 0, 2]);
    assert_eq!(tensor.values::<i32>(), &values);
}

#[test]
fn iterator_owns_its_elements() {
    let dim_sizes = [2, 2];
    let id = identity(2);
    let encoding = identity_encoding(&dim_sizes, &DCSR, &id);
    let tensor = from_coo(&encoding, &[(vec![1, 1], 4.0), (vec![0, 0], 3.0)]);
    let mut iter = new_sparse_tensor(&encoding, F64_TRIPLE, Action::ToIterator, ActionInput::Tensor(&tensor))
        .into_iterator()
        .unwrap();
    // The tensor may go away; the iterator holds its own copy.
    drop(tensor);
    let iter = f64::iterator_mut(&mut iter).unwrap();
    assert_eq!(iter.remaining(), 2);
    let mut seen = Vec::new();
    while let Some(element) = iter.get_next() {
        seen.push((element.coords.to_vec(), element.value));
    }
    assert_eq!(seen, vec![(vec![0, 0], 3.0), (vec![1, 1], 4.0)]);
    assert!(iter.get_next().is_none());
}

#[test]
fn inputs_must_match_the_action() {
    let dim_sizes = [2, 2];
    let id = identity(2);
    let encoding = identity_encoding(&dim_sizes, &CSR, &id);
    for action in [Action::SparseToSparse, Action::ToCOO, Action::ToIterator] {
        assert!(matches!(
            try_new_sparse_tensor(&encoding, F64_TRIPLE, action, ActionInput::None),
            Err(Error::MissingInput { .. })
        ));
    }
    assert!(matches!(
        try_new_sparse_tensor(&encoding, F64_TRIPLE, Action::Pack, ActionInput::None),
        Err(Error::MissingInput { action: Action::Pack, .. })
    ));
    let source = from_coo(&encoding, &[(vec![0, 0], 1.0)]);
    let f32_triple = TypeTriple::new(OverheadType::U64, OverheadType::U64, PrimaryType::F32);
    assert!(matches!(
        try_new_sparse_tensor(&encoding, f32_triple, Action::ToCOO, ActionInput::Tensor(&source)),
        Err(Error::ValueTypeMismatch { expected: PrimaryType::F32, got: PrimaryType::F64, .. })
    ));
}
