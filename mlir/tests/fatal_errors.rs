//! Contract violations terminate the process with a `SparseTensorUtils:`
//! diagnostic.  Each test re-runs itself in a child process, selected by
//! an environment variable, and inspects how the child died.

mod common;

use std::{
    env,
    process::{Command, Output}
};

use mlir_sparse_tensor::{
    dialect::sparse_tensor::ir::enums::{
        Action,
        DimLevelType::{self, Compressed, Dense},
        OverheadType, PrimaryType
    },
    execution_engine::{
        c_runner_utils::StridedMemRefType,
        sparse_tensor::{
            storage::SparseTensorStorage,
            type_matrix::{new_sparse_tensor, ActionInput, TypeTriple}
        },
        sparse_tensor_runtime
    }
};

use common::*;

const CHILD: &str = "SPARSE_TENSOR_FATAL_CHILD";

fn in_child(name: &str) -> bool {
    env::var(CHILD).as_deref() == Ok(name)
}

/// Runs the named test alone in a child process.
fn run_child(name: &str) -> Output {
    Command::new(env::current_exe().expect("test binary path"))
        .args([name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD, name)
        .output()
        .expect("Failed to re-run the test binary")
}

fn assert_fatal(output: &Output, diagnostic: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr);
    assert!(
        stderr.contains(&format!("SparseTensorUtils: {}", diagnostic)),
        "missing {:?} in stderr: {}",
        diagnostic,
        stderr
    );
}

fn tags(triple: TypeTriple) -> (u32, u32, u32) {
    (triple.pos as u32, triple.crd as u32, triple.val as u32)
}

/// Calls the raw-tag entry point on a 2 x `cols` matrix.
fn new_from_tags(lvl_types: &[DimLevelType], cols: u64, triple: TypeTriple, action: u32) {
    let sizes = [2, cols];
    let id = [0u64, 1];
    let (pos, crd, val) = tags(triple);
    sparse_tensor_runtime::new_sparse_tensor(
        &StridedMemRefType::alias(&sizes),
        &StridedMemRefType::alias(&sizes),
        &StridedMemRefType::alias(lvl_types),
        &StridedMemRefType::alias(&id),
        &StridedMemRefType::alias(&id),
        pos,
        crd,
        val,
        action,
        ActionInput::None
    );
}

#[test]
fn unsupported_triple_aborts() {
    if in_child("unsupported_triple_aborts") {
        let dim_sizes = [2, 3];
        let id = identity(2);
        let encoding = identity_encoding(&dim_sizes, &CSR, &id);
        let triple = TypeTriple::new(OverheadType::U8, OverheadType::U16, PrimaryType::C32);
        new_sparse_tensor(&encoding, triple, Action::Empty, ActionInput::None);
        return;
    }
    let output = run_child("unsupported_triple_aborts");
    assert_fatal(&output, "unsupported combination of types: <P=u8, C=u16, V=c32>");
}

#[test]
fn reserved_action_tag_aborts() {
    if in_child("reserved_action_tag_aborts") {
        new_from_tags(&CSR, 3, F64_TRIPLE, 1);
        return;
    }
    let output = run_child("reserved_action_tag_aborts");
    assert_fatal(&output, "unknown action: 1");
}

#[test]
fn unknown_overhead_tag_aborts() {
    if in_child("unknown_overhead_tag_aborts") {
        let sizes = [2u64, 3];
        let id = [0u64, 1];
        sparse_tensor_runtime::new_sparse_tensor(
            &StridedMemRefType::alias(&sizes),
            &StridedMemRefType::alias(&sizes),
            &StridedMemRefType::alias(&CSR),
            &StridedMemRefType::alias(&id),
            &StridedMemRefType::alias(&id),
            9,
            OverheadType::U64 as u32,
            PrimaryType::F64 as u32,
            Action::Empty as u32,
            ActionInput::None
        );
        return;
    }
    let output = run_child("unknown_overhead_tag_aborts");
    assert_fatal(&output, "unknown overhead type: 9");
}

#[test]
fn singleton_without_parent_aborts() {
    if in_child("singleton_without_parent_aborts") {
        new_from_tags(&[DimLevelType::Singleton, Compressed], 3, F64_TRIPLE, Action::Empty as u32);
        return;
    }
    let output = run_child("singleton_without_parent_aborts");
    assert_fatal(
        &output,
        "level 0 has type singleton: must follow a non-unique compressed or singleton level"
    );
}

#[test]
fn narrow_coordinates_abort_at_the_boundary() {
    if in_child("narrow_coordinates_abort_at_the_boundary") {
        let triple = TypeTriple::new(OverheadType::U8, OverheadType::U8, PrimaryType::F64);
        new_from_tags(&[Dense, Compressed], 300, triple, Action::Empty as u32);
        return;
    }
    let output = run_child("narrow_coordinates_abort_at_the_boundary");
    assert_fatal(&output, "level 1 has size 300, which u8 coordinates cannot address");
}

#[test]
fn narrow_coordinates_abort_direct_construction() {
    if in_child("narrow_coordinates_abort_direct_construction") {
        // Bypasses encoding validation; the storage itself must refuse.
        let mut tensor =
            SparseTensorStorage::<u8, u8, f64>::new_empty(&[2, 300], &[2, 300], &[Dense, Compressed], &[0, 1]);
        tensor.lex_insert(&[0, 299], 1.0);
        tensor.end_insert();
        println!("stored {:?}", tensor.coordinates(1));
        return;
    }
    let output = run_child("narrow_coordinates_abort_direct_construction");
    assert_fatal(&output, "level 1 has size 300, which u8 coordinates cannot address");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("stored"));
}

#[test]
fn position_overflow_aborts() {
    if in_child("position_overflow_aborts") {
        // 300 entries in one compressed level overflow u8 positions.
        let mut tensor =
            SparseTensorStorage::<u8, u16, f64>::new_empty(&[1, 300], &[1, 300], &[Dense, Compressed], &[0, 1]);
        for c in 0..300 {
            tensor.lex_insert(&[0, c], 1.0);
        }
        tensor.end_insert();
        return;
    }
    let output = run_child("position_overflow_aborts");
    assert_fatal(&output, "position 300 of level 1 does not fit u8");
}
