/*!
This file provides the functions which comprise the public API of the runtime support library for the SparseTensor dialect.

This file implements a light-weight runtime support library for manipulating sparse tensors from MLIR.  More specifically, it provides the entry points that MLIR-generated code calls into.  The functionality provided in this library is meant to simplify benchmarking, testing, and debugging of MLIR code operating on sparse tensors.  However, the provided functionality is **not** part of core MLIR itself.

The following memory-resident sparse storage schemes are supported:

(a) A coordinate scheme for temporarily storing and lexicographically
    sorting a sparse tensor by coordinate (`SparseTensorCoo`).

(b) A 'one-size-fits-all' sparse tensor storage scheme defined by
    per-level sparse/dense annotations together with a dimension
    ordering used by MLIR compiler-generated code (`SparseTensorStorage`).

Two public APIs are supported:

(I) Functions operating on MLIR buffers (memrefs) to interact with sparse
    tensors.  These should be used exclusively by MLIR compiler-generated
    code.

(II) Functions that accept plain slices to interact with sparse tensors.
     These can be used by any external runtime that wants to interact
     with MLIR compiler-generated code.

In both cases the storage is only visible as an opaque handle.  Raw type and action tags are decoded here; a tag that does not decode, or a request the support set cannot serve, is a contract violation and terminates the process.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/SparseTensorRuntime.h>
- lib <https://github.com/llvm/llvm-project/blob/main/mlir/lib/ExecutionEngine/SparseTensorRuntime.cpp>
*/

use std::{io::Write, path::Path};

use tracing::{debug, trace};

use crate::{
    dialect::sparse_tensor::ir::enums::{Action, DimLevelType, OverheadType, PrimaryType},
    execution_engine::{
        c_runner_utils::{StridedMemRefType, StridedMemRefTypeMut},
        sparse_tensor::{
            arithmetic_utils::to_usize,
            coo::SparseTensorCoo,
            error_handling::{fatal_on_error, Result},
            file::{self, SparseTensorReader, SparseTensorWriter},
            permutation_ref::PermutationRef,
            storage::SparseTensorStorage,
            type_matrix::{
                self, dispatch_triple, ActionInput, ActionOutput, SparseTensorCooHandle,
                SparseTensorEncoding, SparseTensorHandle, SparseTensorIteratorHandle,
                StorageValue, TripleVisitor, TypeTriple
            },
            types::{Overhead, Primary}
        }
    },
    sparse_tensor_fatal
};

fn decode_triple(pos_tp: u32, crd_tp: u32, val_tp: u32) -> Result<TypeTriple> {
    Ok(TypeTriple::new(
        OverheadType::try_from(pos_tp)?,
        OverheadType::try_from(crd_tp)?,
        PrimaryType::try_from(val_tp)?
    ))
}

/*
Public functions which operate on MLIR buffers (memrefs) to interact
with sparse tensors (which are only visible as opaque handles externally).
*/

/**
Constructs a new sparse tensor, COO or iterator, as selected by the raw `action` tag, with the specialisation selected by the raw type tags.  See `type_matrix::new_sparse_tensor` for the actions and what `input` each requires.

Fatal: unknown tags, an unsupported type triple, malformed maps, or a mismatched `input`.
*/
#[allow(clippy::too_many_arguments)]
pub fn new_sparse_tensor(
    dim_sizes_ref: &StridedMemRefType<'_, u64>,
    lvl_sizes_ref: &StridedMemRefType<'_, u64>,
    lvl_types_ref: &StridedMemRefType<'_, DimLevelType>,
    dim2lvl_ref: &StridedMemRefType<'_, u64>,
    lvl2dim_ref: &StridedMemRefType<'_, u64>,
    pos_tp: u32,
    crd_tp: u32,
    val_tp: u32,
    action: u32,
    input: ActionInput<'_>
) -> ActionOutput {
    debug_assert_eq!(dim_sizes_ref.size(), dim2lvl_ref.size(), "Dimension-rank mismatch");
    debug_assert_eq!(lvl_sizes_ref.size(), lvl_types_ref.size(), "Level-rank mismatch");
    debug_assert_eq!(lvl_sizes_ref.size(), lvl2dim_ref.size(), "Level-rank mismatch");
    let triple = fatal_on_error(decode_triple(pos_tp, crd_tp, val_tp));
    let action = fatal_on_error(Action::try_from(action));
    let encoding = SparseTensorEncoding {
        dim_sizes: dim_sizes_ref.payload(),
        lvl_sizes: lvl_sizes_ref.payload(),
        lvl_types: lvl_types_ref.payload(),
        dim2lvl: dim2lvl_ref.payload(),
        lvl2dim: lvl2dim_ref.payload()
    };
    type_matrix::new_sparse_tensor(&encoding, triple, action, input)
}

/// Aliases the values array of the tensor; no copy is made.
pub fn sparse_values<V: StorageValue>(tensor: &SparseTensorHandle) -> StridedMemRefType<'_, V> {
    StridedMemRefType::alias(tensor.values::<V>())
}

/// Aliases the positions array of level `lvl`.
pub fn sparse_positions<P: Overhead>(tensor: &SparseTensorHandle, lvl: u64) -> StridedMemRefType<'_, P> {
    StridedMemRefType::alias(tensor.positions::<P>(to_usize(lvl)))
}

/// Aliases the coordinates array of level `lvl`.
pub fn sparse_coordinates<C: Overhead>(tensor: &SparseTensorHandle, lvl: u64) -> StridedMemRefType<'_, C> {
    StridedMemRefType::alias(tensor.coordinates::<C>(to_usize(lvl)))
}

/**
Adds one element, given in dimension coordinates, to a COO in level space.  The coordinates are pushed through `dim2lvl`, which must be a permutation.
*/
pub fn add_elt<V: StorageValue>(
    lvl_coo: &mut SparseTensorCooHandle,
    vref: &V,
    dim_coords_ref: &StridedMemRefType<'_, u64>,
    dim2lvl_ref: &StridedMemRefType<'_, u64>
) {
    let dim_coords = dim_coords_ref.payload();
    let dim2lvl = fatal_on_error(PermutationRef::new(dim_coords.len(), dim2lvl_ref.payload()));
    let lvl_coords = dim2lvl.push_forward_vec(dim_coords);
    let held = lvl_coo.val_type();
    match V::coo_mut(lvl_coo) {
        Some(coo) => coo.add(&lvl_coords, *vref),
        None => sparse_tensor_fatal!("COO of {} values cannot hold {}", held, V::KIND)
    }
}

/**
Advances the iterator.  On success the element's coordinates are copied into `lvl_coords_ref` and its value into `vref`, and `true` is returned; once exhausted, returns `false` and leaves the outputs untouched.
*/
pub fn get_next<V: StorageValue>(
    iter: &mut SparseTensorIteratorHandle,
    lvl_coords_ref: &mut StridedMemRefTypeMut<'_, u64>,
    vref: &mut V
) -> bool {
    let held = iter.val_type();
    let iter = match V::iterator_mut(iter) {
        Some(iter) => iter,
        None => sparse_tensor_fatal!("iterator over {} values read as {}", held, V::KIND)
    };
    debug_assert_eq!(lvl_coords_ref.size(), iter.rank(), "Rank mismatch");
    match iter.get_next() {
        Some(element) => {
            lvl_coords_ref.payload_mut().copy_from_slice(element.coords);
            *vref = element.value;
            true
        }
        None => false
    }
}

/// Inserts `vref` at the given level coordinates.
pub fn lex_insert<V: StorageValue>(
    tensor: &mut SparseTensorHandle,
    lvl_coords_ref: &StridedMemRefType<'_, u64>,
    vref: &V
) {
    debug_assert_eq!(lvl_coords_ref.size(), tensor.lvl_rank(), "Level-rank mismatch");
    tensor.lex_insert::<V>(lvl_coords_ref.payload(), *vref)
}

/**
Inserts the `count` entries of the expanded access pattern into the innermost-level segment named by the prefix of `lvl_coords_ref`, then resets the expanded buffers for reuse.
*/
pub fn exp_insert<V: StorageValue>(
    tensor: &mut SparseTensorHandle,
    lvl_coords_ref: &mut StridedMemRefTypeMut<'_, u64>,
    vref: &mut StridedMemRefTypeMut<'_, V>,
    fref: &mut StridedMemRefTypeMut<'_, bool>,
    aref: &mut StridedMemRefTypeMut<'_, u64>,
    count: u64
) {
    debug_assert_eq!(vref.size(), fref.size(), "Expanded values and filled differ in size");
    debug_assert!(to_usize(count) <= aref.size(), "More added entries than the buffer holds");
    tensor.exp_insert::<V>(
        lvl_coords_ref.payload_mut(),
        vref.payload_mut(),
        fref.payload_mut(),
        aref.payload_mut(),
        to_usize(count)
    )
}

/// Finalises lexicographic insertions.
pub fn end_insert(tensor: &mut SparseTensorHandle) {
    tensor.end_insert()
}

/**
Creates a reader for the file, and checks its header against the expected shape and value type.  Zero entries of `dim_shape_ref` mark dynamic sizes.
*/
pub fn create_checked_sparse_tensor_reader(
    filename: &Path,
    dim_shape_ref: &StridedMemRefType<'_, u64>,
    val_tp: u32
) -> SparseTensorReader {
    let val_tp = fatal_on_error(PrimaryType::try_from(val_tp));
    fatal_on_error(SparseTensorReader::create(filename, dim_shape_ref.payload(), val_tp))
}

/// Aliases the dimension sizes read from the file header.
pub fn get_sparse_tensor_reader_dim_sizes(reader: &SparseTensorReader) -> StridedMemRefType<'_, u64> {
    StridedMemRefType::alias(reader.dim_sizes())
}

/**
Reads the file's elements into level-coordinate and value buffers.  Returns whether they arrived in sorted level order.
*/
pub fn get_sparse_tensor_reader_read_to_buffers<C: Overhead, V: Primary>(
    reader: &mut SparseTensorReader,
    dim2lvl_ref: &StridedMemRefType<'_, u64>,
    lvl2dim_ref: &StridedMemRefType<'_, u64>,
    cref: &mut StridedMemRefTypeMut<'_, C>,
    vref: &mut StridedMemRefTypeMut<'_, V>
) -> bool {
    debug_assert_eq!(dim2lvl_ref.size(), reader.rank(), "Dimension-rank mismatch");
    fatal_on_error(reader.read_to_buffers(
        dim2lvl_ref.payload(),
        lvl2dim_ref.payload(),
        cref.payload_mut(),
        vref.payload_mut()
    ))
}

struct ReadSparseTensor<'a> {
    reader: &'a mut SparseTensorReader,
    lvl_sizes: &'a [u64],
    lvl_types: &'a [DimLevelType],
    dim2lvl: &'a [u64],
    lvl2dim: &'a [u64]
}

impl TripleVisitor for ReadSparseTensor<'_> {
    type Output = Result<SparseTensorHandle>;

    fn visit<P: Overhead, C: Overhead, V: StorageValue>(self) -> Self::Output
    where
        SparseTensorStorage<P, C, V>: Into<SparseTensorHandle>
    {
        let tensor = self.reader.read_sparse_tensor::<P, C, V>(
            self.lvl_sizes,
            self.lvl_types,
            self.dim2lvl,
            self.lvl2dim
        )?;
        Ok(tensor.into())
    }
}

/// Reads the whole file into a new sparse tensor of the selected
/// specialisation.
#[allow(clippy::too_many_arguments)]
pub fn new_sparse_tensor_from_reader(
    reader: &mut SparseTensorReader,
    lvl_sizes_ref: &StridedMemRefType<'_, u64>,
    lvl_types_ref: &StridedMemRefType<'_, DimLevelType>,
    dim2lvl_ref: &StridedMemRefType<'_, u64>,
    lvl2dim_ref: &StridedMemRefType<'_, u64>,
    pos_tp: u32,
    crd_tp: u32,
    val_tp: u32
) -> SparseTensorHandle {
    debug_assert_eq!(lvl_sizes_ref.size(), lvl_types_ref.size(), "Level-rank mismatch");
    let triple = fatal_on_error(decode_triple(pos_tp, crd_tp, val_tp));
    debug!(path = %reader.path().display(), %triple, "new sparse tensor from reader");
    let visitor = ReadSparseTensor {
        reader,
        lvl_sizes: lvl_sizes_ref.payload(),
        lvl_types: lvl_types_ref.payload(),
        dim2lvl: dim2lvl_ref.payload(),
        lvl2dim: lvl2dim_ref.payload()
    };
    match dispatch_triple(triple, visitor) {
        Some(result) => fatal_on_error(result),
        None => fatal_on_error(Err(triple.unsupported()))
    }
}

/// Writes the metadata record: rank and NSE, then the dimension sizes.
pub fn out_sparse_tensor_writer_meta_data<W: Write>(
    writer: &mut SparseTensorWriter<W>,
    dim_rank: u64,
    nse: u64,
    dim_sizes_ref: &StridedMemRefType<'_, u64>
) {
    debug_assert_eq!(to_usize(dim_rank), dim_sizes_ref.size(), "Dimension-rank mismatch");
    fatal_on_error(writer.write_meta_data(nse, dim_sizes_ref.payload()))
}

/// Writes one element record, with one-based coordinates.
pub fn out_sparse_tensor_writer_next<V: Primary, W: Write>(
    writer: &mut SparseTensorWriter<W>,
    dim_rank: u64,
    dim_coords_ref: &StridedMemRefType<'_, u64>,
    vref: &V
) {
    debug_assert_eq!(to_usize(dim_rank), dim_coords_ref.size(), "Dimension-rank mismatch");
    fatal_on_error(writer.write_element(dim_coords_ref.payload(), *vref))
}

/*
Public functions which accept only plain data to interact with sparse
tensors (which are only visible as opaque handles externally).
*/

/// Gets the size of storage level `l`.
pub fn sparse_lvl_size(tensor: &SparseTensorHandle, l: u64) -> u64 {
    tensor.lvl_size(to_usize(l))
}

/// Gets the size of tensor dimension `d`.
pub fn sparse_dim_size(tensor: &SparseTensorHandle, d: u64) -> u64 {
    tensor.dim_size(to_usize(d))
}

/**
Writes the COO to `dest` (standard output when `None`) in extended FROSTT format, sorting it first if requested.
*/
pub fn out_sparse_tensor<V: StorageValue>(coo: &mut SparseTensorCooHandle, dest: Option<&Path>, sort: bool) {
    if sort {
        coo.sort();
    }
    let held = coo.val_type();
    match V::coo_ref(coo) {
        Some(coo) => fatal_on_error(file::write_ext_frostt(coo, dest)),
        None => sparse_tensor_fatal!("COO of {} values written as {}", held, V::KIND)
    }
}

/// Releases the storage.
pub fn del_sparse_tensor(tensor: SparseTensorHandle) {
    trace!(triple = %tensor.type_triple(), "release sparse tensor");
    drop(tensor)
}

pub fn del_sparse_tensor_coo(coo: SparseTensorCooHandle) {
    trace!(nse = coo.len(), "release COO");
    drop(coo)
}

/// Releases the iterator together with the COO it walks.
pub fn del_sparse_tensor_iterator(iter: SparseTensorIteratorHandle) {
    trace!(rank = iter.rank(), "release iterator");
    drop(iter)
}

/// Reads just the shape of the tensor in the file into `out`.
pub fn read_sparse_tensor_shape(filename: &Path, out: &mut Vec<u64>) {
    let dim_sizes = fatal_on_error(file::read_sparse_tensor_shape(filename));
    out.clear();
    out.extend_from_slice(&dim_sizes);
}

pub fn get_sparse_tensor_reader_rank(reader: &SparseTensorReader) -> u64 {
    reader.rank() as u64
}

pub fn get_sparse_tensor_reader_is_symmetric(reader: &SparseTensorReader) -> bool {
    reader.is_symmetric()
}

pub fn get_sparse_tensor_reader_nse(reader: &SparseTensorReader) -> u64 {
    reader.nse()
}

pub fn get_sparse_tensor_reader_dim_size(reader: &SparseTensorReader, d: u64) -> u64 {
    reader.dim_size(to_usize(d))
}

pub fn del_sparse_tensor_reader(reader: SparseTensorReader) {
    trace!(path = %reader.path().display(), "release reader");
    drop(reader)
}

/// Creates a writer for `filename`; the empty name selects standard output.
pub fn create_sparse_tensor_writer(filename: &str) -> SparseTensorWriter<Box<dyn Write>> {
    let path = (!filename.is_empty()).then(|| Path::new(filename));
    fatal_on_error(SparseTensorWriter::create(path))
}

/// Flushes and releases the writer.
pub fn del_sparse_tensor_writer<W: Write>(writer: SparseTensorWriter<W>) {
    fatal_on_error(writer.finish());
}

/**
Initialises a sparse tensor from an external COO-flavoured format.  `dim_coordinates` holds `rank` coordinates per element, and `dim2lvl` must be a permutation of the rank (so the dimension-rank and level-rank coincide).  The result uses 64-bit overhead storage.
*/
pub fn to_mlir_sparse_tensor<V: Primary>(
    dim_sizes: &[u64],
    values: &[V],
    dim_coordinates: &[u64],
    dim2lvl: &[u64],
    lvl_types: &[DimLevelType]
) -> SparseTensorStorage<u64, u64, V> {
    let rank = dim_sizes.len();
    let nse = values.len();
    debug_assert_eq!(dim_coordinates.len(), rank * nse, "Coordinate buffer size mismatch");
    debug_assert!(
        lvl_types.iter().all(|dlt| dlt.is_dense() || dlt.is_compressed()),
        "Unsupported level type"
    );
    let d2l = fatal_on_error(PermutationRef::new(rank, dim2lvl));
    // Convert external format to internal COO.
    let lvl_sizes = d2l.push_forward_vec(dim_sizes);
    let mut lvl_coo = SparseTensorCoo::<V>::new(&lvl_sizes, nse);
    let mut lvl_coords = vec![0; rank];
    for (dim_coords, &value) in dim_coordinates.chunks_exact(rank).zip(values) {
        d2l.push_forward(dim_coords, &mut lvl_coords);
        lvl_coo.add(&lvl_coords, value);
    }
    let lvl2dim = d2l.inverse();
    SparseTensorStorage::new_from_coo(dim_sizes, lvl_types, &lvl2dim, lvl_coo)
}

/// A sparse tensor exported as plain arrays in dimension space.
#[derive(Clone, Debug, PartialEq)]
pub struct CooBuffers<V> {
    pub rank: u64,
    pub nse: u64,
    pub shape: Vec<u64>,
    pub values: Vec<V>,
    /// `rank` coordinates per element.
    pub coordinates: Vec<u64>
}

/**
Converts a sparse tensor to an external COO-flavoured format, in dimension space.  Stored elements are listed in storage order.
*/
pub fn from_mlir_sparse_tensor<V: StorageValue>(tensor: &SparseTensorHandle) -> CooBuffers<V> {
    let dim_rank = tensor.dim_rank();
    let dim_sizes = tensor.base().dim_sizes();
    let identity: Vec<u64> = (0..dim_rank as u64).collect();
    let coo = tensor.to_coo::<V>(dim_sizes, &identity);
    debug_assert_eq!(coo.rank(), dim_rank, "Rank mismatch");
    let mut values = Vec::with_capacity(coo.len());
    let mut coordinates = Vec::with_capacity(coo.len() * dim_rank);
    for element in &coo {
        values.push(element.value);
        coordinates.extend_from_slice(element.coords);
    }
    CooBuffers {
        rank: dim_rank as u64,
        nse: coo.len() as u64,
        shape: coo.dim_sizes().to_vec(),
        values,
        coordinates
    }
}
