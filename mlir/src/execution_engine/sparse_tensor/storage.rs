/*!
This file contains definitions for the following types:

- `SparseTensorStorageBase`
- `SparseTensorStorage<P, C, V>`
- `SparseTensorStorageOps` and `SparseTensorValues<V>`
- `SparseTensorEnumerator<P, C, V>`

This file is part of the lightweight runtime support library for sparse tensor manipulations.  The functionality of the support library is meant to simplify benchmarking, testing, and debugging MLIR code operating on sparse tensors.  However, the provided functionality is **not** part of core MLIR itself.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/SparseTensor/Storage.h>
- lib <https://github.com/llvm/llvm-project/blob/main/mlir/lib/ExecutionEngine/SparseTensor/Storage.cpp>
*/

use std::mem::size_of;

use bytemuck::Pod;
use tracing::{debug, trace, warn};

use crate::dialect::sparse_tensor::ir::enums::{DimLevelType, LevelFormat, OverheadType, PrimaryType};

use super::{
    arithmetic_utils::{checked_mul, to_usize},
    coo::{ElementRef, SparseTensorCoo},
    error_handling::{fatal_on_error, Error, Result},
    types::{Overhead, OverheadRef, Primary}
};

/**
The `<P, C, V>`-independent part of a sparse tensor: shape, sparsity and the level-to-dimension mapping.

Because this type forms a bridge between the denotational semantics of 'tensors' and the operational semantics of how we store and compute with them, it also distinguishes between two different coordinate spaces (and their associated rank, shape, sizes, etc).
Denotationally, we have the *dimensions* of the tensor represented by this object. Operationally, we have the *levels* of the storage representation itself. We use this 'dimension' vs 'level' terminology throughout, since alternative terminology like 'tensor-dimension', 'original-dimension', 'storage-dimension', etc, is both more verbose and prone to introduce confusion whenever the qualifiers are dropped.
Where necessary, we use 'axis' as the generic term.

The *size* of an axis is the cardinality of possible coordinate values along that axis (regardless of which coordinates have stored element values).  As such, each size must be non-zero since if any axis has size-zero then the whole tensor would have trivial storage (since there are no possible coordinates).
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SparseTensorStorageBase {
    dim_sizes: Vec<u64>,
    lvl_sizes: Vec<u64>,
    lvl_types: Vec<DimLevelType>,
    lvl2dim: Vec<u64>
}

impl SparseTensorStorageBase {
    /**
    Asserts:
    - `dim_sizes` and `lvl_sizes` are non-empty with non-zero entries.
    - `lvl_types` and `lvl2dim` have one entry per level.
    - every level type is dense, compressed or singleton.
    - every entry of `lvl2dim` is a dimension.
    */
    pub fn new(
        dim_sizes: &[u64],
        lvl_sizes: &[u64],
        lvl_types: &[DimLevelType],
        lvl2dim: &[u64]
    ) -> Self {
        debug_assert!(!dim_sizes.is_empty(), "Trivial shape is unsupported");
        debug_assert!(
            dim_sizes.iter().all(|&sz| sz > 0),
            "Dimension size zero has trivial storage"
        );
        debug_assert!(!lvl_sizes.is_empty(), "Trivial shape is unsupported");
        debug_assert!(
            lvl_sizes.iter().all(|&sz| sz > 0),
            "Level size zero has trivial storage"
        );
        debug_assert_eq!(lvl_types.len(), lvl_sizes.len(), "Level-rank mismatch");
        debug_assert_eq!(lvl2dim.len(), lvl_sizes.len(), "Level-rank mismatch");
        debug_assert!(
            lvl_types
                .iter()
                .all(|dlt| dlt.is_dense() || dlt.is_compressed() || dlt.is_singleton()),
            "Unsupported DimLevelType"
        );
        debug_assert!(
            lvl2dim.iter().all(|&d| d < dim_sizes.len() as u64),
            "lvl2dim entry out of range"
        );
        Self {
            dim_sizes: dim_sizes.to_vec(),
            lvl_sizes: lvl_sizes.to_vec(),
            lvl_types: lvl_types.to_vec(),
            lvl2dim: lvl2dim.to_vec()
        }
    }

    /// Gets the number of tensor-dimensions.
    pub fn dim_rank(&self) -> usize {
        self.dim_sizes.len()
    }

    /// Gets the tensor-dimension sizes array.
    pub fn dim_sizes(&self) -> &[u64] {
        &self.dim_sizes
    }

    /// Safely looks up the size of the given tensor-dimension.
    pub fn dim_size(&self, d: usize) -> u64 {
        debug_assert!(d < self.dim_rank(), "Dimension is out of bounds");
        self.dim_sizes[d]
    }

    /// Gets the number of storage-levels.
    pub fn lvl_rank(&self) -> usize {
        self.lvl_sizes.len()
    }

    /// Gets the storage-level sizes array.
    pub fn lvl_sizes(&self) -> &[u64] {
        &self.lvl_sizes
    }

    /// Safely looks up the size of the given storage-level.
    pub fn lvl_size(&self, l: usize) -> u64 {
        debug_assert!(l < self.lvl_rank(), "Level is out of bounds");
        self.lvl_sizes[l]
    }

    /// Gets the level-types array.
    pub fn lvl_types(&self) -> &[DimLevelType] {
        &self.lvl_types
    }

    /// Safely looks up the type of the given level.
    pub fn lvl_type(&self, l: usize) -> DimLevelType {
        debug_assert!(l < self.lvl_rank(), "Level is out of bounds");
        self.lvl_types[l]
    }

    /// Gets the level-to-dimension mapping.
    pub fn lvl2dim(&self) -> &[u64] {
        &self.lvl2dim
    }

    pub fn is_dense_lvl(&self, l: usize) -> bool {
        self.lvl_type(l).is_dense()
    }

    pub fn is_compressed_lvl(&self, l: usize) -> bool {
        self.lvl_type(l).is_compressed()
    }

    pub fn is_singleton_lvl(&self, l: usize) -> bool {
        self.lvl_type(l).is_singleton()
    }

    pub fn is_ordered_lvl(&self, l: usize) -> bool {
        self.lvl_type(l).is_ordered()
    }

    pub fn is_unique_lvl(&self, l: usize) -> bool {
        self.lvl_type(l).is_unique()
    }

    /**
    Checks that every level type names a storage format, and that each singleton level follows a non-unique compressed or singleton level.
    */
    pub fn check_lvl_types(lvl_types: &[DimLevelType]) -> Result<()> {
        for (l, &lvl_type) in lvl_types.iter().enumerate() {
            let invalid = |reason: &'static str| Error::InvalidLevelType { lvl: l, lvl_type, reason };
            match lvl_type.format() {
                None => return Err(invalid("not a storage format")),
                Some(LevelFormat::Singleton) => {
                    let parent = l.checked_sub(1).map(|p| lvl_types[p]);
                    if !parent.is_some_and(|p| !p.is_unique()) {
                        return Err(invalid("must follow a non-unique compressed or singleton level"));
                    }
                }
                Some(LevelFormat::Dense | LevelFormat::Compressed) => {}
            }
        }
        Ok(())
    }

    /// Checks that `crd` can hold every coordinate of the sparse levels.
    pub fn check_crd_width(crd: OverheadType, lvl_types: &[DimLevelType], lvl_sizes: &[u64]) -> Result<()> {
        let bits = crd.bit_width();
        for (l, (lvl_type, &size)) in lvl_types.iter().zip(lvl_sizes).enumerate() {
            if lvl_type.is_dense() || bits >= u64::BITS {
                continue;
            }
            if size.saturating_sub(1) >> bits != 0 {
                return Err(Error::OverheadTooNarrow { lvl: l, size, crd });
            }
        }
        Ok(())
    }
}

/**
The capability interface over every `SparseTensorStorage<P, C, V>`, with all three types erased.  Opaque handles go through it for the operations that do not mention values.
*/
pub trait SparseTensorStorageOps {
    fn base(&self) -> &SparseTensorStorageBase;

    fn pos_type(&self) -> OverheadType;

    fn crd_type(&self) -> OverheadType;

    fn val_type(&self) -> PrimaryType;

    /// Whether `end_insert` (or a construction action that implies it) has run.
    fn is_finalized(&self) -> bool;

    /// Gets the positions array of the given level, tagged with its width.
    fn positions_ref(&self, l: usize) -> OverheadRef<'_>;

    /// Gets the coordinates array of the given level, tagged with its width.
    fn coordinates_ref(&self, l: usize) -> OverheadRef<'_>;

    /// Finalises lexicographic insertions.
    fn end_insert(&mut self);
}

/**
The capability interface over every `SparseTensorStorage<P, C, V>` with the same value type.  It hides the overhead types, which is what direct sparse-to-sparse conversion needs.
*/
pub trait SparseTensorValues<V: Primary>: SparseTensorStorageOps {
    /// Gets the values array.
    fn values(&self) -> &[V];

    /// Element-wise insertion in lexicographic coordinate order.
    fn lex_insert(&mut self, lvl_coords: &[u64], val: V);

    /// Expanded insertion of every update to one innermost-level segment.
    fn exp_insert(
        &mut self,
        lvl_coords: &mut [u64],
        values: &mut [V],
        filled: &mut [bool],
        added: &mut [u64],
        count: usize
    );

    /**
    Enumerates the stored elements, translating their coordinates into a target space given by `trg_sizes` and the source-dimension to target mapping `src2trg`.  Elements are visited in level order.
    */
    fn for_each_element(
        &self,
        trg_sizes: &[u64],
        src2trg: &[u64],
        f: &mut dyn FnMut(&[u64], V)
    );

    /// Materialises all stored elements into a new COO in the target space.
    fn to_coo(&self, trg_sizes: &[u64], src2trg: &[u64]) -> SparseTensorCoo<V> {
        let mut coo = SparseTensorCoo::new(trg_sizes, self.values().len());
        self.for_each_element(trg_sizes, src2trg, &mut |coords, val| coo.add(coords, val));
        // Stored zeros (e.g. in dense levels) are kept rather than filtered.
        debug_assert_eq!(coo.len(), self.values().len());
        coo
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InsertionState {
    // Nothing inserted yet.
    Empty,
    // A lexicographic insertion path is pending.
    Open,
    // Storage is ready for the read accessors.
    Finalized
}

/**
A memory-resident sparse tensor using a storage scheme based on per-level sparse/dense annotations.  This data structure provides a bufferized form of a sparse tensor type.  In contrast to generating setup methods for each differently annotated sparse tensor, this method provides a convenient 'one-size-fits-all' solution that simply takes an input tensor and annotations to implement all required setup in a general manner.
*/
#[derive(Clone, Debug)]
pub struct SparseTensorStorage<P, C, V> {
    base: SparseTensorStorageBase,
    positions: Vec<Vec<P>>,
    coordinates: Vec<Vec<C>>,
    values: Vec<V>,
    /// Cursor for lexicographic insertion.
    lvl_cursor: Vec<u64>,
    state: InsertionState
}

impl<P: Overhead, C: Overhead, V: Primary> SparseTensorStorage<P, C, V> {
    /// Bare storage with empty overhead arrays; used by `pack_from_lvl_buffers`.
    fn with_base(base: SparseTensorStorageBase) -> Self {
        let lvl_rank = base.lvl_rank();
        fatal_on_error(
            SparseTensorStorageBase::check_lvl_types(base.lvl_types())
                .and_then(|()| SparseTensorStorageBase::check_crd_width(C::KIND, base.lvl_types(), base.lvl_sizes()))
        );
        Self {
            base,
            positions: vec![Vec::new(); lvl_rank],
            coordinates: vec![Vec::new(); lvl_rank],
            values: Vec::new(),
            lvl_cursor: vec![0; lvl_rank],
            state: InsertionState::Empty
        }
    }

    /// Storage ready for insertion, with capacity hints for the overhead
    /// arrays and the leading zero of every compressed positions array.
    fn allocate(base: SparseTensorStorageBase) -> Self {
        let mut tensor = Self::with_base(base);
        let mut sz: u64 = 1;
        for l in 0..tensor.base.lvl_rank() {
            let dlt = tensor.base.lvl_type(l);
            if dlt.is_compressed() {
                tensor.positions[l].reserve(to_usize(sz) + 1);
                tensor.positions[l].push(P::from_u64(0));
                tensor.coordinates[l].reserve(to_usize(sz));
                sz = 1;
            } else if dlt.is_singleton() {
                tensor.coordinates[l].reserve(to_usize(sz));
                sz = 1;
            } else {
                debug_assert!(dlt.is_dense(), "Level is neither dense nor sparse");
                sz = checked_mul(sz, tensor.base.lvl_size(l));
            }
        }
        tensor
    }

    /**
    Allocates a new empty sparse tensor.  Insertions go through `lex_insert`/`exp_insert` and must be followed by `end_insert` before the tensor can be read.
    */
    pub fn new_empty(
        dim_sizes: &[u64],
        lvl_sizes: &[u64],
        lvl_types: &[DimLevelType],
        lvl2dim: &[u64]
    ) -> Self {
        debug!(
            pos = %P::KIND, crd = %C::KIND, val = %V::KIND,
            dim_rank = dim_sizes.len(), lvl_rank = lvl_sizes.len(),
            "new empty sparse tensor"
        );
        Self::allocate(SparseTensorStorageBase::new(dim_sizes, lvl_sizes, lvl_types, lvl2dim))
    }

    /**
    Allocates a new sparse tensor and initialises it from the given COO, which is consumed.  The level-sizes are those of the COO.

    The COO need not be sorted: unsorted input is sorted lexicographically here before ingestion.  Elements with equal coordinates in unique levels are collapsed, keeping the first value in sorted order.
    */
    pub fn new_from_coo(
        dim_sizes: &[u64],
        lvl_types: &[DimLevelType],
        lvl2dim: &[u64],
        mut lvl_coo: SparseTensorCoo<V>
    ) -> Self {
        let lvl_sizes = lvl_coo.dim_sizes().to_vec();
        let mut tensor = Self::allocate(SparseTensorStorageBase::new(
            dim_sizes,
            &lvl_sizes,
            lvl_types,
            lvl2dim
        ));
        if !lvl_coo.is_sorted() {
            warn!(nse = lvl_coo.len(), "sorting unsorted COO before ingestion");
            lvl_coo.sort();
        }
        let nse = lvl_coo.len();
        debug!(
            pos = %P::KIND, crd = %C::KIND, val = %V::KIND,
            nse, lvl_rank = lvl_sizes.len(),
            "new sparse tensor from COO"
        );
        let elements: Vec<_> = lvl_coo.iter().collect();
        tensor.values.reserve(nse);
        tensor.from_coo(&elements, 0, nse, 0);
        tensor.state = InsertionState::Finalized;
        tensor
    }

    /**
    Allocates a new sparse tensor and initialises it with the elements of `source`, re-expressed under this tensor's level sizes and types.  `src2lvl` maps the source's dimensions to the new levels.  The traversal is a single pass over the stored entries of the source.
    */
    pub fn new_from_sparse_tensor(
        dim_sizes: &[u64],
        lvl_sizes: &[u64],
        lvl_types: &[DimLevelType],
        lvl2dim: &[u64],
        src2lvl: &[u64],
        source: &dyn SparseTensorValues<V>
    ) -> Self {
        debug_assert_eq!(
            source.base().dim_rank(),
            src2lvl.len(),
            "Source-rank mismatch"
        );
        debug_assert_eq!(source.base().dim_sizes(), dim_sizes, "Dimension-sizes mismatch");
        debug!(
            src_pos = %source.pos_type(), src_crd = %source.crd_type(),
            pos = %P::KIND, crd = %C::KIND, val = %V::KIND,
            nse = source.values().len(),
            "new sparse tensor from sparse tensor"
        );
        let lvl_coo = source.to_coo(lvl_sizes, src2lvl);
        Self::new_from_coo(dim_sizes, lvl_types, lvl2dim, lvl_coo)
    }

    /**
    Allocates a new sparse tensor and initialises it directly from per-level buffers, without an intermediate COO.

    `lvl_buffers` holds, in level order, a positions and a coordinates buffer for every compressed level, followed by the values buffer.  A non-unique compressed level starts a trailing COO region: its positions buffer is followed by a single array-of-structs buffer holding the coordinates of that level and of all the singleton levels after it.  The buffers are copied; the caller keeps them.
    */
    pub fn pack_from_lvl_buffers(
        dim_sizes: &[u64],
        lvl_sizes: &[u64],
        lvl_types: &[DimLevelType],
        lvl2dim: &[u64],
        lvl_buffers: &[&[u8]]
    ) -> Self {
        let mut tensor = Self::with_base(SparseTensorStorageBase::new(
            dim_sizes,
            lvl_sizes,
            lvl_types,
            lvl2dim
        ));
        let lvl_rank = tensor.base.lvl_rank();
        let mut buffers = lvl_buffers.iter();
        let mut trail_coo_len = 0;
        let mut parent_sz = 1;
        for l in 0..lvl_rank {
            if !tensor.base.is_unique_lvl(l) && tensor.base.is_compressed_lvl(l) {
                // A `compressed-nu` level marks the start of the trailing COO.
                // Its coordinates arrive as one array-of-structs buffer and
                // are split into per-level arrays below.
                trail_coo_len = lvl_rank - l;
                break;
            }
            debug_assert!(
                !tensor.base.is_singleton_lvl(l),
                "Singleton level not following a compressed-nu level"
            );
            if tensor.base.is_compressed_lvl(l) {
                tensor.positions[l] = read_buffer(&mut buffers, parent_sz + 1);
                let crd_len = to_usize(tensor.positions[l][parent_sz].to_u64());
                tensor.coordinates[l] = read_buffer(&mut buffers, crd_len);
            } else {
                debug_assert!(tensor.base.is_dense_lvl(l));
            }
            parent_sz = tensor.assembled_size(parent_sz, l);
        }
        if trail_coo_len != 0 {
            let coo_start = lvl_rank - trail_coo_len;
            tensor.positions[coo_start] = read_buffer(&mut buffers, parent_sz + 1);
            let crd_len = to_usize(tensor.positions[coo_start][parent_sz].to_u64());
            let aos: Vec<C> = read_buffer(&mut buffers, crd_len * trail_coo_len);
            for l in coo_start..lvl_rank {
                tensor.coordinates[l] = aos
                    .iter()
                    .skip(l - coo_start)
                    .step_by(trail_coo_len)
                    .copied()
                    .collect();
            }
            parent_sz = tensor.assembled_size(parent_sz, coo_start);
        }
        tensor.values = read_buffer(&mut buffers, parent_sz);
        debug_assert!(buffers.next().is_none(), "Unused level buffers");
        debug!(
            pos = %P::KIND, crd = %C::KIND, val = %V::KIND,
            nse = tensor.values.len(),
            "packed sparse tensor from level buffers"
        );
        tensor.state = InsertionState::Finalized;
        tensor
    }

    pub fn base(&self) -> &SparseTensorStorageBase {
        &self.base
    }

    pub fn is_finalized(&self) -> bool {
        self.state == InsertionState::Finalized
    }

    /// Gets the positions array of the given level; empty unless the
    /// level is compressed.
    pub fn positions(&self, l: usize) -> &[P] {
        debug_assert!(self.is_finalized(), "Read access before end_insert");
        debug_assert!(l < self.base.lvl_rank(), "Level is out of bounds");
        &self.positions[l]
    }

    /// Gets the coordinates array of the given level; empty for dense levels.
    pub fn coordinates(&self, l: usize) -> &[C] {
        debug_assert!(self.is_finalized(), "Read access before end_insert");
        debug_assert!(l < self.base.lvl_rank(), "Level is out of bounds");
        &self.coordinates[l]
    }

    /// Gets the values array; its length is the number of stored entries.
    pub fn values(&self) -> &[V] {
        debug_assert!(self.is_finalized(), "Read access before end_insert");
        &self.values
    }

    /// Gets the coordinate stored at `pos` in a sparse level.
    pub fn crd(&self, l: usize, pos: usize) -> u64 {
        debug_assert!(
            self.base.is_compressed_lvl(l) || self.base.is_singleton_lvl(l),
            "Level has no coordinates array"
        );
        self.coordinates[l][pos].to_u64()
    }

    /**
    Partially specialise lexicographical insertions based on template types.  Coordinates must arrive in strictly ascending lexicographic order (except where a level is declared non-unique or unordered).
    */
    pub fn lex_insert(&mut self, lvl_coords: &[u64], val: V) {
        debug_assert!(!self.is_finalized(), "Insertion after end_insert");
        debug_assert_eq!(lvl_coords.len(), self.base.lvl_rank(), "Level-rank mismatch");
        trace!(?lvl_coords, "lex insert");
        // First, wrap up pending insertion path.
        let mut diff_lvl = 0;
        let mut full = 0;
        if self.state == InsertionState::Open {
            diff_lvl = self.lex_diff(lvl_coords);
            self.end_path(diff_lvl + 1);
            full = self.lvl_cursor[diff_lvl] + 1;
        }
        // Then continue with insertion path.
        self.ins_path(lvl_coords, diff_lvl, full, val);
        self.state = InsertionState::Open;
    }

    /**
    Partially specialise expanded insertions based on template types.

    `values`/`filled` are the dense scratch row for the innermost level, `added` lists the `count` touched coordinates of that row (in any order), and `lvl_coords` holds the outer coordinates.  After the call every touched entry of `values` is zero and of `filled` is false, ready for the next row.
    */
    pub fn exp_insert(
        &mut self,
        lvl_coords: &mut [u64],
        values: &mut [V],
        filled: &mut [bool],
        added: &mut [u64],
        count: usize
    ) {
        debug_assert_eq!(values.len(), filled.len(), "Scratch buffer size mismatch");
        debug_assert!(count <= added.len(), "Added list too short");
        if count == 0 {
            return;
        }
        trace!(count, "expanded insert");
        let added = &mut added[..count];
        added.sort_unstable();
        let last_lvl = self.base.lvl_rank() - 1;
        // Restore insertion path for first insert.
        let mut c = added[0];
        let i = to_usize(c);
        debug_assert!(filled[i], "Added coordinate is not filled");
        lvl_coords[last_lvl] = c;
        self.lex_insert(lvl_coords, values[i]);
        values[i] = V::zero();
        filled[i] = false;
        // Subsequent insertions are quick.
        for k in 1..count {
            debug_assert!(c < added[k], "Non-lexicographic insertion");
            c = added[k];
            let i = to_usize(c);
            debug_assert!(filled[i], "Added coordinate is not filled");
            lvl_coords[last_lvl] = c;
            self.ins_path(lvl_coords, last_lvl, added[k - 1] + 1, values[i]);
            values[i] = V::zero();
            filled[i] = false;
        }
    }

    /// Finalises lexicographic insertions.  A second call without
    /// intervening insertions does nothing.
    pub fn end_insert(&mut self) {
        match self.state {
            InsertionState::Finalized => return,
            InsertionState::Empty => self.finalize_segment(0, 0, 1),
            InsertionState::Open => self.end_path(0)
        }
        self.state = InsertionState::Finalized;
        debug!(nse = self.values.len(), "end insert");
    }

    /**
    Allocates a new COO object and initialises it with the contents of this tensor under the given mapping.  `src2trg` maps this tensor's dimensions to the target space; with `trg_sizes = dim_sizes` and the identity map this yields dimension coordinates.
    */
    pub fn to_coo(&self, trg_sizes: &[u64], src2trg: &[u64]) -> SparseTensorCoo<V> {
        SparseTensorValues::to_coo(self, trg_sizes, src2trg)
    }

    /**
    Initialises sparse tensor storage scheme from a memory-resident sparse tensor in coordinate scheme.  This method prepares the positions and coordinates arrays under the given per-level dense/sparse annotations.

    Preconditions: the `elements` must be lexicographically sorted, and their coordinates must be valid for the level sizes.
    */
    fn from_coo(&mut self, elements: &[ElementRef<'_, V>], mut lo: usize, hi: usize, l: usize) {
        let lvl_rank = self.base.lvl_rank();
        debug_assert!(l <= lvl_rank && hi <= elements.len());
        // Once levels are exhausted, insert the numerical values.
        if l == lvl_rank {
            debug_assert!(lo < hi);
            self.values.push(elements[lo].value);
            return;
        }
        // Visit all elements in this interval.
        let mut full = 0;
        while lo < hi {
            // Find segment in interval with same coordinate at this level.
            let c = elements[lo].coords[l];
            let mut seg = lo + 1;
            if self.base.is_unique_lvl(l) {
                while seg < hi && elements[seg].coords[l] == c {
                    seg += 1;
                }
            }
            // Handle segment in interval for sparse or dense level.
            self.append_crd(l, full, c);
            full = c + 1;
            self.from_coo(elements, lo, seg, l + 1);
            // And move on to next segment in interval.
            lo = seg;
        }
        // Finalise the sparse position structure at this level.
        self.finalize_segment(l, full, 1);
    }

    /// Appends the next free position of `coordinates[l]` to `positions[l]`.
    fn append_pos(&mut self, l: usize, pos: u64, count: usize) {
        debug_assert!(self.base.is_compressed_lvl(l));
        if pos > P::KIND.max_value() {
            crate::sparse_tensor_fatal!("position {} of level {} does not fit {}", pos, l, P::KIND);
        }
        let pos = P::from_u64(pos);
        self.positions[l].extend(std::iter::repeat(pos).take(count));
    }

    /**
    Appends coordinate `crd` to level `l`, in the semantically general sense.  For non-dense levels, that means appending to the `coordinates[l]` array, checking that `crd` is representable in the `C` type; however, we do not verify other semantic requirements (e.g., that `crd` is in bounds for `lvl_sizes[l]`, and not previously occurring in the same segment).  For dense levels, this method instead appends the appropriate number of zeros to the `values` array, where `full` is the number of "entries" already written to `values` for this segment (aka one after the highest coordinate previously appended).
    */
    fn append_crd(&mut self, l: usize, full: u64, crd: u64) {
        let dlt = self.base.lvl_type(l);
        if dlt.is_compressed() || dlt.is_singleton() {
            if crd > C::KIND.max_value() {
                crate::sparse_tensor_fatal!("coordinate {} of level {} does not fit {}", crd, l, C::KIND);
            }
            self.coordinates[l].push(C::from_u64(crd));
        } else {
            debug_assert!(dlt.is_dense());
            debug_assert!(crd >= full, "Coordinate was already filled");
            if crd == full {
                // Short-circuit, since it'll be a nop.
                return;
            }
            if l + 1 == self.base.lvl_rank() {
                let len = self.values.len() + to_usize(crd - full);
                self.values.resize(len, V::zero());
            } else {
                self.finalize_segment(l + 1, 0, to_usize(crd - full));
            }
        }
    }

    /**
    Computes the assembled-size associated with the `l`-th level, given the assembled-size associated with the `(l-1)`-th level.  "Assembled-sizes" correspond to the (nominal) sizes of overhead storage, as opposed to "level-sizes" which are the cardinality of possible coordinates for that level.
    */
    fn assembled_size(&self, parent_sz: usize, l: usize) -> usize {
        let dlt = self.base.lvl_type(l);
        if dlt.is_compressed() {
            return to_usize(self.positions[l][parent_sz].to_u64());
        }
        if dlt.is_singleton() {
            // New size is same as the parent.
            return parent_sz;
        }
        if dlt.is_dense() {
            return to_usize(checked_mul(parent_sz as u64, self.base.lvl_size(l)));
        }
        crate::sparse_tensor_fatal!("unsupported level type: {}", dlt)
    }

    /**
    Finalises the sparse position structure at this level.  `full` is the number of coordinates already written to this segment; `count` is the number of identical segments to finalise.
    */
    fn finalize_segment(&mut self, l: usize, full: u64, count: usize) {
        if count == 0 {
            // Short-circuit, since it'll be a nop.
            return;
        }
        let dlt = self.base.lvl_type(l);
        if dlt.is_compressed() {
            let pos = self.coordinates[l].len() as u64;
            self.append_pos(l, pos, count);
        } else if dlt.is_singleton() {
            // Nothing to finalise.
        } else {
            debug_assert!(dlt.is_dense());
            let sz = self.base.lvl_size(l);
            debug_assert!(sz >= full, "Segment is overfull");
            let count = to_usize(checked_mul(count as u64, sz - full));
            // For dense storage we must enumerate all the remaining
            // coordinates in this level (i.e., coordinates after the last
            // non-zero element), and either fill in their zero values or
            // else recurse to finalise some deeper level.
            if l + 1 == self.base.lvl_rank() {
                let len = self.values.len() + count;
                self.values.resize(len, V::zero());
            } else {
                self.finalize_segment(l + 1, 0, count);
            }
        }
    }

    /// Wraps up a single insertion path, inner to outer.
    fn end_path(&mut self, diff_lvl: usize) {
        let lvl_rank = self.base.lvl_rank();
        debug_assert!(diff_lvl <= lvl_rank);
        for l in (diff_lvl..lvl_rank).rev() {
            let full = self.lvl_cursor[l] + 1;
            self.finalize_segment(l, full, 1);
        }
    }

    /// Continues a single insertion path, outer to inner.
    fn ins_path(&mut self, lvl_coords: &[u64], diff_lvl: usize, mut full: u64, val: V) {
        let lvl_rank = self.base.lvl_rank();
        debug_assert!(diff_lvl <= lvl_rank);
        for l in diff_lvl..lvl_rank {
            let c = lvl_coords[l];
            debug_assert!(c < self.base.lvl_size(l), "Coordinate out of bounds");
            self.append_crd(l, full, c);
            full = 0;
            self.lvl_cursor[l] = c;
        }
        self.values.push(val);
    }

    /// Finds the lexicographically first level where the level-coordinates
    /// in the argument differ from those in the current cursor.
    fn lex_diff(&self, lvl_coords: &[u64]) -> usize {
        let lvl_rank = self.base.lvl_rank();
        for l in 0..lvl_rank {
            let crd = lvl_coords[l];
            let cur = self.lvl_cursor[l];
            if crd > cur
                || (crd == cur && !self.base.is_unique_lvl(l))
                || (crd < cur && !self.base.is_ordered_lvl(l))
            {
                return l;
            }
            if crd < cur {
                debug_assert!(false, "Non-lexicographic insertion");
                return lvl_rank - 1;
            }
        }
        debug_assert!(false, "Duplicate insertion");
        lvl_rank - 1
    }
}

impl<P: Overhead, C: Overhead, V: Primary> SparseTensorStorageOps for SparseTensorStorage<P, C, V> {
    fn base(&self) -> &SparseTensorStorageBase {
        &self.base
    }

    fn pos_type(&self) -> OverheadType {
        P::KIND
    }

    fn crd_type(&self) -> OverheadType {
        C::KIND
    }

    fn val_type(&self) -> PrimaryType {
        V::KIND
    }

    fn is_finalized(&self) -> bool {
        SparseTensorStorage::is_finalized(self)
    }

    fn positions_ref(&self, l: usize) -> OverheadRef<'_> {
        P::wrap(self.positions(l))
    }

    fn coordinates_ref(&self, l: usize) -> OverheadRef<'_> {
        C::wrap(self.coordinates(l))
    }

    fn end_insert(&mut self) {
        SparseTensorStorage::end_insert(self)
    }
}

impl<P: Overhead, C: Overhead, V: Primary> SparseTensorValues<V> for SparseTensorStorage<P, C, V> {
    fn values(&self) -> &[V] {
        SparseTensorStorage::values(self)
    }

    fn lex_insert(&mut self, lvl_coords: &[u64], val: V) {
        SparseTensorStorage::lex_insert(self, lvl_coords, val)
    }

    fn exp_insert(
        &mut self,
        lvl_coords: &mut [u64],
        values: &mut [V],
        filled: &mut [bool],
        added: &mut [u64],
        count: usize
    ) {
        SparseTensorStorage::exp_insert(self, lvl_coords, values, filled, added, count)
    }

    fn for_each_element(
        &self,
        trg_sizes: &[u64],
        src2trg: &[u64],
        f: &mut dyn FnMut(&[u64], V)
    ) {
        SparseTensorEnumerator::new(self, trg_sizes, src2trg).for_all_elements(f);
    }
}

/**
A (higher-order) function object for enumerating the elements of some `SparseTensorStorage` under a permutation.  That is, the `for_all_elements` method encapsulates the loop-nest for enumerating the elements of the source tensor (in whatever order is best for the source tensor), and applies a permutation to the coordinates before handing each element to the callback.  A single enumerator object can be freely reused for several calls to `for_all_elements`, just so long as each call is sequential with respect to one another.
*/
#[must_use]
pub struct SparseTensorEnumerator<'a, P, C, V> {
    src: &'a SparseTensorStorage<P, C, V>,
    // in target order.
    trg_sizes: Vec<u64>,
    // source-levels -> target-dims/levels.
    lvl2trg: Vec<usize>,
    // in target order.
    trg_cursor: Vec<u64>
}

impl<'a, P: Overhead, C: Overhead, V: Primary> SparseTensorEnumerator<'a, P, C, V> {
    /**
    Constructs an enumerator which will locally use the target ordering, and then hand each element to the callback in that order.

    Asserts:
    - `src2trg` has one entry per source dimension, each a valid target axis.
    - the entries of `trg_sizes` are non-zero.
    */
    pub fn new(src: &'a SparseTensorStorage<P, C, V>, trg_sizes: &[u64], src2trg: &[u64]) -> Self {
        debug_assert_eq!(src2trg.len(), src.base.dim_rank(), "Source-rank mismatch");
        debug_assert!(
            trg_sizes.iter().all(|&sz| sz > 0),
            "Target-size zero has trivial storage"
        );
        let trg_rank = trg_sizes.len();
        let lvl2trg = src
            .base
            .lvl2dim()
            .iter()
            .map(|&d| {
                let t = to_usize(src2trg[to_usize(d)]);
                debug_assert!(t < trg_rank, "Target axis out of bounds");
                t
            })
            .collect();
        Self {
            src,
            trg_sizes: trg_sizes.to_vec(),
            lvl2trg,
            trg_cursor: vec![0; trg_rank]
        }
    }

    pub fn trg_rank(&self) -> usize {
        self.trg_sizes.len()
    }

    pub fn trg_sizes(&self) -> &[u64] {
        &self.trg_sizes
    }

    /// Enumerates all elements of the source tensor, permutes their
    /// coordinates, and passes the permuted element to the callback.
    pub fn for_all_elements(&mut self, f: &mut dyn FnMut(&[u64], V)) {
        debug_assert!(self.src.is_finalized(), "Enumeration before end_insert");
        self.visit(f, 0, 0);
    }

    /// The recursive component of `for_all_elements`.
    fn visit(&mut self, f: &mut dyn FnMut(&[u64], V), parent_pos: usize, l: usize) {
        let src = self.src;
        if l == src.base.lvl_rank() {
            debug_assert!(parent_pos < src.values.len(), "Value position is out of bounds");
            f(&self.trg_cursor, src.values[parent_pos]);
            return;
        }
        let t = self.lvl2trg[l];
        let dlt = src.base.lvl_type(l);
        if dlt.is_compressed() {
            // Look up the bounds of the `l`-level segment determined by the
            // `(l - 1)`-level position `parent_pos`.
            let positions = &src.positions[l];
            debug_assert!(parent_pos + 1 < positions.len());
            let pstart = to_usize(positions[parent_pos].to_u64());
            let pstop = to_usize(positions[parent_pos + 1].to_u64());
            let coordinates = &src.coordinates[l];
            debug_assert!(pstop <= coordinates.len());
            for pos in pstart..pstop {
                self.trg_cursor[t] = coordinates[pos].to_u64();
                self.visit(f, pos, l + 1);
            }
        } else if dlt.is_singleton() {
            self.trg_cursor[t] = src.crd(l, parent_pos);
            self.visit(f, parent_pos, l + 1);
        } else {
            debug_assert!(dlt.is_dense());
            let sz = src.base.lvl_size(l);
            let pstart = parent_pos * to_usize(sz);
            for c in 0..sz {
                self.trg_cursor[t] = c;
                self.visit(f, pstart + to_usize(c), l + 1);
            }
        }
    }
}

/// Copies the next buffer as `len` elements of `T`.
fn read_buffer<'a, 'b: 'a, T: Pod>(
    buffers: &mut impl Iterator<Item = &'a &'b [u8]>,
    len: usize
) -> Vec<T> {
    let bytes: &[u8] = match buffers.next() {
        Some(&bytes) => bytes,
        None => crate::sparse_tensor_fatal!("missing level buffer for pack")
    };
    let nbytes = len * size_of::<T>();
    debug_assert!(
        bytes.len() >= nbytes,
        "Level buffer holds {} bytes, expected at least {}", bytes.len(), nbytes
    );
    bytemuck::pod_collect_to_vec(&bytes[..nbytes])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::sparse_tensor::ir::enums::DimLevelType::{
        Compressed, CompressedNu, Dense, Singleton
    };

    type Csr = SparseTensorStorage<u64, u64, f64>;

    fn csr_from(entries: &[([u64; 2], f64)], sizes: [u64; 2]) -> Csr {
        let mut coo = SparseTensorCoo::new(&sizes, entries.len());
        for (coords, value) in entries {
            coo.add(coords, *value);
        }
        Csr::new_from_coo(&sizes, &[Dense, Compressed], &[0, 1], coo)
    }

    fn dump<P: Overhead, C: Overhead>(t: &SparseTensorStorage<P, C, f64>) -> Vec<(Vec<u64>, f64)> {
        let dim_sizes = t.base().dim_sizes().to_vec();
        let identity: Vec<u64> = (0..dim_sizes.len() as u64).collect();
        t.to_coo(&dim_sizes, &identity)
            .iter()
            .map(|e| (e.coords.to_vec(), e.value))
            .collect()
    }

    #[test]
    fn csr_layout_from_coo() {
        let t = csr_from(&[([0, 1], 5.0), ([1, 2], 7.0)], [2, 3]);
        assert!(t.is_finalized());
        assert!(t.positions(0).is_empty());
        assert!(t.coordinates(0).is_empty());
        assert_eq!(t.positions(1), &[0, 1, 2]);
        assert_eq!(t.coordinates(1), &[1, 2]);
        assert_eq!(t.values(), &[5.0, 7.0]);
    }

    #[test]
    fn unsorted_coo_is_sorted_on_ingest() {
        let t = csr_from(&[([1, 2], 7.0), ([0, 1], 5.0), ([1, 0], 6.0)], [2, 3]);
        assert_eq!(t.positions(1), &[0, 1, 3]);
        assert_eq!(t.coordinates(1), &[1, 0, 2]);
        assert_eq!(t.values(), &[5.0, 6.0, 7.0]);
    }

    #[test]
    fn duplicates_keep_the_first_value() {
        let t = csr_from(&[([0, 1], 5.0), ([0, 1], 9.0)], [2, 3]);
        assert_eq!(t.values(), &[5.0]);
    }

    #[test]
    fn dense_levels_store_zeros() {
        let mut coo = SparseTensorCoo::new(&[2, 2], 1);
        coo.add(&[1, 0], 3.0);
        let t = SparseTensorStorage::<u32, u32, f64>::new_from_coo(&[2, 2], &[Dense, Dense], &[0, 1], coo);
        assert_eq!(t.values(), &[0.0, 0.0, 3.0, 0.0]);
        assert_eq!(
            dump(&t),
            vec![
                (vec![0, 0], 0.0),
                (vec![0, 1], 0.0),
                (vec![1, 0], 3.0),
                (vec![1, 1], 0.0)
            ]
        );
    }

    #[test]
    fn coo_layout_with_singleton() {
        let mut coo = SparseTensorCoo::new(&[3, 4], 3);
        coo.add(&[0, 3], 1.0);
        coo.add(&[2, 0], 2.0);
        coo.add(&[2, 1], 3.0);
        let t = SparseTensorStorage::<u8, u16, f64>::new_from_coo(
            &[3, 4],
            &[CompressedNu, Singleton],
            &[0, 1],
            coo
        );
        assert_eq!(t.positions(0), &[0, 3]);
        assert_eq!(t.coordinates(0), &[0, 2, 2]);
        assert!(t.positions(1).is_empty());
        assert_eq!(t.coordinates(1), &[3, 0, 1]);
        assert_eq!(dump(&t), vec![(vec![0, 3], 1.0), (vec![2, 0], 2.0), (vec![2, 1], 3.0)]);
    }

    #[test]
    fn empty_then_end_insert() {
        let mut t = Csr::new_empty(&[2, 3], &[2, 3], &[Dense, Compressed], &[0, 1]);
        assert!(!t.is_finalized());
        t.end_insert();
        assert_eq!(t.positions(1), &[0, 0, 0]);
        assert!(t.values().is_empty());
        let mut dcsr = Csr::new_empty(&[2, 3], &[2, 3], &[Compressed, Compressed], &[0, 1]);
        dcsr.end_insert();
        assert_eq!(dcsr.positions(0), &[0, 0]);
        assert_eq!(dcsr.positions(1), &[0]);
    }

    #[test]
    fn lex_insert_matches_from_coo() {
        let mut t = Csr::new_empty(&[3, 4], &[3, 4], &[Compressed, Compressed], &[0, 1]);
        t.lex_insert(&[0, 1], 1.0);
        t.lex_insert(&[0, 3], 2.0);
        t.lex_insert(&[2, 2], 3.0);
        t.end_insert();
        let mut coo = SparseTensorCoo::new(&[3, 4], 3);
        coo.add(&[0, 1], 1.0);
        coo.add(&[0, 3], 2.0);
        coo.add(&[2, 2], 3.0);
        let u = Csr::new_from_coo(&[3, 4], &[Compressed, Compressed], &[0, 1], coo);
        for l in 0..2 {
            assert_eq!(t.positions(l), u.positions(l));
            assert_eq!(t.coordinates(l), u.coordinates(l));
        }
        assert_eq!(t.values(), u.values());
        assert_eq!(t.positions(0), &[0, 2]);
        assert_eq!(t.coordinates(0), &[0, 2]);
        assert_eq!(t.positions(1), &[0, 2, 3]);
    }

    #[test]
    fn lex_insert_into_dense_levels_fills_gaps() {
        let mut t = Csr::new_empty(&[2, 3], &[2, 3], &[Dense, Dense], &[0, 1]);
        t.lex_insert(&[0, 2], 1.0);
        t.lex_insert(&[1, 1], 2.0);
        t.end_insert();
        assert_eq!(t.values(), &[0.0, 0.0, 1.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn end_insert_is_idempotent() {
        let mut t = Csr::new_empty(&[2, 3], &[2, 3], &[Dense, Compressed], &[0, 1]);
        t.lex_insert(&[1, 1], 4.0);
        t.end_insert();
        let positions = t.positions(1).to_vec();
        let coordinates = t.coordinates(1).to_vec();
        let values = t.values().to_vec();
        t.end_insert();
        assert_eq!(t.positions(1), positions.as_slice());
        assert_eq!(t.coordinates(1), coordinates.as_slice());
        assert_eq!(t.values(), values.as_slice());
        assert_eq!(positions, vec![0, 0, 1]);
    }

    #[test]
    fn expanded_insert_equals_lexicographic_insert() {
        let mut lex = Csr::new_empty(&[2, 3], &[2, 3], &[Dense, Compressed], &[0, 1]);
        lex.lex_insert(&[0, 0], 1.0);
        lex.lex_insert(&[0, 1], 2.0);
        lex.lex_insert(&[0, 2], 3.0);
        lex.end_insert();

        let mut exp = Csr::new_empty(&[2, 3], &[2, 3], &[Dense, Compressed], &[0, 1]);
        let mut lvl_coords = [0u64, 0];
        let mut values = [1.0, 2.0, 3.0];
        let mut filled = [true; 3];
        let mut added = [2u64, 0, 1];
        exp.exp_insert(&mut lvl_coords, &mut values, &mut filled, &mut added, 3);
        exp.end_insert();

        assert_eq!(filled, [false; 3]);
        assert_eq!(values, [0.0; 3]);
        assert_eq!(exp.positions(1), lex.positions(1));
        assert_eq!(exp.coordinates(1), lex.coordinates(1));
        assert_eq!(exp.values(), lex.values());
    }

    #[test]
    fn expanded_insert_over_several_rows() {
        let mut t = Csr::new_empty(&[3, 4], &[3, 4], &[Dense, Compressed], &[0, 1]);
        let mut values = [0.0; 4];
        let mut filled = [false; 4];
        let mut added = [0u64; 4];
        for (row, entries) in [(0u64, vec![(3u64, 1.0)]), (2, vec![(1, 2.0), (0, 3.0)])] {
            for (k, &(c, v)) in entries.iter().enumerate() {
                values[c as usize] = v;
                filled[c as usize] = true;
                added[k] = c;
            }
            let mut lvl_coords = [row, 0];
            t.exp_insert(&mut lvl_coords, &mut values, &mut filled, &mut added, entries.len());
        }
        t.end_insert();
        assert_eq!(t.positions(1), &[0, 1, 1, 3]);
        assert_eq!(t.coordinates(1), &[3, 0, 1]);
        assert_eq!(t.values(), &[1.0, 3.0, 2.0]);
    }

    #[test]
    fn permuted_levels_translate_back() {
        // Column-major storage of a 2x3 matrix.
        let dim2lvl = [1u64, 0];
        let lvl2dim = [1u64, 0];
        let mut coo = SparseTensorCoo::new(&[3, 2], 2);
        coo.add(&[1, 0], 5.0);
        coo.add(&[2, 1], 7.0);
        let t = Csr::new_from_coo(&[2, 3], &[Dense, Compressed], &lvl2dim, coo);
        assert_eq!(t.positions(1), &[0, 0, 1, 2]);
        let back = t.to_coo(&[2, 3], &[0, 1]);
        let got: Vec<_> = back.iter().map(|e| (e.coords.to_vec(), e.value)).collect();
        assert_eq!(got, vec![(vec![0, 1], 5.0), (vec![1, 2], 7.0)]);
        let lvl = t.to_coo(&[3, 2], &dim2lvl);
        let got: Vec<_> = lvl.iter().map(|e| e.coords.to_vec()).collect();
        assert_eq!(got, vec![vec![1, 0], vec![2, 1]]);
    }

    #[test]
    fn sparse_to_sparse_changes_format_and_widths() {
        let src = csr_from(&[([0, 1], 5.0), ([1, 0], 6.0), ([1, 2], 7.0)], [2, 3]);
        // Re-express as CSC with narrow overheads.
        let dst = SparseTensorStorage::<u8, u8, f64>::new_from_sparse_tensor(
            &[2, 3],
            &[3, 2],
            &[Dense, Compressed],
            &[1, 0],
            &[1, 0],
            &src
        );
        assert_eq!(dst.positions(1), &[0, 1, 2, 3]);
        assert_eq!(dst.coordinates(1), &[1, 0, 1]);
        assert_eq!(dst.values(), &[6.0, 5.0, 7.0]);
        assert_eq!(dump(&dst), vec![(vec![1, 0], 6.0), (vec![0, 1], 5.0), (vec![1, 2], 7.0)]);
    }

    #[test]
    fn pack_copies_buffers() {
        let positions = [0u32, 1, 3];
        let coordinates = [2u16, 0, 1];
        let values = [1.0f64, 2.0, 3.0];
        let buffers: [&[u8]; 3] = [
            bytemuck::cast_slice(&positions),
            bytemuck::cast_slice(&coordinates),
            bytemuck::cast_slice(&values)
        ];
        let t = SparseTensorStorage::<u32, u16, f64>::pack_from_lvl_buffers(
            &[2, 3],
            &[2, 3],
            &[Dense, Compressed],
            &[0, 1],
            &buffers
        );
        assert!(t.positions(0).is_empty());
        assert_eq!(t.positions(1), &positions);
        assert_eq!(t.coordinates(1), &coordinates);
        assert_eq!(t.values(), &values);
    }

    #[test]
    fn level_type_order_is_checked() {
        assert!(SparseTensorStorageBase::check_lvl_types(&[Dense, Compressed]).is_ok());
        assert!(SparseTensorStorageBase::check_lvl_types(&[CompressedNu, Singleton]).is_ok());
        assert!(matches!(
            SparseTensorStorageBase::check_lvl_types(&[Singleton, Compressed]),
            Err(Error::InvalidLevelType { lvl: 0, lvl_type: Singleton, .. })
        ));
        assert!(matches!(
            SparseTensorStorageBase::check_lvl_types(&[Compressed, Singleton]),
            Err(Error::InvalidLevelType { lvl: 1, .. })
        ));
        assert!(matches!(
            SparseTensorStorageBase::check_lvl_types(&[Dense, DimLevelType::Undef]),
            Err(Error::InvalidLevelType { lvl: 1, lvl_type: DimLevelType::Undef, .. })
        ));
    }

    #[test]
    fn coordinate_width_must_cover_sparse_levels() {
        let lvl_types = [Dense, Compressed];
        assert!(SparseTensorStorageBase::check_crd_width(OverheadType::U8, &lvl_types, &[1000, 256]).is_ok());
        assert!(matches!(
            SparseTensorStorageBase::check_crd_width(OverheadType::U8, &lvl_types, &[2, 300]),
            Err(Error::OverheadTooNarrow { lvl: 1, size: 300, crd: OverheadType::U8 })
        ));
        assert!(SparseTensorStorageBase::check_crd_width(OverheadType::U16, &lvl_types, &[2, 300]).is_ok());
        assert!(SparseTensorStorageBase::check_crd_width(OverheadType::U64, &lvl_types, &[2, u64::MAX]).is_ok());
    }

    #[test]
    fn pack_splits_trailing_coo() {
        let positions = [0u64, 3];
        let aos = [0u64, 3, 2, 0, 2, 1];
        let values = [1.0f64, 2.0, 3.0];
        let buffers: [&[u8]; 3] = [
            bytemuck::cast_slice(&positions),
            bytemuck::cast_slice(&aos),
            bytemuck::cast_slice(&values)
        ];
        let t = Csr::pack_from_lvl_buffers(&[3, 4], &[3, 4], &[CompressedNu, Singleton], &[0, 1], &buffers);
        assert_eq!(t.positions(0), &positions);
        assert_eq!(t.coordinates(0), &[0, 2, 2]);
        assert_eq!(t.coordinates(1), &[3, 0, 1]);
        assert_eq!(dump(&t), vec![(vec![0, 3], 1.0), (vec![2, 0], 2.0), (vec![2, 1], 3.0)]);
    }
}
