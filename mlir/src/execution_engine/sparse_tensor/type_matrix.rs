/*!
# The closed set of storage specialisations

Every supported (position, coordinate, value) triple is listed once in the `type_matrix!` invocation at the bottom of this file.  From that list the macro generates:

- `SparseTensorHandle`, one variant per triple, standing in for the opaque `void *` that compiler-generated code passes around;
- `SparseTensorCooHandle` and `SparseTensorIteratorHandle`, one variant per value type;
- `TypeTriple::is_supported` and `TypeTriple::SUPPORTED`;
- `dispatch_triple`, which hands a `TripleVisitor` the statically typed specialisation for a runtime triple;
- the `StorageValue` downcasts for each value type.

`new_sparse_tensor` is the Swiss-army-knife for creating and converting storage.

- lib <https://github.com/llvm/llvm-project/blob/main/mlir/lib/ExecutionEngine/SparseTensorRuntime.cpp>
*/

use std::fmt;

use half::{bf16, f16};
use tracing::debug;

use crate::dialect::sparse_tensor::ir::enums::{
    Action, DimLevelType, OverheadType, PrimaryType
};

use super::{
    coo::{SparseTensorCoo, SparseTensorIterator},
    error_handling::{fatal_on_error, Error, Result},
    map_ref::MapRef,
    storage::{SparseTensorStorage, SparseTensorStorageBase, SparseTensorStorageOps, SparseTensorValues},
    types::{Complex32, Complex64, Overhead, OverheadRef, Primary}
};

/// The runtime tags selecting one storage specialisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeTriple {
    pub pos: OverheadType,
    pub crd: OverheadType,
    pub val: PrimaryType
}

impl TypeTriple {
    /// Rewrites `Index` to `U64` for both overhead types, to avoid introducing a bunch of new cases.
    pub const fn new(pos: OverheadType, crd: OverheadType, val: PrimaryType) -> Self {
        Self {
            pos: pos.normalise(),
            crd: crd.normalise(),
            val
        }
    }

    pub fn unsupported(&self) -> Error {
        Error::UnsupportedTypes {
            pos: self.pos,
            crd: self.crd,
            val: self.val
        }
    }
}

impl fmt::Display for TypeTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<P={}, C={}, V={}>", self.pos, self.crd, self.val)
    }
}

/**
A computation generic over one storage specialisation.  `dispatch_triple` calls `visit` with the type parameters matching a runtime `TypeTriple`.
*/
pub trait TripleVisitor {
    type Output;

    fn visit<P: Overhead, C: Overhead, V: StorageValue>(self) -> Self::Output
    where
        SparseTensorStorage<P, C, V>: Into<SparseTensorHandle>;
}

/**
Value types of the support set, with the downcasts from the opaque handles back to their concrete specialisation.  A handle of another value type yields `None`.
*/
pub trait StorageValue: Primary {
    fn storage_ref(tensor: &SparseTensorHandle) -> Option<&dyn SparseTensorValues<Self>>;

    fn storage_mut(tensor: &mut SparseTensorHandle) -> Option<&mut dyn SparseTensorValues<Self>>;

    fn wrap_coo(coo: SparseTensorCoo<Self>) -> SparseTensorCooHandle;

    fn coo_ref(coo: &SparseTensorCooHandle) -> Option<&SparseTensorCoo<Self>>;

    fn coo_mut(coo: &mut SparseTensorCooHandle) -> Option<&mut SparseTensorCoo<Self>>;

    /// Takes the COO out of the handle, or gives the handle back unchanged.
    fn into_coo(coo: SparseTensorCooHandle) -> std::result::Result<SparseTensorCoo<Self>, SparseTensorCooHandle>;

    fn wrap_iterator(iter: SparseTensorIterator<Self>) -> SparseTensorIteratorHandle;

    fn iterator_mut(iter: &mut SparseTensorIteratorHandle) -> Option<&mut SparseTensorIterator<Self>>;
}

macro_rules! type_matrix {
    (
        $(
            $V:ty, $vk:ident => [
                $( ($name:ident, $p:ident, $c:ident, $P:ty, $C:ty) ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /**
        An owned sparse tensor of any supported specialisation.  Dropping the handle releases the storage.
        */
        #[derive(Debug)]
        pub enum SparseTensorHandle {
            $($(
                $name(Box<SparseTensorStorage<$P, $C, $V>>),
            )*)*
        }

        $($(
            impl From<SparseTensorStorage<$P, $C, $V>> for SparseTensorHandle {
                fn from(storage: SparseTensorStorage<$P, $C, $V>) -> Self {
                    Self::$name(Box::new(storage))
                }
            }
        )*)*

        impl SparseTensorHandle {
            /// The specialisation behind the handle, with all types erased.
            pub fn as_ops(&self) -> &dyn SparseTensorStorageOps {
                match self {
                    $($( Self::$name(t) => &**t, )*)*
                }
            }

            pub fn as_ops_mut(&mut self) -> &mut dyn SparseTensorStorageOps {
                match self {
                    $($( Self::$name(t) => &mut **t, )*)*
                }
            }
        }

        /// An owned coordinate list of any supported value type.
        #[derive(Debug)]
        pub enum SparseTensorCooHandle {
            $( $vk(Box<SparseTensorCoo<$V>>), )*
        }

        impl SparseTensorCooHandle {
            pub fn val_type(&self) -> PrimaryType {
                match self {
                    $( Self::$vk(_) => PrimaryType::$vk, )*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $( Self::$vk(coo) => coo.len(), )*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn dim_sizes(&self) -> &[u64] {
                match self {
                    $( Self::$vk(coo) => coo.dim_sizes(), )*
                }
            }

            pub fn sort(&mut self) {
                match self {
                    $( Self::$vk(coo) => coo.sort(), )*
                }
            }
        }

        /// An owned iterator (and the COO it walks) of any supported value type.
        #[derive(Debug)]
        pub enum SparseTensorIteratorHandle {
            $( $vk(Box<SparseTensorIterator<$V>>), )*
        }

        impl SparseTensorIteratorHandle {
            pub fn val_type(&self) -> PrimaryType {
                match self {
                    $( Self::$vk(_) => PrimaryType::$vk, )*
                }
            }

            pub fn rank(&self) -> usize {
                match self {
                    $( Self::$vk(iter) => iter.rank(), )*
                }
            }
        }

        $(
            impl StorageValue for $V {
                fn storage_ref(tensor: &SparseTensorHandle) -> Option<&dyn SparseTensorValues<Self>> {
                    match tensor {
                        $( SparseTensorHandle::$name(t) => Some(&**t as &dyn SparseTensorValues<Self>), )*
                        _ => None
                    }
                }

                fn storage_mut(tensor: &mut SparseTensorHandle) -> Option<&mut dyn SparseTensorValues<Self>> {
                    match tensor {
                        $( SparseTensorHandle::$name(t) => Some(&mut **t as &mut dyn SparseTensorValues<Self>), )*
                        _ => None
                    }
                }

                fn wrap_coo(coo: SparseTensorCoo<Self>) -> SparseTensorCooHandle {
                    SparseTensorCooHandle::$vk(Box::new(coo))
                }

                fn coo_ref(coo: &SparseTensorCooHandle) -> Option<&SparseTensorCoo<Self>> {
                    match coo {
                        SparseTensorCooHandle::$vk(coo) => Some(coo),
                        _ => None
                    }
                }

                fn coo_mut(coo: &mut SparseTensorCooHandle) -> Option<&mut SparseTensorCoo<Self>> {
                    match coo {
                        SparseTensorCooHandle::$vk(coo) => Some(coo),
                        _ => None
                    }
                }

                fn into_coo(coo: SparseTensorCooHandle) -> std::result::Result<SparseTensorCoo<Self>, SparseTensorCooHandle> {
                    match coo {
                        SparseTensorCooHandle::$vk(coo) => Ok(*coo),
                        other => Err(other)
                    }
                }

                fn wrap_iterator(iter: SparseTensorIterator<Self>) -> SparseTensorIteratorHandle {
                    SparseTensorIteratorHandle::$vk(Box::new(iter))
                }

                fn iterator_mut(iter: &mut SparseTensorIteratorHandle) -> Option<&mut SparseTensorIterator<Self>> {
                    match iter {
                        SparseTensorIteratorHandle::$vk(iter) => Some(iter),
                        _ => None
                    }
                }
            }
        )*

        impl TypeTriple {
            /// Every supported triple, in declaration order.
            pub const SUPPORTED: &'static [TypeTriple] = &[
                $($(
                    TypeTriple {
                        pos: OverheadType::$p,
                        crd: OverheadType::$c,
                        val: PrimaryType::$vk
                    },
                )*)*
            ];

            pub fn is_supported(&self) -> bool {
                matches!(
                    (self.pos, self.crd, self.val),
                    $($( (OverheadType::$p, OverheadType::$c, PrimaryType::$vk) )|*)|*
                )
            }
        }

        /// Runs `visitor` on the specialisation selected by `triple`, or
        /// returns `None` if the triple is outside the support set.
        pub fn dispatch_triple<Vis: TripleVisitor>(triple: TypeTriple, visitor: Vis) -> Option<Vis::Output> {
            match (triple.pos, triple.crd, triple.val) {
                $($(
                    (OverheadType::$p, OverheadType::$c, PrimaryType::$vk) => {
                        Some(visitor.visit::<$P, $C, $V>())
                    }
                )*)*
                _ => None
            }
        }
    };
}

type_matrix! {
    // Double matrices with all combinations of overhead storage.
    f64, F64 => [
        (P64C64F64, U64, U64, u64, u64),
        (P64C32F64, U64, U32, u64, u32),
        (P64C16F64, U64, U16, u64, u16),
        (P64C8F64, U64, U8, u64, u8),
        (P32C64F64, U32, U64, u32, u64),
        (P32C32F64, U32, U32, u32, u32),
        (P32C16F64, U32, U16, u32, u16),
        (P32C8F64, U32, U8, u32, u8),
        (P16C64F64, U16, U64, u16, u64),
        (P16C32F64, U16, U32, u16, u32),
        (P16C16F64, U16, U16, u16, u16),
        (P16C8F64, U16, U8, u16, u8),
        (P8C64F64, U8, U64, u8, u64),
        (P8C32F64, U8, U32, u8, u32),
        (P8C16F64, U8, U16, u8, u16),
        (P8C8F64, U8, U8, u8, u8),
    ],
    // Float matrices with all combinations of overhead storage.
    f32, F32 => [
        (P64C64F32, U64, U64, u64, u64),
        (P64C32F32, U64, U32, u64, u32),
        (P64C16F32, U64, U16, u64, u16),
        (P64C8F32, U64, U8, u64, u8),
        (P32C64F32, U32, U64, u32, u64),
        (P32C32F32, U32, U32, u32, u32),
        (P32C16F32, U32, U16, u32, u16),
        (P32C8F32, U32, U8, u32, u8),
        (P16C64F32, U16, U64, u16, u64),
        (P16C32F32, U16, U32, u16, u32),
        (P16C16F32, U16, U16, u16, u16),
        (P16C8F32, U16, U8, u16, u8),
        (P8C64F32, U8, U64, u8, u64),
        (P8C32F32, U8, U32, u8, u32),
        (P8C16F32, U8, U16, u8, u16),
        (P8C8F32, U8, U8, u8, u8),
    ],
    // Two-byte floats with both overheads of the same type.
    f16, F16 => [
        (P64C64F16, U64, U64, u64, u64),
        (P32C32F16, U32, U32, u32, u32),
        (P16C16F16, U16, U16, u16, u16),
        (P8C8F16, U8, U8, u8, u8),
    ],
    bf16, BF16 => [
        (P64C64BF16, U64, U64, u64, u64),
        (P32C32BF16, U32, U32, u32, u32),
        (P16C16BF16, U16, U16, u16, u16),
        (P8C8BF16, U8, U8, u8, u8),
    ],
    // Integral matrices with both overheads of the same type.
    i64, I64 => [
        (P64C64I64, U64, U64, u64, u64),
        (P32C32I64, U32, U32, u32, u32),
        (P16C16I64, U16, U16, u16, u16),
        (P8C8I64, U8, U8, u8, u8),
    ],
    i32, I32 => [
        (P64C64I32, U64, U64, u64, u64),
        (P32C32I32, U32, U32, u32, u32),
        (P16C16I32, U16, U16, u16, u16),
        (P8C8I32, U8, U8, u8, u8),
    ],
    i16, I16 => [
        (P64C64I16, U64, U64, u64, u64),
        (P32C32I16, U32, U32, u32, u32),
        (P16C16I16, U16, U16, u16, u16),
        (P8C8I16, U8, U8, u8, u8),
    ],
    i8, I8 => [
        (P64C64I8, U64, U64, u64, u64),
        (P32C32I8, U32, U32, u32, u32),
        (P16C16I8, U16, U16, u16, u16),
        (P8C8I8, U8, U8, u8, u8),
    ],
    // Complex matrices with wide overhead.
    Complex64, C64 => [
        (P64C64C64, U64, U64, u64, u64),
    ],
    Complex32, C32 => [
        (P64C64C32, U64, U64, u64, u64),
    ],
}

impl SparseTensorHandle {
    pub fn type_triple(&self) -> TypeTriple {
        let ops = self.as_ops();
        TypeTriple::new(ops.pos_type(), ops.crd_type(), ops.val_type())
    }

    pub fn base(&self) -> &SparseTensorStorageBase {
        self.as_ops().base()
    }

    pub fn dim_rank(&self) -> usize {
        self.base().dim_rank()
    }

    pub fn lvl_rank(&self) -> usize {
        self.base().lvl_rank()
    }

    pub fn dim_size(&self, d: usize) -> u64 {
        self.base().dim_size(d)
    }

    pub fn lvl_size(&self, l: usize) -> u64 {
        self.base().lvl_size(l)
    }

    pub fn is_finalized(&self) -> bool {
        self.as_ops().is_finalized()
    }

    pub fn end_insert(&mut self) {
        self.as_ops_mut().end_insert()
    }

    pub fn positions_ref(&self, l: usize) -> OverheadRef<'_> {
        self.as_ops().positions_ref(l)
    }

    pub fn coordinates_ref(&self, l: usize) -> OverheadRef<'_> {
        self.as_ops().coordinates_ref(l)
    }

    /// Positions array of level `l`; `P` must be the handle's position type.
    pub fn positions<P: Overhead>(&self, l: usize) -> &[P] {
        match P::unwrap(self.positions_ref(l)) {
            Some(positions) => positions,
            None => crate::sparse_tensor_fatal!(
                "positions of {} requested as {}",
                self.type_triple(),
                P::KIND
            )
        }
    }

    /// Coordinates array of level `l`; `C` must be the handle's coordinate type.
    pub fn coordinates<C: Overhead>(&self, l: usize) -> &[C] {
        match C::unwrap(self.coordinates_ref(l)) {
            Some(coordinates) => coordinates,
            None => crate::sparse_tensor_fatal!(
                "coordinates of {} requested as {}",
                self.type_triple(),
                C::KIND
            )
        }
    }

    pub fn values<V: StorageValue>(&self) -> &[V] {
        self.typed::<V>().values()
    }

    pub fn lex_insert<V: StorageValue>(&mut self, lvl_coords: &[u64], val: V) {
        self.typed_mut::<V>().lex_insert(lvl_coords, val)
    }

    pub fn exp_insert<V: StorageValue>(
        &mut self,
        lvl_coords: &mut [u64],
        values: &mut [V],
        filled: &mut [bool],
        added: &mut [u64],
        count: usize
    ) {
        self.typed_mut::<V>().exp_insert(lvl_coords, values, filled, added, count)
    }

    /// See `SparseTensorValues::to_coo`.
    pub fn to_coo<V: StorageValue>(&self, trg_sizes: &[u64], src2trg: &[u64]) -> SparseTensorCoo<V> {
        self.typed::<V>().to_coo(trg_sizes, src2trg)
    }

    fn typed<V: StorageValue>(&self) -> &dyn SparseTensorValues<V> {
        match V::storage_ref(self) {
            Some(t) => t,
            None => crate::sparse_tensor_fatal!(
                "values of {} requested as {}",
                self.type_triple(),
                V::KIND
            )
        }
    }

    fn typed_mut<V: StorageValue>(&mut self) -> &mut dyn SparseTensorValues<V> {
        let triple = self.type_triple();
        match V::storage_mut(self) {
            Some(t) => t,
            None => crate::sparse_tensor_fatal!("values of {} requested as {}", triple, V::KIND)
        }
    }
}

/**
The shape, level types and maps describing the storage to construct (or, for `ToCOO`/`ToIterator`, the target space to export into).
*/
#[derive(Clone, Copy, Debug)]
pub struct SparseTensorEncoding<'a> {
    pub dim_sizes: &'a [u64],
    pub lvl_sizes: &'a [u64],
    pub lvl_types: &'a [DimLevelType],
    pub dim2lvl: &'a [u64],
    pub lvl2dim: &'a [u64]
}

impl<'a> SparseTensorEncoding<'a> {
    /**
    Checks that the paired arrays agree in rank, that the level types form a valid order, and that the maps are mutually inverse permutations.  Returns the validated maps.
    */
    pub fn validate(&self) -> Result<MapRef<'a>> {
        let dim_rank = self.dim_sizes.len();
        let lvl_rank = self.lvl_sizes.len();
        if self.lvl_types.len() != lvl_rank {
            return Err(Error::RankMismatch {
                what: "lvl_types",
                expected: lvl_rank,
                got: self.lvl_types.len()
            });
        }
        SparseTensorStorageBase::check_lvl_types(self.lvl_types)?;
        let map = MapRef::new(dim_rank, lvl_rank, self.dim2lvl, self.lvl2dim)?;
        if map.is_permutation() {
            Ok(map)
        } else {
            MapRef::permutation(self.dim2lvl, self.lvl2dim)
        }
    }

    /// Checks that storage of the given triple can address every level.
    pub fn check_overhead(&self, triple: TypeTriple) -> Result<()> {
        SparseTensorStorageBase::check_crd_width(triple.crd, self.lvl_types, self.lvl_sizes)
    }
}

/// The auxiliary argument of a construction action.
#[derive(Debug)]
pub enum ActionInput<'a> {
    None,
    /// Consumed by `FromCOO`.
    Coo(SparseTensorCooHandle),
    /// Read by `SparseToSparse`, `ToCOO` and `ToIterator`.
    Tensor(&'a SparseTensorHandle),
    /// Per-level buffers for `Pack`.
    Buffers(&'a [&'a [u8]])
}

/// What a construction action produced.
#[derive(Debug)]
pub enum ActionOutput {
    Tensor(SparseTensorHandle),
    Coo(SparseTensorCooHandle),
    Iterator(SparseTensorIteratorHandle)
}

impl ActionOutput {
    /// What kind of object this is, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tensor(_) => "a sparse tensor",
            Self::Coo(_) => "a COO",
            Self::Iterator(_) => "an iterator"
        }
    }

    fn unexpected(&self, expected: &'static str) -> Error {
        Error::UnexpectedOutput {
            expected,
            got: self.kind()
        }
    }

    pub fn into_tensor(self) -> Result<SparseTensorHandle> {
        match self {
            Self::Tensor(tensor) => Ok(tensor),
            other => Err(other.unexpected("a sparse tensor"))
        }
    }

    pub fn into_coo(self) -> Result<SparseTensorCooHandle> {
        match self {
            Self::Coo(coo) => Ok(coo),
            other => Err(other.unexpected("a COO"))
        }
    }

    pub fn into_iterator(self) -> Result<SparseTensorIteratorHandle> {
        match self {
            Self::Iterator(iter) => Ok(iter),
            other => Err(other.unexpected("an iterator"))
        }
    }
}

struct NewSparseTensor<'a, 'b> {
    encoding: &'a SparseTensorEncoding<'a>,
    // `None` only for `EmptyCOO`.
    map: Option<MapRef<'a>>,
    action: Action,
    input: ActionInput<'b>
}

impl<'a, 'b> NewSparseTensor<'a, 'b> {
    fn missing(&self, expected: &'static str) -> Error {
        Error::MissingInput {
            action: self.action,
            expected
        }
    }

    fn map(&self) -> Result<MapRef<'a>> {
        self.map.ok_or_else(|| self.missing("validated dim/level maps"))
    }

    fn source<V: StorageValue>(&self) -> Result<&'b dyn SparseTensorValues<V>> {
        match self.input {
            ActionInput::Tensor(tensor) => V::storage_ref(tensor).ok_or(Error::ValueTypeMismatch {
                what: "source tensor",
                expected: V::KIND,
                got: tensor.type_triple().val
            }),
            _ => Err(self.missing("a sparse tensor"))
        }
    }
}

impl<'a, 'b> TripleVisitor for NewSparseTensor<'a, 'b> {
    type Output = Result<ActionOutput>;

    fn visit<P: Overhead, C: Overhead, V: StorageValue>(self) -> Self::Output
    where
        SparseTensorStorage<P, C, V>: Into<SparseTensorHandle>
    {
        let SparseTensorEncoding {
            dim_sizes,
            lvl_sizes,
            lvl_types,
            ..
        } = *self.encoding;
        Ok(match self.action {
            Action::Empty => {
                let map = self.map()?;
                ActionOutput::Tensor(
                    SparseTensorStorage::<P, C, V>::new_empty(dim_sizes, lvl_sizes, lvl_types, map.lvl2dim())
                        .into()
                )
            }
            Action::FromCOO => {
                let map = self.map()?;
                let coo = match self.input {
                    ActionInput::Coo(coo) => coo,
                    _ => return Err(self.missing("a COO"))
                };
                let coo = V::into_coo(coo).map_err(|coo| Error::ValueTypeMismatch {
                    what: "COO",
                    expected: V::KIND,
                    got: coo.val_type()
                })?;
                debug_assert_eq!(coo.dim_sizes(), lvl_sizes, "COO is not in level space");
                ActionOutput::Tensor(
                    SparseTensorStorage::<P, C, V>::new_from_coo(dim_sizes, lvl_types, map.lvl2dim(), coo).into()
                )
            }
            Action::SparseToSparse => {
                let map = self.map()?;
                let source = self.source::<V>()?;
                ActionOutput::Tensor(
                    SparseTensorStorage::<P, C, V>::new_from_sparse_tensor(
                        dim_sizes,
                        lvl_sizes,
                        lvl_types,
                        map.lvl2dim(),
                        map.dim2lvl(),
                        source
                    )
                    .into()
                )
            }
            Action::EmptyCOO => ActionOutput::Coo(V::wrap_coo(SparseTensorCoo::new(lvl_sizes, 0))),
            Action::ToCOO => {
                let map = self.map()?;
                let source = self.source::<V>()?;
                ActionOutput::Coo(V::wrap_coo(source.to_coo(lvl_sizes, map.dim2lvl())))
            }
            Action::ToIterator => {
                let map = self.map()?;
                let source = self.source::<V>()?;
                let coo = source.to_coo(lvl_sizes, map.dim2lvl());
                ActionOutput::Iterator(V::wrap_iterator(SparseTensorIterator::new(coo)))
            }
            Action::Pack => {
                let map = self.map()?;
                let buffers = match self.input {
                    ActionInput::Buffers(buffers) => buffers,
                    _ => return Err(self.missing("level buffers"))
                };
                ActionOutput::Tensor(
                    SparseTensorStorage::<P, C, V>::pack_from_lvl_buffers(
                        dim_sizes,
                        lvl_sizes,
                        lvl_types,
                        map.lvl2dim(),
                        buffers
                    )
                    .into()
                )
            }
        })
    }
}

/**
The Swiss-army-knife for sparse tensor creation.  Selects the specialisation for `triple` and runs `action` on it.

Errors:
- `triple` is outside the support set.
- the encoding's arrays disagree in rank, its level types are out of order, or its maps are not mutually inverse permutations.
- a sparse level is too large for the coordinate overhead of `triple` (actions that build storage only).
- `input` is not what `action` requires, or holds a different value type.
*/
pub fn try_new_sparse_tensor(
    encoding: &SparseTensorEncoding<'_>,
    triple: TypeTriple,
    action: Action,
    input: ActionInput<'_>
) -> Result<ActionOutput> {
    let triple = TypeTriple::new(triple.pos, triple.crd, triple.val);
    if !triple.is_supported() {
        return Err(triple.unsupported());
    }
    let map = match action {
        Action::EmptyCOO => None,
        _ => Some(encoding.validate()?)
    };
    if matches!(action, Action::Empty | Action::FromCOO | Action::SparseToSparse | Action::Pack) {
        encoding.check_overhead(triple)?;
    }
    debug!(
        ?action, %triple,
        dim_rank = encoding.dim_sizes.len(), lvl_rank = encoding.lvl_sizes.len(),
        "new sparse tensor"
    );
    let visitor = NewSparseTensor {
        encoding,
        map,
        action,
        input
    };
    dispatch_triple(triple, visitor).unwrap_or_else(|| Err(triple.unsupported()))
}

/// As `try_new_sparse_tensor`, but any error terminates the process with
/// a diagnostic.
pub fn new_sparse_tensor(
    encoding: &SparseTensorEncoding<'_>,
    triple: TypeTriple,
    action: Action,
    input: ActionInput<'_>
) -> ActionOutput {
    fatal_on_error(try_new_sparse_tensor(encoding, triple, action, input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::sparse_tensor::ir::enums::DimLevelType::{Compressed, Dense};

    const CSR: [DimLevelType; 2] = [Dense, Compressed];
    const ID: [u64; 2] = [0, 1];

    fn encoding() -> SparseTensorEncoding<'static> {
        SparseTensorEncoding {
            dim_sizes: &[2, 3],
            lvl_sizes: &[2, 3],
            lvl_types: &CSR,
            dim2lvl: &ID,
            lvl2dim: &ID
        }
    }

    #[test]
    fn support_set_has_fifty_eight_triples() {
        assert_eq!(TypeTriple::SUPPORTED.len(), 58);
        assert!(TypeTriple::SUPPORTED.iter().all(TypeTriple::is_supported));
        assert!(!TypeTriple::new(OverheadType::U32, OverheadType::U8, PrimaryType::I32).is_supported());
        assert!(!TypeTriple::new(OverheadType::U32, OverheadType::U32, PrimaryType::C64).is_supported());
    }

    #[test]
    fn index_is_normalised() {
        let triple = TypeTriple::new(OverheadType::Index, OverheadType::Index, PrimaryType::C32);
        assert_eq!(triple.pos, OverheadType::U64);
        assert!(triple.is_supported());
    }

    #[test]
    fn empty_handle_reports_its_triple() {
        let triple = TypeTriple::new(OverheadType::U16, OverheadType::U8, PrimaryType::F32);
        let mut tensor = new_sparse_tensor(&encoding(), triple, Action::Empty, ActionInput::None)
            .into_tensor()
            .unwrap();
        assert_eq!(tensor.type_triple(), triple);
        assert!(matches!(tensor, SparseTensorHandle::P16C8F32(_)));
        tensor.lex_insert::<f32>(&[1, 2], 4.0);
        tensor.end_insert();
        assert_eq!(tensor.positions::<u16>(1), &[0, 0, 1]);
        assert_eq!(tensor.coordinates::<u8>(1), &[2]);
        assert_eq!(tensor.values::<f32>(), &[4.0]);
        assert_eq!(tensor.positions_ref(1).to_u64_vec(), vec![0, 0, 1]);
    }

    #[test]
    fn unsupported_triple_is_an_error() {
        let triple = TypeTriple::new(OverheadType::U8, OverheadType::U16, PrimaryType::C32);
        let error = try_new_sparse_tensor(&encoding(), triple, Action::Empty, ActionInput::None)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "unsupported combination of types: <P=u8, C=u16, V=c32>"
        );
    }

    #[test]
    fn missing_input_is_an_error() {
        let triple = TypeTriple::new(OverheadType::U64, OverheadType::U64, PrimaryType::F64);
        assert!(matches!(
            try_new_sparse_tensor(&encoding(), triple, Action::FromCOO, ActionInput::None),
            Err(Error::MissingInput { action: Action::FromCOO, .. })
        ));
    }

    #[test]
    fn coo_of_wrong_value_type_is_rejected() {
        let triple = TypeTriple::new(OverheadType::U64, OverheadType::U64, PrimaryType::F64);
        let coo = i32::wrap_coo(SparseTensorCoo::new(&[2, 3], 0));
        assert!(matches!(
            try_new_sparse_tensor(&encoding(), triple, Action::FromCOO, ActionInput::Coo(coo)),
            Err(Error::ValueTypeMismatch { expected: PrimaryType::F64, got: PrimaryType::I32, .. })
        ));
    }

    #[test]
    fn output_kind_is_checked() {
        let triple = TypeTriple::new(OverheadType::U64, OverheadType::U64, PrimaryType::F64);
        let coo = new_sparse_tensor(&encoding(), triple, Action::EmptyCOO, ActionInput::None);
        let error = coo.into_tensor().unwrap_err();
        assert_eq!(error.to_string(), "expected a sparse tensor, got a COO");
    }

    #[test]
    fn bad_maps_are_rejected() {
        let triple = TypeTriple::new(OverheadType::U64, OverheadType::U64, PrimaryType::F64);
        let bad = SparseTensorEncoding {
            dim2lvl: &[0, 0],
            ..encoding()
        };
        assert!(matches!(
            try_new_sparse_tensor(&bad, triple, Action::Empty, ActionInput::None),
            Err(Error::NotPermutation("dim2lvl"))
        ));
        let short = SparseTensorEncoding {
            lvl_types: &[Dense],
            ..encoding()
        };
        assert!(matches!(
            try_new_sparse_tensor(&short, triple, Action::Empty, ActionInput::None),
            Err(Error::RankMismatch { what: "lvl_types", .. })
        ));
    }

    #[test]
    fn narrow_coordinates_are_rejected_before_construction() {
        let triple = TypeTriple::new(OverheadType::U8, OverheadType::U8, PrimaryType::F64);
        let wide = SparseTensorEncoding {
            dim_sizes: &[2, 300],
            lvl_sizes: &[2, 300],
            ..encoding()
        };
        let error = try_new_sparse_tensor(&wide, triple, Action::Empty, ActionInput::None).unwrap_err();
        assert!(matches!(
            error,
            Error::OverheadTooNarrow { lvl: 1, size: 300, crd: OverheadType::U8 }
        ));
        assert_eq!(error.to_string(), "level 1 has size 300, which u8 coordinates cannot address");
        // Dense levels hold no coordinates.
        let dense = SparseTensorEncoding {
            dim_sizes: &[300, 2],
            lvl_sizes: &[300, 2],
            ..encoding()
        };
        assert!(try_new_sparse_tensor(&dense, triple, Action::Empty, ActionInput::None).is_ok());
    }

    #[test]
    fn singleton_without_a_non_unique_parent_is_rejected() {
        let triple = TypeTriple::new(OverheadType::U64, OverheadType::U64, PrimaryType::F64);
        let encoding = SparseTensorEncoding {
            lvl_types: &[DimLevelType::Singleton, DimLevelType::Compressed],
            ..encoding()
        };
        assert!(matches!(
            try_new_sparse_tensor(&encoding, triple, Action::Empty, ActionInput::None),
            Err(Error::InvalidLevelType { lvl: 0, lvl_type: DimLevelType::Singleton, .. })
        ));
    }

    #[test]
    fn empty_coo_and_iterator_handles() {
        let triple = TypeTriple::new(OverheadType::U64, OverheadType::U64, PrimaryType::BF16);
        let mut coo = new_sparse_tensor(&encoding(), triple, Action::EmptyCOO, ActionInput::None)
            .into_coo()
            .unwrap();
        assert_eq!(coo.val_type(), PrimaryType::BF16);
        bf16::coo_mut(&mut coo).unwrap().add(&[1, 1], bf16::ONE);
        let tensor = new_sparse_tensor(&encoding(), triple, Action::FromCOO, ActionInput::Coo(coo))
            .into_tensor()
            .unwrap();
        let mut iter = new_sparse_tensor(&encoding(), triple, Action::ToIterator, ActionInput::Tensor(&tensor))
            .into_iterator()
            .unwrap();
        assert_eq!(iter.rank(), 2);
        let iter = bf16::iterator_mut(&mut iter).unwrap();
        let element = iter.get_next().map(|e| (e.coords.to_vec(), e.value));
        assert_eq!(element, Some((vec![1, 1], bf16::ONE)));
        assert!(iter.get_next().is_none());
        assert!(f16::iterator_mut(&mut SparseTensorIteratorHandle::BF16(Box::new(
            SparseTensorIterator::new(SparseTensorCoo::new(&[1], 0))
        )))
        .is_none());
    }
}
