/*!
# Coordinate-scheme sparse tensor representation

This file is part of the lightweight runtime support library for sparse tensor manipulations.  The functionality of the support library is meant to simplify benchmarking, testing, and debugging MLIR code operating on sparse tensors.  However, the provided functionality is **not** part of core MLIR itself.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/SparseTensor/COO.h>
*/

use std::cmp::Ordering;

/**
An element of a sparse tensor in coordinate-scheme representation (i.e., a pair of coordinates and value).  For example, a rank-1 vector element would look like

```text
({i}, a[i])
```

and a rank-5 tensor element would look like

```text
({i,j,k,l,m}, a[i,j,k,l,m])
```

The coordinates are represented as an offset into a shared pool of coordinates, rather than being stored directly in this object.
This significantly improves performance because it: (1) reduces the per-element memory footprint, and (2) centralises the memory management for coordinates. The only downside is that the coordinates themselves cannot be retrieved without the pool and the rank of the tensor to which this element belongs; use `ElementRef` for that.
*/
#[derive(Clone, Copy, Debug)]
struct Element<V> {
    // Offset into the shared coordinate pool.
    offset: usize,
    value: V
}

/// A borrowed element: its coordinates resolved against the pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementRef<'a, V> {
    pub coords: &'a [u64],
    pub value: V
}

/**
A memory-resident sparse tensor in coordinate-scheme representation (a collection of elements).  This data structure is used as an intermediate representation; e.g., for reading sparse tensors from external formats into memory, or for certain conversions between different `SparseTensorStorage` formats.

The sizes are fixed at construction.  Depending on the producer they are either dimension-sizes or level-sizes; the COO itself does not care, and we call them `dim_sizes` throughout.
*/
#[derive(Clone, Debug)]
pub struct SparseTensorCoo<V> {
    // per-dimension sizes
    dim_sizes: Vec<u64>,
    // all COO elements
    elements: Vec<Element<V>>,
    // shared coordinate pool
    coordinates: Vec<u64>,
    is_sorted: bool
}

impl<V: Copy> SparseTensorCoo<V> {
    /**
    Constructs a new coordinate-scheme sparse tensor with the given sizes and initial storage capacity.

    Asserts:
    - `dim_sizes` has nonzero size.
    - the elements of `dim_sizes` are non-zero.
    */
    pub fn new(dim_sizes: &[u64], capacity: usize) -> Self {
        debug_assert!(!dim_sizes.is_empty(), "Trivial shape is unsupported");
        debug_assert!(
            dim_sizes.iter().all(|&sz| sz > 0),
            "Dimension size zero has trivial storage"
        );
        Self {
            dim_sizes: dim_sizes.to_vec(),
            elements: Vec::with_capacity(capacity),
            coordinates: Vec::with_capacity(capacity * dim_sizes.len()),
            is_sorted: true
        }
    }

    /// Gets the dimension-rank of the tensor.
    pub fn rank(&self) -> usize {
        self.dim_sizes.len()
    }

    /// Gets the dimension-sizes array.
    pub fn dim_sizes(&self) -> &[u64] {
        &self.dim_sizes
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether the elements are known to be in ascending lexicographic order.
    pub fn is_sorted(&self) -> bool {
        self.is_sorted
    }

    /**
    Adds an element to the tensor.  This method does not check whether `coords` is already associated with a value, it adds it regardless.  Resolving such conflicts is left up to clients of the iterator interface.

    Asserts:
    - the `coords` is valid for `rank`.
    - the components of `coords` are valid for `dim_sizes`.
    */
    pub fn add(&mut self, coords: &[u64], value: V) {
        let rank = self.rank();
        debug_assert_eq!(coords.len(), rank, "Element rank mismatch");
        for (d, (&c, &sz)) in coords.iter().zip(&self.dim_sizes).enumerate() {
            debug_assert!(
                c < sz,
                "Coordinate {} is too large for dimension {} of size {}", c, d, sz
            );
        }
        let offset = self.coordinates.len();
        self.coordinates.extend_from_slice(coords);
        // Update the sorted bit against the previous element.
        if self.is_sorted {
            if let Some(last) = self.elements.last() {
                let previous = &self.coordinates[last.offset..last.offset + rank];
                self.is_sorted = previous < &self.coordinates[offset..offset + rank];
            }
        }
        self.elements.push(Element { offset, value });
    }

    /// Sorts elements lexicographically by coordinates.  The sort is stable,
    /// so duplicate coordinates keep their insertion order.
    pub fn sort(&mut self) {
        if self.is_sorted {
            return;
        }
        let rank = self.rank();
        let pool = &self.coordinates;
        self.elements.sort_by(|a, b| {
            compare_coords(
                &pool[a.offset..a.offset + rank],
                &pool[b.offset..b.offset + rank]
            )
        });
        self.is_sorted = true;
    }

    /// Gets the element at position `i` in the current storage order.
    pub fn get(&self, i: usize) -> Option<ElementRef<'_, V>> {
        self.elements.get(i).map(|e| self.resolve(e))
    }

    /// Iterates over the elements in the current storage order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            coo: self,
            position: 0
        }
    }

    fn resolve(&self, element: &Element<V>) -> ElementRef<'_, V> {
        ElementRef {
            coords: &self.coordinates[element.offset..element.offset + self.rank()],
            value: element.value
        }
    }
}

fn compare_coords(a: &[u64], b: &[u64]) -> Ordering {
    debug_assert_eq!(a.len(), b.len());
    a.cmp(b)
}

/// Borrowing iterator over the elements of a `SparseTensorCoo`.
pub struct Iter<'a, V> {
    coo: &'a SparseTensorCoo<V>,
    position: usize
}

impl<'a, V: Copy> Iterator for Iter<'a, V> {
    type Item = ElementRef<'a, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.coo.get(self.position)?;
        self.position += 1;
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.coo.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl<'a, V: Copy> ExactSizeIterator for Iter<'a, V> {}

impl<'a, V: Copy> IntoIterator for &'a SparseTensorCoo<V> {
    type Item = ElementRef<'a, V>;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/**
Wrapper to avoid memory leakage issues.  `SparseTensorCoo::iter` borrows the COO, but across the opaque-pointer boundary we need an iterator which also holds onto the underlying `SparseTensorCoo` so that it is freed whenever the iterator is freed.

We name this `SparseTensorIterator` rather than `SparseTensorCooIterator` for future-proofing, since the use of `SparseTensorCoo` is an implementation detail that we eventually want to change (e.g., to use the storage enumerator directly, rather than constructing the intermediate `SparseTensorCoo` at all).

The cursor only moves forward; to traverse the elements again, build a new iterator over the same list.
*/
#[derive(Debug)]
pub struct SparseTensorIterator<V> {
    // Owning.
    coo: SparseTensorCoo<V>,
    position: usize
}

impl<V: Copy> SparseTensorIterator<V> {
    /// Takes ownership of `coo`; it is dropped together with the iterator.
    pub fn new(coo: SparseTensorCoo<V>) -> Self {
        Self { coo, position: 0 }
    }

    /// Gets the next element.  If there are no remaining elements, then
    /// returns `None`.
    pub fn get_next(&mut self) -> Option<ElementRef<'_, V>> {
        let position = self.position;
        if position >= self.coo.len() {
            return None;
        }
        self.position += 1;
        self.coo.get(position)
    }

    /// The rank of the coordinates this iterator yields.
    pub fn rank(&self) -> usize {
        self.coo.rank()
    }

    pub fn dim_sizes(&self) -> &[u64] {
        self.coo.dim_sizes()
    }

    pub fn remaining(&self) -> usize {
        self.coo.len() - self.position
    }

    /// Releases the COO without traversing the rest of it.
    pub fn into_coo(self) -> SparseTensorCoo<V> {
        self.coo
    }
}
