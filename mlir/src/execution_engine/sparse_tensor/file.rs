/*!
# Parsing sparse tensors from files

This file implements parsing and printing of files in one of the following external formats:

(1) Matrix Market Exchange (MME): *.mtx
    <https://math.nist.gov/MatrixMarket/formats.html>

(2) Formidable Repository of Open Sparse Tensors and Tools (FROSTT): *.tns
    <http://frostt.io/tensors/file-formats.html>

This file is part of the lightweight runtime support library for sparse tensor manipulations. The functionality of the support library is meant to simplify benchmarking, testing, and debugging MLIR code operating on sparse tensors.  However, the provided functionality is **not** part of core MLIR itself.

- include <https://github.com/llvm/llvm-project/blob/main/mlir/include/mlir/ExecutionEngine/SparseTensor/File.h>
- lib <https://github.com/llvm/llvm-project/blob/main/mlir/lib/ExecutionEngine/SparseTensor/File.cpp>
*/

use std::{
    fmt::{self, Display},
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf}
};

use tracing::{debug, warn};

use crate::dialect::sparse_tensor::ir::enums::{DimLevelType, PrimaryType};

use super::{
    arithmetic_utils::to_usize,
    coo::SparseTensorCoo,
    error_handling::{Error, Result},
    map_ref::MapRef,
    permutation_ref::PermutationRef,
    storage::{SparseTensorStorage, SparseTensorStorageBase},
    types::{Overhead, Primary}
};

/// The kind of values a file declares in its header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueKind {
    // The value before calling `read_header`.
    #[default]
    Invalid,
    // Values that can be set by `read_mme_header`.
    Pattern,
    Real,
    Integer,
    Complex,
    // The value set by `read_ext_frostt_header`.
    Undefined
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Pattern => "pattern",
            Self::Real => "real",
            Self::Integer => "integer",
            Self::Complex => "complex",
            Self::Undefined => "undefined"
        }
    }
}

/**
This type abstracts over the information stored in file headers, as well as providing the buffers and methods for parsing those headers and the elements after them.
*/
pub struct SparseTensorReader {
    path: PathBuf,
    input: Box<dyn BufRead>,
    line: String,
    line_no: usize,
    value_kind: ValueKind,
    is_symmetric: bool,
    nse: u64,
    dim_sizes: Vec<u64>
}

impl fmt::Debug for SparseTensorReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseTensorReader")
            .field("path", &self.path)
            .field("line_no", &self.line_no)
            .field("value_kind", &self.value_kind)
            .field("is_symmetric", &self.is_symmetric)
            .field("nse", &self.nse)
            .field("dim_sizes", &self.dim_sizes)
            .finish_non_exhaustive()
    }
}

impl SparseTensorReader {
    /// Opens the file and reads and parses its header.  The format is
    /// chosen by extension: `.mtx` for MME, `.tns` for extended FROSTT.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| Error::Open {
            path: path.clone(),
            source
        })?;
        Self::from_reader(path, BufReader::new(file))
    }

    /// As `open`, but reads from `input`; `path` only selects the format
    /// and names the source in diagnostics.
    pub fn from_reader(path: impl Into<PathBuf>, input: impl BufRead + 'static) -> Result<Self> {
        let mut reader = Self {
            path: path.into(),
            input: Box::new(input),
            line: String::new(),
            line_no: 0,
            value_kind: ValueKind::Invalid,
            is_symmetric: false,
            nse: 0,
            dim_sizes: Vec::new()
        };
        reader.read_header()?;
        Ok(reader)
    }

    /**
    Opens the file, reads its header, and checks it against the expected tensor: the file's values must be readable as `val_tp`, its rank must be `dim_shape.len()`, and every non-zero entry of `dim_shape` must equal the corresponding dimension size (zero marks a dynamic size).
    */
    pub fn create(path: impl AsRef<Path>, dim_shape: &[u64], val_tp: PrimaryType) -> Result<Self> {
        let reader = Self::open(path)?;
        if !reader.can_read_as(val_tp) {
            return Err(Error::IncompatibleValueType {
                file: reader.value_kind.name(),
                requested: val_tp
            });
        }
        reader.assert_matches_shape(dim_shape)?;
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    /// Checks if a header has been successfully read.
    pub fn is_valid(&self) -> bool {
        self.value_kind != ValueKind::Invalid
    }

    /**
    Checks if the file's `ValueKind` can be converted into the given tensor `PrimaryType`.
    */
    pub fn can_read_as(&self, val_tp: PrimaryType) -> bool {
        match self.value_kind {
            ValueKind::Invalid => false,
            // Pattern tensors get an arbitrary value, so any type will do.
            ValueKind::Pattern => true,
            // Integer values, and the unknown values of FROSTT files, may
            // be read into any real type.
            ValueKind::Integer | ValueKind::Undefined => val_tp.is_real(),
            ValueKind::Real => val_tp.is_float(),
            ValueKind::Complex => val_tp.is_complex()
        }
    }

    /// Gets the MME "pattern" property setting.
    pub fn is_pattern(&self) -> bool {
        self.value_kind == ValueKind::Pattern
    }

    /// Gets the MME "symmetric" property setting.
    pub fn is_symmetric(&self) -> bool {
        self.is_symmetric
    }

    /// Gets the dimension-rank of the tensor.
    pub fn rank(&self) -> usize {
        self.dim_sizes.len()
    }

    /// Gets the number of stored elements declared by the header.
    pub fn nse(&self) -> u64 {
        self.nse
    }

    /// Gets the dimension-sizes array.
    pub fn dim_sizes(&self) -> &[u64] {
        &self.dim_sizes
    }

    /// Safely gets the size of the given dimension.
    pub fn dim_size(&self, d: usize) -> u64 {
        debug_assert!(d < self.rank(), "Dimension out of bounds");
        self.dim_sizes[d]
    }

    /// Checks the shape subsumes the actual dimension sizes.
    pub fn assert_matches_shape(&self, dim_shape: &[u64]) -> Result<()> {
        if dim_shape.len() != self.rank() {
            return Err(Error::RankMismatch {
                what: "dimension shape",
                expected: self.rank(),
                got: dim_shape.len()
            });
        }
        for (dim, (&expected, &got)) in dim_shape.iter().zip(&self.dim_sizes).enumerate() {
            if expected != 0 && expected != got {
                return Err(Error::ShapeMismatch { dim, expected, got });
            }
        }
        Ok(())
    }

    /**
    Allocates a new COO object for `lvl_sizes`, initialises it by reading all the elements from the file and applying `dim2lvl` to their coordinates.  Off-diagonal elements of a symmetric matrix are stored twice, once per triangle.

    Errors: `dim2lvl` is not a permutation of the file's rank, or an element line is malformed.
    */
    pub fn read_coo<V: Primary>(&mut self, lvl_sizes: &[u64], dim2lvl: &[u64]) -> Result<SparseTensorCoo<V>> {
        let dim2lvl = PermutationRef::new(self.rank(), dim2lvl)?;
        debug_assert_eq!(lvl_sizes.len(), self.rank(), "Level-rank mismatch");
        let nse = to_usize(self.nse);
        let capacity = if self.is_symmetric { 2 * nse } else { nse };
        let mut lvl_coo = SparseTensorCoo::new(lvl_sizes, capacity);
        let mut dim_coords = vec![0; self.rank()];
        let mut lvl_coords = vec![0; self.rank()];
        for _ in 0..nse {
            let value = self.read_element::<V>(&mut dim_coords)?;
            dim2lvl.push_forward(&dim_coords, &mut lvl_coords);
            lvl_coo.add(&lvl_coords, value);
            if self.is_symmetric && dim_coords[0] != dim_coords[1] {
                dim_coords.swap(0, 1);
                dim2lvl.push_forward(&dim_coords, &mut lvl_coords);
                lvl_coo.add(&lvl_coords, value);
            }
        }
        debug!(path = %self.path.display(), nse = lvl_coo.len(), sorted = lvl_coo.is_sorted(), "read COO");
        Ok(lvl_coo)
    }

    /**
    Reads all the elements straight into caller-provided buffers: level coordinates as an array of structs with `lvl_rank` entries per element, and one value per element.  Returns whether the elements were already in strictly ascending lexicographic level order, in which case the buffers can be packed without sorting.

    Asserts: the buffers hold at least `nse` elements.  Symmetric files are rejected, since mirroring would change the element count.
    */
    pub fn read_to_buffers<C: Overhead, V: Primary>(
        &mut self,
        dim2lvl: &[u64],
        lvl2dim: &[u64],
        lvl_coordinates: &mut [C],
        values: &mut [V]
    ) -> Result<bool> {
        let map = MapRef::permutation(dim2lvl, lvl2dim)?;
        if map.dim_rank() != self.rank() {
            return Err(Error::RankMismatch {
                what: "dim2lvl",
                expected: self.rank(),
                got: map.dim_rank()
            });
        }
        if self.is_symmetric {
            return Err(self.malformed_header("symmetric files cannot be read into buffers"));
        }
        // Every level's coordinates land in the buffer, dense ones included.
        let lvl_sizes = map.lvl_sizes(&self.dim_sizes);
        if let Some(l) = lvl_sizes.iter().position(|&sz| sz.saturating_sub(1) > C::KIND.max_value()) {
            return Err(Error::OverheadTooNarrow {
                lvl: l,
                size: lvl_sizes[l],
                crd: C::KIND
            });
        }
        let lvl_rank = map.lvl_rank();
        let nse = to_usize(self.nse);
        debug_assert!(values.len() >= nse, "Not enough space in buffers");
        debug_assert!(lvl_coordinates.len() >= lvl_rank * nse, "Not enough space in buffers");
        let mut dim_coords = vec![0; self.rank()];
        let mut lvl_coords = vec![0; lvl_rank];
        let mut previous: Option<Vec<u64>> = None;
        let mut is_sorted = true;
        for (n, value) in values.iter_mut().take(nse).enumerate() {
            *value = self.read_element::<V>(&mut dim_coords)?;
            map.push_forward(&dim_coords, &mut lvl_coords);
            for (slot, &c) in lvl_coordinates[n * lvl_rank..(n + 1) * lvl_rank].iter_mut().zip(&lvl_coords) {
                *slot = C::from_u64(c);
            }
            if let Some(previous) = &mut previous {
                if is_sorted && previous.as_slice() >= lvl_coords.as_slice() {
                    is_sorted = false;
                }
                previous.copy_from_slice(&lvl_coords);
            } else {
                previous = Some(lvl_coords.clone());
            }
        }
        debug!(path = %self.path.display(), nse, is_sorted, "read to buffers");
        Ok(is_sorted)
    }

    /**
    Allocates a new sparse-tensor storage object with the given encoding, initialises it by reading all the elements from the file.
    */
    pub fn read_sparse_tensor<P: Overhead, C: Overhead, V: Primary>(
        &mut self,
        lvl_sizes: &[u64],
        lvl_types: &[DimLevelType],
        dim2lvl: &[u64],
        lvl2dim: &[u64]
    ) -> Result<SparseTensorStorage<P, C, V>> {
        let map = MapRef::permutation(dim2lvl, lvl2dim)?;
        SparseTensorStorageBase::check_lvl_types(lvl_types)?;
        SparseTensorStorageBase::check_crd_width(C::KIND, lvl_types, lvl_sizes)?;
        let lvl_coo = self.read_coo::<V>(lvl_sizes, map.dim2lvl())?;
        let dim_sizes = self.dim_sizes.clone();
        Ok(SparseTensorStorage::new_from_coo(&dim_sizes, lvl_types, map.lvl2dim(), lvl_coo))
    }

    /// Reads and parses the file's header.
    fn read_header(&mut self) -> Result<()> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("mtx") => self.read_mme_header()?,
            Some("tns") => self.read_ext_frostt_header()?,
            _ => return Err(self.malformed_header("unknown format, expected .mtx or .tns"))
        }
        debug!(
            path = %self.path.display(),
            rank = self.rank(), nse = self.nse, kind = self.value_kind.name(),
            symmetric = self.is_symmetric,
            "read sparse tensor header"
        );
        Ok(())
    }

    /// Reads the MME header of a general sparse matrix.
    fn read_mme_header(&mut self) -> Result<()> {
        if !self.read_line()? {
            return Err(self.malformed_header("empty file"));
        }
        let banner: Vec<String> = self.line.split_whitespace().map(str::to_ascii_lowercase).collect();
        let [header, object, format, field, symmetry] = banner.as_slice() else {
            return Err(self.malformed_header("expected a five-token %%MatrixMarket banner"));
        };
        if header != "%%matrixmarket" || object != "matrix" || format != "coordinate" {
            return Err(self.malformed_header("only coordinate matrices are supported"));
        }
        let value_kind = match field.as_str() {
            "pattern" => ValueKind::Pattern,
            "real" => ValueKind::Real,
            "integer" => ValueKind::Integer,
            "complex" => ValueKind::Complex,
            _ => return Err(self.malformed_header(format!("unexpected value type {:?}", field)))
        };
        let is_symmetric = match symmetry.as_str() {
            "general" => false,
            "symmetric" => true,
            _ => return Err(self.malformed_header(format!("unexpected symmetry {:?}", symmetry)))
        };
        // Skip comments.
        loop {
            if !self.read_line()? {
                return Err(self.malformed_header("missing size line"));
            }
            if !self.line.trim_start().starts_with('%') && !self.line.trim().is_empty() {
                break;
            }
        }
        // Next line contains M N NNZ.
        let sizes = self.parse_u64s("size line")?;
        let [rows, cols, nse] = sizes.as_slice() else {
            return Err(self.malformed_header("expected `rows cols nnz`"));
        };
        if is_symmetric && rows != cols {
            return Err(self.malformed_header("symmetric matrix must be square"));
        }
        self.dim_sizes = vec![*rows, *cols];
        self.nse = *nse;
        self.value_kind = value_kind;
        self.is_symmetric = is_symmetric;
        self.check_dim_sizes()
    }

    /**
    Reads the 'extended' FROSTT header. Although not part of the documented format, we assume that the file starts with optional comments followed by two lines that define the rank, the number of nonzeros, and the dimensions sizes (one per rank) of the sparse tensor.
    */
    fn read_ext_frostt_header(&mut self) -> Result<()> {
        // Skip comments.
        loop {
            if !self.read_line()? {
                return Err(self.malformed_header("missing rank line"));
            }
            if !self.line.trim_start().starts_with('#') && !self.line.trim().is_empty() {
                break;
            }
        }
        let counts = self.parse_u64s("rank line")?;
        let [rank, nse] = counts.as_slice() else {
            return Err(self.malformed_header("expected `rank nnz`"));
        };
        let (rank, nse) = (to_usize(*rank), *nse);
        if !self.read_line()? {
            return Err(self.malformed_header("missing dimension sizes"));
        }
        let dim_sizes = self.parse_u64s("dimension sizes")?;
        if dim_sizes.len() != rank {
            return Err(self.malformed_header(format!(
                "declared rank {} but found {} dimension sizes",
                rank,
                dim_sizes.len()
            )));
        }
        self.dim_sizes = dim_sizes;
        self.nse = nse;
        // The FROSTT format does not define the data type of the nonzero elements.
        self.value_kind = ValueKind::Undefined;
        self.check_dim_sizes()
    }

    fn check_dim_sizes(&self) -> Result<()> {
        if self.dim_sizes.is_empty() {
            return Err(self.malformed_header("trivial shape is unsupported"));
        }
        if self.dim_sizes.contains(&0) {
            return Err(self.malformed_header("dimension size zero has trivial storage"));
        }
        Ok(())
    }

    /**
    Reads a sparse tensor element from the next line in the input file and returns the value of the element.  Stores the zero-based coordinates of the element to the `dim_coords` array.
    */
    fn read_element<V: Primary>(&mut self, dim_coords: &mut [u64]) -> Result<V> {
        debug_assert!(self.is_valid(), "Attempt to read elements before the header");
        debug_assert_eq!(dim_coords.len(), self.rank(), "Rank mismatch");
        loop {
            if !self.read_line()? {
                return Err(self.malformed_element("unexpected end of file"));
            }
            if !self.line.trim().is_empty() {
                break;
            }
        }
        let line = std::mem::take(&mut self.line);
        let result = self.parse_element(&line, dim_coords);
        self.line = line;
        result
    }

    fn parse_element<V: Primary>(&self, line: &str, dim_coords: &mut [u64]) -> Result<V> {
        let mut tokens = line.split_whitespace();
        for (d, slot) in dim_coords.iter_mut().enumerate() {
            let token = tokens
                .next()
                .ok_or_else(|| self.malformed_element(format!("missing coordinate {}", d)))?;
            let crd: u64 = token
                .parse()
                .map_err(|_| self.malformed_element(format!("invalid coordinate {:?}", token)))?;
            // Coordinates are one-based in the file.
            if crd == 0 || crd > self.dim_sizes[d] {
                return Err(self.malformed_element(format!(
                    "coordinate {} out of bounds for dimension {} of size {}",
                    crd, d, self.dim_sizes[d]
                )));
            }
            *slot = crd - 1;
        }
        if self.is_pattern() {
            return Ok(V::pattern_value());
        }
        let mut next_f64 = |what: &str| -> Result<f64> {
            let token = tokens
                .next()
                .ok_or_else(|| self.malformed_element(format!("missing {}", what)))?;
            token
                .parse()
                .map_err(|_| self.malformed_element(format!("invalid {} {:?}", what, token)))
        };
        // The external formats always store these numerical values with the
        // type double, but we cast these values to the sparse tensor object
        // type.
        if self.value_kind == ValueKind::Complex {
            let re = next_f64("real part")?;
            let im = next_f64("imaginary part")?;
            Ok(V::from_complex(re, im))
        } else {
            Ok(V::from_real(next_f64("value")?))
        }
    }

    /// Reads the next line into the buffer.  Returns `false` at end of file.
    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self.input.read_line(&mut self.line)?;
        self.line_no += 1;
        Ok(n != 0)
    }

    fn parse_u64s(&self, what: &str) -> Result<Vec<u64>> {
        self.line
            .split_whitespace()
            .map(|token| {
                token
                    .parse()
                    .map_err(|_| self.malformed_header(format!("invalid {} entry {:?}", what, token)))
            })
            .collect()
    }

    fn malformed_header(&self, reason: impl Into<String>) -> Error {
        Error::MalformedHeader {
            path: self.path.clone(),
            reason: reason.into()
        }
    }

    fn malformed_element(&self, reason: impl Into<String>) -> Error {
        Error::MalformedElement {
            path: self.path.clone(),
            line: self.line_no,
            reason: reason.into()
        }
    }
}

/// Reads just the dimension sizes from the header of a file.
pub fn read_sparse_tensor_shape(path: impl AsRef<Path>) -> Result<Vec<u64>> {
    Ok(SparseTensorReader::open(path)?.dim_sizes().to_vec())
}

/**
A streaming writer for the extended FROSTT format.  The banner is written on creation; the caller then writes the metadata record and one record per element.
*/
pub struct SparseTensorWriter<W: Write> {
    out: W,
    rank: Option<usize>
}

impl SparseTensorWriter<Box<dyn Write>> {
    /// Writes to `path`, or to standard output when `path` is `None`.
    pub fn create(path: Option<&Path>) -> Result<Self> {
        Self::new(open_output(path)?)
    }
}

impl<W: Write> SparseTensorWriter<W> {
    pub fn new(mut out: W) -> Result<Self> {
        writeln!(out, "# extended FROSTT format")?;
        Ok(Self { out, rank: None })
    }

    /// Writes the header record: the rank and NSE, then the dimension sizes.
    pub fn write_meta_data(&mut self, nse: u64, dim_sizes: &[u64]) -> Result<()> {
        debug_assert!(!dim_sizes.is_empty(), "Trivial shape is unsupported");
        debug_assert!(self.rank.is_none(), "Metadata written twice");
        writeln!(self.out, "{} {}", dim_sizes.len(), nse)?;
        writeln!(self.out, "{}", join(dim_sizes))?;
        self.rank = Some(dim_sizes.len());
        Ok(())
    }

    /// Writes one element, with its coordinates made one-based.
    pub fn write_element<V: Display>(&mut self, dim_coords: &[u64], value: V) -> Result<()> {
        debug_assert_eq!(Some(dim_coords.len()), self.rank, "Rank mismatch");
        for c in dim_coords {
            write!(self.out, "{} ", c + 1)?;
        }
        writeln!(self.out, "{}", value)?;
        Ok(())
    }

    /// Flushes and returns the underlying output.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

fn join(sizes: &[u64]) -> String {
    sizes.iter().map(u64::to_string).collect::<Vec<_>>().join(" ")
}

/// Writes the COO in extended FROSTT format, in its current storage order.
pub fn write_ext_frostt_to<V: Primary, W: Write>(coo: &SparseTensorCoo<V>, out: W) -> Result<W> {
    let mut writer = SparseTensorWriter::new(out)?;
    writer.write_meta_data(coo.len() as u64, coo.dim_sizes())?;
    for element in coo {
        writer.write_element(element.coords, element.value)?;
    }
    writer.finish()
}

/// Writes the COO to `path` (standard output when `None`) in extended
/// FROSTT format.
pub fn write_ext_frostt<V: Primary>(coo: &SparseTensorCoo<V>, path: Option<&Path>) -> Result<()> {
    if !coo.is_sorted() {
        warn!(nse = coo.len(), "writing unsorted COO");
    }
    write_ext_frostt_to(coo, open_output(path)?)?;
    Ok(())
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path).map_err(|source| Error::Open {
                path: path.to_path_buf(),
                source
            })?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock())
    })
}
