/*!
# Sparse Tensor Tool

Reads a sparse tensor from a Matrix Market (`.mtx`) or extended FROSTT (`.tns`) file, packs it into level storage with the requested level types, dimension-to-level permutation and overhead widths, then exports it back to dimension space and writes it in extended FROSTT format.

Useful for checking that a file survives a round trip through a given storage format.  Set `RUST_LOG=debug` to see what the runtime does along the way.
*/

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mlir_sparse_tensor::{
    dialect::sparse_tensor::ir::enums::{Action, DimLevelType, OverheadType, PrimaryType},
    execution_engine::sparse_tensor::{
        error_handling::{Error, Result},
        file::{self, SparseTensorReader},
        map_ref::MapRef,
        permutation_ref::PermutationRef,
        storage::SparseTensorStorage,
        type_matrix::{
            dispatch_triple, try_new_sparse_tensor, ActionInput, SparseTensorEncoding,
            SparseTensorHandle, StorageValue, TripleVisitor, TypeTriple
        },
        types::Overhead
    }
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Width {
    Index,
    #[value(name = "64")]
    W64,
    #[value(name = "32")]
    W32,
    #[value(name = "16")]
    W16,
    #[value(name = "8")]
    W8
}

impl From<Width> for OverheadType {
    fn from(width: Width) -> Self {
        match width {
            Width::Index => Self::Index,
            Width::W64 => Self::U64,
            Width::W32 => Self::U32,
            Width::W16 => Self::U16,
            Width::W8 => Self::U8
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ValueType {
    F64,
    F32,
    F16,
    Bf16,
    I64,
    I32,
    I16,
    I8,
    C64,
    C32
}

impl From<ValueType> for PrimaryType {
    fn from(val: ValueType) -> Self {
        match val {
            ValueType::F64 => Self::F64,
            ValueType::F32 => Self::F32,
            ValueType::F16 => Self::F16,
            ValueType::Bf16 => Self::BF16,
            ValueType::I64 => Self::I64,
            ValueType::I32 => Self::I32,
            ValueType::I16 => Self::I16,
            ValueType::I8 => Self::I8,
            ValueType::C64 => Self::C64,
            ValueType::C32 => Self::C32
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sparse-tensor-tool")]
#[command(about = "Round-trips a sparse tensor file through level storage")]
struct Cli {
    /// Input file (.mtx or .tns)
    input: PathBuf,

    /// Output file; standard output when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Level types, one per level (e.g. `dense,compressed`); all
    /// compressed when omitted
    #[arg(long, value_delimiter = ',')]
    lvl_types: Vec<DimLevelType>,

    /// Dimension-to-level permutation; identity when omitted
    #[arg(long, value_delimiter = ',')]
    dim2lvl: Vec<u64>,

    /// Position overhead width
    #[arg(long, value_enum, default_value = "index")]
    pos_width: Width,

    /// Coordinate overhead width
    #[arg(long, value_enum, default_value = "index")]
    crd_width: Width,

    /// Element value type
    #[arg(long, value_enum, default_value = "f64")]
    value_type: ValueType,

    /// Sort the exported elements by dimension coordinates
    #[arg(long)]
    sort: bool
}

struct RoundTrip<'a> {
    cli: &'a Cli,
    reader: SparseTensorReader,
    encoding: SparseTensorEncoding<'a>,
    map: MapRef<'a>,
    identity: &'a [u64],
    triple: TypeTriple
}

impl TripleVisitor for RoundTrip<'_> {
    type Output = Result<usize>;

    fn visit<P: Overhead, C: Overhead, V: StorageValue>(mut self) -> Self::Output
    where
        SparseTensorStorage<P, C, V>: Into<SparseTensorHandle>
    {
        let lvl_coo = self.reader.read_coo::<V>(self.encoding.lvl_sizes, self.map.dim2lvl())?;
        let tensor = try_new_sparse_tensor(
            &self.encoding,
            self.triple,
            Action::FromCOO,
            ActionInput::Coo(V::wrap_coo(lvl_coo))
        )?
        .into_tensor()?;
        for l in 0..tensor.lvl_rank() {
            info!(
                lvl = l, lvl_type = %tensor.base().lvl_type(l),
                positions = tensor.positions_ref(l).len(),
                coordinates = tensor.coordinates_ref(l).len(),
                "level storage"
            );
        }

        // Export back into dimension space.
        let export = SparseTensorEncoding {
            lvl_sizes: self.encoding.dim_sizes,
            dim2lvl: self.identity,
            lvl2dim: self.identity,
            ..self.encoding
        };
        let mut dim_coo = try_new_sparse_tensor(&export, self.triple, Action::ToCOO, ActionInput::Tensor(&tensor))?
            .into_coo()?;
        if self.cli.sort {
            dim_coo.sort();
        }
        let nse = dim_coo.len();
        match V::coo_ref(&dim_coo) {
            Some(coo) => file::write_ext_frostt(coo, self.cli.output.as_deref())?,
            None => {
                return Err(Error::ValueTypeMismatch {
                    what: "exported COO",
                    expected: V::KIND,
                    got: dim_coo.val_type()
                })
            }
        }
        Ok(nse)
    }
}

fn run(cli: &Cli) -> Result<usize> {
    let reader = SparseTensorReader::open(&cli.input)?;
    let triple = TypeTriple::new(cli.pos_width.into(), cli.crd_width.into(), cli.value_type.into());
    if !reader.can_read_as(triple.val) {
        return Err(Error::IncompatibleValueType {
            file: reader.value_kind().name(),
            requested: triple.val
        });
    }
    let dim_sizes = reader.dim_sizes().to_vec();
    let rank = dim_sizes.len();
    let identity: Vec<u64> = (0..rank as u64).collect();
    let dim2lvl = if cli.dim2lvl.is_empty() { identity.clone() } else { cli.dim2lvl.clone() };
    let lvl_types = if cli.lvl_types.is_empty() {
        vec![DimLevelType::Compressed; rank]
    } else {
        cli.lvl_types.clone()
    };
    let perm = PermutationRef::new(rank, &dim2lvl)?;
    let lvl2dim = perm.inverse();
    let lvl_sizes = perm.push_forward_vec(&dim_sizes);
    let encoding = SparseTensorEncoding {
        dim_sizes: &dim_sizes,
        lvl_sizes: &lvl_sizes,
        lvl_types: &lvl_types,
        dim2lvl: &dim2lvl,
        lvl2dim: &lvl2dim
    };
    // Reject the storage format before reading any elements.
    let map = encoding.validate()?;
    encoding.check_overhead(triple)?;
    info!(
        input = %cli.input.display(), %triple, ?dim_sizes, ?lvl_sizes, nse = reader.nse(),
        "round trip"
    );
    let visitor = RoundTrip {
        cli,
        reader,
        encoding,
        map,
        identity: &identity,
        triple
    };
    dispatch_triple(triple, visitor).unwrap_or_else(|| Err(triple.unsupported()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(nse) => {
            info!(nse, "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("sparse-tensor-tool: {}", err);
            ExitCode::FAILURE
        }
    }
}
