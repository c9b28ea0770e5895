use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use seqindex::index::{Index, IndexOptions};
use seqindex::persist;
use seqindex::sa::Algorithm;
use seqindex::shape::Shape;
use seqindex::symbol::Sequence;
use seqindex::util::dna;
use seqindex::BuildConfig;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "seqindex", author, version, about = "Full-text index construction for sequences", arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum AlgorithmArg {
    ComparisonSort,
    Doubling,
    Skew,
    ExternalSkew,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build SA, LCP, BWT and optionally a q-gram index of a text file
    Build {
        /// Input file: raw bytes, or DNA with --dna (FASTA header lines are skipped)
        input: PathBuf,
        /// Output prefix for index files
        #[arg(short, long, default_value = "index")]
        output: PathBuf,
        #[arg(short, long, value_enum, default_value_t = AlgorithmArg::Skew)]
        algorithm: AlgorithmArg,
        /// Treat input as DNA over ACGT
        #[arg(long)]
        dna: bool,
        /// Build an ungapped q-gram index of this length
        #[arg(short = 'q', long, conflicts_with = "shape")]
        qgram: Option<usize>,
        /// Build a gapped q-gram index with this shape, e.g. 1101
        #[arg(long)]
        shape: Option<String>,
        /// Plain LCP tree nodes (without suffix positions)
        #[arg(long)]
        plain_tree: bool,
        /// Page size in bytes for external construction
        #[arg(long, default_value_t = 1 << 20)]
        page_size: usize,
        /// Backing files pages are striped over
        #[arg(long, default_value_t = 2)]
        stripes: usize,
        /// Sort memory budget in MiB for external construction
        #[arg(long = "memory-mb", default_value_t = 256)]
        memory_mb: usize,
        /// Directory for temporary page files
        #[arg(long)]
        temp_dir: Option<PathBuf>,
    },
    /// Show what an index holds, optionally searching it
    Inspect {
        /// Prefix the index was saved under
        prefix: PathBuf,
        /// Pattern to look up (DNA indexes take ACGT)
        #[arg(short, long)]
        find: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            input,
            output,
            algorithm,
            dna,
            qgram,
            shape,
            plain_tree,
            page_size,
            stripes,
            memory_mb,
            temp_dir,
        } => {
            let mut cfg = BuildConfig::default()
                .with_page_size(page_size)
                .with_stripes(stripes)
                .with_memory_budget(memory_mb << 20);
            if let Some(dir) = temp_dir {
                cfg = cfg.with_temp_dir(dir);
            }
            let algorithm = match algorithm {
                AlgorithmArg::ComparisonSort => Algorithm::ComparisonSort,
                AlgorithmArg::Doubling => Algorithm::Doubling,
                AlgorithmArg::Skew => Algorithm::Skew,
                AlgorithmArg::ExternalSkew => Algorithm::ExternalSkew(cfg),
            };
            let sigma = if dna { dna::SIGMA } else { 256 };
            let shape = match (qgram, shape) {
                (Some(q), _) => Some(Shape::ungapped(q, sigma)?),
                (None, Some(pattern)) => Some(Shape::gapped(&pattern, sigma)?),
                (None, None) => None,
            };
            let mut opts = IndexOptions::default()
                .with_algorithm(algorithm)
                .with_hybrid_tree(!plain_tree);
            opts.shape = shape;
            run_build(&input, &output, dna, &opts)
        }
        Commands::Inspect { prefix, find } => run_inspect(&prefix, find.as_deref()),
    }
}

fn read_text(input: &Path, dna: bool) -> Result<Vec<u8>> {
    let raw = std::fs::read(input).with_context(|| format!("cannot read input '{}'", input.display()))?;
    if !dna {
        return Ok(raw);
    }
    let body: Vec<u8> = raw
        .split(|&b| b == b'\n')
        .filter(|line| !line.starts_with(b">"))
        .flat_map(|line| line.iter().copied())
        .collect();
    Ok(dna::encode(&dna::normalize(&body))?)
}

fn run_build(input: &Path, output: &Path, dna: bool, opts: &IndexOptions) -> Result<()> {
    let text = read_text(input, dna)?;
    if text.is_empty() {
        anyhow::bail!("input '{}' contains no symbols", input.display());
    }
    let seq = if dna { Sequence::new(&text, dna::SIGMA)? } else { Sequence::bytes(&text) };

    println!("input: {}", input.display());
    println!("symbols: {}", seq.len());
    println!("algorithm: {}", opts.algorithm.name());

    let idx = Index::build(&seq, opts).context("index construction failed")?;
    let manifest = persist::save(&idx, output)
        .with_context(|| format!("cannot write index under '{}'", output.display()))?;
    println!("sentinel row: {}", manifest.sentinel);
    println!("index saved: {}.*", output.display());
    Ok(())
}

fn run_inspect(prefix: &Path, find: Option<&str>) -> Result<()> {
    let manifest = persist::load_manifest(prefix)
        .with_context(|| format!("cannot read manifest under '{}'", prefix.display()))?;
    println!("symbols: {}", manifest.len);
    println!("alphabet: {}", manifest.sigma);
    println!("algorithm: {}", manifest.options.algorithm.name());
    match &manifest.options.shape {
        Some(s) => println!("q-gram shape: span {} weight {}", s.span(), s.weight()),
        None => println!("q-gram shape: none"),
    }
    println!("built: {}", manifest.created);

    if let Some(pattern) = find {
        let idx: Index<u8> = persist::load(prefix).context("cannot load index")?;
        let pattern = if manifest.sigma == dna::SIGMA {
            dna::encode(pattern.as_bytes())?
        } else {
            pattern.as_bytes().to_vec()
        };
        let hits = idx.find(&pattern)?;
        println!("occurrences: {}", hits.len());
        for p in hits.iter().take(20) {
            println!("  {}", p);
        }
    }
    Ok(())
}
