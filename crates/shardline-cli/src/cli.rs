// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Argument parsing and subcommands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use shardline_config::{ConfigKey, ConfigService, FsConfigStore};
use shardline_core::{
    compute_slice, read_slice, slice_key_digest, ConvertOptions, ConvertReport, Converter,
    IdAllocator, IdMapping, InputUnit, PartitionDirFactory, WorkerStats,
};
use shardline_schema::{Dtype, EntityKind, Schema};
use tracing_subscriber::EnvFilter;

/// Top-level arguments.
#[derive(Parser, Debug)]
#[command(name = "shardline", version, about = "Deterministic slice partitioning of raw graph records")]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert raw vertex and edge files into partition files
    Convert(ConvertArgs),
    /// Print the slice an identifier routes to
    Slice {
        /// Raw identifier text
        #[arg(long)]
        id: String,
        /// Declared dtype of the identifier
        #[arg(long)]
        dtype: Dtype,
        /// Number of slices
        #[arg(long)]
        partitions: u32,
    },
    /// Count records per slice in an output directory
    Inspect {
        /// Output directory of a previous `convert`
        #[arg(long)]
        out: PathBuf,
        /// Number of slices the directory was written with
        #[arg(long)]
        partitions: u32,
    },
}

/// Arguments of `shardline convert`.
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Schema JSON file, or the config key of a stored schema
    #[arg(long, default_value = "schema")]
    pub schema: String,
    /// Vertex input files
    #[arg(long)]
    pub vertex: Vec<PathBuf>,
    /// Edge input files
    #[arg(long)]
    pub edge: Vec<PathBuf>,
    /// Output directory for partition files
    #[arg(long)]
    pub out: PathBuf,
    /// Number of slices (overrides stored options)
    #[arg(long)]
    pub partitions: Option<u32>,
    /// Worker threads (overrides stored options)
    #[arg(long)]
    pub workers: Option<usize>,
    /// Config directory (defaults to the platform config dir)
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
    /// Identifier mapping file; seeds the allocator when present and is
    /// rewritten after the run
    #[arg(long)]
    pub id_map: Option<PathBuf>,
}

/// Parse arguments, install logging and run.
pub fn entrypoint() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(cli, &mut out)
}

/// Run a parsed command, writing its report to `out`.
pub fn run<W: Write>(cli: Cli, out: &mut W) -> Result<()> {
    match cli.command {
        Command::Convert(args) => convert(&args, out),
        Command::Slice {
            id,
            dtype,
            partitions,
        } => slice(&id, dtype, partitions, out),
        Command::Inspect { out: dir, partitions } => inspect(&dir, partitions, out),
    }
}

fn config_service(dir: Option<&Path>) -> Result<ConfigService<FsConfigStore>> {
    let store = match dir {
        Some(dir) => FsConfigStore::at(dir),
        None => FsConfigStore::new(),
    }
    .context("failed to open config store")?;
    Ok(ConfigService::new(store))
}

fn load_schema(source: &str, service: &ConfigService<FsConfigStore>) -> Result<Schema> {
    let path = Path::new(source);
    if path.is_file() {
        Schema::from_path(path).with_context(|| format!("failed to load schema {}", path.display()))
    } else {
        Schema::load(service, &ConfigKey::named(source))
            .with_context(|| format!("failed to load stored schema `{source}`"))
    }
}

fn convert<W: Write>(args: &ConvertArgs, out: &mut W) -> Result<()> {
    if args.vertex.is_empty() && args.edge.is_empty() {
        bail!("nothing to convert: pass --vertex and/or --edge files");
    }
    let service = config_service(args.config_dir.as_deref())?;
    let schema = load_schema(&args.schema, &service)?;
    let mut options = ConvertOptions::load(&service).context("failed to load convert options")?;
    if let Some(n) = args.partitions {
        options.partition_count = n;
    }
    if let Some(n) = args.workers {
        options.worker_count = n;
    }

    let allocator = match &args.id_map {
        Some(path) if path.exists() => {
            let mapping = IdMapping::load(path)
                .with_context(|| format!("failed to read id map {}", path.display()))?;
            IdAllocator::from_mapping(mapping)
                .with_context(|| format!("invalid id map {}", path.display()))?
        }
        _ => IdAllocator::new(),
    };

    let units: Vec<InputUnit> = args
        .vertex
        .iter()
        .map(|p| InputUnit::file(EntityKind::Vertex, p))
        .chain(args.edge.iter().map(|p| InputUnit::file(EntityKind::Edge, p)))
        .collect();
    tracing::info!(out = %args.out.display(), id_map = args.id_map.is_some(), "converting");
    let factory = PartitionDirFactory::new(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let report = Converter::new(Arc::new(schema), options)
        .convert(&units, &factory, &allocator)
        .context("conversion failed")?;

    if let Some(path) = &args.id_map {
        allocator
            .export()
            .save(path)
            .with_context(|| format!("failed to write id map {}", path.display()))?;
    }
    write_report(&report, out)
}

fn write_stats<W: Write>(kind: EntityKind, stats: &WorkerStats, out: &mut W) -> Result<()> {
    writeln!(
        out,
        "{kind}: read {} written {} dropped {}",
        stats.read, stats.written, stats.dropped
    )?;
    for (reason, n) in &stats.dropped_by_reason {
        writeln!(out, "  dropped {reason}: {n}")?;
    }
    for (slice, n) in stats.per_slice.iter().enumerate() {
        writeln!(out, "  slice {slice:05}: {n}")?;
    }
    Ok(())
}

fn write_report<W: Write>(report: &ConvertReport, out: &mut W) -> Result<()> {
    for kind in EntityKind::ALL {
        write_stats(kind, report.stats(kind), out)?;
    }
    writeln!(
        out,
        "units {} threads {} allocated ids {}",
        report.units, report.threads, report.allocated_ids
    )?;
    Ok(())
}

fn slice<W: Write>(id: &str, dtype: Dtype, partitions: u32, out: &mut W) -> Result<()> {
    let slice = compute_slice(id.as_bytes(), dtype, partitions)
        .with_context(|| format!("cannot route `{id}` as {dtype}"))?;
    let digest = slice_key_digest(id.as_bytes(), dtype)?;
    writeln!(out, "slice {slice} digest {}", hex::encode(&digest[..8]))?;
    Ok(())
}

fn inspect<W: Write>(dir: &Path, partitions: u32, out: &mut W) -> Result<()> {
    if partitions == 0 {
        bail!("partition count must be positive");
    }
    for kind in EntityKind::ALL {
        let mut total = 0usize;
        for slice in 0..partitions {
            let n = read_slice(dir, kind, slice)
                .with_context(|| format!("failed to read {kind} slice {slice}"))?
                .len();
            total += n;
            writeln!(out, "{kind} slice {slice:05}: {n}")?;
        }
        writeln!(out, "{kind} total: {total}")?;
    }
    Ok(())
}
