//! Command implementations and argument parsing for the `acd-ard` CLI.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use acd_core::{
    Cluster, ClusterError, ClusterKind, ClusterProfile, ConfigError, ConvertError,
    ConvertSummary, ManifestError, ManifestSummary, Paths, RechunkError, RechunkSummary,
    ZarrEncoding, build_manifest, convert_to_base_zarr, ensure_config_dir, load_config,
    rechunk_store,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tracing::{Span, field, info, instrument};

const DEFAULT_CONFIG_DIR: &str = "config";
const DEFAULT_WORKERS: usize = 1;

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(
    name = "acd-ard",
    version,
    about = "Build analysis-ready Zarr stores from NetCDF climate archives."
)]
pub struct Cli {
    /// Directory containing the YAML configuration files.
    #[arg(long = "config-dir", global = true, default_value = DEFAULT_CONFIG_DIR)]
    pub config_dir: PathBuf,

    /// Enable debug-level diagnostics.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Write a sorted manifest of a collection's NetCDF files.
    Manifest(ManifestArgs),
    /// Convert a dataset's NetCDF files into a base Zarr store.
    Base(BaseArgs),
    /// Rewrite a Zarr store with an analysis-ready chunk layout.
    Rechunk(RechunkArgs),
}

/// Options accepted by the `manifest` command.
#[derive(Debug, Args, Clone)]
pub struct ManifestArgs {
    /// Collection to scan, as named in `collections.yml`.
    #[arg(long)]
    pub collection: String,

    /// Manifest output path (defaults to `<manifest_path>/<collection>.txt`).
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Options accepted by the `base` command.
#[derive(Debug, Args, Clone)]
pub struct BaseArgs {
    /// Dataset to convert, as named in `datasets.yml`.
    #[arg(long)]
    pub dataset: String,

    /// Store output path (defaults to `<base_zarr_path>/<dataset>.zarr`).
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Execution backend.
    #[arg(long = "cluster-type", value_enum, default_value_t)]
    pub cluster_type: ClusterTypeArg,

    /// Number of workers to run with.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
}

/// Options accepted by the `rechunk` command.
#[derive(Debug, Args, Clone)]
pub struct RechunkArgs {
    /// Path of the Zarr store to rechunk.
    #[arg(long)]
    pub input: PathBuf,

    /// Store output path (defaults to `<rechunked_zarr_path>/<input name>`).
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Chunk configuration to apply, as named under `chunk_configs` in
    /// `chunks.yml`.
    #[arg(long = "chunks-config", default_value = "default")]
    pub chunks_config: String,

    /// Execution backend.
    #[arg(long = "cluster-type", value_enum, default_value_t)]
    pub cluster_type: ClusterTypeArg,

    /// Number of workers to run with.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Staging store path for oversized chunks (defaults to
    /// `<temp_path>/rechunk_temp`).
    #[arg(long = "temp-store")]
    pub temp_store: Option<PathBuf>,

    /// Memory budget per copy, e.g. `512MB` or `2GB` (defaults to the
    /// `rechunking.max_mem` parameter).
    #[arg(long = "max-mem")]
    pub max_mem: Option<String>,
}

/// Execution backends selectable on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ClusterTypeArg {
    /// PBS batch scheduler.
    Pbs,
    /// Slurm batch scheduler.
    Slurm,
    /// In-process worker pool.
    #[default]
    Local,
}

impl std::fmt::Display for ClusterTypeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pbs => "pbs",
            Self::Slurm => "slurm",
            Self::Local => "local",
        })
    }
}

impl From<ClusterTypeArg> for ClusterKind {
    fn from(arg: ClusterTypeArg) -> Self {
        match arg {
            ClusterTypeArg::Pbs => Self::Pbs,
            ClusterTypeArg::Slurm => Self::Slurm,
            ClusterTypeArg::Local => Self::Local,
        }
    }
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Execution backend dispatch failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    /// Manifest generation failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Base conversion failed.
    #[error(transparent)]
    Convert(#[from] ConvertError),
    /// Rechunking failed.
    #[error(transparent)]
    Rechunk(#[from] RechunkError),
    /// Filesystem I/O outside the pipeline stages failed.
    #[error("I/O error at `{path}`: {source}")]
    Io {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}

impl CliError {
    /// Stable machine-readable code for the underlying failure.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(err) => err.code().as_str(),
            Self::Cluster(err) => err.code().as_str(),
            Self::Manifest(err) => err.code().as_str(),
            Self::Convert(err) => err.code().as_str(),
            Self::Rechunk(err) => err.code().as_str(),
            Self::Io { .. } => "CLI_IO",
        }
    }
}

/// Summarises the outcome of executing a CLI command.
#[derive(Debug, Clone)]
pub enum ExecutionSummary {
    /// A manifest was written.
    Manifest(ManifestSummary),
    /// A base Zarr store was written.
    Base(ConvertSummary),
    /// A store was rechunked.
    Rechunk(RechunkSummary),
    /// The work was handed to a batch scheduler.
    Submitted {
        /// Scheduler the job went to (`pbs` or `slurm`).
        scheduler: String,
        /// Job id the scheduler printed on submission.
        job_id: String,
    },
}

/// Executes the CLI command represented by `cli`.
///
/// # Errors
/// Returns [`CliError`] when configuration loading or execution fails.
#[instrument(
    name = "cli.run",
    err,
    skip(cli),
    fields(command = field::Empty),
)]
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, CliError> {
    ensure_config_dir(&cli.config_dir)?;
    let span = Span::current();
    match cli.command {
        Command::Manifest(args) => {
            span.record("command", field::display("manifest"));
            run_manifest(&cli.config_dir, &args)
        }
        Command::Base(args) => {
            span.record("command", field::display("base"));
            run_base(&cli.config_dir, &args)
        }
        Command::Rechunk(args) => {
            span.record("command", field::display("rechunk"));
            run_rechunk(&cli.config_dir, &args)
        }
    }
}

#[instrument(name = "cli.manifest", err, skip(config_dir, args), fields(collection = args.collection.as_str()))]
fn run_manifest(config_dir: &Path, args: &ManifestArgs) -> Result<ExecutionSummary, CliError> {
    let collections = load_config("collections", config_dir)?;
    let paths = Paths::from_config(&load_config("paths", config_dir)?);
    let summary = build_manifest(&args.collection, &collections, &paths, args.output.clone())?;
    info!(
        collection = summary.collection.as_str(),
        files = summary.file_count,
        "manifest written"
    );
    Ok(ExecutionSummary::Manifest(summary))
}

#[instrument(name = "cli.base", err, skip(config_dir, args), fields(dataset = args.dataset.as_str()))]
fn run_base(config_dir: &Path, args: &BaseArgs) -> Result<ExecutionSummary, CliError> {
    let datasets = load_config("datasets", config_dir)?;
    let paths = Paths::from_config(&load_config("paths", config_dir)?);
    let parameters = load_config("parameters", config_dir)?;

    let kind = ClusterKind::from(args.cluster_type);
    let profile = ClusterProfile::from_parameters(&parameters, kind);
    let cluster = Cluster::start(kind, args.workers, profile)?;

    match cluster {
        Cluster::Batch(mut batch) => {
            let command = base_local_command(config_dir, args);
            let job_id = submit_batch(&mut batch, &command, &paths)?;
            Ok(ExecutionSummary::Submitted {
                scheduler: kind.to_string(),
                job_id,
            })
        }
        local @ Cluster::Local(_) => {
            let encoding = ZarrEncoding::from_parameters(&parameters);
            let summary = local.install(|| {
                convert_to_base_zarr(
                    &args.dataset,
                    &datasets,
                    &paths,
                    args.output.clone(),
                    &encoding,
                )
            })?;
            local.close();
            Ok(ExecutionSummary::Base(summary))
        }
    }
}

#[instrument(name = "cli.rechunk", err, skip(config_dir, args), fields(input = %args.input.display()))]
fn run_rechunk(config_dir: &Path, args: &RechunkArgs) -> Result<ExecutionSummary, CliError> {
    let chunks = load_config("chunks", config_dir)?;
    let paths = Paths::from_config(&load_config("paths", config_dir)?);
    let parameters = load_config("parameters", config_dir)?;

    let kind = ClusterKind::from(args.cluster_type);
    let profile = ClusterProfile::from_parameters(&parameters, kind);
    let cluster = Cluster::start(kind, args.workers, profile)?;

    match cluster {
        Cluster::Batch(mut batch) => {
            let command = rechunk_local_command(config_dir, args);
            let job_id = submit_batch(&mut batch, &command, &paths)?;
            Ok(ExecutionSummary::Submitted {
                scheduler: kind.to_string(),
                job_id,
            })
        }
        local @ Cluster::Local(_) => {
            let summary = local.install(|| {
                rechunk_store(
                    &args.input,
                    &args.chunks_config,
                    &chunks,
                    &parameters,
                    &paths,
                    args.output.clone(),
                    args.temp_store.clone(),
                    args.max_mem.as_deref(),
                )
            })?;
            local.close();
            Ok(ExecutionSummary::Rechunk(summary))
        }
    }
}

fn submit_batch(
    batch: &mut acd_core::BatchCluster,
    command: &str,
    paths: &Paths,
) -> Result<String, CliError> {
    fs::create_dir_all(&paths.logs_path).map_err(|source| CliError::Io {
        path: paths.logs_path.clone(),
        source,
    })?;
    Ok(batch.submit(command, &paths.logs_path)?)
}

/// The `base` invocation the batch job runs on its allocated node.
fn base_local_command(config_dir: &Path, args: &BaseArgs) -> String {
    let mut command = format!(
        "acd-ard --config-dir {} base --dataset {} --cluster-type local --workers {}",
        config_dir.display(),
        args.dataset,
        args.workers
    );
    if let Some(output) = &args.output {
        command.push_str(&format!(" --output {}", output.display()));
    }
    command
}

/// The `rechunk` invocation the batch job runs on its allocated node.
fn rechunk_local_command(config_dir: &Path, args: &RechunkArgs) -> String {
    let mut command = format!(
        "acd-ard --config-dir {} rechunk --input {} --chunks-config {} --cluster-type local --workers {}",
        config_dir.display(),
        args.input.display(),
        args.chunks_config,
        args.workers
    );
    if let Some(output) = &args.output {
        command.push_str(&format!(" --output {}", output.display()));
    }
    if let Some(temp) = &args.temp_store {
        command.push_str(&format!(" --temp-store {}", temp.display()));
    }
    if let Some(max_mem) = &args.max_mem {
        command.push_str(&format!(" --max-mem {max_mem}"));
    }
    command
}

/// Renders `summary` to `writer` in a human-readable text format.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
pub fn render_summary(summary: &ExecutionSummary, mut writer: impl Write) -> io::Result<()> {
    match summary {
        ExecutionSummary::Manifest(manifest) => {
            writeln!(writer, "manifest: {}", manifest.output.display())?;
            writeln!(writer, "files: {}", manifest.file_count)?;
        }
        ExecutionSummary::Base(convert) => {
            writeln!(writer, "store: {}", convert.output.display())?;
            writeln!(writer, "input files: {}", convert.files)?;
            for variable in &convert.variables {
                writeln!(writer, "variable: {variable}")?;
            }
        }
        ExecutionSummary::Rechunk(rechunk) => {
            writeln!(writer, "store: {}", rechunk.output.display())?;
            for array in &rechunk.arrays {
                let chunk = array
                    .chunk_shape
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("x");
                writeln!(writer, "array: {}\tchunks: {chunk}", array.name)?;
            }
        }
        ExecutionSummary::Submitted { scheduler, job_id } => {
            writeln!(writer, "submitted: {job_id} ({scheduler})")?;
        }
    }
    Ok(())
}
