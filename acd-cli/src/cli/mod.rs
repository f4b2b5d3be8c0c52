//! Command-line interface orchestration for the ACD-ARD pipeline.
//!
//! The CLI offers three subcommands: `manifest` lists a raw NetCDF
//! collection, `base` converts a dataset into a base Zarr store, and
//! `rechunk` rewrites a store with analysis-ready chunking. The `base` and
//! `rechunk` commands run locally or submit themselves to a PBS or Slurm
//! scheduler.

mod commands;

pub use commands::{
    BaseArgs, Cli, CliError, ClusterTypeArg, Command, ExecutionSummary, ManifestArgs,
    RechunkArgs, render_summary, run_cli,
};
