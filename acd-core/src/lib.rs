//! ACD-ARD core library.
//!
//! Builds analysis-ready Zarr stores from NetCDF climate archives: manifest
//! generation over raw collections, base conversion, and rechunking, with
//! execution dispatched locally or through a PBS or Slurm scheduler.

mod cluster;
mod config;
mod convert;
mod error;
mod manifest;
mod paths;
mod rechunk;

pub use crate::{
    cluster::{BatchCluster, Cluster, ClusterKind, ClusterProfile, LocalPool},
    config::{ConfigMap, ensure_config_dir, load_config},
    convert::{
        ConvertSummary, DIMENSIONS_ATTRIBUTE, ZarrEncoding, chunk_shape_for,
        convert_to_base_zarr, dimensions_from_attributes,
    },
    error::{
        ClusterError, ClusterErrorCode, ConfigError, ConfigErrorCode, ConvertError,
        ConvertErrorCode, ManifestError, ManifestErrorCode, RechunkError, RechunkErrorCode,
    },
    manifest::{ManifestSummary, build_manifest, scan_netcdf_files},
    paths::Paths,
    rechunk::{
        ChunkSpec, DEFAULT_MAX_MEM, RechunkSummary, RechunkedArray, TempStrategy, parse_mem,
        rechunk_store,
    },
};
