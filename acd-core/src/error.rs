//! Error types for the ACD-ARD core library.
//!
//! Each pipeline stage exposes its own error enum with a stable
//! machine-readable code so the CLI can log failures consistently.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

macro_rules! define_error_codes {
    (
        $(#[$enum_meta:meta])*
        enum $CodeTy:ident for $ErrTy:ident {
            $(
                $(#[$variant_meta:meta])*
                $CodeVariant:ident => $ErrVariant:ident $( { $($pattern:tt)* } )? $( ( $($tuple:tt)* ) )? => $code:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum $CodeTy {
            $(
                $(#[$variant_meta])*
                $CodeVariant,
            )+
        }

        impl $CodeTy {
            /// Return the stable machine-readable representation of this error code.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$CodeVariant => $code,)+
                }
            }
        }

        impl fmt::Display for $CodeTy {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $ErrTy {
            #[doc = concat!(
                "Retrieve the stable [`",
                stringify!($CodeTy),
                "`] for this error."
            )]
            pub const fn code(&self) -> $CodeTy {
                match self {
                    $(Self::$ErrVariant $( { $($pattern)* } )? $( ( $($tuple)* ) )? => $CodeTy::$CodeVariant,)+
                }
            }
        }
    };
}

/// Errors raised while loading and interrogating YAML configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path that was probed.
        path: PathBuf,
    },
    /// Reading the configuration file failed.
    #[error("failed to read configuration file `{path}`: {source}")]
    Io {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid YAML.
    #[error("failed to parse configuration file `{path}`: {source}")]
    Parse {
        /// Path of the malformed file.
        path: PathBuf,
        /// Underlying YAML parse error.
        #[source]
        source: serde_yaml::Error,
    },
    /// The parsed document is not a mapping.
    #[error("configuration file is not a mapping: {path}")]
    NotAMapping {
        /// Path of the offending file.
        path: PathBuf,
    },
    /// A required key is absent from a configuration file.
    #[error("key `{key}` not found in configuration `{file}`")]
    MissingKey {
        /// Configuration file name (without extension).
        file: String,
        /// The missing key.
        key: String,
    },
}

define_error_codes! {
    /// Stable codes describing [`ConfigError`] variants.
    enum ConfigErrorCode for ConfigError {
        /// The configuration file does not exist.
        NotFound => NotFound { .. } => "CONFIG_NOT_FOUND",
        /// Reading the configuration file failed.
        Io => Io { .. } => "CONFIG_IO",
        /// The configuration file is not valid YAML.
        Parse => Parse { .. } => "CONFIG_PARSE",
        /// The parsed document is not a mapping.
        NotAMapping => NotAMapping { .. } => "CONFIG_NOT_A_MAPPING",
        /// A required key is absent from a configuration file.
        MissingKey => MissingKey { .. } => "CONFIG_MISSING_KEY",
    }
}

/// Errors raised while dispatching to an execution backend.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The requested cluster type is not one of `pbs`, `slurm`, or `local`.
    #[error("unsupported cluster type: {kind}")]
    Unsupported {
        /// The rejected cluster-type string.
        kind: String,
    },
    /// Building the local thread pool failed.
    #[error("failed to build local worker pool: {source}")]
    Pool {
        /// Underlying rayon build error.
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
    /// The scheduler submit program could not be spawned.
    #[error("failed to invoke `{program}`: {source}")]
    Spawn {
        /// Submission program, e.g. `qsub` or `sbatch`.
        program: String,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The scheduler rejected the job submission.
    #[error("`{program}` exited with status {status:?}: {stderr}")]
    Submit {
        /// Submission program, e.g. `qsub` or `sbatch`.
        program: String,
        /// Process exit status, if any.
        status: Option<i32>,
        /// Captured standard error from the scheduler.
        stderr: String,
    },
}

define_error_codes! {
    /// Stable codes describing [`ClusterError`] variants.
    enum ClusterErrorCode for ClusterError {
        /// The requested cluster type is unsupported.
        Unsupported => Unsupported { .. } => "CLUSTER_UNSUPPORTED_TYPE",
        /// Building the local thread pool failed.
        Pool => Pool { .. } => "CLUSTER_POOL",
        /// The submit program could not be spawned.
        Spawn => Spawn { .. } => "CLUSTER_SPAWN",
        /// The scheduler rejected the submission.
        Submit => Submit { .. } => "CLUSTER_SUBMIT",
    }
}

/// Errors raised while generating a collection manifest.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Configuration lookup failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The collection is not present in `collections.yml`.
    #[error("collection `{collection}` not found in configuration")]
    UnknownCollection {
        /// The requested collection name.
        collection: String,
    },
    /// Walking the collection input directory failed.
    #[error("failed to scan collection input: {source}")]
    Walk {
        /// Underlying directory walk error.
        #[source]
        source: walkdir::Error,
    },
    /// Writing the manifest file failed.
    #[error("failed to write manifest `{path}`: {source}")]
    Io {
        /// Manifest output path.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}

define_error_codes! {
    /// Stable codes describing [`ManifestError`] variants.
    enum ManifestErrorCode for ManifestError {
        /// Configuration lookup failed.
        Config => Config(..) => "MANIFEST_CONFIG",
        /// The collection is not present in configuration.
        UnknownCollection => UnknownCollection { .. } => "MANIFEST_UNKNOWN_COLLECTION",
        /// Walking the collection input directory failed.
        Walk => Walk { .. } => "MANIFEST_WALK",
        /// Writing the manifest file failed.
        Io => Io { .. } => "MANIFEST_IO",
    }
}

/// Errors raised while converting NetCDF archives into a base Zarr store.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Configuration lookup failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The dataset is not present in `datasets.yml`.
    #[error("dataset `{dataset}` not found in configuration")]
    UnknownDataset {
        /// The requested dataset name.
        dataset: String,
    },
    /// The dataset resolved to no NetCDF input files.
    #[error("dataset `{dataset}` has no NetCDF input files")]
    NoInputFiles {
        /// The requested dataset name.
        dataset: String,
    },
    /// Reading a NetCDF input file failed.
    #[error("failed to read NetCDF file `{path}`: {detail}")]
    NetCdf {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Description of the underlying `netcdf3` failure.
        detail: String,
    },
    /// A variable references a dimension the file does not define.
    #[error("variable `{variable}` references unknown dimension `{dimension}`")]
    UnknownDimension {
        /// Variable whose dimension lookup failed.
        variable: String,
        /// The missing dimension name.
        dimension: String,
    },
    /// Input files disagree on a variable's trailing dimensions.
    #[error("variable `{variable}` has shape {got:?}, expected trailing dimensions of {expected:?}")]
    ShapeMismatch {
        /// Variable that cannot be appended across files.
        variable: String,
        /// Shape recorded from the first input file.
        expected: Vec<u64>,
        /// Conflicting shape from a later input file.
        got: Vec<u64>,
    },
    /// Filesystem I/O outside the Zarr store failed.
    #[error("I/O error at `{path}`: {source}")]
    Io {
        /// Path where the failure occurred.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// Creating the Zarr filesystem store failed.
    #[error("failed to create Zarr store at `{path}`: {source}")]
    StoreCreate {
        /// Store root path.
        path: PathBuf,
        /// Underlying store creation error.
        #[source]
        source: zarrs::filesystem::FilesystemStoreCreateError,
    },
    /// Creating the root Zarr group failed.
    #[error("failed to create Zarr group: {source}")]
    GroupCreate {
        /// Underlying group creation error.
        #[source]
        source: zarrs::group::GroupCreateError,
    },
    /// Creating a Zarr array failed.
    #[error("failed to create Zarr array `{array}`: {source}")]
    ArrayCreate {
        /// Array node path within the store.
        array: String,
        /// Underlying array creation error.
        #[source]
        source: zarrs::array::ArrayCreateError,
    },
    /// A Zarr array operation failed.
    #[error("Zarr array `{array}` operation failed: {source}")]
    Array {
        /// Array node path within the store.
        array: String,
        /// Underlying array error.
        #[source]
        source: zarrs::array::ArrayError,
    },
    /// A Zarr storage operation failed.
    #[error("Zarr storage operation failed: {source}")]
    Storage {
        /// Underlying storage error.
        #[source]
        source: zarrs::storage::StorageError,
    },
}

define_error_codes! {
    /// Stable codes describing [`ConvertError`] variants.
    enum ConvertErrorCode for ConvertError {
        /// Configuration lookup failed.
        Config => Config(..) => "CONVERT_CONFIG",
        /// The dataset is not present in configuration.
        UnknownDataset => UnknownDataset { .. } => "CONVERT_UNKNOWN_DATASET",
        /// The dataset resolved to no NetCDF input files.
        NoInputFiles => NoInputFiles { .. } => "CONVERT_NO_INPUT_FILES",
        /// Reading a NetCDF input file failed.
        NetCdf => NetCdf { .. } => "CONVERT_NETCDF",
        /// A variable references an unknown dimension.
        UnknownDimension => UnknownDimension { .. } => "CONVERT_UNKNOWN_DIMENSION",
        /// Input files disagree on a variable's trailing dimensions.
        ShapeMismatch => ShapeMismatch { .. } => "CONVERT_SHAPE_MISMATCH",
        /// Filesystem I/O failed.
        Io => Io { .. } => "CONVERT_IO",
        /// Creating the Zarr filesystem store failed.
        StoreCreate => StoreCreate { .. } => "CONVERT_STORE_CREATE",
        /// Creating the root Zarr group failed.
        GroupCreate => GroupCreate { .. } => "CONVERT_GROUP_CREATE",
        /// Creating a Zarr array failed.
        ArrayCreate => ArrayCreate { .. } => "CONVERT_ARRAY_CREATE",
        /// A Zarr array operation failed.
        Array => Array { .. } => "CONVERT_ARRAY",
        /// A Zarr storage operation failed.
        Storage => Storage { .. } => "CONVERT_STORAGE",
    }
}

/// Errors raised while rechunking a Zarr store.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RechunkError {
    /// Configuration lookup failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The chunk configuration is not present in `chunks.yml`.
    #[error("chunk config `{name}` not found in configuration")]
    UnknownChunkConfig {
        /// The requested chunk configuration name.
        name: String,
    },
    /// The memory budget string could not be parsed.
    #[error("invalid memory budget `{value}`; expected forms like `512MB` or `2GB`")]
    InvalidMemoryBudget {
        /// The rejected memory budget string.
        value: String,
    },
    /// A chunk size in the configuration is not a positive integer.
    #[error("chunk size for dimension `{dimension}` must be a positive integer")]
    InvalidChunkSize {
        /// Dimension with the invalid chunk size.
        dimension: String,
    },
    /// The source array carries no dimension names to map the chunk config onto.
    #[error("array `{array}` has no dimension names; cannot map chunk config")]
    MissingDimensionNames {
        /// Array node path within the store.
        array: String,
    },
    /// The input store contains no arrays.
    #[error("no Zarr arrays found under `{path}`")]
    NoArrays {
        /// Input store root path.
        path: PathBuf,
    },
    /// Creating or opening a Zarr filesystem store failed.
    #[error("failed to open Zarr store at `{path}`: {source}")]
    StoreCreate {
        /// Store root path.
        path: PathBuf,
        /// Underlying store creation error.
        #[source]
        source: zarrs::filesystem::FilesystemStoreCreateError,
    },
    /// Creating the target root group failed.
    #[error("failed to create Zarr group: {source}")]
    GroupCreate {
        /// Underlying group creation error.
        #[source]
        source: zarrs::group::GroupCreateError,
    },
    /// Creating or opening a Zarr array failed.
    #[error("failed to create or open Zarr array `{array}`: {source}")]
    ArrayCreate {
        /// Array node path within the store.
        array: String,
        /// Underlying array creation error.
        #[source]
        source: zarrs::array::ArrayCreateError,
    },
    /// A Zarr array operation failed.
    #[error("Zarr array `{array}` operation failed: {source}")]
    Array {
        /// Array node path within the store.
        array: String,
        /// Underlying array error.
        #[source]
        source: zarrs::array::ArrayError,
    },
    /// A Zarr storage operation failed.
    #[error("Zarr storage operation failed: {source}")]
    Storage {
        /// Underlying storage error.
        #[source]
        source: zarrs::storage::StorageError,
    },
    /// Filesystem I/O outside the Zarr stores failed.
    #[error("I/O error at `{path}`: {source}")]
    Io {
        /// Path where the failure occurred.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}

define_error_codes! {
    /// Stable codes describing [`RechunkError`] variants.
    enum RechunkErrorCode for RechunkError {
        /// Configuration lookup failed.
        Config => Config(..) => "RECHUNK_CONFIG",
        /// The chunk configuration is not present in configuration.
        UnknownChunkConfig => UnknownChunkConfig { .. } => "RECHUNK_UNKNOWN_CHUNK_CONFIG",
        /// The memory budget string could not be parsed.
        InvalidMemoryBudget => InvalidMemoryBudget { .. } => "RECHUNK_INVALID_MEMORY_BUDGET",
        /// A configured chunk size is not a positive integer.
        InvalidChunkSize => InvalidChunkSize { .. } => "RECHUNK_INVALID_CHUNK_SIZE",
        /// The source array carries no dimension names.
        MissingDimensionNames => MissingDimensionNames { .. } => "RECHUNK_MISSING_DIMENSION_NAMES",
        /// The input store contains no arrays.
        NoArrays => NoArrays { .. } => "RECHUNK_NO_ARRAYS",
        /// Creating or opening a Zarr filesystem store failed.
        StoreCreate => StoreCreate { .. } => "RECHUNK_STORE_CREATE",
        /// Creating the target root group failed.
        GroupCreate => GroupCreate { .. } => "RECHUNK_GROUP_CREATE",
        /// Creating or opening a Zarr array failed.
        ArrayCreate => ArrayCreate { .. } => "RECHUNK_ARRAY_CREATE",
        /// A Zarr array operation failed.
        Array => Array { .. } => "RECHUNK_ARRAY",
        /// A Zarr storage operation failed.
        Storage => Storage { .. } => "RECHUNK_STORAGE",
        /// Filesystem I/O failed.
        Io => Io { .. } => "RECHUNK_IO",
    }
}
