//! Rechunking of base Zarr stores.
//!
//! Rewrites every array in a store with chunk shapes taken from a named
//! entry in `chunks.yml`, mapped onto array axes through the
//! `_ARRAY_DIMENSIONS` attribute. Copies are slabbed so that no read or
//! write holds more than the configured memory budget; when a single target
//! chunk exceeds the budget the copy is staged through an intermediate
//! store with smaller chunks.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_yaml::Value;
use tracing::{debug, info, instrument, warn};
use zarrs::{
    array::{Array, ArrayBuilder, ArrayBytes, ArraySubset},
    filesystem::FilesystemStore,
    group::GroupBuilder,
    storage::ListableStorageTraits,
};

use crate::{
    config::ConfigMap,
    convert::dimensions_from_attributes,
    error::RechunkError,
    paths::Paths,
};

/// Default memory budget when neither the CLI nor `parameters.yml` name one.
pub const DEFAULT_MAX_MEM: &str = "2GB";

/// How an individual array was copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempStrategy {
    /// Each target chunk fits the memory budget; copied directly.
    Direct,
    /// Target chunks exceed the budget; staged through the temp store.
    Staged,
}

/// Per-array outcome of a rechunk run.
#[derive(Debug, Clone)]
pub struct RechunkedArray {
    /// Array node path within the store.
    pub name: String,
    /// Chunk shape written to the target store.
    pub chunk_shape: Vec<u64>,
    /// Copy strategy that was used.
    pub strategy: TempStrategy,
}

/// Outcome of a rechunk run.
#[derive(Debug, Clone)]
pub struct RechunkSummary {
    /// Input store root path.
    pub input: PathBuf,
    /// Output store root path.
    pub output: PathBuf,
    /// Arrays rewritten, in store order.
    pub arrays: Vec<RechunkedArray>,
}

/// Dimension-name keyed chunk sizes parsed from `chunks.yml`.
#[derive(Debug, Clone, Default)]
pub struct ChunkSpec {
    sizes: BTreeMap<String, u64>,
    max_mem: Option<String>,
}

impl ChunkSpec {
    /// Look up the named entry under `chunk_configs` and parse its
    /// dimension sizes. A `max_mem` key carries a memory budget override
    /// rather than a dimension.
    ///
    /// # Errors
    /// Returns [`RechunkError::UnknownChunkConfig`] when the entry is absent
    /// and [`RechunkError::InvalidChunkSize`] when a size is not a positive
    /// integer.
    pub fn from_config(name: &str, chunks: &ConfigMap) -> Result<Self, RechunkError> {
        let configs = chunks.mapping("chunk_configs")?;
        let entry = configs
            .mapping(name)
            .map_err(|_| RechunkError::UnknownChunkConfig {
                name: name.to_owned(),
            })?;
        let mut sizes = BTreeMap::new();
        for dimension in entry.keys() {
            if dimension == "max_mem" {
                continue;
            }
            match entry.get(&dimension) {
                Some(Value::Number(_)) => {
                    let size = entry.u64_opt(&dimension).filter(|&s| s > 0).ok_or(
                        RechunkError::InvalidChunkSize {
                            dimension: dimension.clone(),
                        },
                    )?;
                    sizes.insert(dimension, size);
                }
                _ => {
                    return Err(RechunkError::InvalidChunkSize { dimension });
                }
            }
        }
        Ok(Self {
            sizes,
            max_mem: entry.str_opt("max_mem"),
        })
    }

    /// Chunk size configured for `dimension`, if any.
    #[must_use]
    pub fn size_for(&self, dimension: &str) -> Option<u64> {
        self.sizes.get(dimension).copied()
    }

    /// Memory budget override carried by the chunk config, if any.
    #[must_use]
    pub fn max_mem(&self) -> Option<&str> {
        self.max_mem.as_deref()
    }

    /// Map the spec onto an array's axes. Unconfigured dimensions keep the
    /// full array extent; configured sizes are clamped to the extent. Chunk
    /// extents are always at least 1.
    #[must_use]
    pub fn target_chunk_shape(&self, shape: &[u64], dims: &[String]) -> Vec<u64> {
        shape
            .iter()
            .zip(dims)
            .map(|(&extent, dim)| {
                self.size_for(dim)
                    .map_or(extent, |size| size.min(extent))
                    .max(1)
            })
            .collect()
    }
}

/// Parse a memory budget such as `512MB`, `2GB`, or `1GiB` into bytes.
/// Decimal units are powers of ten; `*iB` units are powers of two. A bare
/// number is taken as bytes.
///
/// # Errors
/// Returns [`RechunkError::InvalidMemoryBudget`] for unrecognized forms.
pub fn parse_mem(value: &str) -> Result<u64, RechunkError> {
    let invalid = || RechunkError::InvalidMemoryBudget {
        value: value.to_owned(),
    };
    let trimmed = value.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(digits_end);
    let number: f64 = digits.parse().map_err(|_| invalid())?;
    let multiplier: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" | "k" => 1e3,
        "mb" | "m" => 1e6,
        "gb" | "g" => 1e9,
        "tb" | "t" => 1e12,
        "kib" => 1024.0,
        "mib" => 1024.0 * 1024.0,
        "gib" => 1024.0 * 1024.0 * 1024.0,
        "tib" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return Err(invalid()),
    };
    let bytes = number * multiplier;
    if !bytes.is_finite() || bytes < 1.0 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

/// Rewrite every array of the store at `input` with chunk shapes from the
/// named chunk configuration.
///
/// `max_mem` overrides the chunk config's own `max_mem` and the
/// `rechunking.max_mem` entry of `parameters.yml`; when all are absent
/// [`DEFAULT_MAX_MEM`] applies. `output` defaults to
/// `<rechunked_zarr_path>/<input file name>` and `temp_store` to
/// `<temp_path>/rechunk_temp`.
///
/// # Errors
/// Returns configuration errors for unknown or malformed chunk configs and
/// Zarr errors from the underlying stores.
#[instrument(
    name = "rechunk.run",
    err,
    skip(chunks, parameters, paths, output, temp_store, max_mem),
    fields(input = %input.display())
)]
pub fn rechunk_store(
    input: &Path,
    chunks_config: &str,
    chunks: &ConfigMap,
    parameters: &ConfigMap,
    paths: &Paths,
    output: Option<PathBuf>,
    temp_store: Option<PathBuf>,
    max_mem: Option<&str>,
) -> Result<RechunkSummary, RechunkError> {
    let spec = ChunkSpec::from_config(chunks_config, chunks)?;
    // Budget precedence: CLI flag, then the chunk config's own max_mem, then
    // the rechunking parameters, then the built-in default.
    let rechunking = parameters.mapping_or_empty("rechunking");
    let budget_text = max_mem
        .or_else(|| spec.max_mem())
        .map_or_else(|| rechunking.str_or("max_mem", DEFAULT_MAX_MEM), str::to_owned);
    let budget = parse_mem(&budget_text)?;

    let output = output.unwrap_or_else(|| {
        let name = input
            .file_name()
            .map_or_else(|| PathBuf::from("rechunked.zarr"), PathBuf::from);
        paths.rechunked_zarr_path.join(name)
    });
    let temp_root = temp_store.unwrap_or_else(|| paths.temp_path.join("rechunk_temp"));
    debug!(
        chunks_config,
        budget, output = %output.display(), temp = %temp_root.display(), "rechunk plan"
    );

    let source_store = Arc::new(FilesystemStore::new(input).map_err(|source| {
        RechunkError::StoreCreate {
            path: input.to_path_buf(),
            source,
        }
    })?);
    let nodes = array_nodes(&source_store)?;
    if nodes.is_empty() {
        return Err(RechunkError::NoArrays {
            path: input.to_path_buf(),
        });
    }

    let target_store = create_store_with_root_group(&output)?;

    let mut arrays = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let rechunked = rechunk_array(
            &source_store,
            &target_store,
            node,
            &spec,
            budget,
            &temp_root,
        )?;
        arrays.push(rechunked);
    }

    let staged = arrays
        .iter()
        .any(|array| array.strategy == TempStrategy::Staged);
    if staged && temp_root.exists() {
        if let Err(err) = fs::remove_dir_all(&temp_root) {
            warn!(temp = %temp_root.display(), error = %err, "failed to clean temp store");
        }
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        arrays = arrays.len(),
        "store rechunked"
    );
    Ok(RechunkSummary {
        input: input.to_path_buf(),
        output,
        arrays,
    })
}

/// Array node paths directly under the store root, discovered from
/// `<name>/zarr.json` keys.
fn array_nodes(store: &Arc<FilesystemStore>) -> Result<Vec<String>, RechunkError> {
    let keys = store.list().map_err(|source| RechunkError::Storage { source })?;
    let mut nodes = Vec::new();
    for key in keys {
        let key = key.as_str();
        if let Some(name) = key.strip_suffix("/zarr.json") {
            if !name.is_empty() && !name.contains('/') {
                nodes.push(format!("/{name}"));
            }
        }
    }
    nodes.sort();
    Ok(nodes)
}

fn create_store_with_root_group(path: &Path) -> Result<Arc<FilesystemStore>, RechunkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RechunkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let store = Arc::new(FilesystemStore::new(path).map_err(|source| {
        RechunkError::StoreCreate {
            path: path.to_path_buf(),
            source,
        }
    })?);
    GroupBuilder::new()
        .build(store.clone(), "/")
        .map_err(|source| RechunkError::GroupCreate { source })?
        .store_metadata()
        .map_err(|source| RechunkError::Storage { source })?;
    Ok(store)
}

fn rechunk_array(
    source_store: &Arc<FilesystemStore>,
    target_store: &Arc<FilesystemStore>,
    node: &str,
    spec: &ChunkSpec,
    budget: u64,
    temp_root: &Path,
) -> Result<RechunkedArray, RechunkError> {
    let source = Array::open(source_store.clone(), node).map_err(|source| {
        RechunkError::ArrayCreate {
            array: node.to_owned(),
            source,
        }
    })?;
    let shape = source.shape().to_vec();
    let dims = dimensions_from_attributes(source.attributes())
        .filter(|names| names.len() == shape.len())
        .ok_or_else(|| RechunkError::MissingDimensionNames {
            array: node.to_owned(),
        })?;

    let chunk_shape = spec.target_chunk_shape(&shape, &dims);
    let element_size = source.data_type().fixed_size().unwrap_or(8) as u64;
    let chunk_bytes = chunk_shape.iter().product::<u64>() * element_size;

    let target = build_like(&source, target_store.clone(), node, &chunk_shape)?;

    let strategy = if chunk_bytes <= budget {
        // Grow the slab over whole target chunks along the leading axis while
        // it still fits the budget, so each copy stays chunk-aligned.
        let slab = grow_to_budget(&shape, &chunk_shape, chunk_bytes, budget);
        copy_slabs(&source, &target, &slab, node)?;
        TempStrategy::Direct
    } else {
        // One target chunk does not fit in memory: stage through a temp
        // array whose chunks are budget-sized slabs of the target chunk.
        let slab = shrink_to_budget(&chunk_shape, element_size, budget);
        let temp_path = temp_root.join(node.trim_start_matches('/'));
        let temp_store = create_store_with_root_group(&temp_path)?;
        let staged = build_like(&source, temp_store, node, &slab)?;
        copy_slabs(&source, &staged, &slab, node)?;
        copy_slabs(&staged, &target, &slab, node)?;
        TempStrategy::Staged
    };

    debug!(array = node, chunk = ?chunk_shape, ?strategy, "array rechunked");
    Ok(RechunkedArray {
        name: node.to_owned(),
        chunk_shape,
        strategy,
    })
}

/// Create an array at `node` in `store` mirroring `source`'s shape, data
/// type, fill value, attributes, and dimension names, with `chunk_shape`.
fn build_like(
    source: &Array<FilesystemStore>,
    store: Arc<FilesystemStore>,
    node: &str,
    chunk_shape: &[u64],
) -> Result<Array<FilesystemStore>, RechunkError> {
    let array = ArrayBuilder::new(
        source.shape().to_vec(),
        chunk_shape.to_vec(),
        source.data_type().clone(),
        source.fill_value().clone(),
    )
    .dimension_names(source.dimension_names().clone())
    .attributes(source.attributes().clone())
    .build(store, node)
    .map_err(|source| RechunkError::ArrayCreate {
        array: node.to_owned(),
        source,
    })?;
    array
        .store_metadata()
        .map_err(|source| RechunkError::Storage { source })?;
    Ok(array)
}

/// Widen a chunk shape along its leading axis by whole-chunk multiples while
/// the slab still fits `budget` bytes.
fn grow_to_budget(shape: &[u64], chunk_shape: &[u64], chunk_bytes: u64, budget: u64) -> Vec<u64> {
    let Some((&chunk_lead, trailing)) = chunk_shape.split_first() else {
        return Vec::new();
    };
    let extent = shape.first().copied().unwrap_or(1).max(1);
    let factor = (budget / chunk_bytes.max(1)).max(1);
    let lead = chunk_lead.saturating_mul(factor).min(extent);
    let mut slab = vec![lead];
    slab.extend_from_slice(trailing);
    slab
}

/// Shrink a chunk shape along its leading axis until it fits `budget` bytes.
fn shrink_to_budget(chunk_shape: &[u64], element_size: u64, budget: u64) -> Vec<u64> {
    let Some((&lead, trailing)) = chunk_shape.split_first() else {
        return Vec::new();
    };
    let trailing_bytes: u64 = trailing.iter().product::<u64>() * element_size;
    let lead_slab = (budget / trailing_bytes.max(1)).clamp(1, lead.max(1));
    let mut slab = vec![lead_slab];
    slab.extend_from_slice(trailing);
    slab
}

/// Every slab-aligned region covering `shape`, clamped to the array bounds.
fn slab_regions(shape: &[u64], slab: &[u64]) -> Vec<ArraySubset> {
    if shape.iter().any(|&d| d == 0) {
        return Vec::new();
    }
    let mut regions = Vec::new();
    let mut start = vec![0u64; shape.len()];
    loop {
        let ranges: Vec<_> = start
            .iter()
            .zip(shape)
            .zip(slab)
            .map(|((&begin, &extent), &step)| begin..(begin + step).min(extent))
            .collect();
        regions.push(ArraySubset::new_with_ranges(&ranges));
        let mut axis = shape.len();
        loop {
            if axis == 0 {
                return regions;
            }
            axis -= 1;
            start[axis] += slab[axis];
            if start[axis] < shape[axis] {
                break;
            }
            start[axis] = 0;
        }
    }
}

/// Copy data between two arrays of identical shape, one slab at a time. The
/// bytes pass through untouched so any data type copies correctly.
fn copy_slabs(
    from: &Array<FilesystemStore>,
    to: &Array<FilesystemStore>,
    slab: &[u64],
    node: &str,
) -> Result<usize, RechunkError> {
    let regions = slab_regions(from.shape(), slab);
    let copied = regions.len();
    for region in regions {
        let bytes: ArrayBytes<'_> = from
            .retrieve_array_subset(&region)
            .map_err(|source| RechunkError::Array {
                array: node.to_owned(),
                source,
            })?;
        to.store_array_subset(&region, bytes)
            .map_err(|source| RechunkError::Array {
                array: node.to_owned(),
                source,
            })?;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use serde_yaml::Mapping;
    use tempfile::TempDir;

    use crate::{
        config::ConfigMap,
        convert::{ZarrEncoding, convert_to_base_zarr},
        error::RechunkError,
        paths::Paths,
    };

    fn chunks_config(yaml: &str) -> ConfigMap {
        let map = serde_yaml::from_str::<Mapping>(yaml).expect("yaml");
        ConfigMap::from_mapping("chunks", map)
    }

    fn empty_parameters() -> ConfigMap {
        ConfigMap::from_mapping("parameters", Mapping::new())
    }

    fn paths_rooted_at(dir: &Path) -> Paths {
        let mut map = Mapping::new();
        map.insert("base_path".into(), dir.display().to_string().into());
        Paths::from_config(&ConfigMap::from_mapping("paths", map))
    }

    /// Build a small base store via the converter so rechunk inputs carry
    /// `_ARRAY_DIMENSIONS` exactly as production stores do.
    fn base_store(dir: &Path, values: &[f64]) -> PathBuf {
        let raw = dir.join("raw");
        std::fs::create_dir_all(&raw).expect("mkdir");
        crate::convert::tests::write_sample_netcdf(&raw.join("x.nc"), values);
        let yaml = "datasets:\n  sample:\n    input_path: raw\n";
        let datasets =
            ConfigMap::from_mapping("datasets", serde_yaml::from_str::<Mapping>(yaml).expect("yaml"));
        convert_to_base_zarr(
            "sample",
            &datasets,
            &paths_rooted_at(dir),
            Some(dir.join("base.zarr")),
            &ZarrEncoding::default(),
        )
        .expect("base conversion")
        .output
    }

    #[rstest]
    #[case::bytes("1024", 1024)]
    #[case::megabytes("512MB", 512_000_000)]
    #[case::gigabytes("2GB", 2_000_000_000)]
    #[case::binary_gigabytes("1GiB", 1_073_741_824)]
    #[case::fractional("1.5GB", 1_500_000_000)]
    #[case::lowercase("100mb", 100_000_000)]
    fn parse_mem_accepts_common_forms(#[case] text: &str, #[case] expected: u64) {
        assert_eq!(parse_mem(text).expect("must parse"), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::unit_only("GB")]
    #[case::unknown_unit("2parsecs")]
    #[case::zero("0")]
    fn parse_mem_rejects_malformed_input(#[case] text: &str) {
        let err = parse_mem(text).expect_err("must reject");
        assert!(matches!(err, RechunkError::InvalidMemoryBudget { .. }));
        assert_eq!(err.code().as_str(), "RECHUNK_INVALID_MEMORY_BUDGET");
    }

    #[test]
    fn chunk_spec_maps_onto_dimension_names() {
        let chunks = chunks_config(
            "chunk_configs:\n  default:\n    time: 1\n    lat: 2\n    lon: 2\n",
        );
        let spec = ChunkSpec::from_config("default", &chunks).expect("spec");
        let dims = vec!["time".to_owned(), "lat".to_owned(), "lon".to_owned()];
        assert_eq!(spec.target_chunk_shape(&[10, 4, 4], &dims), vec![1, 2, 2]);
        // Unconfigured dims keep the full extent; configured sizes clamp.
        let dims = vec!["time".to_owned(), "level".to_owned(), "lat".to_owned()];
        assert_eq!(spec.target_chunk_shape(&[10, 3, 1], &dims), vec![1, 3, 1]);
    }

    #[test]
    fn chunk_spec_rejects_unknown_name() {
        let chunks = chunks_config("chunk_configs:\n  default:\n    time: 1\n");
        let err = ChunkSpec::from_config("seasonal", &chunks).expect_err("unknown must fail");
        assert!(matches!(err, RechunkError::UnknownChunkConfig { .. }));
        assert_eq!(err.code().as_str(), "RECHUNK_UNKNOWN_CHUNK_CONFIG");
    }

    #[rstest]
    #[case::zero("chunk_configs:\n  default:\n    time: 0\n")]
    #[case::string("chunk_configs:\n  default:\n    time: lots\n")]
    fn chunk_spec_rejects_invalid_sizes(#[case] yaml: &str) {
        let err = ChunkSpec::from_config("default", &chunks_config(yaml)).expect_err("must fail");
        assert!(matches!(err, RechunkError::InvalidChunkSize { .. }));
    }

    #[test]
    fn chunk_spec_carries_max_mem_override() {
        let chunks = chunks_config(
            "chunk_configs:\n  default:\n    time: 1\n    max_mem: 512MB\n",
        );
        let spec = ChunkSpec::from_config("default", &chunks).expect("spec");
        assert_eq!(spec.max_mem(), Some("512MB"));
        // max_mem is a budget, not a dimension.
        assert_eq!(spec.size_for("max_mem"), None);
    }

    #[rstest]
    #[case::exact_fit(&[10, 4], &[2, 4], 64, 64, vec![2, 4])]
    #[case::grows_by_whole_chunks(&[10, 4], &[2, 4], 64, 200, vec![6, 4])]
    #[case::clamped_to_extent(&[10, 4], &[2, 4], 64, 10_000, vec![10, 4])]
    fn direct_slabs_grow_within_budget(
        #[case] shape: &[u64],
        #[case] chunk: &[u64],
        #[case] chunk_bytes: u64,
        #[case] budget: u64,
        #[case] expected: Vec<u64>,
    ) {
        assert_eq!(grow_to_budget(shape, chunk, chunk_bytes, budget), expected);
    }

    #[test]
    fn slab_regions_tile_the_whole_shape() {
        let regions = slab_regions(&[5, 4], &[2, 4]);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0], ArraySubset::new_with_ranges(&[0..2, 0..4]));
        assert_eq!(regions[2], ArraySubset::new_with_ranges(&[4..5, 0..4]));
    }

    #[test]
    fn rechunk_preserves_values_and_changes_chunks() {
        let dir = TempDir::new().expect("tempdir");
        let values: Vec<f64> = (0..8).map(f64::from).collect();
        let input = base_store(dir.path(), &values);
        let chunks = chunks_config(
            "chunk_configs:\n  default:\n    time: 1\n    lat: 2\n    lon: 2\n",
        );

        let summary = rechunk_store(
            &input,
            "default",
            &chunks,
            &empty_parameters(),
            &paths_rooted_at(dir.path()),
            Some(dir.path().join("out.zarr")),
            None,
            Some("2GB"),
        )
        .expect("rechunk must succeed");

        assert_eq!(summary.arrays.len(), 1);
        assert_eq!(summary.arrays[0].chunk_shape, vec![1, 2, 2]);
        assert_eq!(summary.arrays[0].strategy, TempStrategy::Direct);

        let store = Arc::new(FilesystemStore::new(&summary.output).expect("open store"));
        let array = Array::open(store, "/tas").expect("open array");
        let read = array
            .retrieve_array_subset_elements::<f64>(&array.subset_all())
            .expect("retrieve");
        assert_eq!(read, values);
    }

    #[test]
    fn rechunk_stages_through_temp_when_budget_is_tiny() {
        let dir = TempDir::new().expect("tempdir");
        let values: Vec<f64> = (0..8).map(f64::from).collect();
        let input = base_store(dir.path(), &values);
        let chunks = chunks_config(
            "chunk_configs:\n  default:\n    time: 2\n    lat: 2\n    lon: 2\n",
        );
        let temp = dir.path().join("staging");

        // 32 bytes holds one 2x2 f64 slab but not a whole 2x2x2 chunk.
        let summary = rechunk_store(
            &input,
            "default",
            &chunks,
            &empty_parameters(),
            &paths_rooted_at(dir.path()),
            Some(dir.path().join("out.zarr")),
            Some(temp.clone()),
            Some("32"),
        )
        .expect("rechunk must succeed");

        assert_eq!(summary.arrays[0].strategy, TempStrategy::Staged);
        assert!(!temp.exists(), "temp store must be cleaned up");

        let store = Arc::new(FilesystemStore::new(&summary.output).expect("open store"));
        let array = Array::open(store, "/tas").expect("open array");
        let read = array
            .retrieve_array_subset_elements::<f64>(&array.subset_all())
            .expect("retrieve");
        assert_eq!(read, values);
    }

    #[test]
    fn rechunk_rejects_store_without_arrays() {
        let dir = TempDir::new().expect("tempdir");
        let input = dir.path().join("empty.zarr");
        create_store_with_root_group(&input).expect("store");
        let chunks = chunks_config("chunk_configs:\n  default:\n    time: 1\n");

        let err = rechunk_store(
            &input,
            "default",
            &chunks,
            &empty_parameters(),
            &paths_rooted_at(dir.path()),
            Some(dir.path().join("out.zarr")),
            None,
            None,
        )
        .expect_err("empty store must fail");
        assert!(matches!(err, RechunkError::NoArrays { .. }));
        assert_eq!(err.code().as_str(), "RECHUNK_NO_ARRAYS");
    }

    #[test]
    fn max_mem_falls_back_to_parameters_then_default() {
        let params = ConfigMap::from_mapping(
            "parameters",
            serde_yaml::from_str::<Mapping>("rechunking:\n  max_mem: 1MB\n").expect("yaml"),
        );
        assert_eq!(
            params.mapping_or_empty("rechunking").str_or("max_mem", DEFAULT_MAX_MEM),
            "1MB"
        );
        assert_eq!(
            empty_parameters()
                .mapping_or_empty("rechunking")
                .str_or("max_mem", DEFAULT_MAX_MEM),
            DEFAULT_MAX_MEM
        );
    }
}
