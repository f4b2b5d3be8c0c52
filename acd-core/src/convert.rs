//! NetCDF to base Zarr conversion.
//!
//! Reads classic-format NetCDF files and materializes one Zarr V3 array per
//! NetCDF variable under a root group. Dimension names are recorded both as
//! Zarr dimension names and in the `_ARRAY_DIMENSIONS` attribute (the xarray
//! convention) so rechunking can map chunk configs onto axes by name.
//!
//! When a dataset spans several files, record variables append along their
//! leading dimension; static variables (coordinates such as `lat`/`lon`) must
//! agree across files and are kept once.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use netcdf3::FileReader;
use serde_json::{Map as JsonMap, Value as JsonValue};
use serde_yaml::Value;
use tracing::{debug, info, instrument};
use zarrs::{
    array::{ArrayBuilder, ArraySubset, DimensionName},
    filesystem::FilesystemStore,
    group::GroupBuilder,
};

use crate::{config::ConfigMap, error::ConvertError, paths::Paths};

/// Attribute under which the variable's dimension names are stored, following
/// the xarray convention for Zarr-backed datasets.
pub const DIMENSIONS_ATTRIBUTE: &str = "_ARRAY_DIMENSIONS";

/// Zarr encoding knobs read from the `zarr_encoding` section of
/// `parameters.yml`.
#[derive(Debug, Clone, Default)]
pub struct ZarrEncoding {
    /// Rough number of elements per chunk; chunks slab along the leading
    /// dimension and keep trailing dimensions whole. When unset each array is
    /// written as a single chunk.
    pub chunk_target_elements: Option<u64>,
}

impl ZarrEncoding {
    /// Read the encoding section from a loaded `parameters.yml` mapping.
    #[must_use]
    pub fn from_parameters(parameters: &ConfigMap) -> Self {
        Self {
            chunk_target_elements: parameters
                .mapping_or_empty("zarr_encoding")
                .u64_opt("chunk_target_elements"),
        }
    }
}

/// Outcome of a base conversion.
#[derive(Debug, Clone)]
pub struct ConvertSummary {
    /// Dataset the store was built for.
    pub dataset: String,
    /// Root path of the written Zarr store.
    pub output: PathBuf,
    /// Variables materialized as arrays, in store order.
    pub variables: Vec<String>,
    /// Number of NetCDF input files consumed.
    pub files: usize,
}

enum VarData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl VarData {
    fn type_name(&self) -> &'static str {
        match self {
            Self::I8(_) => "int8",
            Self::U8(_) => "uint8",
            Self::I16(_) => "int16",
            Self::I32(_) => "int32",
            Self::F32(_) => "float32",
            Self::F64(_) => "float64",
        }
    }
}

struct VariableBuffer {
    dims: Vec<String>,
    shape: Vec<u64>,
    record: bool,
    data: VarData,
}

/// Convert the configured `dataset` into a base Zarr store.
///
/// # Errors
/// Returns [`ConvertError::UnknownDataset`] when the dataset is not
/// configured, [`ConvertError::NoInputFiles`] when no NetCDF inputs resolve,
/// and NetCDF or Zarr errors from the underlying readers and writers.
#[instrument(name = "convert.base", err, skip(datasets, paths, output, encoding))]
pub fn convert_to_base_zarr(
    dataset: &str,
    datasets: &ConfigMap,
    paths: &Paths,
    output: Option<PathBuf>,
    encoding: &ZarrEncoding,
) -> Result<ConvertSummary, ConvertError> {
    let entries = datasets.mapping("datasets")?;
    let info = entries
        .mapping(dataset)
        .map_err(|_| ConvertError::UnknownDataset {
            dataset: dataset.to_owned(),
        })?;

    let files = dataset_input_files(&info, paths)?;
    if files.is_empty() {
        return Err(ConvertError::NoInputFiles {
            dataset: dataset.to_owned(),
        });
    }

    let output = output.unwrap_or_else(|| paths.base_zarr_path.join(format!("{dataset}.zarr")));
    debug!(dataset, files = files.len(), output = %output.display(), "converting dataset");

    let mut variables: BTreeMap<String, VariableBuffer> = BTreeMap::new();
    for file in &files {
        merge_file_variables(&mut variables, file)?;
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|source| ConvertError::Io {
            path: output.clone(),
            source,
        })?;
    }
    let store = Arc::new(FilesystemStore::new(&output).map_err(|source| {
        ConvertError::StoreCreate {
            path: output.clone(),
            source,
        }
    })?);
    GroupBuilder::new()
        .build(store.clone(), "/")
        .map_err(|source| ConvertError::GroupCreate { source })?
        .store_metadata()
        .map_err(|source| ConvertError::Storage { source })?;

    let mut written = Vec::new();
    for (name, buffer) in &variables {
        write_variable(&store, name, buffer, encoding)?;
        written.push(name.clone());
    }

    info!(dataset, variables = written.len(), output = %output.display(), "base Zarr store created");
    Ok(ConvertSummary {
        dataset: dataset.to_owned(),
        output,
        variables: written,
        files: files.len(),
    })
}

fn dataset_input_files(info: &ConfigMap, paths: &Paths) -> Result<Vec<PathBuf>, ConvertError> {
    if let Some(value) = info.get("files") {
        let names: Vec<String> = match value {
            Value::String(single) => vec![single.clone()],
            Value::Sequence(entries) => entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        };
        return Ok(names
            .iter()
            .map(|name| paths.resolve(Path::new(name)))
            .collect());
    }

    let input = paths.resolve(Path::new(&info.str_or("input_path", "")));
    let mut files = Vec::new();
    if input.is_dir() {
        let entries = fs::read_dir(&input).map_err(|source| ConvertError::Io {
            path: input.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ConvertError::Io {
                path: input.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "nc") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn netcdf_error(path: &Path, detail: impl std::fmt::Debug) -> ConvertError {
    ConvertError::NetCdf {
        path: path.to_path_buf(),
        detail: format!("{detail:?}"),
    }
}

fn merge_file_variables(
    variables: &mut BTreeMap<String, VariableBuffer>,
    path: &Path,
) -> Result<(), ConvertError> {
    let mut reader = FileReader::open(path).map_err(|err| netcdf_error(path, err))?;

    // Collect variable metadata up front; typed reads borrow the reader
    // mutably afterwards.
    let mut metas: Vec<(String, netcdf3::DataType, Vec<String>, Vec<u64>, bool)> = Vec::new();
    {
        let data_set = reader.data_set();
        for name in data_set.get_var_names() {
            let var = data_set
                .get_var(&name)
                .ok_or_else(|| netcdf_error(path, format!("variable `{name}` vanished")))?;
            let dims = var.dim_names();
            let mut shape = Vec::with_capacity(dims.len());
            for dim in &dims {
                let size = data_set
                    .get_dim(dim)
                    .map(|d| d.size())
                    .ok_or_else(|| ConvertError::UnknownDimension {
                        variable: name.clone(),
                        dimension: dim.clone(),
                    })?;
                shape.push(size as u64);
            }
            metas.push((name, var.data_type(), dims, shape, var.is_record_var()));
        }
    }

    for (name, data_type, dims, shape, record) in metas {
        let data = read_variable_data(&mut reader, path, &name, data_type)?;
        match variables.get_mut(&name) {
            None => {
                variables.insert(
                    name,
                    VariableBuffer {
                        dims,
                        shape,
                        record,
                        data,
                    },
                );
            }
            Some(existing) => merge_variable(existing, &name, shape, data, path)?,
        }
    }
    Ok(())
}

fn read_variable_data(
    reader: &mut FileReader,
    path: &Path,
    name: &str,
    data_type: netcdf3::DataType,
) -> Result<VarData, ConvertError> {
    let data = match data_type {
        netcdf3::DataType::I8 => {
            VarData::I8(reader.read_var_i8(name).map_err(|e| netcdf_error(path, e))?)
        }
        netcdf3::DataType::U8 => {
            VarData::U8(reader.read_var_u8(name).map_err(|e| netcdf_error(path, e))?)
        }
        netcdf3::DataType::I16 => {
            VarData::I16(reader.read_var_i16(name).map_err(|e| netcdf_error(path, e))?)
        }
        netcdf3::DataType::I32 => {
            VarData::I32(reader.read_var_i32(name).map_err(|e| netcdf_error(path, e))?)
        }
        netcdf3::DataType::F32 => {
            VarData::F32(reader.read_var_f32(name).map_err(|e| netcdf_error(path, e))?)
        }
        netcdf3::DataType::F64 => {
            VarData::F64(reader.read_var_f64(name).map_err(|e| netcdf_error(path, e))?)
        }
    };
    Ok(data)
}

fn merge_variable(
    existing: &mut VariableBuffer,
    name: &str,
    shape: Vec<u64>,
    data: VarData,
    path: &Path,
) -> Result<(), ConvertError> {
    if !existing.record {
        // Static variables (coordinates) must agree; keep the first copy.
        if existing.shape != shape {
            return Err(ConvertError::ShapeMismatch {
                variable: name.to_owned(),
                expected: existing.shape.clone(),
                got: shape,
            });
        }
        return Ok(());
    }

    // Record variables append along the leading dimension.
    if existing.shape.len() != shape.len() || existing.shape[1..] != shape[1..] {
        return Err(ConvertError::ShapeMismatch {
            variable: name.to_owned(),
            expected: existing.shape.clone(),
            got: shape,
        });
    }
    match (&mut existing.data, data) {
        (VarData::I8(dst), VarData::I8(src)) => dst.extend(src),
        (VarData::U8(dst), VarData::U8(src)) => dst.extend(src),
        (VarData::I16(dst), VarData::I16(src)) => dst.extend(src),
        (VarData::I32(dst), VarData::I32(src)) => dst.extend(src),
        (VarData::F32(dst), VarData::F32(src)) => dst.extend(src),
        (VarData::F64(dst), VarData::F64(src)) => dst.extend(src),
        (dst, src) => {
            return Err(netcdf_error(
                path,
                format!(
                    "variable `{name}` changed type from {} to {}",
                    dst.type_name(),
                    src.type_name()
                ),
            ));
        }
    }
    if let Some(first) = existing.shape.first_mut() {
        *first += shape.first().copied().unwrap_or(0);
    }
    Ok(())
}

/// Chunk shape for a fresh array: slabs along the leading dimension sized to
/// roughly `target_elements`, trailing dimensions whole. Without a target the
/// whole array is one chunk. Chunk extents are always at least 1.
#[must_use]
pub fn chunk_shape_for(shape: &[u64], target_elements: Option<u64>) -> Vec<u64> {
    let Some(target) = target_elements else {
        return shape.iter().map(|&d| d.max(1)).collect();
    };
    let Some((&lead, trailing)) = shape.split_first() else {
        return Vec::new();
    };
    let trailing_elements: u64 = trailing.iter().map(|&d| d.max(1)).product();
    let lead_chunk = (target / trailing_elements.max(1)).clamp(1, lead.max(1));
    let mut chunk = vec![lead_chunk];
    chunk.extend(trailing.iter().map(|&d| d.max(1)));
    chunk
}

fn write_variable(
    store: &Arc<FilesystemStore>,
    name: &str,
    buffer: &VariableBuffer,
    encoding: &ZarrEncoding,
) -> Result<(), ConvertError> {
    let node_path = format!("/{name}");
    let chunk = chunk_shape_for(&buffer.shape, encoding.chunk_target_elements);

    let dimension_names: Option<Vec<DimensionName>> = if buffer.dims.is_empty() {
        None
    } else {
        Some(buffer.dims.iter().map(|d| Some(d.clone())).collect())
    };
    let mut attributes = JsonMap::new();
    attributes.insert(
        DIMENSIONS_ATTRIBUTE.to_owned(),
        JsonValue::from(buffer.dims.clone()),
    );

    macro_rules! materialize {
        ($dtype:expr, $fill:expr, $ty:ty, $values:expr) => {{
            let array = ArrayBuilder::new(buffer.shape.clone(), chunk.clone(), $dtype, $fill)
                .dimension_names(dimension_names.clone())
                .attributes(attributes.clone())
                .build(store.clone(), &node_path)
                .map_err(|source| ConvertError::ArrayCreate {
                    array: node_path.clone(),
                    source,
                })?;
            array
                .store_metadata()
                .map_err(|source| ConvertError::Storage { source })?;
            let subset = ArraySubset::new_with_shape(buffer.shape.clone());
            array
                .store_array_subset_elements::<$ty>(&subset, $values)
                .map_err(|source| ConvertError::Array {
                    array: node_path.clone(),
                    source,
                })?;
        }};
    }

    match &buffer.data {
        VarData::I8(v) => materialize!("int8", 0i8, i8, v),
        VarData::U8(v) => materialize!("uint8", 0u8, u8, v),
        VarData::I16(v) => materialize!("int16", 0i16, i16, v),
        VarData::I32(v) => materialize!("int32", 0i32, i32, v),
        VarData::F32(v) => materialize!("float32", 0.0f32, f32, v),
        VarData::F64(v) => materialize!("float64", 0.0f64, f64, v),
    }
    debug!(array = node_path.as_str(), chunk = ?chunk, "variable materialized");
    Ok(())
}

/// Extract `_ARRAY_DIMENSIONS` from an attribute map.
#[must_use]
pub fn dimensions_from_attributes(attributes: &JsonMap<String, JsonValue>) -> Option<Vec<String>> {
    attributes.get(DIMENSIONS_ATTRIBUTE).and_then(|value| {
        value.as_array().map(|entries| {
            entries
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_owned)
                .collect()
        })
    })
}
