//! Manifest generation for NetCDF collections.
//!
//! Scans a collection's input directory and writes a sorted list of the
//! NetCDF files to be processed, one path per line.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::{config::ConfigMap, error::ManifestError, paths::Paths};

/// Outcome of a manifest build.
#[derive(Debug, Clone)]
pub struct ManifestSummary {
    /// Collection the manifest was built for.
    pub collection: String,
    /// Path of the written manifest file.
    pub output: PathBuf,
    /// Number of NetCDF files listed.
    pub file_count: usize,
}

/// Build the manifest for `collection`.
///
/// The collection's `input_path` resolves against `base_path` when relative.
/// A missing input directory yields an empty manifest rather than an error;
/// the archive may simply not be mounted yet.
///
/// # Errors
/// Returns [`ManifestError::UnknownCollection`] when the collection is not
/// configured, and I/O or walk errors when scanning or writing fails.
#[instrument(name = "manifest.build", err, skip(collections, paths, output))]
pub fn build_manifest(
    collection: &str,
    collections: &ConfigMap,
    paths: &Paths,
    output: Option<PathBuf>,
) -> Result<ManifestSummary, ManifestError> {
    let entries = collections.mapping("collections")?;
    let info = entries
        .mapping(collection)
        .map_err(|_| ManifestError::UnknownCollection {
            collection: collection.to_owned(),
        })?;

    let input_path = paths.resolve(Path::new(&info.str_or("input_path", "")));
    let output = output.unwrap_or_else(|| paths.manifest_path.join(format!("{collection}.txt")));
    debug!(input = %input_path.display(), output = %output.display(), "scanning collection");

    let files = scan_netcdf_files(&input_path)?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|source| ManifestError::Io {
            path: output.clone(),
            source,
        })?;
    }
    let mut contents = files
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    fs::write(&output, contents).map_err(|source| ManifestError::Io {
        path: output.clone(),
        source,
    })?;

    info!(collection, files = files.len(), output = %output.display(), "manifest written");
    Ok(ManifestSummary {
        collection: collection.to_owned(),
        output,
        file_count: files.len(),
    })
}

/// Recursively collect the sorted `*.nc` files under `input_path`.
///
/// # Errors
/// Returns [`ManifestError::Walk`] when a directory entry cannot be read.
pub fn scan_netcdf_files(input_path: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    if !input_path.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(input_path).follow_links(true) {
        let entry = entry.map_err(|source| ManifestError::Walk { source })?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "nc")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use serde_yaml::Mapping;
    use tempfile::TempDir;

    use crate::config::ConfigMap;

    fn paths_rooted_at(dir: &Path) -> Paths {
        let mut map = Mapping::new();
        map.insert("base_path".into(), dir.display().to_string().into());
        map.insert(
            "manifest_path".into(),
            dir.join("manifests").display().to_string().into(),
        );
        Paths::from_config(&ConfigMap::from_mapping("paths", map))
    }

    fn collections_with(collection: &str, input_path: &str) -> ConfigMap {
        let yaml = format!("collections:\n  {collection}:\n    input_path: {input_path}\n");
        let map = serde_yaml::from_str::<Mapping>(&yaml).expect("yaml");
        ConfigMap::from_mapping("collections", map)
    }

    #[test]
    fn build_manifest_lists_sorted_netcdf_files() {
        let dir = TempDir::new().expect("tempdir");
        let raw = dir.path().join("raw");
        fs::create_dir_all(raw.join("2021")).expect("mkdir");
        fs::write(raw.join("b.nc"), b"").expect("write");
        fs::write(raw.join("a.nc"), b"").expect("write");
        fs::write(raw.join("2021").join("c.nc"), b"").expect("write");
        fs::write(raw.join("notes.txt"), b"").expect("write");

        let summary = build_manifest(
            "agcd",
            &collections_with("agcd", "raw"),
            &paths_rooted_at(dir.path()),
            None,
        )
        .expect("manifest must build");

        assert_eq!(summary.file_count, 3);
        let written = fs::read_to_string(&summary.output).expect("read manifest");
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("c.nc"));
        assert!(lines[1].ends_with("a.nc"));
        assert!(lines[2].ends_with("b.nc"));
    }

    #[test]
    fn build_manifest_rejects_unknown_collection() {
        let dir = TempDir::new().expect("tempdir");
        let err = build_manifest(
            "missing",
            &collections_with("agcd", "raw"),
            &paths_rooted_at(dir.path()),
            None,
        )
        .expect_err("unknown collection must fail");
        assert!(matches!(err, ManifestError::UnknownCollection { .. }));
        assert_eq!(err.code().as_str(), "MANIFEST_UNKNOWN_COLLECTION");
    }

    #[test]
    fn build_manifest_handles_missing_input_directory() {
        let dir = TempDir::new().expect("tempdir");
        let summary = build_manifest(
            "agcd",
            &collections_with("agcd", "nowhere"),
            &paths_rooted_at(dir.path()),
            Some(dir.path().join("out.txt")),
        )
        .expect("missing input dir yields an empty manifest");
        assert_eq!(summary.file_count, 0);
        assert_eq!(
            fs::read_to_string(&summary.output).expect("read manifest"),
            ""
        );
    }
}
