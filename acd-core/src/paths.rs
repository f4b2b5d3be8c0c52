//! Resolved view of `paths.yml`.

use std::path::{Path, PathBuf};

use crate::config::ConfigMap;

/// Filesystem layout for pipeline inputs and outputs.
///
/// Built from `paths.yml`; every entry has a default so a sparse or absent
/// configuration still yields a usable layout rooted at the working directory.
///
/// # Examples
/// ```
/// use acd_core::{ConfigMap, Paths};
///
/// let paths = Paths::from_config(&ConfigMap::from_mapping("paths", serde_yaml::Mapping::new()));
/// assert_eq!(paths.base_zarr_path, std::path::Path::new("./data/base_zarr"));
/// ```
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root against which relative collection and dataset paths resolve.
    pub base_path: PathBuf,
    /// Destination for base Zarr stores produced by `base`.
    pub base_zarr_path: PathBuf,
    /// Destination for rechunked Zarr stores produced by `rechunk`.
    pub rechunked_zarr_path: PathBuf,
    /// Scratch space for temporary rechunking stores.
    pub temp_path: PathBuf,
    /// Destination for manifest files produced by `manifest`.
    pub manifest_path: PathBuf,
    /// Destination for job logs written by batch cluster scripts.
    pub logs_path: PathBuf,
}

impl Paths {
    /// Resolve the layout from a loaded `paths.yml` mapping.
    #[must_use]
    pub fn from_config(config: &ConfigMap) -> Self {
        Self {
            base_path: PathBuf::from(config.str_or("base_path", ".")),
            base_zarr_path: PathBuf::from(config.str_or("base_zarr_path", "./data/base_zarr")),
            rechunked_zarr_path: PathBuf::from(
                config.str_or("rechunked_zarr_path", "./data/rechunked_zarr"),
            ),
            temp_path: PathBuf::from(config.str_or("temp_path", "./data/temp")),
            manifest_path: PathBuf::from(config.str_or("manifest_path", "./data/manifests")),
            logs_path: PathBuf::from(config.str_or("logs_path", "./logs")),
        }
    }

    /// Resolve `path` against `base_path` unless it is already absolute.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_yaml::Mapping;

    use crate::config::ConfigMap;

    #[test]
    fn from_config_applies_defaults() {
        let paths = Paths::from_config(&ConfigMap::from_mapping("paths", Mapping::new()));
        assert_eq!(paths.base_path, PathBuf::from("."));
        assert_eq!(paths.temp_path, PathBuf::from("./data/temp"));
        assert_eq!(paths.manifest_path, PathBuf::from("./data/manifests"));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let mut map = Mapping::new();
        map.insert("base_path".into(), "/archive".into());
        let paths = Paths::from_config(&ConfigMap::from_mapping("paths", map));
        assert_eq!(paths.resolve(Path::new("/abs/input")), PathBuf::from("/abs/input"));
        assert_eq!(paths.resolve(Path::new("agcd/raw")), PathBuf::from("/archive/agcd/raw"));
    }
}
