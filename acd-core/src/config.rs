//! YAML configuration loading and ad hoc key lookup.
//!
//! Configuration files are arbitrary YAML mappings (`paths.yml`,
//! `datasets.yml`, `chunks.yml`, `collections.yml`, `parameters.yml`); no
//! schema is enforced beyond "the document is a mapping". Call sites perform
//! the key lookups they need through [`ConfigMap`].

use std::{fs, io, path::Path};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::ConfigError;

/// A loaded YAML configuration mapping.
///
/// Wraps the parsed mapping together with the configuration name so lookup
/// failures can report which file was missing a key.
#[derive(Debug, Clone)]
pub struct ConfigMap {
    name: String,
    map: Mapping,
}

/// Load the configuration file `<config_dir>/<name>.yml`.
///
/// An empty file yields an empty mapping, matching the behaviour of a YAML
/// loader returning `null` for empty input.
///
/// # Errors
/// Returns [`ConfigError::NotFound`] when the file is absent,
/// [`ConfigError::Parse`] when it is not valid YAML, and
/// [`ConfigError::NotAMapping`] when the document is not a mapping.
///
/// # Examples
/// ```
/// use acd_core::load_config;
///
/// let dir = tempfile::tempdir()?;
/// std::fs::write(dir.path().join("paths.yml"), "base_path: /data\n")?;
/// let paths = load_config("paths", dir.path())?;
/// assert_eq!(paths.str_or("base_path", "."), "/data");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn load_config(name: &str, config_dir: &Path) -> Result<ConfigMap, ConfigError> {
    let path = config_dir.join(format!("{name}.yml"));
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    let map = match value {
        Value::Null => Mapping::new(),
        Value::Mapping(map) => map,
        _ => return Err(ConfigError::NotAMapping { path }),
    };
    debug!(config = name, path = %path.display(), keys = map.len(), "configuration loaded");
    Ok(ConfigMap {
        name: name.to_owned(),
        map,
    })
}

impl ConfigMap {
    /// Wrap an already-parsed mapping under the given configuration name.
    #[must_use]
    pub fn from_mapping(name: impl Into<String>, map: Mapping) -> Self {
        Self {
            name: name.into(),
            map,
        }
    }

    /// The configuration name this mapping was loaded from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of top-level keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the mapping has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Raw value lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Whether the mapping contains `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.map.get(key).is_some()
    }

    /// String value for `key`, or `default` when absent or not a string.
    #[must_use]
    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.map
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_owned()
    }

    /// Optional string value for `key`.
    #[must_use]
    pub fn str_opt(&self, key: &str) -> Option<String> {
        self.map.get(key).and_then(Value::as_str).map(str::to_owned)
    }

    /// Optional unsigned integer value for `key`.
    #[must_use]
    pub fn u64_opt(&self, key: &str) -> Option<u64> {
        self.map.get(key).and_then(Value::as_u64)
    }

    /// Nested mapping under `key`, or an empty mapping when the key is absent
    /// or holds a non-mapping value.
    #[must_use]
    pub fn mapping_or_empty(&self, key: &str) -> Self {
        let map = self
            .map
            .get(key)
            .and_then(Value::as_mapping)
            .cloned()
            .unwrap_or_default();
        Self {
            name: format!("{}.{key}", self.name),
            map,
        }
    }

    /// Nested mapping under `key`.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingKey`] when the key is absent or does not
    /// hold a mapping.
    pub fn mapping(&self, key: &str) -> Result<Self, ConfigError> {
        self.map
            .get(key)
            .and_then(Value::as_mapping)
            .cloned()
            .map(|map| Self {
                name: format!("{}.{key}", self.name),
                map,
            })
            .ok_or_else(|| ConfigError::MissingKey {
                file: self.name.clone(),
                key: key.to_owned(),
            })
    }

    /// Top-level keys as strings, in document order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.map
            .keys()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect()
    }
}

/// Probe whether `config_dir` exists and is a directory.
///
/// # Errors
/// Returns [`ConfigError::NotFound`] pointing at the directory otherwise.
pub fn ensure_config_dir(config_dir: &Path) -> Result<(), ConfigError> {
    let metadata = fs::metadata(config_dir).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: config_dir.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: config_dir.to_path_buf(),
                source,
            }
        }
    })?;
    if metadata.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::NotFound {
            path: config_dir.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use crate::error::ConfigError;

    fn write_config(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(format!("{name}.yml")), contents).expect("write config");
    }

    #[test]
    fn load_config_returns_mapping_for_valid_file() {
        let dir = TempDir::new().expect("tempdir");
        write_config(&dir, "paths", "base_path: /data\nworkers: 4\n");
        let cfg = load_config("paths", dir.path()).expect("config must load");
        assert_eq!(cfg.str_or("base_path", "."), "/data");
        assert_eq!(cfg.u64_opt("workers"), Some(4));
        assert_eq!(cfg.name(), "paths");
    }

    #[test]
    fn load_config_fails_for_missing_file() {
        let dir = TempDir::new().expect("tempdir");
        let err = load_config("paths", dir.path()).expect_err("missing file must fail");
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert_eq!(err.code().as_str(), "CONFIG_NOT_FOUND");
    }

    #[rstest]
    #[case::sequence("- a\n- b\n")]
    #[case::scalar("42\n")]
    fn load_config_rejects_non_mappings(#[case] contents: &str) {
        let dir = TempDir::new().expect("tempdir");
        write_config(&dir, "bad", contents);
        let err = load_config("bad", dir.path()).expect_err("non-mapping must fail");
        assert!(matches!(err, ConfigError::NotAMapping { .. }));
    }

    #[test]
    fn load_config_treats_empty_file_as_empty_mapping() {
        let dir = TempDir::new().expect("tempdir");
        write_config(&dir, "empty", "");
        let cfg = load_config("empty", dir.path()).expect("empty file must load");
        assert!(cfg.is_empty());
    }

    #[test]
    fn load_config_rejects_malformed_yaml() {
        let dir = TempDir::new().expect("tempdir");
        write_config(&dir, "bad", "key: [unterminated\n");
        let err = load_config("bad", dir.path()).expect_err("malformed YAML must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn mapping_lookup_reports_missing_key() {
        let dir = TempDir::new().expect("tempdir");
        write_config(&dir, "collections", "collections:\n  agcd:\n    input_path: raw\n");
        let cfg = load_config("collections", dir.path()).expect("config must load");
        let collections = cfg.mapping("collections").expect("nested mapping");
        assert!(collections.contains("agcd"));
        let err = cfg.mapping("datasets").expect_err("absent key must fail");
        match err {
            ConfigError::MissingKey { file, key } => {
                assert_eq!(file, "collections");
                assert_eq!(key, "datasets");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn ensure_config_dir_rejects_missing_directory() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("nope");
        let err = ensure_config_dir(&missing).expect_err("missing dir must fail");
        assert!(matches!(err, ConfigError::NotFound { .. }));
        ensure_config_dir(dir.path()).expect("existing dir must pass");
    }
}
