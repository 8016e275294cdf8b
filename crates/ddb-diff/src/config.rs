use std::path::Path;

use serde::{Deserialize, Serialize};

use ddb_store::StoreConfig;

use crate::error::{DiffError, DiffResult};

/// Default bound of channels made by [`DiffDb::stream_channel`](crate::DiffDb::stream_channel).
pub const DEFAULT_STREAM_CAPACITY: usize = 256;

/// Top-level configuration for a [`DiffDb`](crate::DiffDb).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffDbConfig {
    /// Backend and location of the store.
    pub store: StoreConfig,
    /// Bound of channels feeding streamed staging.
    pub stream_capacity: usize,
}

impl Default for DiffDbConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }
}

impl DiffDbConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> DiffResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| DiffError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> DiffResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| DiffError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> DiffResult<()> {
        if self.stream_capacity == 0 {
            return Err(DiffError::Config("stream_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ddb_store::Backend;

    use super::*;

    #[test]
    fn default_config() {
        let c = DiffDbConfig::default();
        assert_eq!(c.stream_capacity, 256);
        assert_eq!(c.store.backend, Backend::Memory);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parses_full_document() {
        let c = DiffDbConfig::from_toml_str(
            r#"
            stream_capacity = 64

            [store]
            backend = "sqlite"
            path = "/var/lib/app/diff.db"

            [store.sqlite]
            journal_mode = "DELETE"
            synchronous = "FULL"
            busy_timeout_ms = 100
            reader_pool_size = 2
            "#,
        )
        .unwrap();
        assert_eq!(c.stream_capacity, 64);
        assert_eq!(c.store.backend, Backend::Sqlite);
        assert_eq!(c.store.path, Some(PathBuf::from("/var/lib/app/diff.db")));
        assert_eq!(c.store.sqlite.journal_mode, "DELETE");
        assert_eq!(c.store.sqlite.synchronous, "FULL");
        assert_eq!(c.store.sqlite.busy_timeout_ms, 100);
        assert_eq!(c.store.sqlite.reader_pool_size, 2);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let c = DiffDbConfig::from_toml_str("[store]\nbackend = \"memory\"\n").unwrap();
        assert_eq!(c, DiffDbConfig::default());

        let c = DiffDbConfig::from_toml_str("[store.sqlite]\nbusy_timeout_ms = 10\n").unwrap();
        assert_eq!(c.store.sqlite.busy_timeout_ms, 10);
        assert_eq!(c.store.sqlite.journal_mode, "WAL");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            DiffDbConfig::from_toml_str("stream_capacity = 0"),
            Err(DiffError::Config(_))
        ));
        assert!(matches!(
            DiffDbConfig::from_toml_str("[store]\nbackend = \"postgres\"\n"),
            Err(DiffError::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diffdb.toml");
        std::fs::write(&path, "stream_capacity = 8\n").unwrap();
        assert_eq!(DiffDbConfig::load(&path).unwrap().stream_capacity, 8);

        let missing = DiffDbConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(missing.to_string().contains("absent.toml"));
    }
}
