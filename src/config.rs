use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, StoreError};

/// Environment override for the data directory, used by the test suites.
pub const TEST_PATH_ENV: &str = "USTORE_TEST_PATH";

/// Document accepted by [`Store::open`](crate::db::Store::open). Unknown
/// keys are ignored so configs can be shared across engines.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub cache_bytes: Option<u64>,
    #[serde(default)]
    pub write_buffer_bytes: Option<u64>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            directory: None,
            engine: None,
            cache_bytes: None,
            write_buffer_bytes: None,
        }
    }
}

impl Config {
    /// Parse the `open()` document. An empty document selects defaults.
    pub fn parse(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(|_| StoreError::ArgsWrong("malformed configuration document"))
    }

    /// Configured engine name; the in-memory reference engine by default.
    pub fn engine(&self) -> &str {
        self.engine.as_deref().unwrap_or("memory")
    }

    /// Data directory after applying the test-path override.
    pub fn resolve_directory(&self) -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(TEST_PATH_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        self.directory.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.engine(), "memory");
        assert!(config.directory.is_none());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = Config::parse(
            r#"{"version": "1.0", "directory": "/tmp/u", "compression": "zstd"}"#,
        )
        .unwrap();
        assert_eq!(config.directory, Some(PathBuf::from("/tmp/u")));
    }

    #[test]
    fn malformed_document_is_args_wrong() {
        let err = Config::parse("{not json").unwrap_err();
        assert_eq!(err.kind(), "ARGS_WRONG");
    }
}
