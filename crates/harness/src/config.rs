//! Harness configuration
//!
//! Every field has a default, so an empty TOML file (or none at all) is a
//! valid configuration:
//!
//! ```toml
//! typelib_root = "."
//! cache_dir = "target/comharness-cache"
//! bind_host = "127.0.0.1"
//! call_timeout_ms = 5000
//! log_level = "debug"
//!
//! [[servers]]
//! progid = "ManagedServer.PetShop.1"
//! clsid = "{5011c315-994d-49b4-b737-03a846f590a0}"
//! endpoint = "10.0.0.7:4135"
//! ```

use crate::error::{HarnessError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Type library the scenarios resolve when none is given
pub const DEFAULT_TYPELIB: &str = "crates/servers/idl/Interfaces.idl";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Relative type library paths resolve against this directory
    pub typelib_root: PathBuf,
    /// Where resolved libraries and their generated proxies are written
    pub cache_dir: Option<PathBuf>,
    /// Host the embedded servers and the callback exporter listen on
    pub bind_host: String,
    /// Unset means calls wait for the server indefinitely
    pub call_timeout_ms: Option<u64>,
    pub log_level: String,
    /// A running `comharness-server` to activate classes on instead of the
    /// embedded one
    pub remote_server: Option<String>,
    /// Per-class endpoints, checked before `remote_server`
    pub servers: Vec<ServerEntry>,
}

/// Where one class is activated
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerEntry {
    pub clsid: String,
    pub progid: Option<String>,
    pub endpoint: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            typelib_root: PathBuf::from("."),
            cache_dir: None,
            bind_host: "127.0.0.1".to_string(),
            call_timeout_ms: None,
            log_level: "info".to_string(),
            remote_server: None,
            servers: Vec::new(),
        }
    }
}

impl HarnessConfig {
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| HarnessError::Config(e.to_string()))
    }

    /// Read a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&source).map_err(|e| match e {
            HarnessError::Config(reason) => HarnessError::Config(format!("{}: {reason}", path.display())),
            other => other,
        })
    }

    pub fn with_typelib_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.typelib_root = root.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_remote_server(mut self, endpoint: impl Into<String>) -> Self {
        self.remote_server = Some(endpoint.into());
        self
    }

    pub fn with_server(mut self, entry: ServerEntry) -> Self {
        self.servers.push(entry);
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(HarnessConfig::from_toml("").unwrap(), HarnessConfig::default());
    }

    #[test]
    fn test_from_toml() {
        let config = HarnessConfig::from_toml(
            r#"
            typelib_root = "/opt/typelibs"
            call_timeout_ms = 250
            log_level = "debug"

            [[servers]]
            clsid = "{5011c315-994d-49b4-b737-03a846f590a0}"
            progid = "ManagedServer.PetShop.1"
            endpoint = "10.0.0.7:4135"
            "#,
        )
        .unwrap();
        assert_eq!(config.typelib_root, PathBuf::from("/opt/typelibs"));
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.bind_host, "127.0.0.1");
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].endpoint, "10.0.0.7:4135");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = HarnessConfig::from_toml("typelib_dir = \"x\"").unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, "remote_server = \"127.0.0.1:4135\"\n").unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.remote_server.as_deref(), Some("127.0.0.1:4135"));

        let err = HarnessConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
