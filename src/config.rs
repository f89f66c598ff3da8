//! Daemon configuration.
//!
//! Read from `sciond.toml` in the configuration directory; every option has
//! a deployment default and missing fields fall back to it.

use crate::{SciondError, SciondResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Well-known local API host.
pub const DEFAULT_API_ADDRESS: &str = "127.255.255.254";
/// Well-known local API port.
pub const DEFAULT_API_PORT: u16 = 3333;

/// Daemon configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SciondConfig {
    /// Lifetime of cached path segments in seconds.
    pub segment_ttl: u64,

    /// Deadline for a single path lookup in seconds; also bounds pending
    /// request entries.
    pub timeout: u64,

    /// Hash-chain search depth when matching revocations.
    pub n_tokens_check: usize,

    /// Whether to bind the local API socket.
    pub run_local_api: bool,

    /// Local API bind address.
    pub local_api_address: String,

    /// Local API bind port; 0 picks an ephemeral port.
    pub local_api_port: u16,
}

impl Default for SciondConfig {
    fn default() -> Self {
        Self {
            segment_ttl: 300,
            timeout: 5,
            n_tokens_check: 20,
            run_local_api: false,
            local_api_address: DEFAULT_API_ADDRESS.to_string(),
            local_api_port: DEFAULT_API_PORT,
        }
    }
}

impl SciondConfig {
    /// Load config from a TOML file.
    pub fn from_file(path: &Path) -> SciondResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SciondError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| SciondError::Config(format!("failed to parse config file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SciondConfig::default();
        assert_eq!(config.segment_ttl, 300);
        assert_eq!(config.timeout, 5);
        assert_eq!(config.n_tokens_check, 20);
        assert!(!config.run_local_api);
        assert_eq!(config.local_api_address, DEFAULT_API_ADDRESS);
        assert_eq!(config.local_api_port, DEFAULT_API_PORT);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout = 2\nrun_local_api = true").unwrap();

        let config = SciondConfig::from_file(file.path()).unwrap();
        assert_eq!(config.timeout, 2);
        assert!(config.run_local_api);
        assert_eq!(config.segment_ttl, 300);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        match SciondConfig::from_file(Path::new("/nonexistent/sciond.toml")) {
            Err(SciondError::Config(_)) => {}
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
