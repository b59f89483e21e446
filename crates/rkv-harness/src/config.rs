//! Harness configuration.
//!
//! Decoding constants are deliberately absent: they are part of the corpus
//! format, and changing them would silently reinterpret every saved input.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Names a TOML file to load instead of reading `RKV_FUZZ_*` variables.
pub const CONFIG_PATH_VAR: &str = "RKV_FUZZ_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Id of the single synthetic member.
    pub member_id: u64,
    pub member_name: String,
    pub peer_urls: Vec<String>,
    pub client_urls: Vec<String>,
    /// `EnvFilter` directive for harness logging.
    pub log_filter: String,
    /// Rebuild the shared request-apply context before every call.
    pub reset_shared_context: bool,
    /// Parent directory for per-context storage; the system temp dir if unset.
    /// The shared request-apply context of `fuzz_applier_backend_apply` is
    /// never dropped, so each fuzz process leaves one `rkv-fuzz-*` directory
    /// here on exit. Point this at a scratch directory for long campaigns.
    pub temp_dir_root: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            member_id: 1,
            member_name: "fuzz-member".to_string(),
            peer_urls: vec!["http://127.0.0.1:2380".to_string()],
            client_urls: vec!["http://127.0.0.1:2379".to_string()],
            log_filter: "warn".to_string(),
            reset_shared_context: false,
            temp_dir_root: None,
        }
    }
}

impl HarnessConfig {
    /// Load config from a TOML file. Missing keys keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overridden by `RKV_FUZZ_*` environment variables.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// The file named by `RKV_FUZZ_CONFIG` if set, otherwise `load_from_env`.
    pub fn resolve() -> Result<Self, ConfigError> {
        let config = match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::load_from_file(Path::new(&path))?,
            None => Self::load_from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("RKV_FUZZ_MEMBER_ID") {
            config.member_id = value.parse().map_err(|_| ConfigError::Env {
                var: "RKV_FUZZ_MEMBER_ID",
                value,
            })?;
        }
        if let Some(value) = lookup("RKV_FUZZ_MEMBER_NAME") {
            config.member_name = value;
        }
        if let Some(value) = lookup("RKV_FUZZ_PEER_URLS") {
            config.peer_urls = split_list(&value);
        }
        if let Some(value) = lookup("RKV_FUZZ_CLIENT_URLS") {
            config.client_urls = split_list(&value);
        }
        if let Some(value) = lookup("RKV_FUZZ_LOG") {
            config.log_filter = value;
        }
        if let Some(value) = lookup("RKV_FUZZ_RESET_SHARED_CONTEXT") {
            config.reset_shared_context = match value.as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => {
                    return Err(ConfigError::Env {
                        var: "RKV_FUZZ_RESET_SHARED_CONTEXT",
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup("RKV_FUZZ_TEMP_DIR") {
            config.temp_dir_root = Some(PathBuf::from(value));
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.member_id == 0 {
            return Err(ConfigError::Invalid("member_id cannot be 0".to_string()));
        }
        if self.peer_urls.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one peer url is required".to_string(),
            ));
        }
        EnvFilter::try_new(&self.log_filter).map_err(|e| {
            ConfigError::Invalid(format!("log_filter {:?}: {e}", self.log_filter))
        })?;
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
