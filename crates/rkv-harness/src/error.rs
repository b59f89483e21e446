//! Harness error types. None of these are fuzzing findings; they mean the
//! harness itself could not be set up.

use std::path::PathBuf;

use rkv_server::{ApplyError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("server setup failed: {0}")]
    Setup(#[from] ApplyError),
}
