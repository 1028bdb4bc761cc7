//! Error types shared across the admission server.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for persisted store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the file-backed lists.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record for '{key}': {detail}")]
    Corrupt { key: String, detail: String },
}

/// Errors raised while verifying a claimed identity.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Hash input must be plain ASCII.
    #[error("cannot hash non-ASCII input for '{0}'")]
    NonAscii(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Internal failure of a single admission check.
///
/// These never leave the pipeline: the failing check's policy decides
/// whether the attempt passes or is rejected.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("rank was not assigned before '{0}'")]
    RankUnassigned(&'static str),
}

/// Errors raised by the network server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("packet encoding failed: {0}")]
    Encode(#[from] bincode::Error),
}
