//! # Core Error Types
//!
//! Errors raised by the shared plumbing. Service-specific failures live in the
//! bot crates; transient transport failures never surface as errors at all.

use thiserror::Error;

/// Problems with operator-supplied files and settings.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },
}

/// Key file errors
#[derive(Error, Debug, Clone)]
pub enum WalletError {
    #[error("Key file '{path}' could not be read: {msg}")]
    KeyFileUnreadable { path: String, msg: String },

    #[error("Could not persist wallet address to '{path}': {msg}")]
    PersistFailed { path: String, msg: String },
}

#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },
}
