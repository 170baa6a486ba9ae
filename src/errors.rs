// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KinotifyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid glob pattern: {0}")]
    PatternError(#[from] globset::Error),

    #[error("inotify is not available: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a single watch could not be installed.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The per-user watch ceiling (`fs.inotify.max_user_watches`) was hit.
    ///
    /// Returned once per process; later failures of the same kind come back
    /// as [`WatchError::Kernel`].
    #[error("inotify watch limit reached; raise fs.inotify.max_user_watches")]
    WatchLimitReached,

    #[error("failed to add watch: {0}")]
    Kernel(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KinotifyError>;
