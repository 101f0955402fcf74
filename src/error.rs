use thiserror::Error;

use crate::target::TargetError;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("No target selected. Run `mirrorsync select <TARGET_ID>` first.")]
    NoTarget,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Target service error: {0}")]
    Target(#[from] TargetError),

    #[error("Source service error: {0}")]
    Source(#[from] SourceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse source response: {0}")]
    Malformed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt state file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Why a comparison produced no usable outstanding list.
///
/// Always recoverable: callers degrade to an empty list or keep their
/// previous view.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("comparison request failed: {0}")]
    Request(#[from] TargetError),

    #[error("comparison payload missing")]
    Missing,

    #[error("comparison payload malformed: {0}")]
    Malformed(String),
}
