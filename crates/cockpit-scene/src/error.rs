//! Error types for configuration, decoder configuration and model loading

use thiserror::Error;

/// A best-effort decoder could not be constructed. Never fatal: the loader
/// carries on without the capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecoderUnavailable {
    #[error("Draco decoder path is empty")]
    EmptyPath,
    #[error("Draco decoder path must be absolute or a URL: {0}")]
    RelativePath(String),
    #[error("Draco decoder path must name a directory (trailing '/'): {0}")]
    NotADirectory(String),
}

/// Failure of the primary model load. Terminal for the current mount.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Failed to fetch model {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("Failed to parse model {url}: {reason}")]
    Parse { url: String, reason: String },
    #[error("Model {url} requires {extension}, which this viewer cannot decode")]
    MissingDecoder { url: String, extension: String },
    #[error("Model {url} did not finish loading within {secs}s")]
    TimedOut { url: String, secs: f32 },
}

impl LoadError {
    /// URL of the model that failed
    pub fn url(&self) -> &str {
        match self {
            LoadError::Transport { url, .. }
            | LoadError::Parse { url, .. }
            | LoadError::MissingDecoder { url, .. }
            | LoadError::TimedOut { url, .. } => url,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse viewer config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Invalid viewer config: {0}")]
    Invalid(String),
}
