use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogSpamError {
    #[error("File not found: \"{}\"", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("io error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("invalid granularity: {0}")]
    InvalidGranularity(f64),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LogSpamError {
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io { source, context: context.into() }
    }
}

pub type Result<T> = std::result::Result<T, LogSpamError>;
