use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GanError {
    #[error("no images found in {0}")]
    EmptyDataset(PathBuf),

    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("checkpoint not found: {0}")]
    MissingCheckpoint(PathBuf),

    #[error(transparent)]
    Tch(#[from] tch::TchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("gif encoding failed: {0}")]
    Gif(#[from] gif::EncodingError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GanError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        GanError::InvalidOption { name, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, GanError>;
