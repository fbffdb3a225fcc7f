use thiserror::Error;

use crate::portal::PortalError;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Portal error: {0}")]
    Portal(#[from] PortalError),

    #[error("Contract not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
