use thiserror::Error;
use wayfind_scanner::ScanError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Target {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Authentication as '{role}' failed: {reason}")]
    Auth { role: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Route inventory error: {0}")]
    Inventory(String),

    #[error("Driver error: {0}")]
    Scan(#[from] ScanError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Errors that stop a sweep before any traversal result can be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Unreachable { .. } | CoreError::Auth { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
