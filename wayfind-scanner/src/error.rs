use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation to '{url}' failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Element {0} is no longer part of the current snapshot")]
    StaleHandle(usize),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<chromiumoxide::error::CdpError> for ScanError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScanError::Browser(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Why a single traversal step could not complete.
///
/// These never leave the traversal loop; the engine turns each one into a
/// `RuntimeFailure` record and moves on to the next action.
#[derive(Error, Debug)]
pub enum StepFault {
    #[error("Navigation action disappeared before execution: {label}")]
    ActionDisappeared { label: String },

    #[error("Possible redirect loop detected (>{threshold} URL changes within {window:?}). Last: {last_url}")]
    RedirectLoop {
        threshold: usize,
        transitions: usize,
        window: Duration,
        last_url: String,
    },

    #[error("Page did not stabilize within {timeout:?} (last URL: {last_url})")]
    StabilizationTimeout { timeout: Duration, last_url: String },

    #[error("{0}")]
    Driver(#[from] ScanError),
}
