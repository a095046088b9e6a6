use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

/// Run-level failures. Every variant aborts the current phase.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("listing did not stabilize after {probes} probes (item counts: {history:?})")]
    RenderTimeout { probes: usize, history: Vec<usize> },

    #[error("cancelled")]
    Cancelled,

    #[error("browser session failed: {0}")]
    Browser(String),

    #[error("store operation failed: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("stored record {url} is unreadable: {reason}")]
    Corrupt { url: String, reason: String },

    #[error("export failed: {0}")]
    Export(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<chromiumoxide::error::CdpError> for ScrapeError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        ScrapeError::Browser(e.to_string())
    }
}

/// Failure to fetch one product page. Never escapes its worker.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
