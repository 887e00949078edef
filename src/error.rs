//! Error taxonomy for the ingestion service.
//!
//! Only configuration and persistence failures abort a run. Fetch failures
//! abort the single event (or scoreboard) being fetched. Incomplete payloads
//! are not errors at all, see [`crate::normalizer::IncompleteReason`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Calendar data is inconsistent or missing a required field
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport, timeout or non-2xx after every retry was spent
    #[error("failed to fetch {url} after {attempts} attempts: {message}")]
    Fetch {
        url: String,
        attempts: u32,
        message: String,
    },

    /// Store or pending-id source unreachable
    #[error("persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl IngestError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for errors that must stop the whole scheduled run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Fetch { .. })
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
