//! Crate-level error type.
//!
//! These are designed to be displayable in CLI output without further
//! formatting.

use crate::data::cache::CacheError;
use crate::data::provider::SourceError;
use crate::domain::TimeRange;
use crate::interpolate::UnsupportedMode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad input; raised before any cache or network access.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A sub-window could not be fetched. Data is never silently skipped.
    #[error("failed to fetch {product_id} {window} after {attempts} attempt(s): {source}")]
    Fetch {
        product_id: String,
        window: TimeRange,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    UnsupportedMode(#[from] UnsupportedMode),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl Error {
    /// Whether the error was caused by the caller's input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidRequest(_) | Error::UnsupportedMode(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
