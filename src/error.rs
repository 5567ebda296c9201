//! Error type shared by the resolution pipeline and the dataset fetchers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FinderError>;

/// Everything that can go wrong during one query cycle.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FinderError {
    /// Service unreachable or answered with a non-2xx status.
    #[error("Network error: {0}")]
    NetworkFailure(String),

    /// Geocoding or region lookup produced no usable candidate.
    #[error("Location could not be resolved: {0}")]
    UnresolvedLocation(String),

    /// The upstream payload did not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    #[error("Query cycle {0} was cancelled")]
    Cancelled(u64),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FinderError {
    /// Whether this error aborts the cycle's list population.
    ///
    /// An unresolved location, or a location step that timed out, is
    /// survivable: fetchers fall back to the unfiltered dataset page instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnresolvedLocation(_) | Self::Timeout { .. })
    }

    /// HTTP status the API layer reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NetworkFailure(_) => 502,
            Self::MalformedResponse(_) => 502,
            Self::UnresolvedLocation(_) => 404,
            Self::Timeout { .. } => 504,
            Self::Cancelled(_) => 409,
            Self::Config(_) => 500,
        }
    }
}
