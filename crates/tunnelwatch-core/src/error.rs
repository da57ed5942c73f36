use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Result of a single enrichment lookup
pub type LookupResult<T> = std::result::Result<T, LookupFailure>;

/// Errors surfaced to the caller of an ingestion or query trigger
#[derive(Error, Debug)]
pub enum MonitorError {
    /// An ingestion source (log file, capture interface, neighbour table) could not be read
    #[error("{source_name} unavailable: {reason}")]
    SourceUnavailable {
        /// Human-readable name of the source
        source_name: String,
        /// Why it could not be used
        reason: String,
    },

    /// The record store failed
    #[error("store error: {0}")]
    Store(String),

    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// A refresh cycle was triggered while another one is loading
    #[error("a refresh is already in progress")]
    RefreshInProgress,

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Shorthand for [`MonitorError::SourceUnavailable`]
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error came from an unreadable ingestion source
    #[must_use]
    pub const fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

/// The three enrichment lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    /// pid to executable path
    Process,
    /// address to ASN and owner
    Ownership,
    /// address to latitude/longitude
    Geolocation,
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Ownership => write!(f, "ownership"),
            Self::Geolocation => write!(f, "geolocation"),
        }
    }
}

/// Why an enrichment lookup produced no value.
///
/// These never escape the enrichment pipeline: a failed lookup leaves its
/// attribute group empty and the record is still stored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// The lookup did not finish within its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered but has no data for the key
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure (connect, read, HTTP status)
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with something that could not be parsed,
    /// or with only part of an attribute group
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The address is not globally routable, so no service will know it
    #[error("{0} is not globally routable")]
    NotRoutable(IpAddr),

    /// The lookup is not configured or not supported on this platform
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

impl LookupFailure {
    /// Returns true if retrying later could plausibly succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_message() {
        let err = MonitorError::source_unavailable("firewall log", "permission denied");
        assert!(err.is_source_unavailable());
        assert_eq!(err.to_string(), "firewall log unavailable: permission denied");
    }

    #[test]
    fn test_transient_failures() {
        assert!(LookupFailure::Timeout(Duration::from_secs(5)).is_transient());
        assert!(LookupFailure::Network("reset".into()).is_transient());
        assert!(!LookupFailure::NotFound("AS".into()).is_transient());
        assert!(!LookupFailure::Malformed("half a pair".into()).is_transient());
    }
}
