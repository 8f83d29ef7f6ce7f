//! Error type shared by every stage of the archiving pipeline.
//!
//! Failures fall into four families:
//!
//! - **Fetch**: transport failures and non-success HTTP statuses
//! - **Parse**: date text or listing markup that cannot be understood
//! - **Storage**: the sink could not write an object
//! - **Configuration**: inputs rejected before any network activity
//!
//! Cancellation and lost workers are reported separately so callers can tell
//! an aborted run from a broken one.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("could not parse displayed date {text:?}")]
    DateTimeParse { text: String },

    #[error("listing total {text:?} is out of range")]
    ListingTotal { text: String },

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("object name is empty")]
    EmptyObjectName,

    #[error("group name is empty")]
    EmptyGroupName,

    #[error("invalid {field} date {value:?}, expected YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },

    #[error("start date {start} is after end date {end}")]
    InvalidWindow { start: String, end: String },

    #[error("{archive} archives need a bounded date window")]
    UnboundedWindow { archive: &'static str },

    #[error("invalid URL {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("storage failed for {object}: {source}")]
    Storage {
        object: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{stage} worker exited without reporting a result")]
    WorkerLost { stage: &'static str },

    #[error("serializing run summary failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArchiveError {
    pub fn fetch(url: &str, source: reqwest::Error) -> Self {
        Self::Fetch {
            url: url.to_string(),
            source,
        }
    }

    pub fn storage(object: &str, source: std::io::Error) -> Self {
        Self::Storage {
            object: object.to_string(),
            source,
        }
    }

    /// Errors worth another attempt at the HTTP layer.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let throttled = ArchiveError::HttpStatus {
            url: "https://example.org".into(),
            status: 429,
        };
        let missing = ArchiveError::HttpStatus {
            url: "https://example.org".into(),
            status: 404,
        };
        let unavailable = ArchiveError::HttpStatus {
            url: "https://example.org".into(),
            status: 503,
        };
        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
        assert!(!missing.is_transient());
        assert!(!ArchiveError::Cancelled.is_transient());
        assert!(!ArchiveError::EmptyObjectName.is_transient());
    }

    #[test]
    fn test_display_messages() {
        let err = ArchiveError::DateTimeParse {
            text: "13/45/99".into(),
        };
        assert_eq!(err.to_string(), "could not parse displayed date \"13/45/99\"");
        assert_eq!(ArchiveError::EmptyObjectName.to_string(), "object name is empty");
    }
}
