//! Error types for polling sessions.
//!
//! [`TransportError`] is what a [`StatusSource`](super::StatusSource) reports
//! when a status fetch fails. Only [`TransportError::Timeout`] is retried by
//! the poller; every other variant ends the session immediately.
//!
//! [`PollError`] is what a session ends with when it did not observe a
//! terminal status.

use thiserror::Error;

/// Failure of a single status fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request timed out. Counted against the retry budget.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The service answered with a non-success HTTP status.
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response could not be interpreted as a status listing.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Any other transport failure (connection refused, TLS, DNS...).
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Reasons a polling session ends without a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("gave up after {attempts} attempts ({max_retries} retries allowed)")]
    RetriesExhausted { attempts: u32, max_retries: u32 },

    #[error("job {0} not found in status listing")]
    JobNotFound(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid poll request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_exhausted_display() {
        let err = PollError::RetriesExhausted {
            attempts: 3,
            max_retries: 2,
        };
        assert_eq!(err.to_string(), "gave up after 3 attempts (2 retries allowed)");
    }

    #[test]
    fn transport_error_is_transparent() {
        let err = PollError::from(TransportError::Status {
            status: 401,
            body: "unauthorised".into(),
        });
        assert_eq!(err.to_string(), "service returned status 401: unauthorised");
    }

    #[test]
    fn only_timeout_is_timeout() {
        assert!(TransportError::Timeout("slow".into()).is_timeout());
        assert!(!TransportError::Request("refused".into()).is_timeout());
        assert!(!TransportError::Malformed("bad json".into()).is_timeout());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PollError>();
    }
}
