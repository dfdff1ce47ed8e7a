//! Error types for offset commits.
//!
//! Request-level failures abort a commit and are returned as [`CommitError`].
//! Broker-reported conditions for individual partitions are not errors at
//! this level: they travel inside the response as [`crate::BrokerError`].

use thiserror::Error;

use crate::broker_error::BrokerError;

/// The result type for offset commit operations.
pub type CommitResult<T> = std::result::Result<T, CommitError>;

/// Coarse classification of a [`CommitError`].
///
/// Callers that only need to decide what to do next (fix the request, retry,
/// re-resolve, give up) should match on this rather than on the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request is malformed and was rejected before any I/O.
    InvalidArgument,
    /// The request needs a protocol feature the broker cannot speak.
    UnsupportedVersion,
    /// The group coordinator could not be determined or reached.
    CoordinatorResolutionFailed,
    /// Connection or I/O failure during send or receive.
    TransportFailure,
    /// Response bytes inconsistent with the declared structure.
    MalformedResponse,
    /// The caller cancelled the call.
    Cancelled,
    /// The caller's deadline passed before the call completed.
    DeadlineExceeded,
}

/// Errors that abort an offset commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    /// A request field failed validation.
    #[error("invalid argument {name}: {reason}")]
    InvalidArgument {
        /// The offending field.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The negotiated protocol version cannot carry the request.
    #[error("unsupported version for {api}: {reason}")]
    UnsupportedVersion {
        /// API name, e.g. `OffsetCommit`.
        api: &'static str,
        /// What is missing.
        reason: String,
    },

    /// The coordinator lookup failed.
    #[error("coordinator resolution failed for group {group_id}: {reason}")]
    CoordinatorResolution {
        /// Group being resolved.
        group_id: String,
        /// Failure description.
        reason: String,
        /// Broker error code returned by the lookup, if any.
        broker_error: Option<BrokerError>,
    },

    /// Connection or I/O failure.
    #[error("transport failure ({broker}): {message}")]
    Transport {
        /// Broker the failure happened against.
        broker: String,
        /// Failure description.
        message: String,
    },

    /// Response bytes could not be interpreted.
    #[error("malformed response: {message}")]
    MalformedResponse {
        /// What was wrong with the response.
        message: String,
    },

    /// Cancelled by the caller.
    #[error("commit cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl CommitError {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Self::CoordinatorResolution { .. } => ErrorKind::CoordinatorResolutionFailed,
            Self::Transport { .. } => ErrorKind::TransportFailure,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Creates a malformed-response error from any displayable cause.
    pub fn malformed<E: std::fmt::Display>(err: E) -> Self {
        Self::MalformedResponse {
            message: err.to_string(),
        }
    }

    /// Creates a transport error against `broker` from any displayable cause.
    pub fn transport<B: std::fmt::Display, E: std::fmt::Display>(broker: B, err: E) -> Self {
        Self::Transport {
            broker: broker.to_string(),
            message: err.to_string(),
        }
    }

    /// Returns true if the caller's context ended the call.
    #[must_use]
    pub const fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            CommitError::invalid_argument("group_id", "must not be empty").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            CommitError::transport("broker-1", "connection reset").kind(),
            ErrorKind::TransportFailure
        );
        assert_eq!(
            CommitError::malformed("truncated").kind(),
            ErrorKind::MalformedResponse
        );
        assert_eq!(CommitError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(CommitError::DeadlineExceeded.kind(), ErrorKind::DeadlineExceeded);
    }

    #[test]
    fn test_display() {
        let err = CommitError::invalid_argument("group_id", "must not be empty");
        assert_eq!(err.to_string(), "invalid argument group_id: must not be empty");

        let err = CommitError::CoordinatorResolution {
            group_id: "g".to_string(),
            reason: "no bootstrap broker answered".to_string(),
            broker_error: None,
        };
        assert_eq!(
            err.to_string(),
            "coordinator resolution failed for group g: no bootstrap broker answered"
        );
    }

    #[test]
    fn test_context_errors() {
        assert!(CommitError::Cancelled.is_context_error());
        assert!(CommitError::DeadlineExceeded.is_context_error());
        assert!(!CommitError::malformed("x").is_context_error());
    }
}
