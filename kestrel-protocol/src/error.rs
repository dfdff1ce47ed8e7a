//! Error types for the offset commit wire codec.

use kestrel_core::{BrokerError, CommitError};
use thiserror::Error;

use crate::versions::VersionRange;

/// Result type for codec operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding requests or decoding responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Error decoding a Kafka protocol message.
    #[error("protocol decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// Error encoding a Kafka protocol message.
    #[error("protocol encode error: {message}")]
    Encode {
        /// Error details.
        message: String,
    },

    /// Frame length prefix exceeds the maximum message size.
    #[error("frame too large: {length} bytes (max {max})")]
    FrameTooLarge {
        /// Declared frame length.
        length: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// The request needs a field the version cannot carry.
    #[error("{api} v{version} does not support {feature}")]
    UnsupportedVersion {
        /// API name.
        api: &'static str,
        /// Version the request would be encoded at.
        version: i16,
        /// The missing capability.
        feature: &'static str,
    },

    /// Client and broker share no version of an API.
    #[error("no common {api} version: client supports {client}, broker supports {}", .broker.map_or_else(|| "none".to_string(), |r| r.to_string()))]
    NoCommonVersion {
        /// API name.
        api: &'static str,
        /// Versions this client can speak.
        client: VersionRange,
        /// Versions the broker advertised, if any.
        broker: Option<VersionRange>,
    },

    /// Response correlation id does not match the request.
    #[error("correlation id mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch {
        /// Correlation id of the request.
        expected: i32,
        /// Correlation id in the response header.
        actual: i32,
    },

    /// Bytes left over after decoding the response body.
    #[error("{api} response has {remaining} trailing bytes")]
    TrailingBytes {
        /// API name.
        api: &'static str,
        /// Unread byte count.
        remaining: usize,
    },

    /// Throttle time below zero.
    #[error("negative throttle time: {0} ms")]
    NegativeThrottle(i32),

    /// A requested topic is absent from the response.
    #[error("response is missing topic {topic}")]
    MissingTopic {
        /// Topic name.
        topic: String,
    },

    /// A requested partition is absent from the response.
    #[error("response is missing partition {topic}/{partition}")]
    MissingPartition {
        /// Topic name.
        topic: String,
        /// Partition index.
        partition: i32,
    },

    /// The broker rejected a connection-level request.
    #[error("{api} rejected by broker: {error}")]
    BrokerRejected {
        /// API name.
        api: &'static str,
        /// Broker error.
        error: BrokerError,
    },
}

impl ProtocolError {
    /// Create a decode error from any error type.
    pub fn decode<E: std::fmt::Display>(err: E) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }

    /// Create an encode error from any error type.
    pub fn encode<E: std::fmt::Display>(err: E) -> Self {
        Self::Encode {
            message: err.to_string(),
        }
    }
}

impl From<ProtocolError> for CommitError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Encode { message } => Self::InvalidArgument {
                name: "request",
                reason: message,
            },
            ProtocolError::UnsupportedVersion { api, .. }
            | ProtocolError::NoCommonVersion { api, .. }
            | ProtocolError::BrokerRejected { api, .. } => Self::UnsupportedVersion {
                api,
                reason: err.to_string(),
            },
            ProtocolError::Decode { .. }
            | ProtocolError::FrameTooLarge { .. }
            | ProtocolError::CorrelationMismatch { .. }
            | ProtocolError::TrailingBytes { .. }
            | ProtocolError::NegativeThrottle(_)
            | ProtocolError::MissingTopic { .. }
            | ProtocolError::MissingPartition { .. } => Self::MalformedResponse {
                message: err.to_string(),
            },
        }
    }
}
