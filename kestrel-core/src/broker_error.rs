//! Broker error codes.
//!
//! Codes are interpreted through `kafka-protocol`'s [`ResponseError`] table,
//! so every code the protocol defines carries its name and retriability.
//! Codes the table does not know become [`BrokerError::Unknown`] so newer
//! brokers never break decoding.
//!
//! See: <https://kafka.apache.org/protocol#protocol_error_codes>

use kafka_protocol::ResponseError;
use thiserror::Error;

/// A broker-reported error for a partition or a coordinator lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// A code defined by the Kafka protocol.
    #[error("{} ({})", .0, .0.code())]
    Known(ResponseError),

    /// A code this client does not know.
    #[error("unknown error code {0}")]
    Unknown(i16),
}

impl BrokerError {
    /// Maps a wire error code. Returns `None` for 0 (no error).
    #[must_use]
    pub fn from_code(code: i16) -> Option<Self> {
        ResponseError::try_from_code(code).map(Self::from)
    }

    /// Returns the wire error code.
    #[must_use]
    pub fn code(self) -> i16 {
        match self {
            Self::Known(error) => error.code(),
            Self::Unknown(code) => code,
        }
    }

    /// Returns the protocol error, if the code is known.
    #[must_use]
    pub const fn response_error(self) -> Option<ResponseError> {
        match self {
            Self::Known(error) => Some(error),
            Self::Unknown(_) => None,
        }
    }

    /// Returns true if the protocol marks this condition as transient.
    /// Unknown codes are never retriable.
    #[must_use]
    pub fn is_retriable(self) -> bool {
        self.response_error()
            .is_some_and(|error| error.is_retriable())
    }

    /// Returns true if the group's coordinator mapping should be re-resolved
    /// before retrying.
    #[must_use]
    pub const fn is_coordinator_error(self) -> bool {
        matches!(
            self,
            Self::Known(
                ResponseError::NotCoordinator
                    | ResponseError::CoordinatorNotAvailable
                    | ResponseError::CoordinatorLoadInProgress
            )
        )
    }
}

impl From<ResponseError> for BrokerError {
    fn from(error: ResponseError) -> Self {
        match error {
            ResponseError::Unknown(code) => Self::Unknown(code),
            known => Self::Known(known),
        }
    }
}

impl PartialEq<ResponseError> for BrokerError {
    fn eq(&self, other: &ResponseError) -> bool {
        *self == Self::from(*other)
    }
}
