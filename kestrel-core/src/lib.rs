//! Kestrel Core - offset model and error taxonomy for group offset commits.
//!
//! This crate has no I/O. It defines what a commit request and its response
//! look like, validates requests, and classifies failures:
//!
//! - [`CommitError`]: request-level failures that abort a commit
//! - [`BrokerError`]: per-partition conditions reported by the broker
//!
//! # Design Principles
//!
//! - **Validate before I/O**: malformed requests never reach the network
//! - **Protocol error table**: broker codes are named by `kafka-protocol`,
//!   unknown codes are kept verbatim
//! - **Leave broker policy to the broker**: metadata limits are not enforced

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod broker_error;
mod error;
mod types;

pub use broker_error::BrokerError;
pub use kafka_protocol::ResponseError;
pub use error::{CommitError, CommitResult, ErrorKind};
pub use types::{
    BrokerEndpoint, CommitRequest, CommitRequestBuilder, CommitResponse, PartitionOffset,
    PartitionResult, NO_OFFSET, UNKNOWN_NODE_ID,
};
