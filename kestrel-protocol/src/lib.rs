//! Kafka wire protocol pieces needed to commit consumer-group offsets.
//!
//! This crate encodes requests and decodes responses for the three APIs the
//! commit client speaks. It performs no I/O; the client crate owns sockets.
//!
//! # Supported APIs
//!
//! | API Key | Name | Versions |
//! |---------|------|----------|
//! | 8 | `OffsetCommit` | v2-v8 |
//! | 10 | `FindCoordinator` | v0-v4 |
//! | 18 | `ApiVersions` | v2 |
//!
//! # Layout
//!
//! ```text
//! CommitRequest ──► offset_commit ──► codec (header + frame) ──► bytes
//!                        ▲
//!                    versions (negotiation + feature table)
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod api_versions;
pub mod codec;
pub mod error;
pub mod find_coordinator;
pub mod offset_commit;
pub mod versions;

pub use codec::EncodedRequest;
pub use error::{ProtocolError, ProtocolResult};
pub use find_coordinator::CoordinatorLookup;
pub use versions::{ApiVersionTable, OffsetCommitFeatures, VersionRange};
