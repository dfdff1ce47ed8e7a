//! Consumer-group offset commit client.
//!
//! [`OffsetCommitClient::set_consumer_group_offset`] resolves the group's
//! coordinator, negotiates the `OffsetCommit` version on a pooled
//! connection, sends the commit and returns per-partition results.
//!
//! # Example
//!
//! ```no_run
//! use kestrel_client::{CallContext, ClientConfig, OffsetCommitClient};
//! use kestrel_core::{BrokerEndpoint, CommitRequest, PartitionOffset};
//!
//! # async fn run() -> kestrel_core::CommitResult<()> {
//! let config = ClientConfig::new(vec![BrokerEndpoint::parse("localhost:9092")?]);
//! let client = OffsetCommitClient::new(config)?;
//!
//! let request = CommitRequest::builder("test-group")
//!     .generation_id(1)
//!     .member_id("member-1")
//!     .offset("test-topic", PartitionOffset::new(0, 100).with_metadata("test-metadata"))
//!     .build()?;
//!
//! let response = client
//!     .set_consumer_group_offset(&CallContext::background(), &request)
//!     .await?;
//! for (topic, partition, error) in response.failures() {
//!     eprintln!("{topic}-{partition}: {error}");
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod commit;
pub mod config;
mod context;
pub mod coordinator;
pub mod pool;
pub mod transport;

pub use commit::OffsetCommitClient;
pub use config::{ClientConfig, CoordinatorCacheConfig};
pub use context::{CallContext, CancelHandle};
pub use coordinator::{CoordinatorCache, CoordinatorResolver, FindCoordinatorResolver, StaticResolver};
pub use pool::{ConnectionPool, PooledConnection};
pub use transport::{Connection, Connector, TcpConnection, TcpConnector, TransportError, TransportResult};
