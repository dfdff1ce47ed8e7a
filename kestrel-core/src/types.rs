//! Offset commit request and response types.
//!
//! Topics are kept in a `BTreeMap`, so a request always encodes its topics in
//! the same (lexicographic) order. Partitions keep the order the caller gave.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use crate::broker_error::BrokerError;
use crate::error::{CommitError, CommitResult};

/// Node id used for bootstrap endpoints whose broker id is not yet known.
pub const UNKNOWN_NODE_ID: i32 = -1;

/// Offset value meaning "no offset".
pub const NO_OFFSET: i64 = -1;

/// A broker that requests can be sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BrokerEndpoint {
    /// Broker node id, or [`UNKNOWN_NODE_ID`] for a bootstrap address.
    pub node_id: i32,
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl BrokerEndpoint {
    /// Creates an endpoint for a known broker.
    #[must_use]
    pub fn new(node_id: i32, host: impl Into<String>, port: u16) -> Self {
        Self {
            node_id,
            host: host.into(),
            port,
        }
    }

    /// Creates an endpoint for a bootstrap address.
    #[must_use]
    pub fn bootstrap(host: impl Into<String>, port: u16) -> Self {
        Self::new(UNKNOWN_NODE_ID, host, port)
    }

    /// Parses `host:port` into a bootstrap endpoint.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the port is missing or not a number.
    pub fn parse(addr: &str) -> CommitResult<Self> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| CommitError::invalid_argument("broker", format!("missing port in {addr}")))?;
        if host.is_empty() {
            return Err(CommitError::invalid_argument("broker", format!("missing host in {addr}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| CommitError::invalid_argument("broker", format!("bad port in {addr}: {e}")))?;
        Ok(Self::bootstrap(host, port))
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.node_id == UNKNOWN_NODE_ID {
            write!(f, "{}:{}", self.host, self.port)
        } else {
            write!(f, "{}:{} (id: {})", self.host, self.port, self.node_id)
        }
    }
}

/// An offset to commit for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionOffset {
    /// Partition index.
    pub partition: i32,
    /// Offset to commit; [`NO_OFFSET`] means "no offset".
    pub offset: i64,
    /// Leader epoch of the last consumed record, if known.
    pub leader_epoch: Option<i32>,
    /// Opaque metadata stored with the offset.
    pub metadata: String,
}

impl PartitionOffset {
    /// Creates a partition offset without metadata.
    #[must_use]
    pub const fn new(partition: i32, offset: i64) -> Self {
        Self {
            partition,
            offset,
            leader_epoch: None,
            metadata: String::new(),
        }
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Sets the leader epoch.
    #[must_use]
    pub const fn with_leader_epoch(mut self, leader_epoch: i32) -> Self {
        self.leader_epoch = Some(leader_epoch);
        self
    }
}

/// A request to commit offsets for a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    /// Consumer group id. Must not be empty.
    pub group_id: String,
    /// Generation of the group the member belongs to.
    pub generation_id: i32,
    /// Member id assigned by the coordinator.
    pub member_id: String,
    /// Static membership instance id.
    pub instance_id: Option<String>,
    /// How long the broker should retain the offsets. Only old protocol
    /// versions carry this.
    pub retention: Option<Duration>,
    /// Offsets to commit, per topic.
    pub topics: BTreeMap<String, Vec<PartitionOffset>>,
}

impl CommitRequest {
    /// Starts building a request for `group_id`.
    #[must_use]
    pub fn builder(group_id: impl Into<String>) -> CommitRequestBuilder {
        CommitRequestBuilder::new(group_id)
    }

    /// Returns the number of partitions across all topics.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    /// Checks the request shape.
    ///
    /// Metadata size and member/instance id contents are left to the broker.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty group id or topic name, a
    /// negative partition, an offset below -1 or a partition listed twice
    /// for the same topic.
    pub fn validate(&self) -> CommitResult<()> {
        if self.group_id.is_empty() {
            return Err(CommitError::invalid_argument("group_id", "must not be empty"));
        }

        for (topic, offsets) in &self.topics {
            if topic.is_empty() {
                return Err(CommitError::invalid_argument("topic", "must not be empty"));
            }

            let mut seen = HashSet::with_capacity(offsets.len());
            for offset in offsets {
                if offset.partition < 0 {
                    return Err(CommitError::invalid_argument(
                        "partition",
                        format!("{topic}/{} is negative", offset.partition),
                    ));
                }
                if offset.offset < NO_OFFSET {
                    return Err(CommitError::invalid_argument(
                        "offset",
                        format!("{topic}/{} has offset {} (must be >= -1)", offset.partition, offset.offset),
                    ));
                }
                if !seen.insert(offset.partition) {
                    return Err(CommitError::invalid_argument(
                        "partition",
                        format!("{topic}/{} listed more than once", offset.partition),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Builder for [`CommitRequest`].
#[derive(Debug, Clone)]
pub struct CommitRequestBuilder {
    request: CommitRequest,
}

impl CommitRequestBuilder {
    fn new(group_id: impl Into<String>) -> Self {
        Self {
            request: CommitRequest {
                group_id: group_id.into(),
                generation_id: -1,
                member_id: String::new(),
                instance_id: None,
                retention: None,
                topics: BTreeMap::new(),
            },
        }
    }

    /// Sets the generation id.
    #[must_use]
    pub const fn generation_id(mut self, generation_id: i32) -> Self {
        self.request.generation_id = generation_id;
        self
    }

    /// Sets the member id.
    #[must_use]
    pub fn member_id(mut self, member_id: impl Into<String>) -> Self {
        self.request.member_id = member_id.into();
        self
    }

    /// Sets the static membership instance id. An empty string clears it.
    #[must_use]
    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        let instance_id = instance_id.into();
        self.request.instance_id = if instance_id.is_empty() { None } else { Some(instance_id) };
        self
    }

    /// Sets the offset retention time.
    #[must_use]
    pub const fn retention(mut self, retention: Duration) -> Self {
        self.request.retention = Some(retention);
        self
    }

    /// Adds one partition offset for `topic`.
    #[must_use]
    pub fn offset(mut self, topic: impl Into<String>, offset: PartitionOffset) -> Self {
        self.request.topics.entry(topic.into()).or_default().push(offset);
        self
    }

    /// Adds several partition offsets for `topic`.
    #[must_use]
    pub fn offsets(
        mut self,
        topic: impl Into<String>,
        offsets: impl IntoIterator<Item = PartitionOffset>,
    ) -> Self {
        self.request.topics.entry(topic.into()).or_default().extend(offsets);
        self
    }

    /// Validates and returns the request.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if [`CommitRequest::validate`] fails.
    pub fn build(self) -> CommitResult<CommitRequest> {
        self.request.validate()?;
        Ok(self.request)
    }
}

/// Commit outcome for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionResult {
    /// Partition index.
    pub partition: i32,
    /// Broker error, or `None` if the offset was committed.
    pub error: Option<BrokerError>,
}

impl PartitionResult {
    /// Returns true if the offset was committed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.error.is_none()
    }
}

/// Response to a [`CommitRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResponse {
    /// Quota delay requested by the broker.
    pub throttle: Duration,
    /// Per-partition results, per topic.
    pub topics: BTreeMap<String, Vec<PartitionResult>>,
}

impl CommitResponse {
    /// Returns true if every partition committed.
    #[must_use]
    pub fn all_committed(&self) -> bool {
        self.topics.values().flatten().all(PartitionResult::is_committed)
    }

    /// Iterates over `(topic, partition, error)` for every failed partition.
    pub fn failures(&self) -> impl Iterator<Item = (&str, i32, BrokerError)> + '_ {
        self.topics.iter().flat_map(|(topic, results)| {
            results
                .iter()
                .filter_map(move |r| r.error.map(|e| (topic.as_str(), r.partition, e)))
        })
    }

    /// Returns the result for one partition, if present.
    #[must_use]
    pub fn partition(&self, topic: &str, partition: i32) -> Option<&PartitionResult> {
        self.topics
            .get(topic)
            .and_then(|results| results.iter().find(|r| r.partition == partition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use kafka_protocol::ResponseError;

    fn sample_request() -> CommitRequestBuilder {
        CommitRequest::builder("test-group")
            .generation_id(1)
            .member_id("test-member")
            .instance_id("test-instance")
            .offset("test-topic", PartitionOffset::new(0, 100).with_metadata("test-metadata"))
    }

    #[test]
    fn test_builder_sets_fields() {
        let req = sample_request().build().unwrap();

        assert_eq!(req.group_id, "test-group");
        assert_eq!(req.generation_id, 1);
        assert_eq!(req.member_id, "test-member");
        assert_eq!(req.instance_id.as_deref(), Some("test-instance"));
        assert_eq!(req.topics.len(), 1);

        let offsets = &req.topics["test-topic"];
        assert_eq!(offsets.len(), 1);
        assert_eq!(offsets[0].partition, 0);
        assert_eq!(offsets[0].offset, 100);
        assert_eq!(offsets[0].metadata, "test-metadata");
        assert_eq!(offsets[0].leader_epoch, None);
    }

    #[test]
    fn test_empty_instance_id_means_none() {
        let req = CommitRequest::builder("g").instance_id("").build().unwrap();
        assert_eq!(req.instance_id, None);
    }

    #[test]
    fn test_empty_group_rejected() {
        let err = CommitRequest::builder("").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_empty_topic_map_is_valid() {
        let req = CommitRequest::builder("g").build().unwrap();
        assert!(req.topics.is_empty());
        assert_eq!(req.partition_count(), 0);
    }

    #[test]
    fn test_negative_partition_rejected() {
        let err = CommitRequest::builder("g")
            .offset("t", PartitionOffset::new(-1, 0))
            .build()
            .unwrap_err();
        assert!(matches!(err, CommitError::InvalidArgument { name: "partition", .. }));
    }

    #[test]
    fn test_offset_below_no_offset_rejected() {
        let err = CommitRequest::builder("g")
            .offset("t", PartitionOffset::new(0, -2))
            .build()
            .unwrap_err();
        assert!(matches!(err, CommitError::InvalidArgument { name: "offset", .. }));

        // -1 itself is allowed.
        CommitRequest::builder("g")
            .offset("t", PartitionOffset::new(0, NO_OFFSET))
            .build()
            .unwrap();
    }

    #[test]
    fn test_duplicate_partition_rejected() {
        let err = CommitRequest::builder("g")
            .offsets("t", [PartitionOffset::new(0, 1), PartitionOffset::new(0, 2)])
            .build()
            .unwrap_err();
        assert!(matches!(err, CommitError::InvalidArgument { name: "partition", .. }));

        // The same partition number under different topics is fine.
        CommitRequest::builder("g")
            .offset("a", PartitionOffset::new(0, 1))
            .offset("b", PartitionOffset::new(0, 1))
            .build()
            .unwrap();
    }

    #[test]
    fn test_empty_topic_name_rejected() {
        let err = CommitRequest::builder("g")
            .offset("", PartitionOffset::new(0, 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, CommitError::InvalidArgument { name: "topic", .. }));
    }

    #[test]
    fn test_large_metadata_not_checked() {
        let metadata = "m".repeat(1024 * 1024);
        CommitRequest::builder("g")
            .offset("t", PartitionOffset::new(0, 1).with_metadata(metadata))
            .build()
            .unwrap();
    }

    #[test]
    fn test_response_helpers() {
        let mut response = CommitResponse {
            throttle: Duration::from_secs(1),
            topics: BTreeMap::new(),
        };
        response.topics.insert(
            "t".to_string(),
            vec![
                PartitionResult { partition: 0, error: None },
                PartitionResult { partition: 1, error: Some(BrokerError::from(ResponseError::NotCoordinator)) },
            ],
        );

        assert!(!response.all_committed());
        assert!(response.partition("t", 0).unwrap().is_committed());
        assert!(response.partition("t", 2).is_none());

        let failures: Vec<_> = response.failures().collect();
        assert_eq!(failures, vec![("t", 1, BrokerError::from(ResponseError::NotCoordinator))]);
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint = BrokerEndpoint::parse("localhost:9092").unwrap();
        assert_eq!(endpoint, BrokerEndpoint::bootstrap("localhost", 9092));
        assert_eq!(endpoint.to_string(), "localhost:9092");
        assert_eq!(endpoint.address(), "localhost:9092");

        assert!(BrokerEndpoint::parse("localhost").is_err());
        assert!(BrokerEndpoint::parse(":9092").is_err());
        assert!(BrokerEndpoint::parse("localhost:port").is_err());
    }

    #[test]
    fn test_endpoint_display_with_id() {
        let endpoint = BrokerEndpoint::new(3, "kafka-3", 9092);
        assert_eq!(endpoint.to_string(), "kafka-3:9092 (id: 3)");
    }
}
