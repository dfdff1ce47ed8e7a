//! API version ranges, negotiation, and per-version field support.
//!
//! Each connection learns the broker's supported ranges once (via
//! `ApiVersions`). A request is then encoded at the highest version both
//! sides speak, and [`OffsetCommitFeatures`] says which optional fields that
//! version can carry.

use std::collections::HashMap;
use std::fmt;

use kafka_protocol::messages::ApiKey;

use crate::error::{ProtocolError, ProtocolResult};

/// `OffsetCommit` API key.
pub const OFFSET_COMMIT: i16 = ApiKey::OffsetCommit as i16;
/// `FindCoordinator` API key.
pub const FIND_COORDINATOR: i16 = ApiKey::FindCoordinator as i16;
/// `ApiVersions` API key.
pub const API_VERSIONS: i16 = ApiKey::ApiVersions as i16;

/// `OffsetCommit` versions this client can encode.
pub const OFFSET_COMMIT_VERSIONS: VersionRange = VersionRange::new(2, 8);
/// `FindCoordinator` versions this client can encode.
pub const FIND_COORDINATOR_VERSIONS: VersionRange = VersionRange::new(0, 4);
/// `ApiVersions` version sent during connection setup.
///
/// v2 is the newest non-flexible version, so the broker can always parse the
/// request before it knows what we speak.
pub const API_VERSIONS_VERSION: i16 = 2;

/// Returns the protocol name for an API key.
#[must_use]
pub const fn api_name(api_key: i16) -> &'static str {
    match api_key {
        OFFSET_COMMIT => "OffsetCommit",
        FIND_COORDINATOR => "FindCoordinator",
        API_VERSIONS => "ApiVersions",
        _ => "Unknown",
    }
}

/// An inclusive range of API versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionRange {
    /// Lowest supported version.
    pub min: i16,
    /// Highest supported version.
    pub max: i16,
}

impl VersionRange {
    /// Creates a version range.
    #[must_use]
    pub const fn new(min: i16, max: i16) -> Self {
        Self { min, max }
    }

    /// Returns true if `version` is inside the range.
    #[must_use]
    pub const fn contains(self, version: i16) -> bool {
        self.min <= version && version <= self.max
    }

    /// Returns the overlap of two ranges, if any.
    #[must_use]
    pub fn intersect(self, other: Self) -> Option<Self> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(Self { min, max })
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}-v{}", self.min, self.max)
    }
}

/// Versions a broker supports, keyed by API key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiVersionTable {
    ranges: HashMap<i16, VersionRange>,
}

impl ApiVersionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table advertising exactly what this client speaks.
    #[must_use]
    pub fn client_defaults() -> Self {
        Self::new()
            .with(OFFSET_COMMIT, OFFSET_COMMIT_VERSIONS)
            .with(FIND_COORDINATOR, FIND_COORDINATOR_VERSIONS)
            .with(API_VERSIONS, VersionRange::new(0, API_VERSIONS_VERSION))
    }

    /// Adds or replaces the range for an API.
    #[must_use]
    pub fn with(mut self, api_key: i16, range: VersionRange) -> Self {
        self.insert(api_key, range);
        self
    }

    /// Adds or replaces the range for an API.
    pub fn insert(&mut self, api_key: i16, range: VersionRange) {
        self.ranges.insert(api_key, range);
    }

    /// Returns the broker's range for an API.
    #[must_use]
    pub fn get(&self, api_key: i16) -> Option<VersionRange> {
        self.ranges.get(&api_key).copied()
    }

    /// Returns the number of APIs in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Picks the highest version of `api_key` both sides support.
    ///
    /// # Errors
    /// Returns `NoCommonVersion` if the broker does not advertise the API or
    /// the ranges do not overlap.
    pub fn negotiate(&self, api_key: i16, client: VersionRange) -> ProtocolResult<i16> {
        let broker = self.get(api_key);
        broker
            .and_then(|range| range.intersect(client))
            .map(|common| common.max)
            .ok_or(ProtocolError::NoCommonVersion {
                api: api_name(api_key),
                client,
                broker,
            })
    }
}

/// Optional `OffsetCommit` fields available at a given version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct OffsetCommitFeatures {
    /// Request carries `retention_time_ms` (v2-v4).
    pub retention_time: bool,
    /// Response carries `throttle_time_ms` (v3+).
    pub throttle_time: bool,
    /// Partitions carry `committed_leader_epoch` (v6+).
    pub leader_epoch: bool,
    /// Request carries `group_instance_id` (v7+).
    pub instance_id: bool,
    /// Compact strings and tagged fields (v8+).
    pub flexible: bool,
}

impl OffsetCommitFeatures {
    /// Returns the feature set of `version`.
    #[must_use]
    pub const fn for_version(version: i16) -> Self {
        Self {
            retention_time: version >= 2 && version <= 4,
            throttle_time: version >= 3,
            leader_epoch: version >= 6,
            instance_id: version >= 7,
            flexible: version >= 8,
        }
    }
}
