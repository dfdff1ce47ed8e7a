//! `OffsetCommit` request encoding and response decoding.
//!
//! Field presence by version:
//!
//! | Field | Versions |
//! |-------|----------|
//! | `retention_time_ms` | 2-4 |
//! | `throttle_time_ms` (response) | 3+ |
//! | `committed_leader_epoch` | 6+ |
//! | `group_instance_id` | 7+ |
//! | flexible encoding | 8+ |

use std::time::Duration;

use bytes::Bytes;
use kafka_protocol::{
    messages::{
        offset_commit_request::{OffsetCommitRequestPartition, OffsetCommitRequestTopic},
        GroupId, OffsetCommitRequest, OffsetCommitResponse, TopicName,
    },
    protocol::StrBytes,
};
use kestrel_core::{BrokerError, CommitRequest, CommitResponse, PartitionResult};

use crate::codec::{self, EncodedRequest};
use crate::error::{ProtocolError, ProtocolResult};
use crate::versions::{OffsetCommitFeatures, OFFSET_COMMIT, OFFSET_COMMIT_VERSIONS};

const API: &str = "OffsetCommit";

/// Checks that `request` can be carried by `version`.
///
/// A leader epoch below v6 is dropped rather than rejected: it is an
/// optimisation for the broker, not part of the commit.
///
/// # Errors
///
/// Returns `UnsupportedVersion` if the version is outside what this client
/// encodes, an instance id is set below v7, or a retention time is set
/// outside v2-v4.
pub fn check_version(request: &CommitRequest, version: i16) -> ProtocolResult<OffsetCommitFeatures> {
    if !OFFSET_COMMIT_VERSIONS.contains(version) {
        return Err(ProtocolError::UnsupportedVersion {
            api: API,
            version,
            feature: "encoding by this client",
        });
    }

    let features = OffsetCommitFeatures::for_version(version);
    if request.instance_id.is_some() && !features.instance_id {
        return Err(ProtocolError::UnsupportedVersion {
            api: API,
            version,
            feature: "static membership (instance id)",
        });
    }
    if request.retention.is_some() && !features.retention_time {
        return Err(ProtocolError::UnsupportedVersion {
            api: API,
            version,
            feature: "offset retention time",
        });
    }

    Ok(features)
}

/// Builds the protocol message for `request` at `version`.
///
/// # Errors
///
/// See [`check_version`].
pub fn build_request(request: &CommitRequest, version: i16) -> ProtocolResult<OffsetCommitRequest> {
    let features = check_version(request, version)?;

    let mut message = OffsetCommitRequest::default();
    message.group_id = GroupId(StrBytes::from_string(request.group_id.clone()));
    message.generation_id_or_member_epoch = request.generation_id;
    message.member_id = StrBytes::from_string(request.member_id.clone());
    if features.instance_id {
        message.group_instance_id = request.instance_id.clone().map(StrBytes::from_string);
    }
    if features.retention_time {
        message.retention_time_ms = request.retention.map_or(-1, duration_to_ms);
    }

    for (name, offsets) in &request.topics {
        let mut topic = OffsetCommitRequestTopic::default();
        topic.name = TopicName(StrBytes::from_string(name.clone()));

        for offset in offsets {
            let mut partition = OffsetCommitRequestPartition::default();
            partition.partition_index = offset.partition;
            partition.committed_offset = offset.offset;
            partition.committed_leader_epoch = if features.leader_epoch {
                offset.leader_epoch.unwrap_or(-1)
            } else {
                -1
            };
            partition.committed_metadata = Some(StrBytes::from_string(offset.metadata.clone()));
            topic.partitions.push(partition);
        }

        message.topics.push(topic);
    }

    Ok(message)
}

/// Encodes `request` with its header at `version`.
///
/// # Errors
///
/// Returns an error if the version cannot carry the request or encoding
/// fails.
pub fn encode_request(
    request: &CommitRequest,
    version: i16,
    correlation_id: i32,
    client_id: &str,
) -> ProtocolResult<EncodedRequest> {
    let message = build_request(request, version)?;
    codec::encode_request(OFFSET_COMMIT, version, correlation_id, client_id, &message)
}

/// Decodes the response payload for `request`.
///
/// # Errors
///
/// Returns an error if the payload is truncated, has trailing bytes, or
/// carries the wrong correlation id or a negative throttle time.
pub fn decode_response(request: &EncodedRequest, payload: Bytes) -> ProtocolResult<CommitResponse> {
    let message: OffsetCommitResponse = codec::decode_response(request, payload)?;
    from_message(message)
}

/// Converts a decoded protocol message into a [`CommitResponse`].
///
/// Topics appearing more than once are merged.
///
/// # Errors
///
/// Returns `NegativeThrottle` if the throttle time is below zero.
pub fn from_message(message: OffsetCommitResponse) -> ProtocolResult<CommitResponse> {
    let throttle_ms = u64::try_from(message.throttle_time_ms)
        .map_err(|_| ProtocolError::NegativeThrottle(message.throttle_time_ms))?;

    let mut response = CommitResponse {
        throttle: Duration::from_millis(throttle_ms),
        ..CommitResponse::default()
    };

    for topic in message.topics {
        let results = response.topics.entry(topic.name.0.to_string()).or_default();
        results.extend(topic.partitions.into_iter().map(|p| PartitionResult {
            partition: p.partition_index,
            error: BrokerError::from_code(p.error_code),
        }));
    }

    Ok(response)
}

/// Checks that every requested partition has a result.
///
/// Extra topics or partitions in the response are allowed.
///
/// # Errors
///
/// Returns `MissingTopic` or `MissingPartition` for the first gap found.
pub fn check_complete(request: &CommitRequest, response: &CommitResponse) -> ProtocolResult<()> {
    for (topic, offsets) in &request.topics {
        if offsets.is_empty() {
            continue;
        }
        let Some(results) = response.topics.get(topic) else {
            return Err(ProtocolError::MissingTopic {
                topic: topic.clone(),
            });
        };
        for offset in offsets {
            if !results.iter().any(|r| r.partition == offset.partition) {
                return Err(ProtocolError::MissingPartition {
                    topic: topic.clone(),
                    partition: offset.partition,
                });
            }
        }
    }
    Ok(())
}

fn duration_to_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
