//! `FindCoordinator` encoding and decoding for consumer groups.
//!
//! v0-v3 look up a single `key`; v4 batches lookups through
//! `coordinator_keys` and answers with a `coordinators` array. This client
//! always asks for exactly one group.

use bytes::Bytes;
use kafka_protocol::{
    messages::{FindCoordinatorRequest, FindCoordinatorResponse},
    protocol::StrBytes,
};
use kestrel_core::{BrokerEndpoint, BrokerError};

use crate::codec::{self, EncodedRequest};
use crate::error::{ProtocolError, ProtocolResult};
use crate::versions::{FIND_COORDINATOR, FIND_COORDINATOR_VERSIONS};

/// `key_type` for consumer groups.
pub const GROUP_KEY_TYPE: i8 = 0;

/// First version that batches keys.
const BATCHED_VERSION: i16 = 4;

/// Outcome of a coordinator lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorLookup {
    /// The broker acting as coordinator.
    Found(BrokerEndpoint),
    /// The broker answered with an error.
    Failed {
        /// Broker error.
        error: BrokerError,
        /// Optional error message from the broker.
        message: Option<String>,
    },
}

/// Builds the lookup message for `group_id` at `version`.
///
/// # Errors
///
/// Returns `UnsupportedVersion` if the version is outside what this client
/// encodes.
pub fn build_request(group_id: &str, version: i16) -> ProtocolResult<FindCoordinatorRequest> {
    if !FIND_COORDINATOR_VERSIONS.contains(version) {
        return Err(ProtocolError::UnsupportedVersion {
            api: "FindCoordinator",
            version,
            feature: "encoding by this client",
        });
    }

    let mut message = FindCoordinatorRequest::default();
    let key = StrBytes::from_string(group_id.to_string());
    if version >= BATCHED_VERSION {
        message.coordinator_keys.push(key);
    } else {
        message.key = key;
    }
    if version >= 1 {
        message.key_type = GROUP_KEY_TYPE;
    }
    Ok(message)
}

/// Encodes a lookup for `group_id` with its header.
///
/// # Errors
///
/// Returns an error if the version is unsupported or encoding fails.
pub fn encode_request(
    group_id: &str,
    version: i16,
    correlation_id: i32,
    client_id: &str,
) -> ProtocolResult<EncodedRequest> {
    let message = build_request(group_id, version)?;
    codec::encode_request(FIND_COORDINATOR, version, correlation_id, client_id, &message)
}

/// Decodes the lookup response for `group_id`.
///
/// # Errors
///
/// Returns an error if the payload cannot be decoded, a v4 response has no
/// entry for the group, or the advertised port is out of range.
pub fn decode_response(
    request: &EncodedRequest,
    payload: Bytes,
    group_id: &str,
) -> ProtocolResult<CoordinatorLookup> {
    let message: FindCoordinatorResponse = codec::decode_response(request, payload)?;

    if request.api_version >= BATCHED_VERSION {
        let coordinator = message
            .coordinators
            .into_iter()
            .find(|c| c.key.as_str() == group_id)
            .ok_or_else(|| ProtocolError::Decode {
                message: format!("no coordinator entry for group {group_id}"),
            })?;
        return lookup(
            coordinator.error_code,
            coordinator.error_message,
            coordinator.node_id.0,
            &coordinator.host,
            coordinator.port,
        );
    }

    lookup(
        message.error_code,
        message.error_message,
        message.node_id.0,
        &message.host,
        message.port,
    )
}

fn lookup(
    error_code: i16,
    error_message: Option<StrBytes>,
    node_id: i32,
    host: &str,
    port: i32,
) -> ProtocolResult<CoordinatorLookup> {
    if let Some(error) = BrokerError::from_code(error_code) {
        return Ok(CoordinatorLookup::Failed {
            error,
            message: error_message.map(|m| m.to_string()),
        });
    }

    let port = u16::try_from(port).map_err(|_| ProtocolError::Decode {
        message: format!("coordinator port {port} out of range"),
    })?;
    Ok(CoordinatorLookup::Found(BrokerEndpoint::new(node_id, host, port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use kafka_protocol::messages::{
        find_coordinator_response::Coordinator, BrokerId, RequestHeader, ResponseHeader,
    };
    use kafka_protocol::protocol::{Decodable, Encodable};
    use kafka_protocol::ResponseError;

    use crate::codec::{request_header_version, response_header_version};

    fn broker_decode(request: &EncodedRequest) -> FindCoordinatorRequest {
        let mut payload = request.payload.clone();
        RequestHeader::decode(
            &mut payload,
            request_header_version(FIND_COORDINATOR, request.api_version),
        )
        .unwrap();
        FindCoordinatorRequest::decode(&mut payload, request.api_version).unwrap()
    }

    fn broker_encode(request: &EncodedRequest, response: &FindCoordinatorResponse) -> Bytes {
        let mut header = ResponseHeader::default();
        header.correlation_id = request.correlation_id;
        let mut buf = BytesMut::new();
        header
            .encode(&mut buf, response_header_version(FIND_COORDINATOR, request.api_version))
            .unwrap();
        response.encode(&mut buf, request.api_version).unwrap();
        buf.freeze()
    }

    #[test]
    fn test_single_key_versions() {
        for version in 0..BATCHED_VERSION {
            let request = encode_request("orders", version, 9, "kestrel").unwrap();
            let decoded = broker_decode(&request);
            assert_eq!(decoded.key.as_str(), "orders");
            assert!(decoded.coordinator_keys.is_empty());
        }
    }

    #[test]
    fn test_batched_version() {
        let request = encode_request("orders", 4, 9, "kestrel").unwrap();
        let decoded = broker_decode(&request);
        assert_eq!(decoded.key_type, GROUP_KEY_TYPE);
        assert_eq!(decoded.coordinator_keys.len(), 1);
        assert_eq!(decoded.coordinator_keys[0].as_str(), "orders");
    }

    #[test]
    fn test_decode_found_v3() {
        let request = encode_request("orders", 3, 9, "kestrel").unwrap();

        let mut response = FindCoordinatorResponse::default();
        response.node_id = BrokerId(2);
        response.host = StrBytes::from_static_str("kafka-2");
        response.port = 9092;

        let lookup = decode_response(&request, broker_encode(&request, &response), "orders").unwrap();
        assert_eq!(lookup, CoordinatorLookup::Found(BrokerEndpoint::new(2, "kafka-2", 9092)));
    }

    #[test]
    fn test_decode_found_v4() {
        let request = encode_request("orders", 4, 9, "kestrel").unwrap();

        let mut coordinator = Coordinator::default();
        coordinator.key = StrBytes::from_static_str("orders");
        coordinator.node_id = BrokerId(3);
        coordinator.host = StrBytes::from_static_str("kafka-3");
        coordinator.port = 19092;
        let mut response = FindCoordinatorResponse::default();
        response.coordinators.push(coordinator);

        let lookup = decode_response(&request, broker_encode(&request, &response), "orders").unwrap();
        assert_eq!(lookup, CoordinatorLookup::Found(BrokerEndpoint::new(3, "kafka-3", 19092)));
    }

    #[test]
    fn test_decode_v4_missing_group() {
        let request = encode_request("orders", 4, 9, "kestrel").unwrap();
        let response = FindCoordinatorResponse::default();

        let err = decode_response(&request, broker_encode(&request, &response), "orders").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode { .. }));
    }

    #[test]
    fn test_decode_error() {
        let request = encode_request("orders", 2, 9, "kestrel").unwrap();

        let mut response = FindCoordinatorResponse::default();
        response.error_code = 15;
        response.error_message = Some(StrBytes::from_static_str("loading"));

        let lookup = decode_response(&request, broker_encode(&request, &response), "orders").unwrap();
        assert_eq!(
            lookup,
            CoordinatorLookup::Failed {
                error: ResponseError::CoordinatorNotAvailable.into(),
                message: Some("loading".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_bad_port() {
        let request = encode_request("orders", 1, 9, "kestrel").unwrap();

        let mut response = FindCoordinatorResponse::default();
        response.host = StrBytes::from_static_str("kafka");
        response.port = 70_000;

        let err = decode_response(&request, broker_encode(&request, &response), "orders").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode { .. }));
    }
}
