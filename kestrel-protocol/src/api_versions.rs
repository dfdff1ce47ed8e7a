//! `ApiVersions` exchange used to learn what a broker speaks.

use bytes::Bytes;
use kafka_protocol::messages::{ApiVersionsRequest, ApiVersionsResponse};
use kestrel_core::BrokerError;

use crate::codec::{self, EncodedRequest};
use crate::error::{ProtocolError, ProtocolResult};
use crate::versions::{ApiVersionTable, VersionRange, API_VERSIONS, API_VERSIONS_VERSION};

/// Encodes the handshake request.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_request(correlation_id: i32, client_id: &str) -> ProtocolResult<EncodedRequest> {
    codec::encode_request(
        API_VERSIONS,
        API_VERSIONS_VERSION,
        correlation_id,
        client_id,
        &ApiVersionsRequest::default(),
    )
}

/// Decodes the handshake response into a version table.
///
/// # Errors
///
/// Returns `BrokerRejected` if the broker answered with an error code, or a
/// decode error if the payload is malformed.
pub fn decode_response(request: &EncodedRequest, payload: Bytes) -> ProtocolResult<ApiVersionTable> {
    let message: ApiVersionsResponse = codec::decode_response(request, payload)?;

    if let Some(error) = BrokerError::from_code(message.error_code) {
        return Err(ProtocolError::BrokerRejected {
            api: "ApiVersions",
            error,
        });
    }

    let mut table = ApiVersionTable::new();
    for api in message.api_keys {
        table.insert(api.api_key, VersionRange::new(api.min_version, api.max_version));
    }
    Ok(table)
}
