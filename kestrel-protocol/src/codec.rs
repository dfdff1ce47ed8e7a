//! Kafka wire protocol codec.
//!
//! Handles framing and request/response headers for the client side of the
//! Kafka protocol.
//!
//! # Wire Format
//!
//! ```text
//! Request:
//! ┌─────────────────┬────────────────────────────────────────────────┐
//! │  Length (4B)    │                  Payload                       │
//! │   big-endian    │  RequestHeader + RequestBody                   │
//! └─────────────────┴────────────────────────────────────────────────┘
//!
//! Response:
//! ┌─────────────────┬────────────────────────────────────────────────┐
//! │  Length (4B)    │                  Payload                       │
//! │   big-endian    │  ResponseHeader + ResponseBody                 │
//! └─────────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! Connections exchange payloads; the length prefix is added and stripped
//! by [`write_frame`] and [`read_frame`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use kafka_protocol::{
    messages::{RequestHeader, ResponseHeader},
    protocol::{Decodable, Encodable, StrBytes},
};

use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::versions::{api_name, API_VERSIONS, FIND_COORDINATOR, OFFSET_COMMIT};

/// Maximum message size (100 MB, same as Kafka default).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Minimum frame size (4 bytes for length prefix).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Returns the first flexible version of an API, or `None` if this client
/// never encodes it flexibly.
#[must_use]
pub const fn flexible_version_threshold(api_key: i16) -> Option<i16> {
    match api_key {
        OFFSET_COMMIT => Some(8),
        FIND_COORDINATOR => Some(3),
        API_VERSIONS => Some(3),
        _ => None,
    }
}

/// Get request header version for a given API key and version.
///
/// - v1: includes `client_id`
/// - v2: adds tagged fields (flexible versions)
#[must_use]
pub const fn request_header_version(api_key: i16, api_version: i16) -> i16 {
    match flexible_version_threshold(api_key) {
        Some(threshold) if api_version >= threshold => 2,
        _ => 1,
    }
}

/// Get response header version for a given API key and version.
///
/// Response header v0 has just `correlation_id` (4 bytes).
/// Response header v1 adds tagged fields.
///
/// Note: `ApiVersions` responses always use header v0 so that a client can
/// read the error code even when the broker rejected the request version.
#[must_use]
pub const fn response_header_version(api_key: i16, api_version: i16) -> i16 {
    if api_key == API_VERSIONS {
        return 0;
    }
    match flexible_version_threshold(api_key) {
        Some(threshold) if api_version >= threshold => 1,
        _ => 0,
    }
}

/// Read a length-prefixed frame from the buffer.
///
/// Returns `None` if not enough data is available yet.
/// Returns `Some(bytes)` with the frame payload (excluding length prefix).
///
/// # Errors
///
/// Returns an error if the message exceeds `MAX_MESSAGE_SIZE`.
pub fn read_frame(buf: &mut BytesMut) -> ProtocolResult<Option<Bytes>> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    // Peek at the length (don't consume yet).
    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            length,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let total_size = FRAME_HEADER_SIZE + length;
    if buf.len() < total_size {
        return Ok(None);
    }

    buf.advance(FRAME_HEADER_SIZE);
    let payload = buf.split_to(length).freeze();

    Ok(Some(payload))
}

/// Write a length-prefixed frame to the buffer.
///
/// # Errors
///
/// Returns an error if the payload exceeds `MAX_MESSAGE_SIZE`.
pub fn write_frame(buf: &mut BytesMut, payload: &[u8]) -> ProtocolResult<()> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            length: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    // MAX_MESSAGE_SIZE is 100MB, well under u32::MAX.
    #[allow(clippy::cast_possible_truncation)]
    let length = payload.len() as u32;
    buf.reserve(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(length);
    buf.put_slice(payload);
    Ok(())
}

/// An encoded request payload plus what is needed to match its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRequest {
    /// API key from the header.
    pub api_key: i16,
    /// API version the body was encoded at.
    pub api_version: i16,
    /// Correlation ID for matching responses.
    pub correlation_id: i32,
    /// Header and body bytes, without the length prefix.
    pub payload: Bytes,
}

/// Encode a request header and body.
///
/// # Errors
///
/// Returns an error if header or body encoding fails.
pub fn encode_request<R: Encodable>(
    api_key: i16,
    api_version: i16,
    correlation_id: i32,
    client_id: &str,
    body: &R,
) -> ProtocolResult<EncodedRequest> {
    let mut header = RequestHeader::default();
    header.request_api_key = api_key;
    header.request_api_version = api_version;
    header.correlation_id = correlation_id;
    header.client_id = Some(StrBytes::from_string(client_id.to_string()));

    let mut buf = BytesMut::new();
    header
        .encode(&mut buf, request_header_version(api_key, api_version))
        .map_err(ProtocolError::encode)?;
    body.encode(&mut buf, api_version)
        .map_err(ProtocolError::encode)?;

    Ok(EncodedRequest {
        api_key,
        api_version,
        correlation_id,
        payload: buf.freeze(),
    })
}

/// Decode a response payload for `request`: check the header, then decode
/// the body at the request's version.
///
/// # Errors
///
/// Returns an error if the header or body cannot be decoded, the
/// correlation id does not match, or bytes are left over.
pub fn decode_response<R: Decodable>(request: &EncodedRequest, mut payload: Bytes) -> ProtocolResult<R> {
    let header_version = response_header_version(request.api_key, request.api_version);
    let header = ResponseHeader::decode(&mut payload, header_version)
        .map_err(ProtocolError::decode)?;

    if header.correlation_id != request.correlation_id {
        debug!(
            api = api_name(request.api_key),
            expected = request.correlation_id,
            actual = header.correlation_id,
            "Correlation id mismatch"
        );
        return Err(ProtocolError::CorrelationMismatch {
            expected: request.correlation_id,
            actual: header.correlation_id,
        });
    }

    let body = R::decode(&mut payload, request.api_version).map_err(ProtocolError::decode)?;

    if payload.has_remaining() {
        debug!(
            api = api_name(request.api_key),
            version = request.api_version,
            remaining = payload.remaining(),
            "Trailing bytes after response body"
        );
        return Err(ProtocolError::TrailingBytes {
            api: api_name(request.api_key),
            remaining: payload.remaining(),
        });
    }

    Ok(body)
}
