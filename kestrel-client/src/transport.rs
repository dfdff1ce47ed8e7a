//! Broker connections.
//!
//! # Design
//!
//! Two traits separate opening connections from using them:
//! - [`Connector`] opens a [`Connection`] to a broker
//! - [`Connection`] performs one request/response round trip at a time
//!
//! Production code uses [`TcpConnector`]. Tests supply their own connector
//! to script broker behavior and count calls.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use kestrel_core::BrokerEndpoint;
use kestrel_protocol::codec::{read_frame, write_frame};
use kestrel_protocol::{api_versions, ApiVersionTable, EncodedRequest, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Initial read buffer capacity per connection.
const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Correlation id of the `ApiVersions` handshake, the first request on a
/// fresh connection.
const HANDSHAKE_CORRELATION_ID: i32 = 0;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to connect to the broker.
    #[error("failed to connect to {broker}: {source}")]
    ConnectFailed {
        /// The broker address.
        broker: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The broker closed the connection.
    #[error("connection closed by broker")]
    Closed,

    /// Framing or handshake decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An open connection to one broker.
///
/// Implementations never interleave requests: `round_trip` takes `&mut
/// self`, so a connection has at most one request in flight.
#[async_trait]
pub trait Connection: Send {
    /// Sends an encoded request and returns the response payload (response
    /// header included, length prefix stripped).
    ///
    /// # Errors
    ///
    /// Returns an error if writing or reading fails, or the broker closes
    /// the connection.
    async fn round_trip(&mut self, request: &EncodedRequest) -> TransportResult<Bytes>;

    /// Versions the broker advertised when the connection was opened.
    fn api_versions(&self) -> &ApiVersionTable;
}

/// Opens connections to brokers.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a connection to `broker`.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker cannot be reached or the handshake
    /// fails.
    async fn connect(&self, broker: &BrokerEndpoint) -> TransportResult<Box<dyn Connection>>;
}

/// Opens plain TCP connections and performs the `ApiVersions` handshake.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    client_id: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector.
    #[must_use]
    pub fn new(client_id: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            client_id: client_id.into(),
            connect_timeout,
        }
    }

    async fn open(&self, broker: &BrokerEndpoint) -> TransportResult<TcpConnection> {
        let addr = broker.address();

        // Resolve the address (supports both IP and hostname).
        let stream = async {
            let mut addrs = tokio::net::lookup_host(addr.as_str()).await?;
            let resolved = addrs.next().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no addresses found for {addr}"),
                )
            })?;
            TcpStream::connect(resolved).await
        }
        .await
        .map_err(|source| TransportError::ConnectFailed {
            broker: broker.to_string(),
            source,
        })?;

        // Disable Nagle's algorithm; every write is a complete request.
        stream.set_nodelay(true)?;

        let mut connection = TcpConnection {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            broker: broker.clone(),
            versions: ApiVersionTable::new(),
        };

        let request = api_versions::encode_request(HANDSHAKE_CORRELATION_ID, &self.client_id)?;
        let payload = connection.round_trip(&request).await?;
        connection.versions = api_versions::decode_response(&request, payload)?;

        debug!(
            broker = %broker,
            apis = connection.versions.len(),
            "Connected"
        );
        Ok(connection)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, broker: &BrokerEndpoint) -> TransportResult<Box<dyn Connection>> {
        match tokio::time::timeout(self.connect_timeout, self.open(broker)).await {
            Ok(Ok(connection)) => Ok(Box::new(connection)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::ConnectFailed {
                broker: broker.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timed out"),
            }),
        }
    }
}

/// A TCP connection to one broker.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    read_buf: BytesMut,
    broker: BrokerEndpoint,
    versions: ApiVersionTable,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn round_trip(&mut self, request: &EncodedRequest) -> TransportResult<Bytes> {
        let mut frame = BytesMut::new();
        write_frame(&mut frame, &request.payload)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        loop {
            if let Some(payload) = read_frame(&mut self.read_buf)? {
                return Ok(payload);
            }
            let bytes_read = self.stream.read_buf(&mut self.read_buf).await?;
            if bytes_read == 0 {
                debug!(broker = %self.broker, "Connection closed by broker");
                return Err(TransportError::Closed);
            }
        }
    }

    fn api_versions(&self) -> &ApiVersionTable {
        &self.versions
    }
}
