//! Per-broker connection pool.
//!
//! Connections are handed out as [`PooledConnection`] guards with exclusive
//! use. A guard returns its connection to the idle list on drop only if the
//! last round trip completed cleanly; a connection abandoned mid-request
//! (error, cancellation, panic) may still have a response in flight and is
//! closed instead.
//!
//! Idle connections older than the idle timeout are closed on the next
//! acquire for their broker, before the broker drops them from its side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use kestrel_core::BrokerEndpoint;
use kestrel_protocol::{ApiVersionTable, EncodedRequest};
use tokio::time::Instant;
use tracing::debug;

use crate::config::IDLE_TIMEOUT_DEFAULT;
use crate::transport::{Connection, Connector, TransportError, TransportResult};

/// A connection waiting in the idle list.
struct IdleConnection {
    connection: Box<dyn Connection>,
    idle_since: Instant,
}

type IdleConnections = Arc<Mutex<HashMap<BrokerEndpoint, Vec<IdleConnection>>>>;

/// Pool of broker connections.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    idle: IdleConnections,
    max_idle_per_broker: usize,
    idle_timeout: Duration,
    next_correlation_id: AtomicI32,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("max_idle_per_broker", &self.max_idle_per_broker)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates a pool that opens connections through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, max_idle_per_broker: usize) -> Self {
        Self {
            connector,
            idle: Arc::new(Mutex::new(HashMap::new())),
            max_idle_per_broker,
            idle_timeout: IDLE_TIMEOUT_DEFAULT,
            next_correlation_id: AtomicI32::new(1),
        }
    }

    /// Sets how long an idle connection stays reusable.
    #[must_use]
    pub const fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Returns an idle connection to `broker`, or opens a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if a new connection cannot be opened.
    pub async fn acquire(&self, broker: &BrokerEndpoint) -> TransportResult<PooledConnection> {
        let reused = {
            let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
            idle.get_mut(broker).and_then(|slot| {
                let before = slot.len();
                slot.retain(|entry| entry.idle_since.elapsed() < self.idle_timeout);
                if slot.len() < before {
                    debug!(broker = %broker, expired = before - slot.len(), "Closing idle connections");
                }
                slot.pop().map(|entry| entry.connection)
            })
        };

        let connection = match reused {
            Some(connection) => connection,
            None => {
                debug!(broker = %broker, "Opening connection");
                self.connector.connect(broker).await?
            }
        };

        Ok(PooledConnection {
            versions: connection.api_versions().clone(),
            connection: Some(connection),
            broker: broker.clone(),
            idle: Arc::clone(&self.idle),
            max_idle: self.max_idle_per_broker,
            reusable: true,
        })
    }

    /// Returns the number of idle connections to `broker`.
    #[must_use]
    pub fn idle_count(&self, broker: &BrokerEndpoint) -> usize {
        let idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        idle.get(broker).map_or(0, Vec::len)
    }

    /// Closes every idle connection.
    pub fn clear(&self) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns a fresh correlation id. Wraps on overflow.
    pub fn next_correlation_id(&self) -> i32 {
        self.next_correlation_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Exclusive use of one pooled connection.
pub struct PooledConnection {
    connection: Option<Box<dyn Connection>>,
    versions: ApiVersionTable,
    broker: BrokerEndpoint,
    idle: IdleConnections,
    max_idle: usize,
    reusable: bool,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broker", &self.broker)
            .field("reusable", &self.reusable)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Performs one round trip on the connection.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the connection will not be reused.
    pub async fn round_trip(&mut self, request: &EncodedRequest) -> TransportResult<Bytes> {
        // Cleared until the response is fully read.
        self.reusable = false;
        let connection = self.connection.as_mut().ok_or(TransportError::Closed)?;
        let payload = connection.round_trip(request).await?;
        self.reusable = true;
        Ok(payload)
    }

    /// Versions the broker advertised.
    #[must_use]
    pub const fn api_versions(&self) -> &ApiVersionTable {
        &self.versions
    }

    /// Closes the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        self.reusable = false;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if !self.reusable || std::thread::panicking() {
            debug!(broker = %self.broker, "Closing connection");
            return;
        }

        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = idle.entry(self.broker.clone()).or_default();
        if slot.len() < self.max_idle {
            slot.push(IdleConnection {
                connection,
                idle_since: Instant::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    /// Connection whose round trip either echoes or hangs.
    struct FakeConnection {
        versions: ApiVersionTable,
        hang: bool,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn round_trip(&mut self, request: &EncodedRequest) -> TransportResult<Bytes> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(request.payload.clone())
        }

        fn api_versions(&self) -> &ApiVersionTable {
            &self.versions
        }
    }

    struct FakeConnector {
        connects: AtomicUsize,
        hang: bool,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _broker: &BrokerEndpoint) -> TransportResult<Box<dyn Connection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnection {
                versions: ApiVersionTable::client_defaults(),
                hang: self.hang,
            }))
        }
    }

    fn pool(hang: bool, max_idle: usize) -> (ConnectionPool, Arc<FakeConnector>) {
        let connector = Arc::new(FakeConnector {
            connects: AtomicUsize::new(0),
            hang,
        });
        (ConnectionPool::new(connector.clone(), max_idle), connector)
    }

    fn request() -> EncodedRequest {
        EncodedRequest {
            api_key: 8,
            api_version: 8,
            correlation_id: 1,
            payload: Bytes::from_static(b"ping"),
        }
    }

    #[tokio::test]
    async fn test_reuses_after_clean_round_trip() {
        let (pool, connector) = pool(false, 2);
        let broker = BrokerEndpoint::new(1, "kafka", 9092);

        let mut conn = pool.acquire(&broker).await.unwrap();
        assert_eq!(conn.round_trip(&request()).await.unwrap(), Bytes::from_static(b"ping"));
        drop(conn);
        assert_eq!(pool.idle_count(&broker), 1);

        let conn = pool.acquire(&broker).await.unwrap();
        assert_eq!(pool.idle_count(&broker), 0);
        drop(conn);

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interrupted_round_trip_is_not_reused() {
        let (pool, connector) = pool(true, 2);
        let broker = BrokerEndpoint::new(1, "kafka", 9092);

        let mut conn = pool.acquire(&broker).await.unwrap();
        let result = tokio::time::timeout(Duration::from_millis(10), conn.round_trip(&request())).await;
        assert!(result.is_err());
        drop(conn);

        assert_eq!(pool.idle_count(&broker), 0);
        let _conn = pool.acquire(&broker).await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_discard_and_idle_limit() {
        let (pool, _connector) = pool(false, 1);
        let broker = BrokerEndpoint::new(1, "kafka", 9092);

        let a = pool.acquire(&broker).await.unwrap();
        let b = pool.acquire(&broker).await.unwrap();
        let c = pool.acquire(&broker).await.unwrap();
        c.discard();
        assert_eq!(pool.idle_count(&broker), 0);

        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(&broker), 1);

        pool.clear();
        assert_eq!(pool.idle_count(&broker), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connections_expire() {
        let (pool, connector) = pool(false, 2);
        let pool = pool.with_idle_timeout(Duration::from_secs(60));
        let broker = BrokerEndpoint::new(1, "kafka", 9092);

        let mut conn = pool.acquire(&broker).await.unwrap();
        conn.round_trip(&request()).await.unwrap();
        drop(conn);

        tokio::time::advance(Duration::from_secs(59)).await;
        let mut conn = pool.acquire(&broker).await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        conn.round_trip(&request()).await.unwrap();
        drop(conn);

        // Idle time restarts when the connection is returned.
        tokio::time::advance(Duration::from_secs(59)).await;
        let mut conn = pool.acquire(&broker).await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        conn.round_trip(&request()).await.unwrap();
        drop(conn);
        assert_eq!(pool.idle_count(&broker), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        let _conn = pool.acquire(&broker).await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle_count(&broker), 0);
    }

    #[test]
    fn test_correlation_ids_increase() {
        let (pool, _connector) = pool(false, 1);
        let first = pool.next_correlation_id();
        assert_eq!(pool.next_correlation_id(), first + 1);
    }
}
