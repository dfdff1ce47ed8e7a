//! Client configuration.

use std::time::Duration;

use kestrel_core::{BrokerEndpoint, CommitError, CommitResult};

/// Client id sent in request headers when none is configured.
pub const CLIENT_ID_DEFAULT: &str = "kestrel";

/// Default TCP connect timeout (including the `ApiVersions` handshake).
pub const CONNECT_TIMEOUT_DEFAULT: Duration = Duration::from_secs(10);

/// Default bound on a call whose context carries no deadline.
pub const REQUEST_TIMEOUT_DEFAULT: Duration = Duration::from_secs(30);

/// Default number of idle connections kept per broker.
pub const MAX_IDLE_PER_BROKER_DEFAULT: usize = 4;

/// Default time an idle connection stays reusable. Brokers close idle
/// connections after 10 minutes by default.
pub const IDLE_TIMEOUT_DEFAULT: Duration = Duration::from_secs(9 * 60);

/// Maximum number of cached coordinator entries.
pub const COORDINATOR_CACHE_ENTRIES_MAX: usize = 10_000;

/// Default TTL for cached coordinators in microseconds (60 seconds).
pub const COORDINATOR_CACHE_TTL_US_DEFAULT: u64 = 60_000_000;

/// Configuration for the coordinator cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorCacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Time-to-live for entries in microseconds.
    pub ttl_us: u64,
}

impl Default for CoordinatorCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: COORDINATOR_CACHE_ENTRIES_MAX,
            ttl_us: COORDINATOR_CACHE_TTL_US_DEFAULT,
        }
    }
}

impl CoordinatorCacheConfig {
    /// Sets the maximum number of entries.
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the entry time-to-live.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_us = u64::try_from(ttl.as_micros()).unwrap_or(u64::MAX);
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the cache cannot hold any entry.
    pub fn validate(&self) -> CommitResult<()> {
        if self.max_entries == 0 {
            return Err(CommitError::invalid_argument(
                "coordinator_cache.max_entries",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Configuration for an [`crate::OffsetCommitClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client id sent in every request header.
    pub client_id: String,
    /// Brokers asked to locate group coordinators, tried in order.
    pub bootstrap: Vec<BrokerEndpoint>,
    /// Bound on opening a connection and completing its handshake.
    pub connect_timeout: Duration,
    /// Bound on a call whose context has no deadline.
    pub request_timeout: Duration,
    /// Coordinator cache settings.
    pub coordinator_cache: CoordinatorCacheConfig,
    /// Idle connections kept per broker.
    pub max_idle_per_broker: usize,
    /// How long an idle connection stays reusable.
    pub idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID_DEFAULT.to_string(),
            bootstrap: Vec::new(),
            connect_timeout: CONNECT_TIMEOUT_DEFAULT,
            request_timeout: REQUEST_TIMEOUT_DEFAULT,
            coordinator_cache: CoordinatorCacheConfig::default(),
            max_idle_per_broker: MAX_IDLE_PER_BROKER_DEFAULT,
            idle_timeout: IDLE_TIMEOUT_DEFAULT,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with the given bootstrap brokers.
    #[must_use]
    pub fn new(bootstrap: Vec<BrokerEndpoint>) -> Self {
        Self {
            bootstrap,
            ..Self::default()
        }
    }

    /// Sets the client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the default request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the coordinator cache configuration.
    #[must_use]
    pub const fn with_coordinator_cache(mut self, cache: CoordinatorCacheConfig) -> Self {
        self.coordinator_cache = cache;
        self
    }

    /// Sets how many idle connections are kept per broker.
    #[must_use]
    pub const fn with_max_idle_per_broker(mut self, max_idle: usize) -> Self {
        self.max_idle_per_broker = max_idle;
        self
    }

    /// Sets how long an idle connection stays reusable.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Checks the configuration.
    ///
    /// An empty bootstrap list is allowed here; it only matters to the
    /// `FindCoordinator` resolver, which checks it itself.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty client id, a zero timeout, or
    /// an invalid cache configuration.
    pub fn validate(&self) -> CommitResult<()> {
        if self.client_id.is_empty() {
            return Err(CommitError::invalid_argument("client_id", "must not be empty"));
        }
        if self.connect_timeout.is_zero() {
            return Err(CommitError::invalid_argument("connect_timeout", "must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(CommitError::invalid_argument("request_timeout", "must be positive"));
        }
        if self.idle_timeout.is_zero() {
            return Err(CommitError::invalid_argument("idle_timeout", "must be positive"));
        }
        self.coordinator_cache.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.client_id, CLIENT_ID_DEFAULT);
        assert!(config.bootstrap.is_empty());
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::new(vec![BrokerEndpoint::bootstrap("localhost", 9092)])
            .with_client_id("billing")
            .with_request_timeout(Duration::from_secs(2))
            .with_coordinator_cache(
                CoordinatorCacheConfig::default()
                    .with_max_entries(8)
                    .with_ttl(Duration::from_secs(1)),
            )
            .with_max_idle_per_broker(0)
            .with_idle_timeout(Duration::from_secs(5));

        assert_eq!(config.client_id, "billing");
        assert_eq!(config.bootstrap.len(), 1);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.coordinator_cache.max_entries, 8);
        assert_eq!(config.coordinator_cache.ttl_us, 1_000_000);
        assert_eq!(config.max_idle_per_broker, 0);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let err = ClientConfig::default().with_client_id("").validate().unwrap_err();
        assert!(matches!(err, CommitError::InvalidArgument { name: "client_id", .. }));

        let err = ClientConfig::default()
            .with_request_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, CommitError::InvalidArgument { name: "request_timeout", .. }));

        let err = ClientConfig::default()
            .with_idle_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, CommitError::InvalidArgument { name: "idle_timeout", .. }));

        let err = ClientConfig::default()
            .with_coordinator_cache(CoordinatorCacheConfig::default().with_max_entries(0))
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            CommitError::InvalidArgument { name: "coordinator_cache.max_entries", .. }
        ));
    }
}
