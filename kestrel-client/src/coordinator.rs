//! Group coordinator resolution.
//!
//! Caching the coordinator of each group avoids a `FindCoordinator` round
//! trip per commit. Entries are dropped on TTL expiry or when the commit
//! path reports that the broker is no longer the coordinator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use kestrel_core::{BrokerEndpoint, CommitError, CommitResult};
use kestrel_protocol::find_coordinator::{self, CoordinatorLookup};
use kestrel_protocol::versions::{FIND_COORDINATOR, FIND_COORDINATOR_VERSIONS};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CoordinatorCacheConfig;
use crate::pool::ConnectionPool;

/// Maps a consumer group to its coordinator broker.
#[async_trait]
pub trait CoordinatorResolver: Send + Sync {
    /// Returns the coordinator for `group_id`.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorResolution` if no coordinator can be determined.
    async fn resolve(&self, group_id: &str) -> CommitResult<BrokerEndpoint>;

    /// Forgets any cached coordinator for `group_id`.
    ///
    /// Called when the coordinator rejects a request as not-coordinator or
    /// cannot be reached.
    fn invalidate(&self, group_id: &str);
}

/// An entry in the coordinator cache.
#[derive(Debug, Clone)]
struct CacheEntry {
    coordinator: BrokerEndpoint,
    /// Timestamp when this entry was last updated (microseconds).
    updated_at_us: u64,
}

/// Bounded TTL cache of group coordinators.
#[derive(Debug)]
pub struct CoordinatorCache {
    config: CoordinatorCacheConfig,
    entries: HashMap<String, CacheEntry>,
}

impl CoordinatorCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CoordinatorCacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    /// Returns the cached coordinator, if known and not expired.
    #[must_use]
    pub fn get(&self, group_id: &str, current_time_us: u64) -> Option<&BrokerEndpoint> {
        self.entries.get(group_id).and_then(|entry| {
            let age = current_time_us.saturating_sub(entry.updated_at_us);
            (age <= self.config.ttl_us).then_some(&entry.coordinator)
        })
    }

    /// Records the coordinator for a group, evicting the oldest entry when
    /// full.
    pub fn put(&mut self, group_id: &str, coordinator: BrokerEndpoint, current_time_us: u64) {
        if self.entries.len() >= self.config.max_entries && !self.entries.contains_key(group_id) {
            self.evict_oldest();
        }
        self.entries.insert(
            group_id.to_string(),
            CacheEntry {
                coordinator,
                updated_at_us: current_time_us,
            },
        );
    }

    /// Forgets the coordinator for a group.
    pub fn invalidate(&mut self, group_id: &str) {
        self.entries.remove(group_id);
    }

    /// Returns the number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.updated_at_us)
            .map(|(group_id, _)| group_id.clone());
        if let Some(group_id) = oldest {
            self.entries.remove(&group_id);
        }
    }
}

/// Resolves coordinators with `FindCoordinator` against bootstrap brokers.
///
/// Bootstrap brokers are tried in order until one answers. A broker that
/// answers with an error code ends the lookup; there is no retry.
#[derive(Debug)]
pub struct FindCoordinatorResolver {
    pool: Arc<ConnectionPool>,
    bootstrap: Vec<BrokerEndpoint>,
    client_id: String,
    cache: Mutex<CoordinatorCache>,
    epoch: Instant,
}

impl FindCoordinatorResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        pool: Arc<ConnectionPool>,
        bootstrap: Vec<BrokerEndpoint>,
        client_id: impl Into<String>,
        cache: CoordinatorCacheConfig,
    ) -> Self {
        Self {
            pool,
            bootstrap,
            client_id: client_id.into(),
            cache: Mutex::new(CoordinatorCache::new(cache)),
            epoch: Instant::now(),
        }
    }

    fn now_us(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    async fn lookup(&self, broker: &BrokerEndpoint, group_id: &str) -> CommitResult<CoordinatorLookup> {
        let mut conn = self
            .pool
            .acquire(broker)
            .await
            .map_err(|e| CommitError::transport(broker, e))?;

        let version = conn
            .api_versions()
            .negotiate(FIND_COORDINATOR, FIND_COORDINATOR_VERSIONS)?;
        let request = find_coordinator::encode_request(
            group_id,
            version,
            self.pool.next_correlation_id(),
            &self.client_id,
        )?;

        let payload = conn
            .round_trip(&request)
            .await
            .map_err(|e| CommitError::transport(broker, e))?;

        match find_coordinator::decode_response(&request, payload, group_id) {
            Ok(lookup) => Ok(lookup),
            Err(e) => {
                conn.discard();
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl CoordinatorResolver for FindCoordinatorResolver {
    async fn resolve(&self, group_id: &str) -> CommitResult<BrokerEndpoint> {
        let now_us = self.now_us();
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(coordinator) = cache.get(group_id, now_us) {
                return Ok(coordinator.clone());
            }
        }

        let mut last_failure = None;
        for broker in &self.bootstrap {
            match self.lookup(broker, group_id).await {
                Ok(CoordinatorLookup::Found(coordinator)) => {
                    debug!(group_id = %group_id, coordinator = %coordinator, "Resolved coordinator");
                    self.cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .put(group_id, coordinator.clone(), self.now_us());
                    return Ok(coordinator);
                }
                Ok(CoordinatorLookup::Failed { error, message }) => {
                    warn!(group_id = %group_id, broker = %broker, error = %error, "Coordinator lookup rejected");
                    return Err(CommitError::CoordinatorResolution {
                        group_id: group_id.to_string(),
                        reason: message.unwrap_or_else(|| error.to_string()),
                        broker_error: Some(error),
                    });
                }
                Err(e) => {
                    warn!(group_id = %group_id, broker = %broker, error = %e, "Coordinator lookup failed");
                    last_failure = Some(e.to_string());
                }
            }
        }

        Err(CommitError::CoordinatorResolution {
            group_id: group_id.to_string(),
            reason: last_failure.unwrap_or_else(|| "no bootstrap brokers configured".to_string()),
            broker_error: None,
        })
    }

    fn invalidate(&self, group_id: &str) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .invalidate(group_id);
    }
}

/// Sends every group to one fixed broker.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    coordinator: BrokerEndpoint,
}

impl StaticResolver {
    /// Creates a resolver that always answers `coordinator`.
    #[must_use]
    pub const fn new(coordinator: BrokerEndpoint) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl CoordinatorResolver for StaticResolver {
    async fn resolve(&self, _group_id: &str) -> CommitResult<BrokerEndpoint> {
        Ok(self.coordinator.clone())
    }

    fn invalidate(&self, _group_id: &str) {}
}
