//! The offset commit executor.

use std::sync::Arc;

use kestrel_core::{BrokerEndpoint, CommitError, CommitRequest, CommitResponse, CommitResult};
use kestrel_protocol::offset_commit;
use kestrel_protocol::versions::{OFFSET_COMMIT, OFFSET_COMMIT_VERSIONS};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::context::CallContext;
use crate::coordinator::{CoordinatorResolver, FindCoordinatorResolver};
use crate::pool::ConnectionPool;
use crate::transport::{Connector, TcpConnector, TransportError};

/// Commits consumer-group offsets to group coordinators.
///
/// Cheap to share: wrap in an `Arc` and call from any number of tasks.
pub struct OffsetCommitClient {
    config: ClientConfig,
    pool: Arc<ConnectionPool>,
    resolver: Arc<dyn CoordinatorResolver>,
}

impl std::fmt::Debug for OffsetCommitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffsetCommitClient")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl OffsetCommitClient {
    /// Creates a client that connects over TCP and locates coordinators
    /// through the configured bootstrap brokers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration is invalid.
    pub fn new(config: ClientConfig) -> CommitResult<Self> {
        config.validate()?;
        let connector = TcpConnector::new(config.client_id.clone(), config.connect_timeout);
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Creates a client over a custom connector, resolving coordinators
    /// through the configured bootstrap brokers.
    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let pool = Arc::new(
            ConnectionPool::new(connector, config.max_idle_per_broker)
                .with_idle_timeout(config.idle_timeout),
        );
        let resolver = Arc::new(FindCoordinatorResolver::new(
            Arc::clone(&pool),
            config.bootstrap.clone(),
            config.client_id.clone(),
            config.coordinator_cache,
        ));
        Self::with_parts(config, pool, resolver)
    }

    /// Creates a client from explicit parts.
    #[must_use]
    pub fn with_parts(
        config: ClientConfig,
        pool: Arc<ConnectionPool>,
        resolver: Arc<dyn CoordinatorResolver>,
    ) -> Self {
        Self {
            config,
            pool,
            resolver,
        }
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Commits the offsets in `request` for its group.
    ///
    /// Partition-level broker errors do not fail the call: they are reported
    /// per partition in the response. A response is only returned if every
    /// requested partition has a result.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the request fails validation (no I/O happens)
    /// - `Cancelled` / `DeadlineExceeded` if the context ends first
    /// - `CoordinatorResolution` if the coordinator cannot be found or
    ///   cannot be reached
    /// - `Transport` if the connection fails mid-request
    /// - `UnsupportedVersion` if the coordinator cannot carry the request
    /// - `MalformedResponse` if the response is not a valid frame, does not
    ///   decode, or is missing requested partitions
    pub async fn set_consumer_group_offset(
        &self,
        ctx: &CallContext,
        request: &CommitRequest,
    ) -> CommitResult<CommitResponse> {
        request.validate()?;
        ctx.check()?;

        let result = ctx.run(self.config.request_timeout, self.commit(request)).await;
        if let Err(e) = &result {
            warn!(group_id = %request.group_id, error = %e, "Offset commit failed");
        }
        result
    }

    async fn commit(&self, request: &CommitRequest) -> CommitResult<CommitResponse> {
        let group_id = request.group_id.as_str();
        let coordinator = self.resolver.resolve(group_id).await?;

        let mut conn = match self.pool.acquire(&coordinator).await {
            Ok(conn) => conn,
            Err(e) => {
                self.resolver.invalidate(group_id);
                return Err(CommitError::CoordinatorResolution {
                    group_id: group_id.to_string(),
                    reason: format!("coordinator {coordinator} unreachable: {e}"),
                    broker_error: None,
                });
            }
        };

        let version = conn
            .api_versions()
            .negotiate(OFFSET_COMMIT, OFFSET_COMMIT_VERSIONS)?;
        let encoded = offset_commit::encode_request(
            request,
            version,
            self.pool.next_correlation_id(),
            &self.config.client_id,
        )?;

        debug!(
            group_id = %group_id,
            coordinator = %coordinator,
            version = version,
            partitions = request.partition_count(),
            "Sending offset commit"
        );

        let payload = match conn.round_trip(&encoded).await {
            Ok(payload) => payload,
            Err(TransportError::Protocol(e)) => return Err(e.into()),
            Err(e) => {
                self.resolver.invalidate(group_id);
                return Err(CommitError::transport(&coordinator, e));
            }
        };

        let response = match offset_commit::decode_response(&encoded, payload) {
            Ok(response) => response,
            Err(e) => {
                // The stream position is no longer trustworthy.
                conn.discard();
                return Err(e.into());
            }
        };
        offset_commit::check_complete(request, &response)?;

        self.check_coordinator(group_id, &coordinator, &response);

        info!(
            group_id = %group_id,
            coordinator = %coordinator,
            committed = response.topics.values().flatten().filter(|r| r.is_committed()).count(),
            failed = response.failures().count(),
            throttle = ?response.throttle,
            "Offset commit completed"
        );
        Ok(response)
    }

    /// Invalidates the cached coordinator if any partition says it moved.
    fn check_coordinator(&self, group_id: &str, coordinator: &BrokerEndpoint, response: &CommitResponse) {
        let moved = response
            .failures()
            .find(|(_, _, error)| error.is_coordinator_error());
        if let Some((topic, partition, error)) = moved {
            warn!(
                group_id = %group_id,
                coordinator = %coordinator,
                topic = %topic,
                partition = partition,
                error = %error,
                "Coordinator rejected commit, invalidating"
            );
            self.resolver.invalidate(group_id);
        }
    }
}
