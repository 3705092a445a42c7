//! Registry of named connection pools.
//!
//! The [`ConnectionManager`] maps logical connection names to lazily created
//! [`ConnectionPool`]s. It is normally built once at startup and shared as an
//! `Arc` with the data-access layer; [`get_instance`] offers a process-wide
//! accessor for callers that cannot be handed one.

use crate::config::ManagerConfig;
use crate::db::pool::{ConnectionPool, PooledConnection};
use crate::error::{DbError, DbResult};
use crate::models::ManagerStats;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owner of every named pool in the process.
pub struct ConnectionManager {
    config: ManagerConfig,
    pools: RwLock<HashMap<String, Arc<ConnectionPool>>>,
    /// Idle sweeper handle. Uses std::sync::Mutex for synchronous storage.
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager with no pools. Pools are created on first use.
    pub fn new(config: ManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            pools: RwLock::new(HashMap::new()),
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Look up the pool for `name`, creating it on first use.
    ///
    /// Creation happens under the registry write lock with a second lookup, so
    /// concurrent callers for the same name always end up with one pool.
    async fn get_or_create_pool(&self, name: &str) -> DbResult<Arc<ConnectionPool>> {
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(name) {
                return Ok(Arc::clone(pool));
            }
        }

        let connection = self
            .config
            .connection(name)
            .ok_or_else(|| DbError::not_configured(name))?;

        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.get(name) {
            return Ok(Arc::clone(pool));
        }

        let settings = self.config.settings_for(connection);
        let pool = Arc::new(ConnectionPool::new(connection, settings)?);
        info!(
            pool = %name,
            pool_id = %pool.id(),
            db_type = %connection.db_type,
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            "Created connection pool"
        );
        pools.insert(name.to_string(), Arc::clone(&pool));
        Ok(pool)
    }

    /// Borrow a connection from the pool named `name`.
    pub async fn acquire_connection(&self, name: &str) -> DbResult<PooledConnection> {
        let pool = self.get_or_create_pool(name).await?;
        pool.acquire().await
    }

    /// Return a connection through the pool named `name`.
    ///
    /// The lease always goes back to the pool that issued it. An error is
    /// reported only when `name` matches neither a registered pool nor the
    /// lease's own pool.
    pub async fn release_connection(
        &self,
        name: &str,
        connection: PooledConnection,
    ) -> DbResult<()> {
        let pool = self.pools.read().await.get(name).cloned();

        match pool {
            Some(pool) => {
                pool.release(connection).await;
                Ok(())
            }
            // Owner already removed by shutdown; releasing closes it
            None if connection.pool_name() == name => {
                connection.release().await;
                Ok(())
            }
            None => {
                warn!(
                    pool = %name,
                    owner = %connection.pool_name(),
                    connection_id = %connection.id(),
                    "Release through unknown pool, returning connection to its owner"
                );
                connection.release().await;
                Err(DbError::unknown_pool(name))
            }
        }
    }

    /// Snapshot of every registered pool.
    pub async fn get_pool_stats(&self) -> ManagerStats {
        let pools = self.pools.read().await;
        ManagerStats::from_pools(pools.values().map(|pool| pool.stats()))
    }

    /// Registered pool for `name`, without creating one.
    pub async fn pool(&self, name: &str) -> Option<Arc<ConnectionPool>> {
        self.pools.read().await.get(name).cloned()
    }

    /// Names of the registered pools, sorted.
    pub async fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn snapshot(&self) -> Vec<Arc<ConnectionPool>> {
        self.pools.read().await.values().cloned().collect()
    }

    /// Create and warm up a pool for every configured connection.
    ///
    /// Returns the number of connections opened.
    pub async fn initialize(&self) -> DbResult<usize> {
        let mut names: Vec<&String> = self.config.connections.keys().collect();
        names.sort();

        let mut opened = 0;
        for name in names {
            let pool = self.get_or_create_pool(name).await?;
            opened += pool.warm_up().await?;
        }

        info!(
            pools = self.config.connections.len(),
            opened = opened,
            "Connection pools initialized"
        );
        Ok(opened)
    }

    /// Evict idle connections past each pool's idle timeout.
    pub async fn evict_idle_all(&self) -> usize {
        let pools = self.snapshot().await;
        join_all(
            pools
                .iter()
                .map(|pool| pool.evict_idle(pool.settings().idle_timeout)),
        )
        .await
        .into_iter()
        .sum()
    }

    /// One sweeper pass: eviction followed by a health check of what remains.
    async fn sweep(&self) {
        let evicted = self.evict_idle_all().await;

        let mut removed = 0;
        for pool in self.snapshot().await {
            removed += pool.health_check().await.removed;
        }

        debug!(evicted = evicted, unhealthy = removed, "Idle sweep complete");
    }

    /// Start the background idle sweeper. Does nothing if it is already running.
    ///
    /// The task holds a `Weak` reference and exits once the manager is dropped.
    /// `shutdown` stops it.
    pub fn start_idle_sweeper(self: &Arc<Self>) {
        let mut guard = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            debug!("Idle sweeper already running");
            return;
        }

        let weak_manager = Arc::downgrade(self);
        let interval = self.config.effective_sweep_interval();
        *guard = Some(tokio::spawn(async move {
            Self::sweep_task(weak_manager, interval).await;
        }));
        info!(interval_ms = interval.as_millis() as u64, "Idle sweeper started");
    }

    async fn sweep_task(weak_manager: Weak<Self>, sweep_interval: Duration) {
        let mut interval = tokio::time::interval(sweep_interval);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            let Some(manager) = weak_manager.upgrade() else {
                info!("Connection manager dropped, idle sweeper exiting");
                return;
            };
            manager.sweep().await;
        }
    }

    fn stop_idle_sweeper(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Idle sweeper stopped");
        }
    }

    /// Drain and forget every pool.
    ///
    /// Idle connections are closed immediately. Outstanding leases are waited
    /// for up to the configured shutdown grace and closed whenever they come
    /// back. Never fails and is safe to call repeatedly; a later acquire
    /// creates a fresh pool.
    pub async fn shutdown(&self) {
        self.stop_idle_sweeper();

        let pools: Vec<Arc<ConnectionPool>> = {
            let mut pools = self.pools.write().await;
            pools.drain().map(|(_, pool)| pool).collect()
        };

        if pools.is_empty() {
            debug!("Shutdown with no registered pools");
            return;
        }

        info!(pools = pools.len(), "Shutting down connection pools");

        let closed: usize = join_all(pools.iter().map(|pool| pool.drain()))
            .await
            .into_iter()
            .sum();

        let grace = self.config.shutdown_grace;
        let settled = join_all(pools.iter().map(|pool| pool.wait_closed(grace))).await;
        let pending: Vec<&str> = pools
            .iter()
            .zip(settled)
            .filter(|(_, closed)| !closed)
            .map(|(pool, _)| pool.name())
            .collect();

        if pending.is_empty() {
            info!(closed = closed, "All connection pools closed");
        } else {
            warn!(
                closed = closed,
                pending = ?pending,
                "Pools still have outstanding connections, they will close on release"
            );
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

static INSTANCE: Mutex<Option<Arc<ConnectionManager>>> = Mutex::new(None);

/// Process-wide manager.
///
/// The first call creates the instance from `config`; later calls return it
/// and ignore their argument.
pub fn get_instance(config: ManagerConfig) -> Arc<ConnectionManager> {
    let mut instance = INSTANCE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = instance.as_ref() {
        debug!("Connection manager already initialized, ignoring new configuration");
        return Arc::clone(existing);
    }

    let manager = ConnectionManager::new(config);
    *instance = Some(Arc::clone(&manager));
    manager
}

/// Shut down and forget the process-wide manager.
///
/// Intended for tests; the next [`get_instance`] builds a new one.
pub async fn reset_instance() {
    let taken = INSTANCE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(manager) = taken {
        manager.shutdown().await;
    }
}
