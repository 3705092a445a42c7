//! Pool statistics types.

use crate::models::{DatabaseType, PoolLifecycle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Snapshot of one pool's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: String,
    /// Instance id; changes when a pool is re-created under the same name
    pub pool_id: Uuid,
    pub db_type: DatabaseType,
    pub lifecycle: PoolLifecycle,
    /// Live connections (busy + idle)
    pub total: usize,
    pub busy: usize,
    pub idle: usize,
    /// Opens reserved but not yet completed
    pub opening: usize,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Physical connections opened over the pool's lifetime
    pub opened_total: u64,
    /// Physical connections closed over the pool's lifetime. Includes
    /// connections dropped without a protocol-level close because no runtime
    /// was available to run it.
    pub closed_total: u64,
}

impl PoolStats {
    /// Calculate pool utilization as a fraction of capacity (0.0 to 1.0).
    pub fn utilization(&self) -> f64 {
        if self.max_connections == 0 {
            0.0
        } else {
            self.busy as f64 / self.max_connections as f64
        }
    }

    /// True when every slot is taken by a busy connection.
    pub fn is_saturated(&self) -> bool {
        self.idle == 0 && self.total + self.opening >= self.max_connections as usize
    }
}

/// Aggregate snapshot across every registered pool.
///
/// Computed on demand from the registry; never cached.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub total: usize,
    pub busy: usize,
    pub idle: usize,
    pub per_pool: BTreeMap<String, PoolStats>,
    pub captured_at: DateTime<Utc>,
}

impl ManagerStats {
    /// Aggregate per-pool snapshots.
    pub fn from_pools(pools: impl IntoIterator<Item = PoolStats>) -> Self {
        let per_pool: BTreeMap<String, PoolStats> =
            pools.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            total: per_pool.values().map(|s| s.total).sum(),
            busy: per_pool.values().map(|s| s.busy).sum(),
            idle: per_pool.values().map(|s| s.idle).sum(),
            per_pool,
            captured_at: Utc::now(),
        }
    }

    pub fn pool(&self, name: &str) -> Option<&PoolStats> {
        self.per_pool.get(name)
    }
}

/// Outcome of pinging a pool's idle connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub checked: usize,
    pub healthy: usize,
    /// Connections that failed the ping and were closed
    pub removed: usize,
}
