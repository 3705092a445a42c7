//! Integration tests for a single connection pool.
//!
//! Tests verify that:
//! - Capacity is never exceeded and exhaustion does not touch the engine
//! - Released connections are reused
//! - Drain closes idle connections now and busy ones on release
//! - Idle eviction and health checks keep the live set consistent

use db_pool_manager::config::{PoolOptions, PoolSettings};
use db_pool_manager::db::ConnectionPool;
use db_pool_manager::error::DbError;
use db_pool_manager::models::{ConnectionConfig, PoolLifecycle};
use std::time::Duration;
use tempfile::TempDir;

fn settings(max: u32, min: u32) -> PoolSettings {
    PoolSettings {
        max_connections: max,
        min_connections: min,
        idle_timeout: Duration::from_secs(600),
        test_before_acquire: true,
    }
}

fn pool(name: &str, url: &str, max: u32, min: u32) -> ConnectionPool {
    let config = ConnectionConfig::new(name, url, PoolOptions::default()).unwrap();
    ConnectionPool::new(&config, settings(max, min)).unwrap()
}

/// File-backed pool so every connection sees the same database.
fn file_pool(dir: &TempDir, max: u32) -> ConnectionPool {
    let path = dir.path().join("pool.db");
    pool("default", &format!("sqlite:{}", path.display()), max, 0)
}

#[tokio::test]
async fn test_max_two_scenario() {
    let pool = pool("default", "sqlite::memory:", 2, 0);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_ne!(a.id(), b.id());

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, DbError::PoolExhausted { ref pool, max_connections: 2 } if pool == "default"));
    assert!(err.is_retryable());

    let a_id = a.id();
    pool.release(a).await;

    let again = pool.acquire().await.unwrap();
    assert_eq!(again.id(), a_id);

    pool.release(b).await;
    let stats = pool.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.busy, 1);
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.opened_total, 2);

    pool.release(again).await;
}

#[tokio::test]
async fn test_exhaustion_does_not_open() {
    let pool = pool("default", "sqlite::memory:", 1, 0);
    let held = pool.acquire().await.unwrap();

    for _ in 0..5 {
        assert!(matches!(
            pool.acquire().await,
            Err(DbError::PoolExhausted { .. })
        ));
    }
    assert_eq!(pool.stats().opened_total, 1);
    held.release().await;
}

#[tokio::test]
async fn test_connections_share_file_database() {
    let dir = TempDir::new().unwrap();
    let pool = file_pool(&dir, 2);

    let mut writer = pool.acquire().await.unwrap();
    writer
        .execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    writer
        .execute("INSERT INTO items (name) VALUES ('a'), ('b')")
        .await
        .unwrap();

    let mut other = pool.acquire().await.unwrap();
    assert_ne!(writer.id(), other.id());
    let deleted = other.execute("DELETE FROM items WHERE name = 'a'").await.unwrap();
    assert_eq!(deleted, 1);

    writer.release().await;
    other.release().await;
    pool.drain().await;
    assert_eq!(pool.lifecycle(), PoolLifecycle::Closed);
}

#[tokio::test]
async fn test_adapter_failure_keeps_pool_usable() {
    let pool = pool(
        "broken",
        "sqlite:/nonexistent-dir-for-pool-tests/nested/db.sqlite",
        1,
        0,
    );

    for _ in 0..3 {
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, DbError::Adapter { .. }));
        assert!(err.suggestion().is_some());
    }

    let stats = pool.stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.opening, 0);
    assert_eq!(pool.lifecycle(), PoolLifecycle::Active);
}

#[tokio::test]
async fn test_drain_with_outstanding_leases() {
    let pool = pool("default", "sqlite::memory:", 3, 0);
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let idle = pool.acquire().await.unwrap();
    idle.release().await;

    assert_eq!(pool.drain().await, 1);
    assert_eq!(pool.lifecycle(), PoolLifecycle::Draining);
    assert!(matches!(pool.acquire().await, Err(DbError::PoolClosed { .. })));

    a.release().await;
    assert_eq!(pool.stats().total, 1);
    assert!(!pool.wait_closed(Duration::from_millis(10)).await);

    b.release().await;
    assert!(pool.wait_closed(Duration::from_millis(10)).await);

    let stats = pool.stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.opened_total, 3);
    assert_eq!(stats.closed_total, 3);
}

#[tokio::test]
async fn test_dropped_lease_closes_during_drain() {
    let pool = pool("default", "sqlite::memory:", 1, 0);
    let lease = pool.acquire().await.unwrap();
    pool.drain().await;

    drop(lease);
    assert_eq!(pool.lifecycle(), PoolLifecycle::Closed);
    assert_eq!(pool.stats().total, 0);
}

#[tokio::test]
async fn test_release_to_foreign_pool() {
    let owner = pool("default", "sqlite::memory:", 1, 0);
    let stranger = pool("reporting", "sqlite::memory:", 1, 0);

    let lease = owner.acquire().await.unwrap();
    assert_eq!(lease.pool_name(), "default");
    stranger.release(lease).await;

    assert_eq!(stranger.stats().total, 0);
    assert_eq!(stranger.stats().opened_total, 0);
    assert_eq!(owner.stats().idle, 1);
}

#[tokio::test]
async fn test_evict_oldest_first() {
    let pool = pool("default", "sqlite::memory:", 3, 0);
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let (a_id, b_id) = (a.id(), b.id());

    a.release().await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    b.release().await;

    // Only `a` has been idle long enough
    assert_eq!(pool.evict_idle(Duration::from_millis(50)).await, 1);

    let survivor = pool.acquire().await.unwrap();
    assert_eq!(survivor.id(), b_id);
    assert_ne!(survivor.id(), a_id);
    survivor.release().await;
}

#[tokio::test]
async fn test_evict_never_below_floor() {
    let pool = pool("default", "sqlite::memory:", 4, 2);
    assert_eq!(pool.warm_up().await.unwrap(), 2);

    assert_eq!(pool.evict_idle(Duration::ZERO).await, 0);
    assert_eq!(pool.stats().total, 2);
}

#[tokio::test]
async fn test_health_check_leaves_busy_alone() {
    let pool = pool("default", "sqlite::memory:", 3, 0);
    let busy = pool.acquire().await.unwrap();
    let x = pool.acquire().await.unwrap();
    let y = pool.acquire().await.unwrap();
    x.release().await;
    y.release().await;

    let report = pool.health_check().await;
    assert_eq!(report.checked, 2);
    assert_eq!(report.healthy, 2);
    assert_eq!(report.removed, 0);

    let stats = pool.stats();
    assert_eq!(stats.busy, 1);
    assert_eq!(stats.idle, 2);
    busy.release().await;
}

#[tokio::test]
async fn test_health_check_keeps_idle_age() {
    let pool = pool("default", "sqlite::memory:", 1, 0);
    let lease = pool.acquire().await.unwrap();
    lease.release().await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    pool.health_check().await;

    // A health check does not count as use
    assert_eq!(pool.evict_idle(Duration::from_millis(50)).await, 1);
}
