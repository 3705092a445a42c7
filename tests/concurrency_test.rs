//! Concurrency stress tests.
//!
//! Many tasks acquire and release in random order on a multi-threaded runtime;
//! the live set must never exceed capacity and nothing may leak.

use db_pool_manager::config::{ManagerConfig, PoolOptions};
use db_pool_manager::db::ConnectionManager;
use db_pool_manager::error::DbError;
use db_pool_manager::models::ConnectionConfig;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 4;
const TASKS: usize = 16;
const ROUNDS: usize = 40;

fn manager() -> Arc<ConnectionManager> {
    let options = PoolOptions {
        max_connections: Some(MAX_CONNECTIONS),
        test_before_acquire: Some(false),
        ..Default::default()
    };
    ConnectionManager::new(
        ManagerConfig::new()
            .with_connection(ConnectionConfig::new("default", "sqlite::memory:", options).unwrap()),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_acquire_release_respects_capacity() {
    let manager = manager();
    let exhausted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let exhausted = Arc::clone(&exhausted);
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    let hold_ms = rand::thread_rng().gen_range(0..3);
                    match manager.acquire_connection("default").await {
                        Ok(lease) => {
                            let stats = manager.get_pool_stats().await;
                            assert!(stats.total <= MAX_CONNECTIONS as usize);
                            tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                            manager.release_connection("default", lease).await.unwrap();
                        }
                        Err(DbError::PoolExhausted { .. }) => {
                            exhausted.fetch_add(1, Ordering::Relaxed);
                            tokio::task::yield_now().await;
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let stats = manager.get_pool_stats().await;
    let pool = stats.pool("default").unwrap();
    assert!(pool.total <= MAX_CONNECTIONS as usize);
    assert_eq!(pool.busy, 0);
    assert_eq!(pool.opening, 0);
    assert!(pool.opened_total <= MAX_CONNECTIONS as u64);

    manager.shutdown().await;
    assert_eq!(manager.get_pool_stats().await.total, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_races_with_acquires() {
    let manager = manager();

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    match manager.acquire_connection("default").await {
                        Ok(lease) => {
                            tokio::task::yield_now().await;
                            lease.release().await;
                        }
                        Err(DbError::PoolExhausted { .. }) | Err(DbError::PoolClosed { .. }) => {
                            tokio::task::yield_now().await;
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(5)).await;
    manager.shutdown().await;

    for handle in handles {
        handle.await.unwrap();
    }

    // Workers may have re-created the pool after the first shutdown
    manager.shutdown().await;
    assert_eq!(manager.get_pool_stats().await.total, 0);
}
