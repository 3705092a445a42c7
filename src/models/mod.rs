//! Data models for the pool manager.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod stats;

// Re-export commonly used types
pub use connection::{
    ConnectionConfig, ConnectionConfigError, ConnectionId, ConnectionState, DatabaseType,
    PoolLifecycle,
};
pub use stats::{HealthReport, ManagerStats, PoolStats};
