//! Connection pooling layer.
//!
//! This module provides:
//! - Engine adapters that open, ping and close physical connections
//! - Database dispatch macros for reducing code duplication
//! - Bounded per-name connection pools
//! - The manager that owns every pool in the process

pub mod adapter;
#[macro_use]
pub mod macros;
pub mod manager;
pub mod pool;

pub use adapter::{ConnectionAdapter, PhysicalConnection};
pub use manager::{ConnectionManager, get_instance, reset_instance};
pub use pool::{ConnectionPool, PooledConnection};
