//! DB Pool Manager Library
//!
//! Named, bounded connection pools for SQL databases (SQLite, PostgreSQL,
//! MySQL) with lazy creation, idle eviction and graceful shutdown.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod shutdown;

pub use config::{Config, ManagerConfig};
pub use db::{ConnectionManager, ConnectionPool, PooledConnection};
pub use error::{DbError, DbResult};
