//! Engine dispatch macros for reducing code duplication.
//!
//! The physical connection types differ per engine but expose the same
//! `sqlx::Connection` surface, so most operations are the same expression
//! repeated for every variant. The macro expands at compile time with zero
//! runtime overhead.

/// Apply the same expression to whichever engine connection `$conn` holds.
///
/// `$conn` may be the enum by value, by reference or by mutable reference;
/// `$c` binds accordingly.
///
/// # Example
///
/// ```ignore
/// let alive = impl_conn_dispatch!(conn, c => c.ping().await.is_ok());
/// ```
macro_rules! impl_conn_dispatch {
    ($conn:expr, $c:ident => $body:expr) => {
        match $conn {
            $crate::db::adapter::PhysicalConnection::MySql($c) => $body,
            $crate::db::adapter::PhysicalConnection::Postgres($c) => $body,
            $crate::db::adapter::PhysicalConnection::SQLite($c) => $body,
        }
    };
}

pub(crate) use impl_conn_dispatch;
