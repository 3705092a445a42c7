//! Connection pool for one logical connection.
//!
//! A pool owns a bounded live set of physical connections and lends them out
//! as [`PooledConnection`] leases.
//!
//! # Design Decisions
//!
//! - **Arena live set**: `HashMap<ConnectionId, Slot>` with an explicit
//!   [`ConnectionState`] per slot. Busy slots keep their bookkeeping while the
//!   physical connection travels with the lease.
//! - **One `std::sync::Mutex` per pool**: never held across an await point.
//!   Admission (capacity check plus reservation) is a single critical section,
//!   so `live + opening <= max_connections` holds under any contention.
//! - **No waiting**: `acquire` returns a connection or fails immediately with
//!   `PoolExhausted`; callers own their backoff policy.
//! - **Health checks stay idle**: a health check takes one idle connection at a time
//!   and leaves its slot `Idle`. An `acquire` that finds nothing else to hand
//!   out waits for the check instead of failing with `PoolExhausted`.
//! - **Close-on-release drain**: `drain` closes idle connections right away and
//!   marks the pool draining; busy connections are closed when their lease
//!   comes back. The pool reaches `Closed` once nothing is live or opening.
//!
//! # Cancellation Safety
//!
//! - A reserved open is tracked by a [`Reservation`] guard, so a dropped
//!   `acquire` future gives its capacity back.
//! - A lease dropped without `release()` returns itself to its pool; the
//!   physical close (when needed) is spawned on the current runtime.

use crate::config::PoolSettings;
use crate::db::adapter::{ConnectionAdapter, PhysicalConnection};
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionConfig, ConnectionId, ConnectionState, DatabaseType, HealthReport, PoolLifecycle,
    PoolStats,
};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, futures::Notified, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bookkeeping for one member of the live set.
struct Slot {
    state: ConnectionState,
    /// Present while idle; travels with the lease while busy.
    conn: Option<PhysicalConnection>,
    /// Idle, but the connection is out with a health check.
    checking: bool,
    created_at: Instant,
    last_used: Instant,
}

impl Slot {
    fn busy(now: Instant) -> Self {
        Self {
            state: ConnectionState::Busy,
            conn: None,
            checking: false,
            created_at: now,
            last_used: now,
        }
    }

    /// Idle and in hand, so it can be lent, evicted or drained.
    fn is_ready(&self) -> bool {
        self.state == ConnectionState::Idle && !self.checking
    }

    /// Apply a state change, refusing illegal transitions.
    fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

struct PoolState {
    lifecycle: PoolLifecycle,
    lifecycle_tx: watch::Sender<PoolLifecycle>,
    slots: HashMap<ConnectionId, Slot>,
    /// Opens reserved but not yet completed.
    opening: usize,
    next_id: u64,
    #[cfg(test)]
    failing_pings: std::collections::HashSet<ConnectionId>,
}

impl PoolState {
    fn next_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId(self.next_id)
    }

    fn has_capacity(&self, max_connections: u32) -> bool {
        self.slots.len() + self.opening < max_connections as usize
    }

    fn set_lifecycle(&mut self, next: PoolLifecycle) {
        self.lifecycle = next;
        self.lifecycle_tx.send_replace(next);
    }

    /// Finish a drain once nothing is live or opening.
    fn settle(&mut self) {
        if self.lifecycle == PoolLifecycle::Draining && self.slots.is_empty() && self.opening == 0
        {
            self.set_lifecycle(PoolLifecycle::Closed);
        }
    }

    /// Check out the most recently used idle connection that is not under a health check.
    fn take_idle(&mut self, now: Instant) -> Option<(ConnectionId, PhysicalConnection)> {
        let id = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.is_ready())
            .max_by_key(|(_, slot)| slot.last_used)
            .map(|(id, _)| *id)?;
        let slot = self.slots.get_mut(&id)?;
        slot.transition(ConnectionState::Busy);
        slot.last_used = now;
        slot.conn.take().map(|conn| (id, conn))
    }

    /// Remove a slot from the live set, returning its connection if it held one.
    fn remove(&mut self, id: ConnectionId) -> Option<PhysicalConnection> {
        let mut slot = self.slots.remove(&id)?;
        slot.transition(ConnectionState::Closed);
        slot.conn.take()
    }

    fn count(&self, state: ConnectionState) -> usize {
        self.slots.values().filter(|slot| slot.state == state).count()
    }

    fn any_checking(&self) -> bool {
        self.slots.values().any(|slot| slot.checking)
    }
}

pub(crate) struct PoolInner {
    /// Distinguishes pool instances that share a name across re-creation.
    id: Uuid,
    name: String,
    adapter: ConnectionAdapter,
    settings: PoolSettings,
    state: Mutex<PoolState>,
    /// Signalled whenever a health check hands its connection back.
    check_done: Notify,
    opened_total: AtomicU64,
    closed_total: AtomicU64,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self) -> bool {
        self.lock().lifecycle.is_active()
    }

    /// Put a returned connection back, or hand it back for closing when the
    /// pool no longer wants it.
    fn check_in(&self, id: ConnectionId, conn: PhysicalConnection) -> Option<PhysicalConnection> {
        let mut state = self.lock();
        let active = state.lifecycle.is_active();

        let Some(slot) = state.slots.get_mut(&id) else {
            warn!(
                pool = %self.name,
                connection_id = %id,
                "Released connection is not in the live set, closing it"
            );
            return Some(conn);
        };

        if slot.state != ConnectionState::Busy {
            warn!(
                pool = %self.name,
                connection_id = %id,
                state = ?slot.state,
                "Connection released while not busy, closing the duplicate handle"
            );
            return Some(conn);
        }

        if active {
            slot.transition(ConnectionState::Idle);
            slot.conn = Some(conn);
            slot.last_used = Instant::now();
            return None;
        }

        // Draining: close on release
        state.remove(id);
        state.settle();
        debug!(
            pool = %self.name,
            connection_id = %id,
            remaining = state.slots.len(),
            "Closing connection released during drain"
        );
        Some(conn)
    }

    /// Take a checked connection back, keeping its last-used time.
    ///
    /// Returns the connection when it must be closed instead: it failed the
    /// ping, a drain started meanwhile, or the slot is gone.
    fn finish_check(
        &self,
        id: ConnectionId,
        conn: PhysicalConnection,
        alive: bool,
    ) -> Option<PhysicalConnection> {
        let mut state = self.lock();
        let active = state.lifecycle.is_active();
        let tracked = match state.slots.get_mut(&id) {
            Some(slot) if slot.checking => {
                slot.checking = false;
                true
            }
            _ => false,
        };

        let leftover = if !tracked {
            warn!(
                pool = %self.name,
                connection_id = %id,
                "Checked connection is not in the live set, closing it"
            );
            Some(conn)
        } else if alive && active {
            if let Some(slot) = state.slots.get_mut(&id) {
                slot.conn = Some(conn);
            }
            None
        } else {
            state.remove(id);
            state.settle();
            Some(conn)
        };
        drop(state);

        self.check_done.notify_waiters();
        leftover
    }

    /// Liveness check for a connection that is out of its slot.
    async fn is_alive(&self, id: ConnectionId, conn: &mut PhysicalConnection) -> bool {
        #[cfg(test)]
        let forced_failure = self.lock().failing_pings.contains(&id);
        #[cfg(not(test))]
        let forced_failure = false;

        let alive = !forced_failure && conn.ping().await;
        if !alive {
            debug!(pool = %self.name, connection_id = %id, "Liveness check failed");
        }
        alive
    }

    /// Remove a busy slot and close its connection.
    async fn discard(&self, id: ConnectionId, conn: PhysicalConnection) {
        {
            let mut state = self.lock();
            state.remove(id);
            state.settle();
        }
        self.close_connection(conn).await;
    }

    async fn close_connection(&self, conn: PhysicalConnection) {
        conn.close().await;
        self.closed_total.fetch_add(1, Ordering::AcqRel);
    }

    async fn close_all(&self, conns: Vec<PhysicalConnection>) -> usize {
        let count = conns.len();
        join_all(conns.into_iter().map(|conn| self.close_connection(conn))).await;
        count
    }
}

/// Capacity reserved for an open in flight.
///
/// Dropping it without [`Reservation::complete`] gives the capacity back.
struct Reservation<'a> {
    pool: &'a PoolInner,
    id: ConnectionId,
    pending: bool,
}

impl Reservation<'_> {
    /// Release the reservation while holding the pool lock.
    fn complete(mut self, state: &mut PoolState) {
        state.opening = state.opening.saturating_sub(1);
        self.pending = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.pending {
            let mut state = self.pool.lock();
            state.opening = state.opening.saturating_sub(1);
            state.settle();
            debug!(
                pool = %self.pool.name,
                connection_id = %self.id,
                "Abandoned connection open, capacity returned"
            );
        }
    }
}

/// An idle connection out for a health check.
///
/// Dropping it before [`IdleCheck::run`] finishes puts the connection back.
struct IdleCheck {
    pool: Arc<PoolInner>,
    id: ConnectionId,
    conn: Option<PhysicalConnection>,
}

impl IdleCheck {
    /// Ping the connection, then return it to its slot or close it.
    async fn run(mut self) -> bool {
        let alive = match self.conn.as_mut() {
            Some(conn) => self.pool.is_alive(self.id, conn).await,
            None => false,
        };
        if let Some(conn) = self.conn.take() {
            if let Some(conn) = self.pool.finish_check(self.id, conn, alive) {
                self.pool.close_connection(conn).await;
            }
        }
        alive
    }
}

impl Drop for IdleCheck {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Some(conn) = self.pool.finish_check(self.id, conn, true) {
                spawn_close(Arc::clone(&self.pool), conn);
            }
        }
    }
}

enum Admission<'a> {
    Reuse(ConnectionId, PhysicalConnection),
    Open(ConnectionId),
    /// Every other slot is busy; the checked one comes back shortly.
    AwaitCheck(Notified<'a>),
}

/// Bounded pool of physical connections for one logical connection name.
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create an empty pool. No connection is opened until first use.
    pub fn new(config: &ConnectionConfig, settings: PoolSettings) -> DbResult<Self> {
        if settings.max_connections == 0 {
            return Err(DbError::invalid_input(format!(
                "Pool '{}' needs max_connections greater than 0",
                config.id
            )));
        }

        let adapter = ConnectionAdapter::from_config(config)?;
        let (lifecycle_tx, _) = watch::channel(PoolLifecycle::Active);

        Ok(Self {
            inner: Arc::new(PoolInner {
                id: Uuid::new_v4(),
                name: config.id.clone(),
                adapter,
                settings,
                state: Mutex::new(PoolState {
                    lifecycle: PoolLifecycle::Active,
                    lifecycle_tx,
                    slots: HashMap::new(),
                    opening: 0,
                    next_id: 0,
                    #[cfg(test)]
                    failing_pings: std::collections::HashSet::new(),
                }),
                check_done: Notify::new(),
                opened_total: AtomicU64::new(0),
                closed_total: AtomicU64::new(0),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Instance identity; a re-created pool with the same name gets a new one.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn db_type(&self) -> DatabaseType {
        self.inner.adapter.db_type()
    }

    pub fn settings(&self) -> PoolSettings {
        self.inner.settings
    }

    pub fn lifecycle(&self) -> PoolLifecycle {
        self.inner.lock().lifecycle
    }

    /// Borrow a connection.
    ///
    /// Reuses the most recently used idle connection, otherwise opens a new one
    /// while under `max_connections`. Fails with `PoolExhausted` when every
    /// slot is busy (the adapter is not invoked) and with `PoolClosed` once a
    /// drain has started. If the only idle connection is under a health check,
    /// waits for that check to finish.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        loop {
            let admission = {
                let mut state = self.inner.lock();
                if !state.lifecycle.is_active() {
                    return Err(DbError::pool_closed(&self.inner.name));
                }
                if let Some((id, conn)) = state.take_idle(Instant::now()) {
                    Admission::Reuse(id, conn)
                } else if state.has_capacity(self.inner.settings.max_connections) {
                    state.opening += 1;
                    Admission::Open(state.next_id())
                } else if state.any_checking() {
                    Admission::AwaitCheck(self.inner.check_done.notified())
                } else {
                    return Err(DbError::pool_exhausted(
                        &self.inner.name,
                        self.inner.settings.max_connections,
                    ));
                }
            };

            match admission {
                Admission::Reuse(id, conn) => {
                    let mut lease = PooledConnection::new(Arc::clone(&self.inner), id, conn);
                    if self.inner.settings.test_before_acquire
                        && !self.inner.is_alive(id, &mut lease).await
                    {
                        warn!(
                            pool = %self.inner.name,
                            connection_id = %id,
                            "Idle connection failed liveness check, discarding"
                        );
                        lease.discard().await;
                        continue;
                    }
                    if !self.inner.is_active() {
                        lease.release().await;
                        return Err(DbError::pool_closed(&self.inner.name));
                    }
                    debug!(pool = %self.inner.name, connection_id = %id, "Reusing idle connection");
                    return Ok(lease);
                }
                Admission::Open(id) => {
                    let reservation = Reservation {
                        pool: &self.inner,
                        id,
                        pending: true,
                    };
                    return self.open_reserved(reservation).await;
                }
                Admission::AwaitCheck(check_done) => {
                    check_done.await;
                }
            }
        }
    }

    /// Open the connection a reservation was made for and add it as busy.
    async fn open_reserved(&self, reservation: Reservation<'_>) -> DbResult<PooledConnection> {
        let id = reservation.id;
        let conn = match self.inner.adapter.open().await {
            Ok(conn) => conn,
            Err(e) => {
                {
                    let mut state = self.inner.lock();
                    reservation.complete(&mut state);
                    state.settle();
                }
                warn!(pool = %self.inner.name, error = %e, "Failed to open connection");
                return Err(e);
            }
        };
        self.inner.opened_total.fetch_add(1, Ordering::AcqRel);

        let admitted = {
            let mut state = self.inner.lock();
            reservation.complete(&mut state);
            if state.lifecycle.is_active() {
                state.slots.insert(id, Slot::busy(Instant::now()));
                Some(state.slots.len())
            } else {
                state.settle();
                None
            }
        };

        let Some(live) = admitted else {
            debug!(
                pool = %self.inner.name,
                connection_id = %id,
                "Pool drained while opening, closing new connection"
            );
            self.inner.close_connection(conn).await;
            return Err(DbError::pool_closed(&self.inner.name));
        };

        debug!(
            pool = %self.inner.name,
            connection_id = %id,
            live = live,
            "Opened new connection"
        );
        Ok(PooledConnection::new(Arc::clone(&self.inner), id, conn))
    }

    /// Return a lease to the pool.
    ///
    /// A lease owned by another pool instance leaves this pool untouched and is
    /// routed back to its owner.
    pub async fn release(&self, connection: PooledConnection) {
        if !Arc::ptr_eq(&connection.pool, &self.inner) {
            warn!(
                pool = %self.inner.name,
                owner = %connection.pool_name(),
                connection_id = %connection.id(),
                "Connection released to a pool that does not own it, returning it to its owner"
            );
        }
        connection.release().await;
    }

    /// Open idle connections until the live set reaches `min_connections`.
    pub async fn warm_up(&self) -> DbResult<usize> {
        let mut opened = 0;
        loop {
            let id = {
                let mut state = self.inner.lock();
                if !state.lifecycle.is_active() {
                    return Err(DbError::pool_closed(&self.inner.name));
                }
                let target = self.inner.settings.min_connections as usize;
                if state.slots.len() + state.opening >= target
                    || !state.has_capacity(self.inner.settings.max_connections)
                {
                    break;
                }
                state.opening += 1;
                state.next_id()
            };

            let reservation = Reservation {
                pool: &self.inner,
                id,
                pending: true,
            };
            let lease = self.open_reserved(reservation).await?;
            lease.release().await;
            opened += 1;
        }

        if opened > 0 {
            info!(pool = %self.inner.name, opened = opened, "Pool warmed up");
        }
        Ok(opened)
    }

    /// Close idle connections unused for at least `older_than`, oldest first,
    /// never shrinking the live set below `min_connections`.
    pub async fn evict_idle(&self, older_than: Duration) -> usize {
        let evicted = {
            let mut state = self.inner.lock();
            if !state.lifecycle.is_active() {
                return 0;
            }

            let floor = self.inner.settings.min_connections as usize;
            let removable = state.slots.len().saturating_sub(floor);
            if removable == 0 {
                return 0;
            }

            let now = Instant::now();
            let mut candidates: Vec<(Instant, ConnectionId)> = state
                .slots
                .iter()
                .filter(|(_, slot)| {
                    slot.is_ready() && now.saturating_duration_since(slot.last_used) >= older_than
                })
                .map(|(id, slot)| (slot.last_used, *id))
                .collect();
            candidates.sort();
            candidates.truncate(removable);

            candidates
                .into_iter()
                .filter_map(|(_, id)| state.remove(id))
                .collect::<Vec<_>>()
        };

        let count = self.inner.close_all(evicted).await;
        if count > 0 {
            info!(pool = %self.inner.name, evicted = count, "Evicted idle connections");
        }
        count
    }

    /// Ping every idle connection and close the ones that fail.
    ///
    /// Connections are pinged one at a time and their slots stay idle, so
    /// callers are never refused because of a check. Last-used times are left
    /// unchanged.
    pub async fn health_check(&self) -> HealthReport {
        let candidates: Vec<ConnectionId> = {
            let state = self.inner.lock();
            if !state.lifecycle.is_active() {
                return HealthReport::default();
            }
            state
                .slots
                .iter()
                .filter(|(_, slot)| slot.is_ready())
                .map(|(id, _)| *id)
                .collect()
        };

        let mut report = HealthReport::default();
        for id in candidates {
            let check = {
                let mut state = self.inner.lock();
                if !state.lifecycle.is_active() {
                    break;
                }
                // Lent out or evicted since the candidates were collected
                let Some(slot) = state.slots.get_mut(&id).filter(|slot| slot.is_ready()) else {
                    continue;
                };
                let Some(conn) = slot.conn.take() else {
                    continue;
                };
                slot.checking = true;
                IdleCheck {
                    pool: Arc::clone(&self.inner),
                    id,
                    conn: Some(conn),
                }
            };

            report.checked += 1;
            if check.run().await {
                report.healthy += 1;
            } else {
                report.removed += 1;
            }
        }

        if report.removed > 0 {
            warn!(
                pool = %self.inner.name,
                removed = report.removed,
                "Closed connections that failed health check"
            );
        }
        report
    }

    /// Stop handing out connections and close everything idle.
    ///
    /// Busy connections are closed as their leases come back. Calling this
    /// again is safe and converges on the same terminal state. Returns the
    /// number of idle connections closed by this call.
    pub async fn drain(&self) -> usize {
        let (idle, remaining) = {
            let mut state = self.inner.lock();
            if state.lifecycle == PoolLifecycle::Closed {
                return 0;
            }
            if state.lifecycle.is_active() {
                state.set_lifecycle(PoolLifecycle::Draining);
            }

            // Connections under a health check close when it hands them back
            let idle_ids: Vec<ConnectionId> = state
                .slots
                .iter()
                .filter(|(_, slot)| slot.is_ready())
                .map(|(id, _)| *id)
                .collect();
            let idle: Vec<PhysicalConnection> = idle_ids
                .into_iter()
                .filter_map(|id| state.remove(id))
                .collect();
            state.settle();
            (idle, state.slots.len())
        };

        let closed = self.inner.close_all(idle).await;
        info!(
            pool = %self.inner.name,
            closed = closed,
            remaining = remaining,
            "Pool drained"
        );
        closed
    }

    /// Wait until the pool reaches `Closed`, up to `timeout`.
    ///
    /// Returns true if the pool closed in time.
    pub async fn wait_closed(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.lock().lifecycle_tx.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|l| *l == PoolLifecycle::Closed)).await {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        }
    }

    /// Snapshot of the live set. Never mutates state.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            name: self.inner.name.clone(),
            pool_id: self.inner.id,
            db_type: self.inner.adapter.db_type(),
            lifecycle: state.lifecycle,
            total: state.slots.len(),
            busy: state.count(ConnectionState::Busy),
            idle: state.count(ConnectionState::Idle),
            opening: state.opening,
            max_connections: self.inner.settings.max_connections,
            min_connections: self.inner.settings.min_connections,
            opened_total: self.inner.opened_total.load(Ordering::Acquire),
            closed_total: self.inner.closed_total.load(Ordering::Acquire),
        }
    }

    /// Age of the oldest live connection, if any.
    pub fn oldest_connection_age(&self) -> Option<Duration> {
        let state = self.inner.lock();
        state.slots.values().map(|slot| slot.created_at.elapsed()).max()
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("adapter", &self.inner.adapter)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

/// A connection borrowed from a pool.
///
/// Dereferences to the [`PhysicalConnection`]. Return it with
/// [`release`](Self::release) (preferred) or through the manager. If it is
/// dropped instead, it returns itself to its pool and logs a warning.
///
/// # Runtime Shutdown Behavior
///
/// When a lease is dropped during a drain, the physical close is spawned on
/// the current tokio runtime. Without a runtime the connection is dropped,
/// which closes the socket without a protocol-level goodbye.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    id: ConnectionId,
    conn: Option<PhysicalConnection>,
    acquired_at: Instant,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, id: ConnectionId, conn: PhysicalConnection) -> Self {
        Self {
            pool,
            id,
            conn: Some(conn),
            acquired_at: Instant::now(),
        }
    }

    /// Identity within the owning pool.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Name of the pool this lease belongs to.
    pub fn pool_name(&self) -> &str {
        &self.pool.name
    }

    /// Instance id of the owning pool.
    pub fn pool_id(&self) -> Uuid {
        self.pool.id
    }

    /// How long this lease has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Return the connection to its owning pool.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            if let Some(conn) = self.pool.check_in(self.id, conn) {
                self.pool.close_connection(conn).await;
            }
        }
    }

    /// Remove the connection from the pool and close it.
    async fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(self.id, conn).await;
        }
    }
}

/// Close a connection on the current runtime, or drop it when there is none.
///
/// A dropped connection still counts towards `closed_total`.
fn spawn_close(pool: Arc<PoolInner>, conn: PhysicalConnection) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                pool.close_connection(conn).await;
            });
        }
        Err(_) => {
            drop(conn);
            pool.closed_total.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl Deref for PooledConnection {
    type Target = PhysicalConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until the lease is consumed")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until the lease is consumed")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        warn!(
            pool = %self.pool.name,
            connection_id = %self.id,
            "Connection released via Drop - consider using explicit release()"
        );
        if let Some(conn) = self.pool.check_in(self.id, conn) {
            spawn_close(Arc::clone(&self.pool), conn);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("pool", &self.pool.name)
            .field("pool_id", &self.pool.id)
            .field("held_for", &self.acquired_at.elapsed())
            .finish_non_exhaustive()
    }
}
