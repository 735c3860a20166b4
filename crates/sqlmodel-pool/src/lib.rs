//! Bounded connection pool for [`sqlmodel_postgres::Connection`] (C9).
//!
//! A [`Pool`] owns a fixed-size vector of slots, each either idle (holding a
//! live connection), busy (checked out), or broken (needs reconnecting). A
//! mutex guards the vector; a condvar wakes waiters when a slot is released.
//! `acquire` is the only blocking operation; everything else is wait-free
//! beyond the mutex.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use sqlmodel_postgres::error::{PoolError, PoolErrorKind};
use sqlmodel_postgres::{Connection, Error, PgConfig, RlsContext};

/// Tuning knobs for a [`Pool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of slots in the pool.
    pub max_size: usize,
    /// How long [`Pool::acquire`] waits for an idle slot before returning
    /// [`PoolErrorKind::AcquireTimeout`]. `Duration::ZERO` waits forever.
    pub acquisition_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig { max_size: 10, acquisition_timeout: Duration::from_secs(30) }
    }
}

enum Slot {
    Idle(Connection),
    Busy,
    /// Never connected yet, or a previous connection/reset failed.
    Broken,
}

struct PoolState {
    slots: Vec<Slot>,
    closed: bool,
}

/// A bounded pool of PostgreSQL connections.
pub struct Pool {
    config: PgConfig,
    pool_config: PoolConfig,
    state: Mutex<PoolState>,
    condvar: Condvar,
}

impl Pool {
    /// Create a pool of `pool_config.max_size` slots, all starting unconnected.
    /// Connections are established lazily, on first `acquire`.
    pub fn new(config: PgConfig, pool_config: PoolConfig) -> Self {
        let slots = (0..pool_config.max_size).map(|_| Slot::Broken).collect();
        Pool { config, pool_config, state: Mutex::new(PoolState { slots, closed: false }) }
    }

    /// Total number of slots.
    pub fn size(&self) -> usize {
        self.pool_config.max_size
    }

    /// Number of slots currently idle (connected and available).
    pub fn available_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.slots.iter().filter(|s| matches!(s, Slot::Idle(_))).count()
    }

    /// Check out a connection. Blocks up to `acquisition_timeout` (the pool's
    /// default, see [`Pool::set_timeout`]) waiting for an idle or reconnectable
    /// slot. If `rls` is given, applies it (`RESET ALL` + one `SET SESSION` per
    /// entry) before handing the connection back; a failure there returns the
    /// slot to the pool and surfaces the error to the caller.
    pub fn acquire(&self, rls: Option<&RlsContext>) -> Result<PooledConnection<'_>, Error> {
        let deadline = if self.pool_config.acquisition_timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + self.pool_config.acquisition_timeout)
        };

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        loop {
            if state.closed {
                return Err(Error::Pool(PoolError { kind: PoolErrorKind::Closed, message: "pool is closed".to_string() }));
            }

            if let Some((idx, conn)) = Self::take_idle(&mut state.slots) {
                drop(state);
                return self.finish_acquire(idx, conn, rls);
            }

            if let Some(idx) = Self::find_broken(&state.slots) {
                state.slots[idx] = Slot::Busy;
                drop(state);
                match Connection::connect(self.config.clone()) {
                    Ok(conn) => {
                        tracing::debug!(slot = idx, "pool slot reconnected");
                        return self.finish_acquire(idx, conn, rls);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "lazy reconnect failed, will retry on next acquire");
                        let mut relocked = self.state.lock().unwrap_or_else(|e| e.into_inner());
                        relocked.slots[idx] = Slot::Broken;
                        state = self.wait(relocked, deadline)?;
                        continue;
                    }
                }
            }

            state = self.wait(state, deadline)?;
        }
    }

    fn take_idle(slots: &mut [Slot]) -> Option<(usize, Connection)> {
        for (idx, slot) in slots.iter_mut().enumerate() {
            if matches!(slot, Slot::Idle(_)) {
                if let Slot::Idle(conn) = std::mem::replace(slot, Slot::Busy) {
                    return Some((idx, conn));
                }
            }
        }
        None
    }

    fn find_broken(slots: &[Slot]) -> Option<usize> {
        slots.iter().position(|s| matches!(s, Slot::Broken))
    }

    fn wait<'a>(&'a self, state: std::sync::MutexGuard<'a, PoolState>, deadline: Option<Instant>) -> Result<std::sync::MutexGuard<'a, PoolState>, Error> {
        match deadline {
            None => Ok(self.condvar.wait(state).unwrap_or_else(|e| e.into_inner())),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(Error::Pool(PoolError { kind: PoolErrorKind::AcquireTimeout, message: "timed out waiting for an idle connection".to_string() }));
                }
                let (state, timeout_result) = self.condvar.wait_timeout(state, remaining).unwrap_or_else(|e| e.into_inner());
                if timeout_result.timed_out() && Self::take_idle_peek(&state.slots).is_none() && Self::find_broken(&state.slots).is_none() {
                    return Err(Error::Pool(PoolError { kind: PoolErrorKind::AcquireTimeout, message: "timed out waiting for an idle connection".to_string() }));
                }
                Ok(state)
            }
        }
    }

    fn take_idle_peek(slots: &[Slot]) -> Option<usize> {
        slots.iter().position(|s| matches!(s, Slot::Idle(_)))
    }

    fn finish_acquire(&self, idx: usize, mut conn: Connection, rls: Option<&RlsContext>) -> Result<PooledConnection<'_>, Error> {
        if let Some(rls) = rls {
            if let Err(e) = conn.apply_session_rls(rls) {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.slots[idx] = Slot::Idle(conn);
                self.condvar.notify_one();
                return Err(e);
            }
        }
        tracing::debug!(slot = idx, "connection acquired from pool");
        Ok(PooledConnection { pool: self, idx, conn: Some(conn) })
    }

    /// Return a checked-out connection to the pool: `RESET ALL`, then mark
    /// idle and wake one waiter. A reset failure marks the slot broken
    /// instead, so the next acquirer reconnects it.
    fn release(&self, idx: usize, mut conn: Connection) {
        let slot = match conn.query("RESET ALL") {
            Ok(_) => {
                tracing::debug!(slot = idx, "connection released back to pool");
                Slot::Idle(conn)
            }
            Err(e) => {
                tracing::warn!(error = %e, "connection reset on release failed, marking slot broken");
                Slot::Broken
            }
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.slots[idx] = slot;
        drop(state);
        self.condvar.notify_one();
    }

    /// Drop every idle connection and mark their slots for reconnect. Slots
    /// currently checked out are left untouched; they rejoin as broken on
    /// their next `release` only if the caller's own work fails.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for slot in &mut state.slots {
            if matches!(slot, Slot::Idle(_)) {
                *slot = Slot::Broken;
            }
        }
    }

    /// Adjust the acquisition timeout used by subsequent calls to `acquire`.
    /// Pending waiters already blocked on the condvar keep their original deadline.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.pool_config.acquisition_timeout = timeout;
    }

    /// Mark the pool closed: further `acquire` calls fail immediately, and
    /// idle connections are dropped.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        for slot in &mut state.slots {
            if matches!(slot, Slot::Idle(_)) {
                *slot = Slot::Broken;
            }
        }
        drop(state);
        self.condvar.notify_all();
    }
}

/// An RAII checkout from a [`Pool`]. Returned to the pool on `Drop` if
/// [`PooledConnection::release`] was not called explicitly.
pub struct PooledConnection<'a> {
    pool: &'a Pool,
    idx: usize,
    conn: Option<Connection>,
}

impl PooledConnection<'_> {
    /// Explicitly return this connection to the pool. Equivalent to dropping
    /// it, but lets the caller do so before the end of its scope.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(self.idx, conn);
        }
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken only by release/drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken only by release/drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(self.idx, conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_has_configured_size_and_no_idle_slots() {
        let pool = Pool::new(PgConfig::new(), PoolConfig { max_size: 4, acquisition_timeout: Duration::from_millis(10) });
        assert_eq!(pool.size(), 4);
        assert_eq!(pool.available_count(), 0);
    }

    #[test]
    fn acquire_times_out_when_every_reconnect_fails() {
        let config = PgConfig::new().host("127.0.0.1").port(1).connect_timeout(Duration::from_millis(50));
        let pool = Pool::new(config, PoolConfig { max_size: 1, acquisition_timeout: Duration::from_millis(200) });
        let err = pool.acquire(None);
        assert!(matches!(err, Err(Error::Pool(e)) if e.kind == PoolErrorKind::AcquireTimeout));
    }

    #[test]
    fn closed_pool_rejects_acquire() {
        let pool = Pool::new(PgConfig::new(), PoolConfig { max_size: 1, acquisition_timeout: Duration::from_millis(10) });
        pool.close();
        let err = pool.acquire(None);
        assert!(matches!(err, Err(Error::Pool(e)) if e.kind == PoolErrorKind::Closed));
    }
}
