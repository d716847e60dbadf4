//! The pool's observable lifecycle surface.
//!
//! Where the source this crate is modeled on registers string-keyed listeners
//! (`pool.on('connectionAddedToPool', ...)`), this crate exposes a typed enum
//! plus a sink trait: one [`PoolEvent`] variant per named event in the
//! documented event surface, delivered through an [`EventSink`] the caller
//! installs on [`PgPoolOptions`][crate::PgPoolOptions].

use std::time::Instant;

use crate::driver::{ConnectionId, DriverError};

/// A single observable moment in the pool's or a connection's lifecycle.
///
/// Variant names and payloads follow the documented event surface exactly;
/// see each variant's doc comment for the point in the protocol where it
/// fires.
#[derive(Debug)]
pub enum PoolEvent<'a> {
    /// A caller's `acquire` found no idle connection and no free slot; a
    /// [`Waiter`][crate::pool] was enqueued.
    ConnectionRequestQueued,

    /// A queued waiter was handed a connection (as opposed to timing out).
    ConnectionRequestDequeued,

    /// A new physical connection finished its handshake and joined the pool,
    /// before it becomes available to any caller.
    ConnectionAddedToPool {
        connection_id: ConnectionId,
        retry_attempt: u32,
        start_time: Instant,
    },

    /// A connection was permanently removed from the pool and `close()` was
    /// attempted on the underlying driver.
    ConnectionRemovedFromPool { connection_id: ConnectionId },

    /// A connection was released with no waiter present and pushed onto the
    /// idle set.
    ConnectionIdle { connection_id: ConnectionId },

    /// A connection was spliced out of the idle set as part of removal.
    /// Fires only when the removed connection was actually idle.
    ConnectionRemovedFromIdlePool { connection_id: ConnectionId },

    /// An idle connection was popped from the idle set and handed to a
    /// caller.
    IdleConnectionActivated { connection_id: ConnectionId },

    /// A query was denied because the connected node is a read-only replica;
    /// the connection will be removed and the query retried.
    QueryDeniedForReadOnlyTransaction { connection_id: ConnectionId },

    /// A query was denied because the driver reported a stale/unqueryable
    /// connection; the connection will be removed and the query retried.
    QueryDeniedForConnectionError { connection_id: ConnectionId },

    /// A connect attempt failed because the database is still starting up;
    /// the pool will sleep and retry.
    WaitingForDatabaseToStart { attempt: u32 },

    /// A connect attempt failed with a transient, code-matched error and
    /// will be retried.
    RetryConnectionOnError {
        attempt: u32,
        error: &'a DriverError,
    },

    /// A driver-reported error not otherwise attached to a specific outcome.
    Error {
        error: &'a DriverError,
        connection_id: Option<ConnectionId>,
    },
}

/// Receives [`PoolEvent`]s as the pool emits them.
///
/// Implementations must not block; `on_event` is called while the pool is
/// mid-operation (though never while its internal lock is held).
pub trait EventSink: Send + Sync + 'static {
    fn on_event(&self, event: &PoolEvent<'_>);
}

/// An [`EventSink`] that discards every event, used when the caller does not
/// install one.
///
/// Named after `bb8`'s `NopErrorSink`, which plays the same "silently drop
/// everything" default role in that crate's connection manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopEventSink;

impl EventSink for NopEventSink {
    fn on_event(&self, _event: &PoolEvent<'_>) {}
}

impl<F> EventSink for F
where
    F: Fn(&PoolEvent<'_>) + Send + Sync + 'static,
{
    fn on_event(&self, event: &PoolEvent<'_>) {
        self(event)
    }
}
