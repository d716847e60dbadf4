//! Pool state, accounting, and the acquire/release/remove protocols.
//!
//! The four shared sets from the data model (`total`, `idle`, `queue`,
//! `ending`) live behind one `std::sync::Mutex`: short critical sections
//! only, the lock is never held across an `.await`. Waiter handoff uses a
//! `tokio::sync::oneshot` channel as the single-shot completion primitive,
//! matching `sqlx_core::pool::queue::ConnectionQueue`'s use of
//! `futures_channel::oneshot`.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{instrument, trace};

use crate::connection::PooledConnection;
use crate::driver::{ConnectionId, DriverConnection};
use crate::error::PoolError;
use crate::events::PoolEvent;
use crate::options::PgPoolOptions;
use crate::waiter::{Handoff, Waiter};

mod connect;
mod query;

/// Why a connection was torn down, for logging only (not part of the public
/// event payload — the event surface follows `spec.md` §6 exactly).
#[derive(Debug, Clone, Copy)]
pub(crate) enum RemoveReason {
    IdleTimeout,
    DriverError,
    ExplicitRemove,
    PoolEnded,
}

pub(crate) struct IdleEntry<C: DriverConnection> {
    id: ConnectionId,
    driver: C,
    cancel: oneshot::Sender<()>,
}

struct State<C: DriverConnection> {
    total: HashSet<ConnectionId>,
    idle: VecDeque<IdleEntry<C>>,
    queue: VecDeque<Waiter<C>>,
    ending: bool,
}

impl<C: DriverConnection> State<C> {
    fn new() -> Self {
        Self {
            total: HashSet::new(),
            idle: VecDeque::new(),
            queue: VecDeque::new(),
            ending: false,
        }
    }
}

/// What to remove: a detached (in-use) connection's driver handed in by the
/// caller, or an id that should still be sitting in the idle set.
pub(crate) enum RemoveSource<C: DriverConnection> {
    Detached(C),
    Idle,
}

pub(crate) struct Shared<C: DriverConnection> {
    pub(crate) options: PgPoolOptions<C>,
    state: Mutex<State<C>>,
}

impl<C: DriverConnection> Shared<C> {
    fn emit(&self, event: &PoolEvent<'_>) {
        self.options.event_sink.on_event(event);
    }

    fn is_ending(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).ending
    }

    #[instrument(target = "postgres_pool::pool", skip_all)]
    pub(crate) async fn acquire(self: Arc<Self>) -> Result<PooledConnection<C>, PoolError> {
        enum Next<C: DriverConnection> {
            Idle(ConnectionId, C),
            Connect(ConnectionId),
            Wait(oneshot::Receiver<Handoff<C>>, u64),
        }

        // A loop, not recursion: a stale idle connection is removed and the
        // whole selection (idle/connect/wait) is retried from scratch. Async
        // fns can't recurse into themselves without boxing the resulting
        // self-referential future, so this retries via `continue` instead.
        loop {
            let next = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if state.ending {
                    return Err(PoolError::Ended);
                }

                if let Some(entry) = state.idle.pop_front() {
                    let _ = entry.cancel.send(());
                    Next::Idle(entry.id, entry.driver)
                } else if (state.total.len() as u32) < self.options.pool_size {
                    let id = ConnectionId::next();
                    state.total.insert(id);
                    Next::Connect(id)
                } else {
                    let waiter_id = Waiter::<C>::next_id();
                    let (tx, rx) = oneshot::channel();
                    state.queue.push_back(Waiter { id: waiter_id, tx });
                    Next::Wait(rx, waiter_id)
                }
            };

            match next {
                Next::Idle(id, mut driver) => {
                    if let Some(err) = driver.take_error() {
                        self.emit(&PoolEvent::Error {
                            error: &err,
                            connection_id: Some(id),
                        });
                        self.clone()
                            .remove(id, RemoveSource::Detached(driver), RemoveReason::DriverError)
                            .await;
                        // The slot `remove` just freed lets this retry proceed
                        // through idle/connect/wait again from scratch.
                        continue;
                    }
                    trace!(target: "postgres_pool::pool", %id, "reusing idle connection");
                    self.emit(&PoolEvent::IdleConnectionActivated { connection_id: id });
                    return Ok(PooledConnection::new(self, id, driver));
                }

                Next::Connect(id) => {
                    return match self.clone().connect_with_retry(id, 0, None).await {
                        Ok(driver) => Ok(PooledConnection::new(self, id, driver)),
                        Err(err) => {
                            self.state.lock().unwrap_or_else(|e| e.into_inner()).total.remove(&id);
                            Err(err)
                        }
                    };
                }

                Next::Wait(rx, waiter_id) => {
                    self.emit(&PoolEvent::ConnectionRequestQueued);
                    trace!(target: "postgres_pool::pool", waiter_id, "enqueued waiter");

                    let deadline = tokio::time::Instant::now() + self.options.acquire_timeout;
                    let mut rx = rx;

                    let handoff = tokio::select! {
                        result = &mut rx => result.map_err(|_| PoolError::AcquireTimeout)?,
                        _ = tokio::time::sleep_until(deadline) => {
                            let removed = {
                                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                                let before = state.queue.len();
                                state.queue.retain(|w| w.id != waiter_id);
                                state.queue.len() != before
                            };
                            if removed {
                                return Err(PoolError::AcquireTimeout);
                            }
                            // A release already popped this waiter concurrently with
                            // the deadline firing; fall back to awaiting the handoff
                            // rather than reporting a spurious timeout.
                            rx.await.map_err(|_| PoolError::AcquireTimeout)?
                        }
                    };

                    self.emit(&PoolEvent::ConnectionRequestDequeued);
                    return Ok(PooledConnection::new(self, handoff.id, handoff.driver));
                }
            }
        }
    }

    pub(crate) async fn release(self: Arc<Self>, id: ConnectionId, driver: C, remove_flag: bool) {
        if remove_flag || self.is_ending() {
            let reason = if remove_flag {
                RemoveReason::ExplicitRemove
            } else {
                RemoveReason::PoolEnded
            };
            self.remove(id, RemoveSource::Detached(driver), reason).await;
            return;
        }

        let mut driver = driver;
        loop {
            let waiter = self.state.lock().unwrap_or_else(|e| e.into_inner()).queue.pop_front();
            let Some(waiter) = waiter else { break };
            match waiter.tx.send(Handoff { id, driver }) {
                Ok(()) => return,
                Err(handoff) => {
                    driver = handoff.driver;
                    continue;
                }
            }
        }

        if self.options.idle_timeout.is_zero() {
            self.remove(id, RemoveSource::Detached(driver), RemoveReason::IdleTimeout)
                .await;
            return;
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.idle.push_back(IdleEntry {
                id,
                driver,
                cancel: cancel_tx,
            });
        }
        self.emit(&PoolEvent::ConnectionIdle { connection_id: id });

        let shared = self.clone();
        let idle_timeout = self.options.idle_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(idle_timeout) => {
                    shared.remove(id, RemoveSource::Idle, RemoveReason::IdleTimeout).await;
                }
                _ = cancel_rx => {}
            }
        });
    }

    pub(crate) async fn remove(
        self: Arc<Self>,
        id: ConnectionId,
        source: RemoveSource<C>,
        reason: RemoveReason,
    ) {
        let driver = match source {
            RemoveSource::Detached(driver) => driver,
            RemoveSource::Idle => {
                let entry = {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    let pos = state.idle.iter().position(|entry| entry.id == id);
                    pos.map(|pos| state.idle.remove(pos).unwrap())
                };
                match entry {
                    Some(entry) => {
                        self.emit(&PoolEvent::ConnectionRemovedFromIdlePool { connection_id: id });
                        entry.driver
                    }
                    // Already reused or removed concurrently (e.g. the idle
                    // timer lost a race with a reuse that forgot to cancel).
                    None => return,
                }
            }
        };

        let was_tracked = self.state.lock().unwrap_or_else(|e| e.into_inner()).total.remove(&id);
        if !was_tracked {
            trace!(target: "postgres_pool::pool", %id, ?reason, "double-remove observed, no-op");
        }

        if let Err(err) = driver.close().await {
            if !C::is_benign_close_error(&err) {
                self.emit(&PoolEvent::Error {
                    error: &err,
                    connection_id: Some(id),
                });
            }
        }

        self.emit(&PoolEvent::ConnectionRemovedFromPool { connection_id: id });
    }

    /// Remove every currently-idle connection, sequentially.
    ///
    /// Sequential rather than concurrent per the chosen resolution in
    /// DESIGN.md: either order satisfies the one hard requirement (a
    /// subsequent acquire must not observe an already-removed connection as
    /// idle), and sequential draining keeps `remove`'s driver-error
    /// bookkeeping trivially race-free.
    pub(crate) async fn drain_idle(self: Arc<Self>) {
        let entries: Vec<IdleEntry<C>> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.idle.drain(..).collect()
        };
        for entry in entries {
            let _ = entry.cancel.send(());
            self.clone()
                .remove(
                    entry.id,
                    RemoveSource::Detached(entry.driver),
                    RemoveReason::PoolEnded,
                )
                .await;
        }
    }

    pub(crate) fn total_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).total.len()
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).idle.len()
    }

    pub(crate) fn waiting_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).queue.len()
    }
}

/// A bounded pool of physical connections to a PostgreSQL-wire-protocol
/// server, generic over the underlying [`DriverConnection`].
///
/// Cloning a `Pool` is cheap (it is a thin handle over a shared, reference
/// counted state) and every clone refers to the same set of physical
/// connections.
pub struct Pool<C: DriverConnection>(pub(crate) Arc<Shared<C>>);

impl<C: DriverConnection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Pool(self.0.clone())
    }
}

impl<C: DriverConnection> Pool<C> {
    pub(crate) fn new(options: PgPoolOptions<C>) -> Self {
        Pool(Arc::new(Shared {
            options,
            state: Mutex::new(State::new()),
        }))
    }

    /// Acquire an exclusively-owned connection, per the protocol in
    /// `spec.md` §4.2: reuse an idle connection if one exists, otherwise
    /// open a new one if under `pool_size`, otherwise wait in FIFO order for
    /// a release.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        self.0.clone().acquire().await
    }

    /// Latch the pool closed: drains every idle connection, rejects new
    /// acquires immediately, and lets in-flight connections finish and be
    /// removed on their own release.
    pub async fn end(&self) {
        self.0.state.lock().unwrap_or_else(|e| e.into_inner()).ending = true;
        self.0.clone().drain_idle().await;
    }

    /// Number of physical connections currently counted against `pool_size`
    /// (connecting, in-use, and idle).
    pub fn total_count(&self) -> usize {
        self.0.total_count()
    }

    /// Number of connections currently sitting in the idle set.
    pub fn idle_count(&self) -> usize {
        self.0.idle_count()
    }

    /// Number of callers currently queued waiting for a connection.
    pub fn waiting_count(&self) -> usize {
        self.0.waiting_count()
    }
}
