//! A single queued `acquire` request.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use crate::driver::{ConnectionId, DriverConnection};

/// What a [`Waiter`] is ultimately handed: the connection's id (for event
/// payloads) and the driver itself.
pub(crate) struct Handoff<C: DriverConnection> {
    pub(crate) id: ConnectionId,
    pub(crate) driver: C,
}

/// A FIFO queue entry representing one caller blocked in `acquire`.
///
/// The `tx` half is a single-shot completion primitive: it is settled
/// exactly once, either by a releaser handing off a connection or by the
/// waiter's own deadline firing and removing it from the queue by `id`.
pub(crate) struct Waiter<C: DriverConnection> {
    pub(crate) id: u64,
    pub(crate) tx: oneshot::Sender<Handoff<C>>,
}

impl<C: DriverConnection> Waiter<C> {
    pub(crate) fn next_id() -> u64 {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }
}
