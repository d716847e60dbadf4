//! The RAII guard callers receive from [`Pool::acquire`][crate::Pool::acquire].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::driver::{ConnectionId, DriverConnection};
use crate::pool::Shared;

const DEREF_ERR: &str = "(PooledConnection) connection already released back to the pool";

/// An exclusively-owned handle to one physical connection.
///
/// Dropping a `PooledConnection` without calling [`release`][Self::release]
/// or [`remove`][Self::remove] releases it back to the pool automatically
/// (equivalent to `release(false)`) — the actual handoff is deferred onto a
/// spawned task since `Drop` cannot `.await`. Calling `release`/`remove`
/// explicitly lets the caller wait for that handoff (and choose removal) and
/// makes the subsequent `Drop` a no-op, satisfying the "releasing twice MUST
/// be a no-op" invariant.
pub struct PooledConnection<C: DriverConnection> {
    shared: Arc<Shared<C>>,
    id: ConnectionId,
    driver: Option<C>,
    finished: bool,
}

impl<C: DriverConnection> PooledConnection<C> {
    pub(crate) fn new(shared: Arc<Shared<C>>, id: ConnectionId, driver: C) -> Self {
        Self {
            shared,
            id,
            driver: Some(driver),
            finished: false,
        }
    }

    /// This connection's stable identity.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Return this connection to the pool: handed directly to the oldest
    /// queued waiter if one exists, otherwise parked in the idle set (or
    /// removed immediately if idling is disabled). A second call is a no-op.
    pub async fn release(&mut self) {
        self.finish(false).await;
    }

    /// Permanently remove this connection from the pool instead of
    /// returning it. A second call is a no-op.
    pub async fn remove(&mut self) {
        self.finish(true).await;
    }

    async fn finish(&mut self, remove_flag: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        let driver = self.driver.take().expect("driver present until finished");
        self.shared.clone().release(self.id, driver, remove_flag).await;
    }
}

impl<C: DriverConnection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.driver.as_ref().expect(DEREF_ERR)
    }
}

impl<C: DriverConnection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.driver.as_mut().expect(DEREF_ERR)
    }
}

impl<C: DriverConnection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(driver) = self.driver.take() {
            let shared = self.shared.clone();
            let id = self.id;
            tokio::spawn(async move {
                shared.release(id, driver, false).await;
            });
        }
    }
}
