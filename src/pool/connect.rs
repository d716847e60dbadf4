//! Connect-with-retry: opening one new physical connection.

use std::sync::Arc;
use std::time::Instant;

use tracing::{instrument, warn};

use crate::driver::{ConnectionId, DriverConnection};
use crate::error::PoolError;
use crate::events::PoolEvent;

use super::Shared;

impl<C: DriverConnection> Shared<C> {
    /// Open one new physical connection, retrying transient failures under
    /// two independent budgets: a count-limited code-retry policy (tried
    /// first) and a wall-clock-limited database-is-starting-up policy.
    ///
    /// The code-retry counter resets to 0 every time a startup retry is
    /// taken — a slow database restart must not exhaust the code-retry
    /// budget — while the startup clock, once started, is never reset. The
    /// two are intentionally never collapsed into a single counter or a
    /// single clock.
    #[instrument(target = "postgres_pool::connect", skip(self), fields(%id), err)]
    pub(crate) async fn connect_with_retry(
        self: Arc<Self>,
        id: ConnectionId,
        mut retry_attempt: u32,
        mut db_start: Option<Instant>,
    ) -> Result<C, PoolError> {
        let mut first_err = None;

        loop {
            let mut driver = C::new(self.options.driver_config.clone());
            let start_time = Instant::now();

            let outcome =
                tokio::time::timeout(self.options.connect_timeout, driver.start()).await;

            let err = match outcome {
                Ok(Ok(())) => {
                    self.emit(&PoolEvent::ConnectionAddedToPool {
                        connection_id: id,
                        retry_attempt,
                        start_time,
                    });
                    return Ok(driver);
                }
                Ok(Err(err)) => err,
                Err(_elapsed) => {
                    driver.destroy_transport();
                    if let Err(close_err) = driver.close().await {
                        if !C::is_benign_close_error(&close_err) {
                            self.emit(&PoolEvent::Error {
                                error: &close_err,
                                connection_id: Some(id),
                            });
                        }
                    }
                    return Err(PoolError::ConnectTimeout);
                }
            };

            driver.destroy_transport();
            if let Err(close_err) = driver.close().await {
                if !C::is_benign_close_error(&close_err) {
                    self.emit(&PoolEvent::Error {
                        error: &close_err,
                        connection_id: Some(id),
                    });
                }
            }

            if self.options.retry_connection_max_retries > 0
                && err.matches_any_code(&self.options.retry_connection_error_codes)
                && retry_attempt < self.options.retry_connection_max_retries
            {
                warn!(
                    target: "postgres_pool::connect",
                    %id, retry_attempt, %err,
                    "retrying connect after transient error"
                );
                self.emit(&PoolEvent::RetryConnectionOnError {
                    attempt: retry_attempt + 1,
                    error: &err,
                });
                tokio::time::sleep(self.options.retry_connection_wait).await;
                retry_attempt += 1;
                continue;
            }

            if self.options.reconnect_on_database_is_starting_error
                && err.message_contains_ci("the database system is starting up")
            {
                self.emit(&PoolEvent::WaitingForDatabaseToStart {
                    attempt: retry_attempt,
                });
                let started = *db_start.get_or_insert_with(Instant::now);
                // Rethrow whatever error first started this startup-wait
                // clock, not this iteration's (spec.md §7), so it must be
                // captured before the clock can expire.
                let first_err = first_err.get_or_insert_with(|| err.clone());
                tokio::time::sleep(self.options.wait_for_database_startup).await;
                if started.elapsed() <= self.options.database_startup_timeout {
                    retry_attempt = 0;
                    continue;
                }
                return Err(PoolError::Driver(first_err.clone()));
            }

            return Err(PoolError::Driver(err));
        }
    }
}
