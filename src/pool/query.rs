//! Query-with-retry: acquire, execute, release, with read-only and
//! stale-connection retry policies.

use std::time::Instant;

use crate::driver::{ConnectionId, DriverConnection};
use crate::error::PoolError;
use crate::events::PoolEvent;
use crate::params::Values;

use super::Pool;

impl<C: DriverConnection> Pool<C> {
    /// Execute a query via acquire/release/retry.
    ///
    /// `values` is rewritten from `@name` to positional form first
    /// (`spec.md` §4.7) — entirely before any connection is acquired, so a
    /// query referencing an unknown parameter never touches the pool at
    /// all. The query itself is then retried, without the caller's
    /// involvement, if the server rejects it as a read-only replica or the
    /// driver reports the connection as stale.
    pub async fn query(
        &self,
        text: &str,
        values: Values<C::Param>,
    ) -> Result<C::QueryResult, PoolError> {
        let rewritten = self
            .0
            .options
            .named_parameter_regexes
            .rewrite(text, values)?;

        let mut start_time: Option<Instant> = None;
        let mut first_err = None;

        loop {
            let mut conn = self.acquire().await?;
            let id = conn.id();

            let err = match conn.query(&rewritten.text, rewritten.params.clone()).await {
                Ok(result) => {
                    conn.release().await;
                    return Ok(result);
                }
                Err(err) => err,
            };

            let matchers = &self.0.options.query_error_matchers;
            let read_only = self.0.options.reconnect_on_read_only_transaction_error
                && matchers.read_only_transaction.is_match(&err.message);
            let stale_connection = !read_only
                && self.0.options.reconnect_on_connection_error
                && matchers.stale_connection.is_match(&err.message);

            if !read_only && !stale_connection {
                conn.release().await;
                return Err(PoolError::Driver(err));
            }

            conn.remove().await;
            self.emit_denied(id, read_only);

            // Force the next acquire onto a fresh socket that may reach a
            // new primary.
            self.0.clone().drain_idle().await;

            let budget_start = *start_time.get_or_insert_with(Instant::now);
            // The budget check below must rethrow the error that first
            // triggered this retry loop, not whatever the latest attempt
            // failed with (spec.md §7): capture it once and hang onto it.
            let first_err = first_err.get_or_insert(err);
            let (wait, budget) = if read_only {
                (
                    self.0.options.wait_for_reconnect_read_only_transaction,
                    self.0.options.read_only_transaction_reconnect_timeout,
                )
            } else {
                (
                    self.0.options.wait_for_reconnect_connection,
                    self.0.options.connection_reconnect_timeout,
                )
            };
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            if budget_start.elapsed() > budget {
                return Err(PoolError::Driver(first_err.clone()));
            }
        }
    }

    fn emit_denied(&self, connection_id: ConnectionId, read_only: bool) {
        if read_only {
            self.0.emit(&PoolEvent::QueryDeniedForReadOnlyTransaction { connection_id });
        } else {
            self.0.emit(&PoolEvent::QueryDeniedForConnectionError { connection_id });
        }
    }
}
