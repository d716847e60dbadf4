//! A connection pool for a PostgreSQL wire-protocol client.
//!
//! This crate multiplexes many logical query requests onto a bounded set of
//! physical database connections. It provides:
//!
//! * fair, FIFO queueing for callers waiting on a connection slot,
//! * idle-connection reaping,
//! * independent, bounded connect and wait timeouts,
//! * cluster-failover-aware retry policies (database startup, read-only
//!   transaction after failover, dropped connection), and
//! * `@name`-style named-parameter query rewriting.
//!
//! The pool itself is generic over the underlying client via the
//! [`DriverConnection`][driver::DriverConnection] trait; the wire protocol,
//! statement execution and `$N`-positional parameter binding are the
//! responsibility of that driver, not of this crate. A [`DriverConnection`]
//! backed by [`tokio-postgres`](https://docs.rs/tokio-postgres) is bundled
//! behind the `tokio-postgres` feature (on by default).
//!
//! ```no_run
//! # #[cfg(feature = "tokio-postgres")]
//! # async fn example() -> Result<(), postgres_pool::PoolError> {
//! use postgres_pool::{PgPoolOptions, TokioPostgresConnection, Values};
//!
//! let config: tokio_postgres::Config = "postgres://localhost/example".parse().unwrap();
//! let pool = PgPoolOptions::<TokioPostgresConnection>::new(config)
//!     .pool_size(10)
//!     .build();
//!
//! let result = pool
//!     .query("select * from foo where id = @id", Values::named([("id", 1i32.into())]))
//!     .await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
mod events;
mod options;
mod params;
mod pool;
mod waiter;

pub mod driver;

#[cfg(feature = "test-util")]
pub mod testing;

pub use connection::PooledConnection;
pub use driver::{ConnectionId, DriverConnection, DriverError};
pub use error::PoolError;
pub use events::{EventSink, NopEventSink, PoolEvent};
pub use options::PgPoolOptions;
pub use params::{QueryParams, Values};
pub use pool::Pool;

#[cfg(feature = "tokio-postgres")]
pub use driver::tokio_postgres::TokioPostgresConnection;

/// A specialized [`Result`][std::result::Result] for this crate's fallible operations.
pub type Result<T, E = PoolError> = std::result::Result<T, E>;
