//! The boundary between the pool and the underlying PostgreSQL client.
//!
//! The wire protocol, statement execution and `$N`-positional parameter
//! binding belong to the driver, not to the pool. This module only describes
//! the shape the pool needs: something that can be constructed, started
//! (handshake), queried, closed, and polled for out-of-band errors.

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::params::QueryParams;

#[cfg(feature = "tokio-postgres")]
pub mod tokio_postgres;

/// An opaque identifier for a pooled connection, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        ConnectionId(NEXT.fetch_add(1, Ordering::Relaxed) as u64)
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// An error reported by the driver, either while connecting or while
/// executing a query.
///
/// `code` mirrors the `code` field Node drivers attach to errors (e.g.
/// `ENOTFOUND`, a PostgreSQL `SQLSTATE`); it is `None` when the driver only
/// has a message to offer. Retry classification matches on `code` first and
/// falls back to a substring search over `message`, per the pool's retry
/// policies.
#[derive(Debug, Clone)]
pub struct DriverError {
    pub message: String,
    pub code: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Whether this error's code or message matches one of `codes`.
    pub(crate) fn matches_any_code(&self, codes: &[String]) -> bool {
        codes.iter().any(|code| {
            self.code.as_deref() == Some(code.as_str()) || self.message.contains(code.as_str())
        })
    }

    pub(crate) fn message_contains_ci(&self, needle_lower: &str) -> bool {
        self.message.to_lowercase().contains(needle_lower)
    }
}

impl Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for DriverError {}

/// The minimal interface the pool needs from a PostgreSQL client.
///
/// Implementations own exactly one physical connection. The pool is
/// responsible for everything above this line: accounting, queueing,
/// retries and named-parameter rewriting.
pub trait DriverConnection: Send + 'static {
    /// Whatever is needed to open a new connection (a DSN, a config struct, …).
    type Config: Clone + Send + Sync + 'static;

    /// A single bound query parameter, in whatever representation the driver
    /// binds at the `$N` level.
    type Param: Clone + Send + Sync + 'static;

    /// The result of a successful query, passed back to the caller verbatim.
    type QueryResult: Send + 'static;

    /// Construct a new, not-yet-connected client.
    ///
    /// This exists separately from [`start`][Self::start] so that a failed
    /// handshake still leaves behind an object the pool can use to force a
    /// socket teardown (see [`destroy_transport`][Self::destroy_transport]).
    fn new(config: Self::Config) -> Self;

    /// Perform the handshake. The pool races this against
    /// `connectionTimeoutMillis`; on timeout, `self` is still torn down via
    /// [`destroy_transport`][Self::destroy_transport] and
    /// [`close`][Self::close].
    fn start(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send + '_;

    /// Execute a query, with parameters already rewritten to positional form.
    fn query(
        &mut self,
        text: &str,
        params: QueryParams<Self::Param>,
    ) -> impl Future<Output = Result<Self::QueryResult, DriverError>> + Send + '_;

    /// Gracefully end the session. Idempotent: a second call must not panic.
    fn close(self) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Poll for an error the driver reported out-of-band (e.g. on its
    /// background I/O task), since its last call to `query`/`start`.
    ///
    /// This is the Rust-native replacement for registering an `error`
    /// listener on the underlying client: the pool calls this right before
    /// handing an idle connection back out, and treats a non-`None` result as
    /// cause for immediate removal.
    fn take_error(&mut self) -> Option<DriverError>;

    /// Best-effort forced teardown of the underlying transport after a failed
    /// connect attempt, before `close()` is called.
    ///
    /// Drivers that don't expose raw socket access may leave this as a no-op;
    /// the pool tolerates the slightly leakier semantics that results.
    fn destroy_transport(&mut self) {}

    /// Whether a `close()` error is the expected "socket already closed by
    /// the peer" noise rather than something worth surfacing via the `error`
    /// event. The default matches common driver wording.
    fn is_benign_close_error(err: &DriverError) -> bool {
        let m = err.message.to_lowercase();
        m.contains("socket has been ended") || m.contains("already closed")
    }
}
