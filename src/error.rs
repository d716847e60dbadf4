//! Error and Result types.

use std::error::Error as StdError;
use std::fmt::{self, Display};

use crate::driver::DriverError;

/// A generic error that represents all the ways the pool can fail.
///
/// Every variant carries a stable [`code()`][PoolError::code] string, matching
/// the error-code surface documented for the pool.
#[derive(Debug)]
pub enum PoolError {
    /// `end()` was called on the pool; no new connections will be created.
    Ended,

    /// A new physical connection did not complete the handshake within
    /// `connectionTimeoutMillis`.
    ConnectTimeout,

    /// A caller waited longer than `waitForAvailableConnectionTimeoutMillis`
    /// for a pooled connection to become available.
    AcquireTimeout,

    /// A named-parameter query was given a map of values but the query text
    /// contains no `@name` tokens.
    NoNamedParameters,

    /// A named-parameter query referenced keys that were not present in the
    /// supplied values, in first-seen order.
    MissingQueryParameters(Vec<String>),

    /// The underlying driver reported an error that was not retried (or that
    /// exhausted its retry budget).
    Driver(DriverError),
}

impl PoolError {
    /// The stable error code for this variant, suitable for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            PoolError::Ended => "ERR_PG_CONNECT_POOL_ENDED",
            PoolError::ConnectTimeout => "ERR_PG_CONNECT_TIMEOUT",
            PoolError::AcquireTimeout => "ERR_PG_CONNECT_POOL_CONNECTION_TIMEOUT",
            PoolError::NoNamedParameters => "ERR_PG_QUERY_NO_NAMED_PARAMETERS",
            PoolError::MissingQueryParameters(_) => "ERR_PG_QUERY_MISSING_QUERY_PARAMETER",
            PoolError::Driver(err) => err.code.as_deref().unwrap_or("ERR_PG_QUERY_FAILED"),
        }
    }
}

impl StdError for PoolError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            PoolError::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Ended => f.write_str("cannot acquire a connection on a closed pool"),

            PoolError::ConnectTimeout => {
                f.write_str("timed out establishing a new database connection")
            }

            PoolError::AcquireTimeout => {
                f.write_str("timed out while waiting for an available connection")
            }

            PoolError::NoNamedParameters => {
                f.write_str("named parameter values were supplied but the query contains none")
            }

            PoolError::MissingQueryParameters(keys) => {
                write!(f, "Missing query parameter(s): {}", keys.join(", "))
            }

            PoolError::Driver(err) => Display::fmt(err, f),
        }
    }
}

impl From<DriverError> for PoolError {
    fn from(err: DriverError) -> Self {
        PoolError::Driver(err)
    }
}
