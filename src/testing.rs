//! A scriptable in-memory [`DriverConnection`] for exercising the pool's
//! retry and accounting logic without a real database.
//!
//! Modeled on `bb8`'s trait-object connection manager pattern of swapping in
//! a fake backend behind the same trait the real driver implements, and on
//! `sqlx-core`'s `#[tokio::test]` convention for the tests that drive it.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::driver::{DriverConnection, DriverError};
use crate::params::QueryParams;

/// A value a scripted query can accept or return.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeValue {
    Int(i64),
    Text(String),
}

impl From<i32> for FakeValue {
    fn from(value: i32) -> Self {
        FakeValue::Int(value as i64)
    }
}

impl From<&str> for FakeValue {
    fn from(value: &str) -> Self {
        FakeValue::Text(value.to_string())
    }
}

impl From<String> for FakeValue {
    fn from(value: String) -> Self {
        FakeValue::Text(value)
    }
}

/// What a scripted query call returns on success.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FakeRows {
    pub rows: Vec<FakeValue>,
    pub row_count: usize,
}

/// One scripted outcome for a `start()` call.
pub enum ConnectOutcome {
    Ok,
    Err(DriverError),
    /// Never completes — for exercising `connectionTimeoutMillis`.
    Hang,
}

/// One scripted outcome for a `query()` call.
pub enum QueryOutcome {
    Ok(FakeRows),
    Err(DriverError),
}

#[derive(Default)]
struct ScriptInner {
    connect: VecDeque<ConnectOutcome>,
    query: VecDeque<QueryOutcome>,
    connect_attempts: AtomicU32,
    query_calls: AtomicU32,
    close_calls: AtomicU32,
    injected_error: Option<DriverError>,
}

/// Shared, cloneable configuration for a family of [`FakeConnection`]s.
///
/// Every [`FakeConnection::new`] built from a cloned `FakeConfig` pops from
/// the *same* queues, so a test can script "first connect fails, second
/// succeeds" across what the pool believes are independent connect attempts.
#[derive(Clone)]
pub struct FakeConfig {
    inner: Arc<Mutex<ScriptInner>>,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScriptInner::default())),
        }
    }
}

impl FakeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_connect(&self, outcome: ConnectOutcome) -> &Self {
        self.inner.lock().unwrap().connect.push_back(outcome);
        self
    }

    pub fn push_query(&self, outcome: QueryOutcome) -> &Self {
        self.inner.lock().unwrap().query.push_back(outcome);
        self
    }

    /// Make the next `take_error()` poll (on any connection built from this
    /// config) return `err` once.
    pub fn inject_error(&self, err: DriverError) {
        self.inner.lock().unwrap().injected_error = Some(err);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.inner.lock().unwrap().connect_attempts.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> u32 {
        self.inner.lock().unwrap().query_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.inner.lock().unwrap().close_calls.load(Ordering::SeqCst)
    }
}

pub struct FakeConnection {
    config: FakeConfig,
}

impl DriverConnection for FakeConnection {
    type Config = FakeConfig;
    type Param = FakeValue;
    type QueryResult = FakeRows;

    fn new(config: Self::Config) -> Self {
        Self { config }
    }

    fn start(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send + '_ {
        async move {
            let outcome = {
                let mut inner = self.config.inner.lock().unwrap();
                inner.connect_attempts.fetch_add(1, Ordering::SeqCst);
                inner.connect.pop_front()
            };
            match outcome {
                Some(ConnectOutcome::Ok) | None => Ok(()),
                Some(ConnectOutcome::Err(err)) => Err(err),
                Some(ConnectOutcome::Hang) => std::future::pending().await,
            }
        }
    }

    fn query(
        &mut self,
        _text: &str,
        _params: QueryParams<Self::Param>,
    ) -> impl Future<Output = Result<Self::QueryResult, DriverError>> + Send + '_ {
        async move {
            let outcome = {
                let mut inner = self.config.inner.lock().unwrap();
                inner.query_calls.fetch_add(1, Ordering::SeqCst);
                inner.query.pop_front()
            };
            match outcome {
                Some(QueryOutcome::Ok(rows)) => Ok(rows),
                Some(QueryOutcome::Err(err)) => Err(err),
                None => Ok(FakeRows::default()),
            }
        }
    }

    fn close(self) -> impl Future<Output = Result<(), DriverError>> + Send {
        async move {
            self.config
                .inner
                .lock()
                .unwrap()
                .close_calls
                .fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn take_error(&mut self) -> Option<DriverError> {
        self.config.inner.lock().unwrap().injected_error.take()
    }
}
