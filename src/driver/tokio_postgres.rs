//! A [`DriverConnection`] backed by the real `tokio-postgres` crate.
//!
//! Modeled on `get-convex-convex-backend`'s Postgres client wrapper: spawn
//! the connection-driving future returned by `Config::connect`, keep its
//! `JoinHandle`, and surface whatever error it terminates with through a
//! watch channel rather than the `driver.on('error', ...)` listener this
//! design is ported from.

use std::future::Future;

use bytes::BytesMut;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};

use super::{DriverConnection, DriverError};
use crate::params::QueryParams;

/// One bound query parameter.
///
/// `tokio_postgres::types::ToSql` trait objects aren't `Clone`, so the
/// pool's generic `Param` associated type needs a concrete, cloneable
/// stand-in. This enum covers the primitive types most queries need;
/// extend it if a consuming application binds something not listed here.
#[derive(Debug, Clone)]
pub enum PgParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

macro_rules! from_impl {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for PgParam {
            fn from(value: $ty) -> Self {
                PgParam::$variant(value)
            }
        }
    };
}

from_impl!(bool, Bool);
from_impl!(i16, I16);
from_impl!(i32, I32);
from_impl!(i64, I64);
from_impl!(f32, F32);
from_impl!(f64, F64);
from_impl!(String, Text);
from_impl!(Vec<u8>, Bytes);

impl From<&str> for PgParam {
    fn from(value: &str) -> Self {
        PgParam::Text(value.to_string())
    }
}

impl<T: Into<PgParam>> From<Option<T>> for PgParam {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => PgParam::Null,
        }
    }
}

impl ToSql for PgParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgParam::Null => Ok(IsNull::Yes),
            PgParam::Bool(v) => v.to_sql(ty, out),
            PgParam::I16(v) => v.to_sql(ty, out),
            PgParam::I32(v) => v.to_sql(ty, out),
            PgParam::I64(v) => v.to_sql(ty, out),
            PgParam::F32(v) => v.to_sql(ty, out),
            PgParam::F64(v) => v.to_sql(ty, out),
            PgParam::Text(v) => v.to_sql(ty, out),
            PgParam::Bytes(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Each variant delegates encoding to a real `ToSql` impl for its
        // concrete type; this wrapper accepts anything and lets that
        // delegate reject it at encode time.
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn to_driver_error(err: tokio_postgres::Error) -> DriverError {
    match err.code() {
        Some(code) => DriverError::with_code(err.to_string(), code.code().to_string()),
        None => DriverError::new(err.to_string()),
    }
}

/// A single `tokio-postgres` session plus the task driving its connection.
pub struct TokioPostgresConnection {
    config: Config,
    client: Option<Client>,
    connection_task: Option<JoinHandle<()>>,
    error_rx: Option<watch::Receiver<Option<DriverError>>>,
}

impl DriverConnection for TokioPostgresConnection {
    type Config = Config;
    type Param = PgParam;
    type QueryResult = Vec<Row>;

    fn new(config: Self::Config) -> Self {
        Self {
            config,
            client: None,
            connection_task: None,
            error_rx: None,
        }
    }

    fn start(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send + '_ {
        async move {
            let (client, connection) = self
                .config
                .connect(NoTls)
                .await
                .map_err(to_driver_error)?;

            let (tx, rx) = watch::channel(None);
            let handle = tokio::spawn(async move {
                if let Err(err) = connection.await {
                    let _ = tx.send(Some(to_driver_error(err)));
                }
            });

            self.client = Some(client);
            self.connection_task = Some(handle);
            self.error_rx = Some(rx);
            Ok(())
        }
    }

    fn query(
        &mut self,
        text: &str,
        params: QueryParams<Self::Param>,
    ) -> impl Future<Output = Result<Self::QueryResult, DriverError>> + Send + '_ {
        async move {
            let client = self
                .client
                .as_ref()
                .ok_or_else(|| DriverError::new("connection was never started"))?;

            let rows = match params {
                QueryParams::None => client.query(text, &[]).await,
                QueryParams::Positional(values) => {
                    let refs: Vec<&(dyn ToSql + Sync)> =
                        values.iter().map(|value| value as &(dyn ToSql + Sync)).collect();
                    client.query(text, &refs).await
                }
            };

            rows.map_err(to_driver_error)
        }
    }

    fn close(self) -> impl Future<Output = Result<(), DriverError>> + Send {
        async move {
            drop(self.client);
            if let Some(handle) = self.connection_task {
                let _ = handle.await;
            }
            Ok(())
        }
    }

    fn take_error(&mut self) -> Option<DriverError> {
        let rx = self.error_rx.as_mut()?;
        rx.borrow_and_update().clone()
    }

    fn destroy_transport(&mut self) {
        if let Some(handle) = self.connection_task.take() {
            handle.abort();
        }
        self.client = None;
    }
}
