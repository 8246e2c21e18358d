//! DBAPI-style connections over thread-affine native drivers.
//!
//! `jdbcbridge` exposes native database drivers through the familiar
//! connection / cursor API, both synchronously and to async callers.
//!
//! - [`Context`]: process-wide runtime state, type registry and driver cache
//! - [`Connection`] / [`Cursor`]: the synchronous API
//! - [`AsyncConnection`] / [`AsyncCursor`]: the same API for async callers,
//!   with every native call dispatched through a [`Bridge`] worker thread
//! - [`BlockingConnection`]: a synchronous face over an async connection
//!
//! # Example
//!
//! ```ignore
//! use jdbcbridge::{ConnectArgs, Value, connect};
//!
//! let conn = connect(ConnectArgs::new("jdbc:sqlite::memory:", "org.sqlite.JDBC"))?
//!     .into_sync()
//!     .unwrap();
//! let mut cur = conn.cursor()?;
//! cur.execute("SELECT ?", vec![Value::Int(1)])?;
//! let row = cur.fetchone()?;
//! ```

pub mod async_connection;
pub mod blocking;
pub mod bridge;
pub mod connection;
pub mod context;
pub mod cursor;

pub use async_connection::{AsyncConnection, AsyncCursor};
pub use blocking::{BlockingConnection, BlockingCursor};
pub use bridge::{Bridge, Completion};
pub use connection::Connection;
pub use context::{ConnectArgs, Context, DbConnection, connect};
pub use cursor::{Cursor, TypedCursor};

pub use jdbcbridge_core::{
    APILEVEL, ColumnDescription, Cx, DriverError, DriverErrorKind, Error, FromRow, FromValue,
    JDBC_QUERY_DRIVER, JDBC_QUERY_DSN, JDBC_QUERY_MODULES, Outcome, PARAMSTYLE, Params, Query,
    Result, Row, THREADSAFETY, TypeRegistry, Value, ValueType,
};
