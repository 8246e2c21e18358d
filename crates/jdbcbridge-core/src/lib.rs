//! Core types and contracts for JDBC Bridge.
//!
//! - [`Value`] / [`NativeValue`]: language-side and native-side values
//! - [`TypeRegistry`] and [`TypePipeline`]: bidirectional value conversion
//! - [`Error`] and [`translate`]: the DBAPI error taxonomy
//! - [`NativeRuntime`] and friends: what the bridge needs from a native driver runtime
//! - `Outcome` and `Cx` re-exported from asupersync for the async surface

pub use asupersync::{Cx, Outcome};

pub mod error;
pub mod native;
pub mod pipeline;
pub mod query;
pub mod row;
pub mod types;
pub mod value;

pub use error::{
    ConfigError, DriverError, DriverErrorKind, Error, LookupError, Result, TypeError, translate,
};
pub use native::{
    DriverLoader, DriverProperties, HasNativeDecode, NativeColumn, NativeConnection, NativeCursor,
    NativeDriver, NativeError, NativeErrorKind, NativeObject, NativeResult, NativeRuntime,
    NativeType, NativeValue,
};
pub use pipeline::{PipelineFactory, PipelineKey, TypePipeline, TypeRegistry};
pub use query::{Params, Query};
pub use row::{ColumnDescription, ColumnInfo, FromRow, FromValue, Row};
pub use types::{JdbcType, find_type_code};
pub use value::{Value, ValueType};

/// DBAPI level implemented.
pub const APILEVEL: &str = "2.0";

/// Threads may share the module and connections, not cursors.
pub const THREADSAFETY: u8 = 2;

pub const PARAMSTYLE: &str = "qmark";

/// Connection URL query key carrying a raw native DSN.
pub const JDBC_QUERY_DSN: &str = "jdbc_dsn";

/// Connection URL query key carrying the driver class name.
pub const JDBC_QUERY_DRIVER: &str = "jdbc_driver";

/// Connection URL query key carrying driver module paths.
pub const JDBC_QUERY_MODULES: &str = "jdbc_modules";
