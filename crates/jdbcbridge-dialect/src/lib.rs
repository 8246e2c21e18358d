//! Engine-framework dialects for JDBC Bridge.
//!
//! A dialect maps a connection URL such as
//! `sqlite+jdbc_wrapper:////srv/app.db?jdbc_driver=org.sqlite.JDBC` onto the
//! [`ConnectArgs`] of a bridge connection, and reports the capabilities of the
//! engine behind it as resolved [`DialectSettings`].
//!
//! - [`settings`]: optional capability fields and their inheritance
//! - [`Dialect`]: connect arguments, disconnect detection, isolation level, pool class
//! - [`SqliteDialect`], [`PostgresDialect`], [`MssqlDialect`] and the async siblings
//! - [`DialectRegistry`]: lookup by `name+driver`, DSN / URL conversion
//! - [`ArtifactLoader`]: where a dialect's driver modules come from
//!
//! ```ignore
//! use jdbcbridge_dialect::connect_url;
//!
//! let conn = connect_url("sqlite+jdbc_wrapper://?jdbc_driver=org.sqlite.JDBC")?;
//! ```

pub mod connection_url;
pub mod convert;
pub mod dialect;
pub mod loader;
pub mod mssql;
pub mod postgresql;
pub mod registry;
pub mod settings;
pub mod sqlite;

pub use connection_url::ConnectionUrl;
pub use convert::DsnConvertor;
pub use dialect::{
    AUTOCOMMIT, Autocommit, Dialect, IsClosed, PoolClass, as_bool, build_connect_args,
};
pub use loader::{ArtifactLoader, LocalArtifacts};
pub use mssql::MssqlDialect;
pub use postgresql::{AsyncPostgresDialect, PostgresDialect};
pub use registry::{DialectRegistry, connect_url, create_url, dsn_to_url, url_to_dsn};
pub use settings::{ColumnProcessor, DialectSettings, merge_settings};
pub use sqlite::{AsyncSqliteDialect, SqliteDialect};

pub use jdbcbridge::ConnectArgs;
