//! The `Dialect` trait: how an engine framework talks to a JDBC-backed engine.

#![allow(clippy::result_large_err)]

use crate::connection_url::ConnectionUrl;
use crate::convert::DsnConvertor;
use crate::settings::DialectSettings;
use jdbcbridge::{
    AsyncConnection, AsyncCursor, BlockingConnection, BlockingCursor, ConnectArgs, Connection,
    Cursor,
};
use jdbcbridge_core::{
    Error, JDBC_QUERY_DRIVER, JDBC_QUERY_DSN, JDBC_QUERY_MODULES, Result, Value, ValueType,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Isolation level that switches native autocommit on.
pub const AUTOCOMMIT: &str = "AUTOCOMMIT";

/// Connection pool an engine framework should use for a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolClass {
    Queue,
    AsyncAdaptedQueue,
    FallbackAsyncAdaptedQueue,
}

/// Anything whose liveness a dialect can check.
pub trait IsClosed {
    fn is_closed(&self) -> bool;
}

impl IsClosed for Connection {
    fn is_closed(&self) -> bool {
        Connection::is_closed(self)
    }
}

impl IsClosed for Cursor {
    fn is_closed(&self) -> bool {
        Cursor::is_closed(self)
    }
}

impl IsClosed for AsyncConnection {
    fn is_closed(&self) -> bool {
        AsyncConnection::is_closed(self)
    }
}

impl IsClosed for AsyncCursor {
    fn is_closed(&self) -> bool {
        AsyncCursor::is_closed(self)
    }
}

impl IsClosed for BlockingConnection {
    fn is_closed(&self) -> bool {
        BlockingConnection::is_closed(self)
    }
}

impl IsClosed for BlockingCursor {
    fn is_closed(&self) -> bool {
        BlockingCursor::is_closed(self)
    }
}

/// A synchronous connection whose autocommit mode can be switched.
pub trait Autocommit {
    fn set_autocommit(&self, autocommit: bool) -> Result<()>;
}

impl Autocommit for Connection {
    fn set_autocommit(&self, autocommit: bool) -> Result<()> {
        Connection::set_autocommit(self, autocommit)
    }
}

impl Autocommit for BlockingConnection {
    fn set_autocommit(&self, autocommit: bool) -> Result<()> {
        BlockingConnection::set_autocommit(self, autocommit)
    }
}

/// A JDBC-backed dialect.
///
/// Implementors supply their resolved [`DialectSettings`] and
/// [`Dialect::parse_dsn_parts`]; everything else has a default.
pub trait Dialect: fmt::Debug + Send + Sync {
    fn settings(&self) -> &DialectSettings;

    /// Native DSN for `url`, plus the query parameters left for the connect call.
    fn parse_dsn_parts(&self, url: &ConnectionUrl) -> Result<(String, Vec<(String, String)>)>;

    fn name(&self) -> &str {
        &self.settings().name
    }

    fn driver(&self) -> &str {
        &self.settings().driver
    }

    fn is_async(&self) -> bool {
        self.settings().is_async()
    }

    /// Rewrites the tail of a native DSN (after the prefix) into a URL tail.
    fn dsn_convertor(&self) -> Option<&DsnConvertor> {
        None
    }

    /// Connection URL equivalent to a native DSN carrying this dialect's prefix.
    fn url_for_dsn(&self, dsn: &str) -> Result<ConnectionUrl> {
        let prefix = self.settings().dsn_prefix();
        let tail = dsn.strip_prefix(prefix.as_str()).unwrap_or(dsn);
        let tail = tail.strip_prefix("://").unwrap_or(tail);
        let tail = match self.dsn_convertor() {
            Some(convertor) => convertor.convert(tail),
            None => tail.to_string(),
        };
        ConnectionUrl::parse(&format!("{}://{}", self.settings().description(), tail))
    }

    fn create_connect_args(&self, url: &ConnectionUrl) -> Result<ConnectArgs> {
        let (dsn, query) = self.parse_dsn_parts(url)?;
        build_connect_args(self, dsn, query)
    }

    /// `true` when a failure left the connection (or, lacking one, the
    /// cursor) closed.
    fn is_disconnect(
        &self,
        _error: &Error,
        connection: Option<&dyn IsClosed>,
        cursor: Option<&dyn IsClosed>,
    ) -> bool {
        match (connection, cursor) {
            (Some(conn), _) => conn.is_closed(),
            (None, Some(cursor)) => cursor.is_closed(),
            (None, None) => false,
        }
    }

    fn set_isolation_level(&self, connection: &dyn Autocommit, level: &str) -> Result<()> {
        let autocommit = level.eq_ignore_ascii_case(AUTOCOMMIT);
        tracing::debug!(dialect = %self.settings().description(), level, autocommit, "setting isolation level");
        connection.set_autocommit(autocommit)
    }

    fn pool_class(&self, url: &ConnectionUrl) -> PoolClass {
        if !self.is_async() {
            return PoolClass::Queue;
        }
        if url.query_value("async_fallback").is_some_and(as_bool) {
            PoolClass::FallbackAsyncAdaptedQueue
        } else {
            PoolClass::AsyncAdaptedQueue
        }
    }

    /// Apply this dialect's result processor for `value_type`, if any.
    fn process_result(&self, value_type: ValueType, value: Value) -> Value {
        match self.settings().colspec(value_type) {
            Some(processor) => processor.apply(value),
            None => value,
        }
    }
}

/// Truthiness of a query string flag.
pub fn as_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "y" | "t" | "1"
    )
}

/// Map a native DSN and the remaining query parameters into connect arguments.
///
/// A `jdbc_dsn` parameter replaces the DSN outright: it is turned back into a
/// connection URL for `dialect`, its own query taking precedence over the
/// remaining parameters, and resolved again from there.
pub fn build_connect_args<D: Dialect + ?Sized>(
    dialect: &D,
    dsn: String,
    mut query: Vec<(String, String)>,
) -> Result<ConnectArgs> {
    if let Some(raw) = take_first(&mut query, JDBC_QUERY_DSN) {
        let url = dialect.url_for_dsn(&raw)?;
        query.retain(|(k, _)| !url.query.iter().any(|(uk, _)| uk == k));
        let mut merged = query;
        merged.extend(url.query.iter().cloned());
        return dialect.create_connect_args(&url.with_query(merged));
    }

    let driver = take_first(&mut query, JDBC_QUERY_DRIVER).ok_or_else(|| {
        Error::operational("The `jdbc_driver` key is required in the query string")
    })?;

    let modules: Vec<PathBuf> = take_all(&mut query, JDBC_QUERY_MODULES)
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|module| !module.is_empty())
        .map(PathBuf::from)
        .collect();

    let mut driver_args: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    for (key, value) in query {
        match driver_args.remove(&key) {
            None => {
                driver_args.insert(key, serde_json::Value::String(value));
            }
            Some(serde_json::Value::Array(mut values)) => {
                values.push(serde_json::Value::String(value));
                driver_args.insert(key, serde_json::Value::Array(values));
            }
            Some(previous) => {
                let values = vec![previous, serde_json::Value::String(value)];
                driver_args.insert(key, serde_json::Value::Array(values));
            }
        }
    }

    Ok(ConnectArgs {
        dsn,
        driver,
        modules,
        driver_args,
        is_async: dialect.is_async(),
    })
}

fn take_first(query: &mut Vec<(String, String)>, key: &str) -> Option<String> {
    let index = query.iter().position(|(k, _)| k == key)?;
    let (_, value) = query.remove(index);
    Some(value)
}

fn take_all(query: &mut Vec<(String, String)>, key: &str) -> Vec<String> {
    let mut taken = Vec::new();
    query.retain(|(k, v)| {
        if k == key {
            taken.push(v.clone());
            false
        } else {
            true
        }
    });
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DialectSettings, merge_settings, postgresql_engine, resolve_jdbc_dialect};
    use std::cell::Cell;

    #[derive(Debug)]
    struct Plain {
        settings: DialectSettings,
    }

    impl Plain {
        fn new(is_async: bool) -> Self {
            let own = DialectSettings {
                jdbc_dsn_prefix: Some(vec!["jdbc:plain:".to_string(), "//".to_string()]),
                ..DialectSettings::new("plain", "jdbc_wrapper")
            };
            let settings = resolve_jdbc_dialect(own, &postgresql_engine());
            let settings = if is_async {
                merge_settings(
                    DialectSettings {
                        is_async: Some(true),
                        ..DialectSettings::new("plain", "jdbc_async_wrapper")
                    },
                    &settings,
                )
            } else {
                settings
            };
            Self { settings }
        }
    }

    impl Dialect for Plain {
        fn settings(&self) -> &DialectSettings {
            &self.settings
        }

        fn parse_dsn_parts(&self, url: &ConnectionUrl) -> Result<(String, Vec<(String, String)>)> {
            let dsn = format!(
                "jdbc:plain://{}/{}",
                url.host.as_deref().unwrap_or_default(),
                url.database.as_deref().unwrap_or_default()
            );
            Ok((dsn, url.query.clone()))
        }
    }

    struct Handle(bool);

    impl IsClosed for Handle {
        fn is_closed(&self) -> bool {
            self.0
        }
    }

    struct Recorder(Cell<Option<bool>>);

    impl Autocommit for Recorder {
        fn set_autocommit(&self, autocommit: bool) -> Result<()> {
            self.0.set(Some(autocommit));
            Ok(())
        }
    }

    #[test]
    fn test_connect_args_from_query() {
        let url = ConnectionUrl::parse(
            "plain+jdbc_wrapper://h/db?jdbc_driver=org.Plain&jdbc_modules=a.jar,b.jar&jdbc_modules=c.jar&ssl=true",
        )
        .unwrap();
        let args = Plain::new(false).create_connect_args(&url).unwrap();
        assert_eq!(args.dsn, "jdbc:plain://h/db");
        assert_eq!(args.driver, "org.Plain");
        assert_eq!(
            args.modules,
            vec![
                PathBuf::from("a.jar"),
                PathBuf::from("b.jar"),
                PathBuf::from("c.jar")
            ]
        );
        assert_eq!(args.driver_args.len(), 1);
        assert_eq!(args.driver_args["ssl"], "true");
        assert!(!args.is_async);
    }

    #[test]
    fn test_missing_driver_is_operational_error() {
        let url = ConnectionUrl::parse("plain+jdbc_wrapper://h/db").unwrap();
        let err = Plain::new(false).create_connect_args(&url).unwrap_err();
        assert!(err.is_operational_error());
        assert!(err.to_string().contains("`jdbc_driver` key is required"));
    }

    #[test]
    fn test_repeated_driver_args_become_lists() {
        let url = ConnectionUrl::parse(
            "plain+jdbc_wrapper://h/db?jdbc_driver=d&opt=1&opt=2&opt=3",
        )
        .unwrap();
        let args = Plain::new(false).create_connect_args(&url).unwrap();
        assert_eq!(args.driver_args["opt"], serde_json::json!(["1", "2", "3"]));
    }

    #[test]
    fn test_raw_dsn_override() {
        let url = ConnectionUrl::parse(
            "plain+jdbc_wrapper://?jdbc_dsn=jdbc%3Aplain%3A%2F%2Fother%2Fwarehouse%3Fjdbc_driver%3Dinner&jdbc_driver=outer&ssl=1",
        )
        .unwrap();
        let args = Plain::new(true).create_connect_args(&url).unwrap();
        assert_eq!(args.dsn, "jdbc:plain://other/warehouse");
        // the raw DSN's own query wins
        assert_eq!(args.driver, "inner");
        assert_eq!(args.driver_args["ssl"], "1");
        assert!(args.is_async);
    }

    #[test]
    fn test_is_disconnect_prefers_connection() {
        let dialect = Plain::new(false);
        let err = Error::operational("boom");
        let open = Handle(false);
        let closed = Handle(true);
        assert!(!dialect.is_disconnect(&err, Some(&open), Some(&closed)));
        assert!(dialect.is_disconnect(&err, Some(&closed), Some(&open)));
        assert!(dialect.is_disconnect(&err, None, Some(&closed)));
        assert!(!dialect.is_disconnect(&err, None, Some(&open)));
        assert!(!dialect.is_disconnect(&err, None, None));
    }

    #[test]
    fn test_isolation_level_toggles_autocommit() {
        let dialect = Plain::new(false);
        let conn = Recorder(Cell::new(None));
        dialect.set_isolation_level(&conn, "AUTOCOMMIT").unwrap();
        assert_eq!(conn.0.get(), Some(true));
        dialect.set_isolation_level(&conn, "SERIALIZABLE").unwrap();
        assert_eq!(conn.0.get(), Some(false));
    }

    #[test]
    fn test_pool_class() {
        let url = ConnectionUrl::parse("plain+jdbc_wrapper://h/db").unwrap();
        assert_eq!(Plain::new(false).pool_class(&url), PoolClass::Queue);
        assert_eq!(Plain::new(true).pool_class(&url), PoolClass::AsyncAdaptedQueue);
        let fallback = url.clone().with_query_param("async_fallback", "Yes");
        assert_eq!(
            Plain::new(true).pool_class(&fallback),
            PoolClass::FallbackAsyncAdaptedQueue
        );
        let off = url.with_query_param("async_fallback", "false");
        assert_eq!(Plain::new(true).pool_class(&off), PoolClass::AsyncAdaptedQueue);
        assert_eq!(Plain::new(false).pool_class(&fallback), PoolClass::Queue);
    }

    #[test]
    fn test_as_bool() {
        for yes in ["true", "1", "YES", " on ", "t", "y"] {
            assert!(as_bool(yes), "{yes}");
        }
        for no in ["false", "0", "no", "", "maybe"] {
            assert!(!as_bool(no), "{no}");
        }
    }
}
