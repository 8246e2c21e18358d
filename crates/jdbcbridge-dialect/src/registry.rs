//! Dialect lookup by name and driver, and conversion between native DSNs and
//! connection URLs.

#![allow(clippy::result_large_err)]

use crate::connection_url::ConnectionUrl;
use crate::dialect::Dialect;
use crate::mssql::MssqlDialect;
use crate::postgresql::{AsyncPostgresDialect, PostgresDialect};
use crate::sqlite::{AsyncSqliteDialect, SqliteDialect};
use jdbcbridge::{ConnectArgs, DbConnection};
use jdbcbridge_core::{Error, JDBC_QUERY_DRIVER, JDBC_QUERY_DSN, JDBC_QUERY_MODULES, Result};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

static GLOBAL: LazyLock<DialectRegistry> = LazyLock::new(DialectRegistry::with_builtins);

/// Registered dialects, in registration order.
pub struct DialectRegistry {
    dialects: RwLock<Vec<Arc<dyn Dialect>>>,
}

impl fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectRegistry")
            .field("dialects", &self.descriptions())
            .finish()
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DialectRegistry {
    pub fn new() -> Self {
        Self {
            dialects: RwLock::new(Vec::new()),
        }
    }

    /// A registry holding the SQLite, PostgreSQL and SQL Server dialects.
    ///
    /// Sync dialects come first so DSN lookup prefers them.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(SqliteDialect));
        registry.register(Arc::new(PostgresDialect));
        registry.register(Arc::new(MssqlDialect));
        registry.register(Arc::new(AsyncSqliteDialect));
        registry.register(Arc::new(AsyncPostgresDialect));
        registry
    }

    pub fn global() -> &'static DialectRegistry {
        &GLOBAL
    }

    /// Register `dialect`, replacing any dialect with the same name and driver.
    pub fn register(&self, dialect: Arc<dyn Dialect>) {
        let mut dialects = self.dialects.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(
            dialect = %dialect.settings().description(),
            prefix = %dialect.settings().dsn_prefix(),
            "registering dialect"
        );
        match dialects
            .iter()
            .position(|d| d.name() == dialect.name() && d.driver() == dialect.driver())
        {
            Some(index) => dialects[index] = dialect,
            None => dialects.push(dialect),
        }
    }

    /// `name+driver` of every registered dialect.
    pub fn descriptions(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|d| d.settings().description())
            .collect()
    }

    pub fn get(&self, name: &str, driver: &str) -> Option<Arc<dyn Dialect>> {
        self.snapshot()
            .into_iter()
            .find(|d| d.name() == name && d.driver() == driver)
    }

    /// The dialect named by `url`'s backend and driver.
    pub fn for_url(&self, url: &ConnectionUrl) -> Result<Arc<dyn Dialect>> {
        url.driver
            .as_deref()
            .and_then(|driver| self.get(&url.backend, driver))
            .ok_or_else(|| Error::config(format!("Unknown JDBC URL: {}", url)))
    }

    /// The dialect whose DSN prefix `dsn` carries.
    ///
    /// Candidates are those whose first prefix token matches; among them the
    /// first whose whole prefix matches wins.
    pub fn for_dsn(&self, dsn: &str) -> Result<Arc<dyn Dialect>> {
        let candidates: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|d| {
                d.settings()
                    .jdbc_dsn_prefix
                    .as_deref()
                    .and_then(|tokens| tokens.first())
                    .is_some_and(|first| dsn.starts_with(first.as_str()))
            })
            .collect();
        let full_match = candidates
            .iter()
            .position(|d| dsn.starts_with(&d.settings().dsn_prefix()));
        let chosen = match full_match {
            Some(index) => candidates.into_iter().nth(index),
            None => candidates.into_iter().next(),
        };
        chosen.ok_or_else(|| Error::config(format!("Unknown JDBC DSN: {}", dsn)))
    }

    pub fn dsn_to_url(&self, dsn: &str) -> Result<ConnectionUrl> {
        self.for_dsn(dsn)?.url_for_dsn(dsn)
    }

    /// Native DSN for `url`, plus the query parameters left for the connect call.
    pub fn url_to_dsn(&self, url: &ConnectionUrl) -> Result<(String, Vec<(String, String)>)> {
        self.for_url(url)?.parse_dsn_parts(url)
    }

    pub fn create_connect_args(&self, url: &ConnectionUrl) -> Result<ConnectArgs> {
        self.for_url(url)?.create_connect_args(url)
    }

    fn snapshot(&self) -> Vec<Arc<dyn Dialect>> {
        self.dialects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// [`DialectRegistry::dsn_to_url`] on the global registry.
pub fn dsn_to_url(dsn: &str) -> Result<ConnectionUrl> {
    DialectRegistry::global().dsn_to_url(dsn)
}

/// [`DialectRegistry::url_to_dsn`] on the global registry.
pub fn url_to_dsn(url: &ConnectionUrl) -> Result<(String, Vec<(String, String)>)> {
    DialectRegistry::global().url_to_dsn(url)
}

/// A connection URL for a native DSN: the dialect's bare URL carrying the DSN
/// as `jdbc_dsn`, plus the driver class and module paths.
pub fn create_url<P: AsRef<Path>>(
    dsn: &str,
    driver: &str,
    modules: impl IntoIterator<Item = P>,
) -> Result<ConnectionUrl> {
    let dialect = DialectRegistry::global().for_dsn(dsn)?;
    let mut url = ConnectionUrl::new(dialect.name(), Some(dialect.driver()))
        .with_query_param(JDBC_QUERY_DSN, dsn)
        .with_query_param(JDBC_QUERY_DRIVER, driver);
    for module in modules {
        url = url.with_query_param(
            JDBC_QUERY_MODULES,
            module.as_ref().to_string_lossy().into_owned(),
        );
    }
    Ok(url)
}

/// Connect through the global registry and the global bridge context.
pub fn connect_url(url: &str) -> Result<DbConnection> {
    let url = ConnectionUrl::parse(url)?;
    let args = DialectRegistry::global().create_connect_args(&url)?;
    jdbcbridge::connect(args)
}
