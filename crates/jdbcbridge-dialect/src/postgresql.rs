//! PostgreSQL over JDBC.

#![allow(clippy::result_large_err)]

use crate::connection_url::ConnectionUrl;
use crate::dialect::Dialect;
use crate::settings::{
    DialectSettings, SYNC_DRIVER, async_sibling, postgresql_engine, resolve_jdbc_dialect,
};
use jdbcbridge_core::Result;
use std::sync::LazyLock;

static SETTINGS: LazyLock<DialectSettings> = LazyLock::new(|| {
    resolve_jdbc_dialect(
        DialectSettings {
            jdbc_dsn_prefix: Some(vec!["jdbc:postgresql:".to_string(), "//".to_string()]),
            ..DialectSettings::new("postgresql", SYNC_DRIVER)
        },
        &postgresql_engine(),
    )
});

static ASYNC_SETTINGS: LazyLock<DialectSettings> = LazyLock::new(|| async_sibling(&SETTINGS));

/// `jdbc:postgresql://host[:port]/database?user=..&password=..&`
fn postgresql_dsn(url: &ConnectionUrl) -> String {
    let mut dsn = String::from("jdbc:postgresql://");
    if let Some(host) = &url.host {
        dsn.push_str(host);
    }
    if let Some(port) = url.port {
        dsn.push_str(&format!(":{}", port));
    }
    dsn.push('/');
    if let Some(database) = &url.database {
        dsn.push_str(database);
    }
    dsn.push('?');
    if let Some(username) = &url.username {
        dsn.push_str(&format!("user={}&", username));
    }
    if let Some(password) = &url.password {
        dsn.push_str(&format!("password={}&", password));
    }
    dsn
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn settings(&self) -> &DialectSettings {
        &SETTINGS
    }

    fn parse_dsn_parts(&self, url: &ConnectionUrl) -> Result<(String, Vec<(String, String)>)> {
        Ok((postgresql_dsn(url), url.query.clone()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncPostgresDialect;

impl Dialect for AsyncPostgresDialect {
    fn settings(&self) -> &DialectSettings {
        &ASYNC_SETTINGS
    }

    fn parse_dsn_parts(&self, url: &ConnectionUrl) -> Result<(String, Vec<(String, String)>)> {
        Ok((postgresql_dsn(url), url.query.clone()))
    }
}
