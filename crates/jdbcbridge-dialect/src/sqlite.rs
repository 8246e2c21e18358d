//! SQLite over JDBC: DSN `jdbc:sqlite:<absolute path>` or `jdbc:sqlite::memory:`.

#![allow(clippy::result_large_err)]

use crate::connection_url::ConnectionUrl;
use crate::convert::DsnConvertor;
use crate::dialect::Dialect;
use crate::settings::{
    ColumnProcessor, DialectSettings, SYNC_DRIVER, async_sibling, resolve_jdbc_dialect,
    sqlite_engine,
};
use jdbcbridge_core::{Error, Result, ValueType};
use std::path::Path;
use std::sync::LazyLock;

pub const SQLITE_DSN_PREFIX: &str = "jdbc:sqlite:";

const MEMORY: &str = ":memory:";

static SETTINGS: LazyLock<DialectSettings> = LazyLock::new(|| {
    resolve_jdbc_dialect(
        DialectSettings {
            jdbc_dsn_prefix: Some(vec![SQLITE_DSN_PREFIX.to_string()]),
            colspecs: Some(vec![
                (ValueType::Timestamp, ColumnProcessor::DateAsTimestamp),
                (ValueType::Date, ColumnProcessor::Passthrough),
                (ValueType::Time, ColumnProcessor::Passthrough),
            ]),
            is_async: Some(false),
            ..DialectSettings::new("sqlite", SYNC_DRIVER)
        },
        &sqlite_engine(),
    )
});

static ASYNC_SETTINGS: LazyLock<DialectSettings> = LazyLock::new(|| async_sibling(&SETTINGS));

// a DSN path becomes the URL's database, which drops one leading '/'
static CONVERTOR: LazyLock<DsnConvertor> =
    LazyLock::new(|| DsnConvertor::function(|tail| format!("/{}", tail)));

fn sqlite_dsn(url: &ConnectionUrl) -> Result<(String, Vec<(String, String)>)> {
    let dsn = match url.database.as_deref() {
        None | Some(MEMORY) => format!("{}{}", SQLITE_DSN_PREFIX, MEMORY),
        Some(database) => {
            let path = std::path::absolute(Path::new(database)).map_err(Error::Io)?;
            format!("{}{}", SQLITE_DSN_PREFIX, path.display())
        }
    };
    Ok((dsn, url.query.clone()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn settings(&self) -> &DialectSettings {
        &SETTINGS
    }

    fn parse_dsn_parts(&self, url: &ConnectionUrl) -> Result<(String, Vec<(String, String)>)> {
        sqlite_dsn(url)
    }

    fn dsn_convertor(&self) -> Option<&DsnConvertor> {
        Some(&*CONVERTOR)
    }
}

/// [`SqliteDialect`] for async callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncSqliteDialect;

impl Dialect for AsyncSqliteDialect {
    fn settings(&self) -> &DialectSettings {
        &ASYNC_SETTINGS
    }

    fn parse_dsn_parts(&self, url: &ConnectionUrl) -> Result<(String, Vec<(String, String)>)> {
        sqlite_dsn(url)
    }

    fn dsn_convertor(&self) -> Option<&DsnConvertor> {
        Some(&*CONVERTOR)
    }
}
