//! Blocking face over an [`AsyncConnection`].
//!
//! Pool frameworks that only speak the synchronous DBAPI can still hold an
//! async connection: each call is driven to completion on a private
//! current-thread runtime, while the native work itself stays on the
//! connection's bridge worker.

#![allow(clippy::result_large_err)]

use crate::async_connection::{AsyncConnection, AsyncCursor};
use asupersync::runtime::{Runtime, RuntimeBuilder};
use jdbcbridge_core::{ColumnDescription, Error, Params, Result, Row};
use std::fmt;
use std::sync::Arc;

/// A synchronous connection backed by an [`AsyncConnection`].
pub struct BlockingConnection {
    conn: AsyncConnection,
    runtime: Arc<Runtime>,
}

impl fmt::Debug for BlockingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl BlockingConnection {
    pub fn new(conn: AsyncConnection) -> Result<Self> {
        let runtime = RuntimeBuilder::current_thread()
            .build()
            .map_err(|e| Error::internal(format!("failed to build blocking runtime: {:?}", e)))?;
        Ok(Self {
            conn,
            runtime: Arc::new(runtime),
        })
    }

    pub fn async_connection(&self) -> &AsyncConnection {
        &self.conn
    }

    pub fn into_async(self) -> AsyncConnection {
        self.conn
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    pub fn cursor(&self) -> Result<BlockingCursor> {
        let cursor = self.runtime.block_on(self.conn.open_cursor())?;
        Ok(BlockingCursor {
            cursor,
            runtime: Arc::clone(&self.runtime),
        })
    }

    pub fn commit(&self) -> Result<()> {
        self.runtime.block_on(self.conn.submit(|c| c.commit()))
    }

    pub fn rollback(&self) -> Result<()> {
        self.runtime.block_on(self.conn.submit(|c| c.rollback()))
    }

    pub fn autocommit(&self) -> Result<bool> {
        self.runtime.block_on(self.conn.submit(|c| c.autocommit()))
    }

    pub fn set_autocommit(&self, autocommit: bool) -> Result<()> {
        self.runtime
            .block_on(self.conn.submit(move |c| c.set_autocommit(autocommit)))
    }

    /// Close the connection. Closing twice is not an error.
    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.conn.close_now())
    }
}

/// A synchronous cursor backed by an [`AsyncCursor`].
pub struct BlockingCursor {
    cursor: AsyncCursor,
    runtime: Arc<Runtime>,
}

impl fmt::Debug for BlockingCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingCursor")
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl BlockingCursor {
    pub fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.cursor.description()
    }

    pub fn rowcount(&self) -> i64 {
        self.cursor.rowcount()
    }

    pub fn lastrowid(&self) -> Option<i64> {
        self.cursor.lastrowid()
    }

    pub fn arraysize(&self) -> usize {
        self.cursor.arraysize()
    }

    pub fn set_arraysize(&self, size: usize) {
        self.cursor.set_arraysize(size);
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    pub fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<()> {
        let sql = sql.to_string();
        let params = params.into();
        self.runtime
            .block_on(self.cursor.submit(move |c| c.execute(&sql, params).map(|_| ())))
    }

    pub fn executemany(&self, sql: &str, param_sets: Vec<Params>) -> Result<()> {
        let sql = sql.to_string();
        self.runtime.block_on(
            self.cursor
                .submit(move |c| c.executemany(&sql, param_sets).map(|_| ())),
        )
    }

    pub fn fetchone(&self) -> Result<Option<Row>> {
        self.runtime.block_on(self.cursor.submit(|c| c.fetchone()))
    }

    pub fn fetchmany(&self, size: Option<usize>) -> Result<Vec<Row>> {
        let size = size.unwrap_or_else(|| self.arraysize());
        self.runtime
            .block_on(self.cursor.submit(move |c| c.fetchmany(Some(size))))
    }

    pub fn fetchall(&self) -> Result<Vec<Row>> {
        self.runtime.block_on(self.cursor.submit(|c| c.fetchall()))
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.cursor.close_now())
    }
}
