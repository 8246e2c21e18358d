//! Synchronous DBAPI cursor.
//!
//! A [`Cursor`] executes statements on its connection's native handle and
//! decodes fetched rows through the context's type registry. Column
//! descriptions pick the decoding pipeline; values the declared pipeline
//! cannot take fall back to their native type.
//!
//! Cursors are `Send` but not shareable: methods that touch the native handle
//! take `&mut self`.

#![allow(clippy::result_large_err)]

use crate::connection::Connection;
use jdbcbridge_core::{
    ColumnDescription, ColumnInfo, Error, FromRow, NativeCursor, NativeValue, Params, Query,
    Result, Row, Value, translate,
};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::ThreadId;

/// A DBAPI cursor.
pub struct Cursor {
    conn: Connection,
    native: Box<dyn NativeCursor>,
    closed: bool,
    arraysize: usize,
    rowcount: i64,
    lastrowid: Option<i64>,
    description: Option<Vec<ColumnDescription>>,
    columns: Option<Arc<ColumnInfo>>,
    thread_id: ThreadId,
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("closed", &self.is_closed())
            .field("arraysize", &self.arraysize)
            .field("rowcount", &self.rowcount)
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl Cursor {
    pub(crate) fn new(conn: Connection, native: Box<dyn NativeCursor>) -> Self {
        Self {
            conn,
            native,
            closed: false,
            arraysize: 1,
            rowcount: -1,
            lastrowid: None,
            description: None,
            columns: None,
            thread_id: std::thread::current().id(),
        }
    }

    /// The connection this cursor was opened on.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Result metadata of the last statement, `None` if it produced no rows
    /// or nothing has run yet.
    pub fn description(&self) -> Option<&[ColumnDescription]> {
        self.description.as_deref()
    }

    /// Rows affected by the last DML statement, -1 when unknown.
    pub fn rowcount(&self) -> i64 {
        self.rowcount
    }

    /// Row id of the last inserted row, if the driver reports one.
    pub fn lastrowid(&self) -> Option<i64> {
        self.lastrowid
    }

    /// Rows returned by [`Cursor::fetchmany`] when no size is given.
    pub fn arraysize(&self) -> usize {
        self.arraysize
    }

    /// Set the default fetch batch size; zero is treated as one.
    pub fn set_arraysize(&mut self, size: usize) {
        self.arraysize = size.max(1);
    }

    /// Thread that last made a native call through this cursor.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Record the thread making native calls for this cursor.
    pub fn set_thread_id(&mut self, id: ThreadId) {
        self.thread_id = id;
    }

    /// `true` if closed here, or if the native cursor or connection was
    /// closed underneath it.
    pub fn is_closed(&self) -> bool {
        self.closed || self.native.is_closed()
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.conn.is_closed() {
            return Err(Error::interface("Connection is closed"));
        }
        if self.is_closed() {
            return Err(Error::interface("Cursor is closed"));
        }
        self.thread_id = std::thread::current().id();
        Ok(())
    }

    fn encode(&self, params: Params) -> Result<Vec<NativeValue>> {
        let registry = self.conn.context().registry();
        params
            .into_positional()
            .iter()
            .map(|value| registry.encode(value))
            .collect()
    }

    fn reset_results(&mut self) {
        self.description = self
            .native
            .columns()
            .map(|cols| cols.iter().map(ColumnDescription::from).collect::<Vec<_>>());
        self.columns = self.description.as_deref().map(|desc| {
            Arc::new(ColumnInfo::from_description(desc))
        });
        self.rowcount = self.native.update_count();
        self.lastrowid = self.native.last_row_id();
    }

    /// Execute a statement with positional or named parameters.
    ///
    /// Named parameters are bound in insertion order.
    pub fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<&mut Self> {
        self.ensure_open()?;
        let values = self.encode(params.into())?;
        tracing::trace!(sql, params = values.len(), "execute");
        translate(|| self.native.execute(sql, &values))?;
        self.reset_results();
        Ok(self)
    }

    /// Execute a statement once per parameter set, as one native batch.
    pub fn executemany<I, P>(&mut self, sql: &str, param_sets: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        self.ensure_open()?;
        let batches = param_sets
            .into_iter()
            .map(|p| self.encode(p.into()))
            .collect::<Result<Vec<_>>>()?;
        tracing::trace!(sql, batches = batches.len(), "executemany");
        translate(|| self.native.execute_batch(sql, &batches))?;
        self.reset_results();
        Ok(self)
    }

    /// Execute a typed statement; the returned view fetches `R`.
    pub fn execute_query<R: FromRow>(
        &mut self,
        query: &Query<R>,
        params: impl Into<Params>,
    ) -> Result<TypedCursor<'_, R>> {
        self.execute(query.sql(), params)?;
        Ok(TypedCursor {
            cursor: self,
            _row: PhantomData,
        })
    }

    /// Call a stored procedure, returning the parameters unchanged.
    pub fn callproc(&mut self, name: &str, params: impl Into<Params>) -> Result<Vec<Value>> {
        let values = params.into().into_positional();
        let placeholders = vec!["?"; values.len()].join(", ");
        self.execute(
            &format!("CALL {}({})", name, placeholders),
            values.clone(),
        )?;
        Ok(values)
    }

    fn decode_row(&self, native: Vec<NativeValue>) -> Result<Row> {
        let (Some(desc), Some(columns)) = (self.description.as_deref(), self.columns.as_ref())
        else {
            return Err(Error::programming("No result set"));
        };
        let registry = self.conn.context().registry();
        let values = native
            .into_iter()
            .zip(desc)
            .map(|(value, col)| registry.decode_column(col.type_code, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Row::with_columns(Arc::clone(columns), values))
    }

    /// Next row of the current result set, `None` when exhausted.
    pub fn fetchone(&mut self) -> Result<Option<Row>> {
        self.ensure_open()?;
        if self.description.is_none() {
            return Err(Error::programming("No result set"));
        }
        match translate(|| self.native.fetch_next())? {
            Some(native) => self.decode_row(native).map(Some),
            None => Ok(None),
        }
    }

    /// Up to `size` rows (default [`Cursor::arraysize`]); fewer only at the
    /// end of the result set.
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>> {
        let size = size.unwrap_or(self.arraysize);
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match self.fetchone()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        tracing::trace!(requested = size, fetched = rows.len(), "fetchmany");
        Ok(rows)
    }

    /// All remaining rows.
    pub fn fetchall(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        tracing::trace!(fetched = rows.len(), "fetchall");
        Ok(rows)
    }

    /// Same as [`Cursor::fetchone`]. The cursor does not implement `Iterator`.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        self.fetchone()
    }

    /// Cursor iteration is not supported; use the fetch methods.
    pub fn iter(&mut self) -> Result<std::iter::Empty<Row>> {
        Err(Error::not_supported("cursor iteration is not supported"))
    }

    /// There is never a further result set.
    pub fn nextset(&mut self) -> Option<bool> {
        None
    }

    /// Accepted and ignored.
    pub fn setinputsizes(&mut self, _sizes: &[usize]) {}

    /// Accepted and ignored.
    pub fn setoutputsize(&mut self, _size: usize, _column: Option<usize>) {}

    /// Release the native statement. Closing twice is not an error.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.description = None;
        self.columns = None;
        if self.native.is_closed() {
            return Ok(());
        }
        translate(|| self.native.close())
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "error closing dropped cursor");
        }
    }
}

/// A cursor view that fetches rows as `R`.
pub struct TypedCursor<'c, R> {
    cursor: &'c mut Cursor,
    _row: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for TypedCursor<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCursor")
            .field("cursor", &self.cursor)
            .field("row", &std::any::type_name::<R>())
            .finish()
    }
}

impl<R: FromRow> TypedCursor<'_, R> {
    pub fn description(&self) -> Option<&[ColumnDescription]> {
        self.cursor.description()
    }

    /// Rows affected by the last statement, -1 when unknown.
    pub fn rowcount(&self) -> i64 {
        self.cursor.rowcount()
    }

    /// Next row as `R`.
    pub fn fetchone(&mut self) -> Result<Option<R>> {
        self.cursor.fetchone()?.map(R::from_row).transpose()
    }

    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<R>> {
        self.cursor
            .fetchmany(size)?
            .into_iter()
            .map(R::from_row)
            .collect()
    }

    /// All remaining rows as `R`.
    pub fn fetchall(&mut self) -> Result<Vec<R>> {
        self.cursor
            .fetchall()?
            .into_iter()
            .map(R::from_row)
            .collect()
    }
}
