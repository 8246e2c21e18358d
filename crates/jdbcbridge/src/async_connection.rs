//! Async connection and cursor over a [`Bridge`].
//!
//! Every native call is dispatched to the connection's bridge worker. Each
//! operation checks its `Cx` before dispatch and reports
//! `Outcome::Cancelled` without touching native state; once dispatched, an
//! operation always completes on the worker.
//!
//! When a native call fails, the connection is closed on the worker before
//! the error is returned. Errors raised by this layer itself, such as a fetch
//! with no result set or a type registry miss, leave the connection open.

#![allow(clippy::result_large_err)]

use crate::bridge::{Bridge, Completion};
use crate::connection::Connection;
use crate::context::{ConnectArgs, Context};
use crate::cursor::Cursor;
use asupersync::{Cx, Outcome};
use jdbcbridge_core::{ColumnDescription, Error, Params, Result, Row};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

fn outcome<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(value) => Outcome::Ok(value),
        Err(e) => Outcome::Err(e),
    }
}

fn closed_error() -> Error {
    Error::interface("Connection is closed")
}

/// Close `conn` after `error`, swallowing failures.
fn close_after_error(conn: &Connection, closed: &AtomicBool, error: &Error) {
    if error.native_cause().is_none() || closed.swap(true, Ordering::AcqRel) {
        return;
    }
    tracing::warn!(dsn = conn.dsn(), error = %error, "closing connection after native error");
    if let Err(e) = conn.close() {
        tracing::warn!(dsn = conn.dsn(), error = %e, "error closing connection after native error");
    }
}

struct AsyncInner {
    bridge: Bridge,
    conn: Connection,
    /// Set once a close has been requested; refuses new submissions.
    closing: AtomicBool,
    /// Set on the worker once the native connection is closed.
    closed: Arc<AtomicBool>,
}

impl Drop for AsyncInner {
    fn drop(&mut self) {
        if self.closing.swap(true, Ordering::AcqRel) || self.closed.load(Ordering::Acquire) {
            return;
        }
        let conn = self.conn.clone();
        let closed = Arc::clone(&self.closed);
        // runs on the worker ahead of its shutdown; nobody awaits it
        drop(self.bridge.run(move || {
            if closed.swap(true, Ordering::AcqRel) {
                return;
            }
            if let Err(e) = conn.close() {
                tracing::warn!(dsn = conn.dsn(), error = %e, "error closing dropped connection");
            }
        }));
    }
}

/// An async connection. Clones share the connection and its worker.
#[derive(Clone)]
pub struct AsyncConnection {
    inner: Arc<AsyncInner>,
}

impl fmt::Debug for AsyncConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncConnection")
            .field("dsn", &self.dsn())
            .field("bridge", &self.inner.bridge)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AsyncConnection {
    fn from_parts(bridge: Bridge, conn: Connection) -> Self {
        Self {
            inner: Arc::new(AsyncInner {
                bridge,
                conn,
                closing: AtomicBool::new(false),
                closed: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Connect on a fresh bridge worker.
    pub async fn connect(cx: &Cx, ctx: Arc<Context>, args: ConnectArgs) -> Outcome<Self, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let bridge = match Bridge::start(Arc::clone(&ctx)) {
            Ok(bridge) => bridge,
            Err(e) => return Outcome::Err(e),
        };
        let opened = bridge.run(move || ctx.open(&args)).await;
        match opened.and_then(|r| r) {
            Ok(conn) => Outcome::Ok(Self::from_parts(bridge, conn)),
            Err(e) => Outcome::Err(e),
        }
    }

    /// Connect, blocking the calling thread until the worker has connected.
    pub(crate) fn open_blocking(ctx: Arc<Context>, args: ConnectArgs) -> Result<Self> {
        let bridge = Bridge::start(Arc::clone(&ctx))?;
        let conn = bridge.run_blocking(move || ctx.open(&args))??;
        Ok(Self::from_parts(bridge, conn))
    }

    pub fn dsn(&self) -> &str {
        self.inner.conn.dsn()
    }

    /// `true` once closed, or once a close has been requested.
    pub fn is_closed(&self) -> bool {
        self.inner.closing.load(Ordering::Acquire) || self.inner.closed.load(Ordering::Acquire)
    }

    pub fn bridge(&self) -> &Bridge {
        &self.inner.bridge
    }

    /// Run `op` on the worker, closing the connection if a native call fails.
    pub(crate) fn submit<T, F>(&self, op: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let closed = Arc::clone(&self.inner.closed);
        let dispatched: Option<Completion<Result<T>>> = if self.is_closed() {
            None
        } else {
            let conn = self.inner.conn.clone();
            Some(self.inner.bridge.run(move || {
                if closed.load(Ordering::Acquire) {
                    return Err(closed_error());
                }
                let result = op(&conn);
                if let Err(e) = &result {
                    close_after_error(&conn, &closed, e);
                }
                result
            }))
        };
        async move {
            match dispatched {
                Some(completion) => completion.await.and_then(|r| r),
                None => Err(closed_error()),
            }
        }
    }

    async fn dispatch<T, F>(&self, cx: &Cx, op: F) -> Outcome<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        outcome(self.submit(op).await)
    }

    pub(crate) fn open_cursor(&self) -> impl Future<Output = Result<AsyncCursor>> + Send + 'static {
        let conn = self.clone();
        let opened = self.submit(|c| c.cursor());
        async move { opened.await.map(|cursor| AsyncCursor::new(conn, cursor)) }
    }

    pub async fn cursor(&self, cx: &Cx) -> Outcome<AsyncCursor, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        outcome(self.open_cursor().await)
    }

    pub async fn commit(&self, cx: &Cx) -> Outcome<(), Error> {
        self.dispatch(cx, Connection::commit).await
    }

    pub async fn rollback(&self, cx: &Cx) -> Outcome<(), Error> {
        self.dispatch(cx, Connection::rollback).await
    }

    pub async fn autocommit(&self, cx: &Cx) -> Outcome<bool, Error> {
        self.dispatch(cx, Connection::autocommit).await
    }

    pub async fn set_autocommit(&self, cx: &Cx, autocommit: bool) -> Outcome<(), Error> {
        self.dispatch(cx, move |c| c.set_autocommit(autocommit)).await
    }

    /// Queue the native close behind every operation already submitted.
    pub(crate) fn close_now(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let dispatched = if self.inner.closing.swap(true, Ordering::AcqRel) {
            None
        } else {
            let conn = self.inner.conn.clone();
            let closed = Arc::clone(&self.inner.closed);
            Some(self.inner.bridge.run(move || {
                if closed.swap(true, Ordering::AcqRel) {
                    return Ok(());
                }
                conn.close()
            }))
        };
        async move {
            match dispatched {
                Some(completion) => completion.await.and_then(|r| r),
                None => Ok(()),
            }
        }
    }

    /// Close the connection. Closing twice is not an error.
    pub async fn close(&self, cx: &Cx) -> Outcome<(), Error> {
        if self.is_closed() {
            return Outcome::Ok(());
        }
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        outcome(self.close_now().await)
    }
}

#[derive(Debug, Clone)]
struct CursorState {
    description: Option<Vec<ColumnDescription>>,
    rowcount: i64,
    lastrowid: Option<i64>,
    thread_id: ThreadId,
    closed: bool,
}

impl CursorState {
    fn of(cursor: &Cursor) -> Self {
        Self {
            description: cursor.description().map(<[ColumnDescription]>::to_vec),
            rowcount: cursor.rowcount(),
            lastrowid: cursor.lastrowid(),
            thread_id: cursor.thread_id(),
            closed: cursor.is_closed(),
        }
    }
}

/// Marks a cursor in use; a second concurrent user is refused.
struct InUse(Arc<AtomicBool>);

impl Drop for InUse {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An async cursor.
///
/// One task at a time: an operation started while another is still pending
/// fails with an `InterfaceError`.
pub struct AsyncCursor {
    conn: AsyncConnection,
    cursor: Arc<Mutex<Cursor>>,
    state: Arc<Mutex<CursorState>>,
    busy: Arc<AtomicBool>,
    arraysize: AtomicUsize,
}

impl fmt::Debug for AsyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCursor")
            .field("state", &*self.state())
            .field("arraysize", &self.arraysize())
            .finish_non_exhaustive()
    }
}

fn lock(cursor: &Mutex<Cursor>) -> MutexGuard<'_, Cursor> {
    cursor.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AsyncCursor {
    fn new(conn: AsyncConnection, cursor: Cursor) -> Self {
        let state = CursorState::of(&cursor);
        let arraysize = cursor.arraysize();
        Self {
            conn,
            cursor: Arc::new(Mutex::new(cursor)),
            state: Arc::new(Mutex::new(state)),
            busy: Arc::new(AtomicBool::new(false)),
            arraysize: AtomicUsize::new(arraysize),
        }
    }

    fn state(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The connection this cursor was opened on.
    pub fn connection(&self) -> &AsyncConnection {
        &self.conn
    }

    /// Columns of the last result set, as of the last completed operation.
    pub fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.state().description.clone()
    }

    /// Rows affected by the last statement, -1 when unknown.
    pub fn rowcount(&self) -> i64 {
        self.state().rowcount
    }

    /// Row id of the last inserted row, if the driver reports one.
    pub fn lastrowid(&self) -> Option<i64> {
        self.state().lastrowid
    }

    /// Thread that last made a native call for this cursor: the bridge worker.
    pub fn thread_id(&self) -> ThreadId {
        self.state().thread_id
    }

    /// Rows returned by `fetchmany` when no size is given.
    pub fn arraysize(&self) -> usize {
        self.arraysize.load(Ordering::Relaxed)
    }

    pub fn set_arraysize(&self, size: usize) {
        self.arraysize.store(size.max(1), Ordering::Relaxed);
    }

    /// `true` once the cursor or its connection is closed.
    pub fn is_closed(&self) -> bool {
        self.conn.is_closed() || self.state().closed
    }

    fn claim(&self) -> Result<InUse> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(Error::interface(
                "cursor is already in use by another task",
            ));
        }
        Ok(InUse(Arc::clone(&self.busy)))
    }

    /// Run `op` against the cursor on the worker and refresh cached metadata.
    pub(crate) fn submit<T, F>(&self, op: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce(&mut Cursor) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let claimed = self.claim();
        let cursor = Arc::clone(&self.cursor);
        let state = Arc::clone(&self.state);
        let dispatched = claimed.as_ref().ok().map(|_| {
            self.conn.submit(move |_| {
                let mut cursor = lock(&cursor);
                let result = op(&mut cursor);
                *state.lock().unwrap_or_else(PoisonError::into_inner) = CursorState::of(&cursor);
                result
            })
        });
        async move {
            let _in_use = claimed?;
            match dispatched {
                Some(completion) => completion.await,
                None => Err(Error::interface("cursor is already in use by another task")),
            }
        }
    }

    async fn dispatch<T, F>(&self, cx: &Cx, op: F) -> Outcome<T, Error>
    where
        F: FnOnce(&mut Cursor) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        outcome(self.submit(op).await)
    }

    pub async fn execute(&self, cx: &Cx, sql: &str, params: impl Into<Params>) -> Outcome<(), Error> {
        let sql = sql.to_string();
        let params = params.into();
        self.dispatch(cx, move |c| c.execute(&sql, params).map(|_| ()))
            .await
    }

    pub async fn executemany(
        &self,
        cx: &Cx,
        sql: &str,
        param_sets: Vec<Params>,
    ) -> Outcome<(), Error> {
        let sql = sql.to_string();
        self.dispatch(cx, move |c| c.executemany(&sql, param_sets).map(|_| ()))
            .await
    }

    pub async fn fetchone(&self, cx: &Cx) -> Outcome<Option<Row>, Error> {
        self.dispatch(cx, Cursor::fetchone).await
    }

    pub async fn fetchmany(&self, cx: &Cx, size: Option<usize>) -> Outcome<Vec<Row>, Error> {
        let size = size.unwrap_or_else(|| self.arraysize());
        self.dispatch(cx, move |c| c.fetchmany(Some(size))).await
    }

    pub async fn fetchall(&self, cx: &Cx) -> Outcome<Vec<Row>, Error> {
        self.dispatch(cx, Cursor::fetchall).await
    }

    pub(crate) fn close_now(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let cursor = Arc::clone(&self.cursor);
        let state = Arc::clone(&self.state);
        let dispatched = if self.is_closed() {
            None
        } else {
            Some(self.conn.inner.bridge.run(move || {
                let mut cursor = lock(&cursor);
                let result = cursor.close();
                state.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
                result
            }))
        };
        async move {
            match dispatched {
                Some(completion) => completion.await.and_then(|r| r),
                None => Ok(()),
            }
        }
    }

    /// Close the cursor. Closing twice is not an error.
    pub async fn close(&self, cx: &Cx) -> Outcome<(), Error> {
        if self.is_closed() {
            return Outcome::Ok(());
        }
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        outcome(self.close_now().await)
    }
}

impl Drop for AsyncCursor {
    fn drop(&mut self) {
        // release the native cursor on the worker, where it was used
        if !self.is_closed() {
            drop(self.close_now());
        }
    }
}
