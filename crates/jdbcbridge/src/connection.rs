//! Synchronous DBAPI connection.

#![allow(clippy::result_large_err)]

use crate::context::Context;
use crate::cursor::Cursor;
use jdbcbridge_core::{Error, NativeConnection, Result, translate};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct ConnectionInner {
    ctx: Arc<Context>,
    native: Mutex<Box<dyn NativeConnection>>,
    closed: AtomicBool,
    dsn: String,
}

impl ConnectionInner {
    fn native(&self) -> MutexGuard<'_, Box<dyn NativeConnection>> {
        self.native.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        translate(|| self.native().close())?;
        tracing::debug!(dsn = %self.dsn, "connection closed");
        Ok(())
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(dsn = %self.dsn, error = %e, "error closing dropped connection");
        }
    }
}

/// A connection to a database through a native driver.
///
/// Cheap to clone; clones share the native connection. Connections may be
/// shared between threads, cursors may not.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("dsn", &self.inner.dsn)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(ctx: Arc<Context>, native: Box<dyn NativeConnection>, dsn: String) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                ctx,
                native: Mutex::new(native),
                closed: AtomicBool::new(false),
                dsn,
            }),
        }
    }

    pub(crate) fn context(&self) -> &Arc<Context> {
        &self.inner.ctx
    }

    pub fn dsn(&self) -> &str {
        &self.inner.dsn
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::interface("Connection is closed"))
        } else {
            Ok(())
        }
    }

    /// A new cursor over this connection's native handle.
    pub fn cursor(&self) -> Result<Cursor> {
        self.ensure_open()?;
        let native = translate(|| self.inner.native().create_cursor())?;
        Ok(Cursor::new(self.clone(), native))
    }

    pub fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        translate(|| self.inner.native().commit())
    }

    pub fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        translate(|| self.inner.native().rollback())
    }

    /// Close the connection. Closing twice is not an error.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    /// `true` once closed here or by the native driver.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) || self.inner.native().is_closed()
    }

    pub fn autocommit(&self) -> Result<bool> {
        self.ensure_open()?;
        translate(|| self.inner.native().autocommit())
    }

    /// Set the native autocommit flag. Turning it on commits an open
    /// transaction.
    pub fn set_autocommit(&self, autocommit: bool) -> Result<()> {
        self.ensure_open()?;
        translate(|| self.inner.native().set_autocommit(autocommit))
    }
}
