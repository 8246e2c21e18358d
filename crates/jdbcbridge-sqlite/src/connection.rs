//! SQLite native connections and cursors.
//!
//! A [`SqliteConnection`] and every cursor it creates share one database
//! handle behind a mutex. Closing the connection marks the shared handle
//! closed, so cursors observe the closure on their next call even though
//! nobody closed them.
//!
//! Statements that return rows are stepped lazily, one row per
//! [`NativeCursor::fetch_next`]. Statements without result columns run to
//! completion inside [`NativeCursor::execute`].
//!
//! With autocommit off the connection opens a transaction before the first
//! statement and after every commit or rollback, so the database is never
//! written outside an explicit transaction.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::types;
use jdbcbridge_core::types::code_for_declared_type;
use jdbcbridge_core::{
    DriverProperties, NativeColumn, NativeConnection, NativeCursor, NativeError, NativeErrorKind,
    NativeResult, NativeValue,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// DSN prefix understood by the SQLite driver.
pub const DSN_PREFIX: &str = "jdbc:sqlite:";

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read_only: bool,
    pub read_write: bool,
    pub create: bool,
    /// Interpret the path as a `file:` URI.
    pub uri: bool,
    pub memory: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Read-write access to an existing database.
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = ffi::SQLITE_OPEN_FULLMUTEX;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.memory {
            flags |= ffi::SQLITE_OPEN_MEMORY;
        }

        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Build a config from a `jdbc:sqlite:` DSN and driver properties.
    ///
    /// Recognised properties are `busy_timeout` (milliseconds) and
    /// `open_mode` (`ro`, `rw` or `rwc`). Other properties are ignored.
    pub fn from_dsn(dsn: &str, properties: &DriverProperties) -> NativeResult<Self> {
        let Some(target) = dsn.strip_prefix(DSN_PREFIX) else {
            return Err(NativeError::new(
                NativeErrorKind::Interface,
                format!("not a SQLite DSN: {}", dsn),
            ));
        };

        let mut config = match target {
            "" | ":memory:" => Self::memory(),
            path => Self::file(path),
        };
        if config.path.starts_with("file:") {
            config.flags.uri = true;
        }

        for (key, value) in properties {
            match key.as_str() {
                "busy_timeout" => {
                    let ms = property_u32(value).ok_or_else(|| {
                        NativeError::new(
                            NativeErrorKind::Interface,
                            format!("invalid busy_timeout: {}", value),
                        )
                    })?;
                    config.busy_timeout_ms = ms;
                }
                "open_mode" => {
                    let flags = match value.as_str() {
                        Some("ro") => OpenFlags::read_only(),
                        Some("rw") => OpenFlags::read_write(),
                        Some("rwc") => OpenFlags::create_read_write(),
                        _ => {
                            return Err(NativeError::new(
                                NativeErrorKind::Interface,
                                format!("invalid open_mode: {}", value),
                            ));
                        }
                    };
                    config.flags = OpenFlags {
                        uri: config.flags.uri,
                        ..flags
                    };
                }
                other => {
                    tracing::debug!(property = other, "ignoring unknown sqlite property");
                }
            }
        }

        Ok(config)
    }
}

fn property_u32(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The database handle shared by a connection and its cursors.
struct Handle {
    db: *mut ffi::sqlite3,
    closed: bool,
    autocommit: bool,
}

// SAFETY: the handle is opened in serialized (FULLMUTEX) mode and every access
// goes through the surrounding Mutex.
unsafe impl Send for Handle {}

impl Handle {
    fn close(&mut self) -> NativeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // SAFETY: db is valid until this call; close_v2 defers the actual
        // release until cursors have finalized their statements
        let rc = unsafe { ffi::sqlite3_close_v2(self.db) };
        if rc != ffi::SQLITE_OK {
            return Err(NativeError::new(
                NativeErrorKind::Operational,
                ffi::error_string(rc),
            )
            .with_vendor_code(rc));
        }
        Ok(())
    }

    fn ensure_open(&self) -> NativeResult<()> {
        if self.closed {
            return Err(NativeError::new(
                NativeErrorKind::Operational,
                "database connection closed",
            ));
        }
        Ok(())
    }

    /// `true` while an explicit transaction is open.
    fn in_transaction(&self) -> bool {
        // SAFETY: db is valid while open
        !self.closed && unsafe { ffi::sqlite3_get_autocommit(self.db) } == 0
    }

    /// Open a transaction if autocommit is off and none is open.
    fn begin_if_needed(&self, sql: &str) -> NativeResult<()> {
        if self.autocommit || self.in_transaction() || is_transaction_control(sql) {
            return Ok(());
        }
        exec(self.db, "BEGIN")
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close sqlite handle");
        }
    }
}

type SharedHandle = Arc<Mutex<Handle>>;

fn lock(handle: &SharedHandle) -> MutexGuard<'_, Handle> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_transaction_control(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    matches!(
        head.as_str(),
        "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "VACUUM"
    )
}

/// A native connection to a SQLite database.
pub struct SqliteConnection {
    handle: SharedHandle,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SqliteConnection {
    pub fn open(config: &SqliteConfig) -> NativeResult<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            NativeError::new(
                NativeErrorKind::Interface,
                "invalid path: contains null byte",
            )
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = CStr::from_ptr(ffi::sqlite3_errmsg(db))
                        .to_string_lossy()
                        .into_owned();
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            };
            return Err(NativeError::new(
                NativeErrorKind::Operational,
                format!("failed to open database: {}", msg),
            )
            .with_vendor_code(rc));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(path = %config.path, "sqlite database opened");

        Ok(Self {
            handle: Arc::new(Mutex::new(Handle {
                db,
                closed: false,
                autocommit: true,
            })),
            path: config.path.clone(),
        })
    }

    pub fn open_memory() -> NativeResult<Self> {
        Self::open(&SqliteConfig::memory())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute SQL text directly, without binding parameters.
    pub fn execute_raw(&self, sql: &str) -> NativeResult<()> {
        let handle = lock(&self.handle);
        handle.ensure_open()?;
        handle.begin_if_needed(sql)?;
        exec(handle.db, sql)
    }

    fn end_transaction(&self, sql: &str) -> NativeResult<()> {
        let handle = lock(&self.handle);
        handle.ensure_open()?;
        if handle.in_transaction() {
            exec(handle.db, sql)?;
        }
        Ok(())
    }
}

impl NativeConnection for SqliteConnection {
    fn create_cursor(&mut self) -> NativeResult<Box<dyn NativeCursor>> {
        lock(&self.handle).ensure_open()?;
        Ok(Box::new(SqliteCursor::new(Arc::clone(&self.handle))))
    }

    fn commit(&mut self) -> NativeResult<()> {
        self.end_transaction("COMMIT")
    }

    fn rollback(&mut self) -> NativeResult<()> {
        self.end_transaction("ROLLBACK")
    }

    fn close(&mut self) -> NativeResult<()> {
        let result = lock(&self.handle).close();
        tracing::debug!(path = %self.path, "sqlite database closed");
        result
    }

    fn is_closed(&self) -> bool {
        lock(&self.handle).closed
    }

    fn autocommit(&self) -> NativeResult<bool> {
        let handle = lock(&self.handle);
        handle.ensure_open()?;
        Ok(handle.autocommit)
    }

    fn set_autocommit(&mut self, autocommit: bool) -> NativeResult<()> {
        let mut handle = lock(&self.handle);
        handle.ensure_open()?;
        if autocommit && !handle.autocommit && handle.in_transaction() {
            exec(handle.db, "COMMIT")?;
        }
        handle.autocommit = autocommit;
        Ok(())
    }
}

/// A native cursor over one SQLite statement at a time.
pub struct SqliteCursor {
    handle: SharedHandle,
    /// Statement with rows still to fetch; null when there is none
    stmt: *mut ffi::sqlite3_stmt,
    columns: Option<Vec<NativeColumn>>,
    update_count: i64,
    last_row_id: Option<i64>,
    closed: bool,
}

// SAFETY: `stmt` belongs to the shared handle and is only stepped, read or
// finalized while holding that handle's mutex.
unsafe impl Send for SqliteCursor {}

impl SqliteCursor {
    fn new(handle: SharedHandle) -> Self {
        Self {
            handle,
            stmt: ptr::null_mut(),
            columns: None,
            update_count: -1,
            last_row_id: None,
            closed: false,
        }
    }

    fn ensure_open(&self, handle: &Handle) -> NativeResult<()> {
        if self.closed {
            return Err(NativeError::new(
                NativeErrorKind::Interface,
                "cursor is closed",
            ));
        }
        handle.ensure_open()
    }

    fn finalize(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: stmt is a live statement owned by this cursor
            unsafe { ffi::sqlite3_finalize(self.stmt) };
            self.stmt = ptr::null_mut();
        }
    }

    fn reset_results(&mut self) {
        self.finalize();
        self.columns = None;
        self.update_count = -1;
    }
}

impl NativeCursor for SqliteCursor {
    fn execute(&mut self, sql: &str, params: &[NativeValue]) -> NativeResult<()> {
        let handle_ref = Arc::clone(&self.handle);
        let handle = lock(&handle_ref);
        self.ensure_open(&handle)?;
        self.reset_results();
        handle.begin_if_needed(sql)?;

        let db = handle.db;
        let Some(stmt) = prepare_stmt(db, sql)? else {
            // empty statement
            return Ok(());
        };
        if let Err(e) = bind_all(db, stmt, params) {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlite3_finalize(stmt) };
            return Err(e);
        }

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
        if col_count > 0 {
            self.columns = Some(describe(stmt, col_count));
            self.stmt = stmt;
            return Ok(());
        }

        let result = step_to_done(db, stmt);
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };
        let changed = result?;
        self.update_count = changed;
        if changed > 0 {
            // SAFETY: db is valid
            self.last_row_id = Some(unsafe { ffi::sqlite3_last_insert_rowid(db) });
        }
        Ok(())
    }

    fn execute_batch(&mut self, sql: &str, batches: &[Vec<NativeValue>]) -> NativeResult<()> {
        let handle_ref = Arc::clone(&self.handle);
        let handle = lock(&handle_ref);
        self.ensure_open(&handle)?;
        self.reset_results();
        handle.begin_if_needed(sql)?;

        let db = handle.db;
        let Some(stmt) = prepare_stmt(db, sql)? else {
            return Ok(());
        };

        let mut total = 0_i64;
        let mut outcome = Ok(());
        for params in batches {
            // SAFETY: stmt is valid
            unsafe {
                ffi::sqlite3_reset(stmt);
                ffi::sqlite3_clear_bindings(stmt);
            }
            if let Err(e) = bind_all(db, stmt, params) {
                outcome = Err(e);
                break;
            }
            match step_to_done(db, stmt) {
                Ok(changed) => total += changed.max(0),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };
        outcome?;

        self.update_count = total;
        if total > 0 {
            // SAFETY: db is valid
            self.last_row_id = Some(unsafe { ffi::sqlite3_last_insert_rowid(db) });
        }
        Ok(())
    }

    fn columns(&self) -> Option<&[NativeColumn]> {
        self.columns.as_deref()
    }

    fn update_count(&self) -> i64 {
        self.update_count
    }

    fn last_row_id(&self) -> Option<i64> {
        self.last_row_id
    }

    fn fetch_next(&mut self) -> NativeResult<Option<Vec<NativeValue>>> {
        let handle_ref = Arc::clone(&self.handle);
        let handle = lock(&handle_ref);
        self.ensure_open(&handle)?;
        if self.stmt.is_null() {
            return Ok(None);
        }

        let stmt = self.stmt;
        // SAFETY: stmt is valid
        match unsafe { ffi::sqlite3_step(stmt) } {
            ffi::SQLITE_ROW => {
                // SAFETY: stmt is valid
                let count = unsafe { ffi::sqlite3_column_count(stmt) };
                let row = (0..count)
                    // SAFETY: stmt just returned SQLITE_ROW and i < count
                    .map(|i| unsafe { types::read_column(stmt, i) })
                    .collect();
                Ok(Some(row))
            }
            ffi::SQLITE_DONE => {
                self.finalize();
                Ok(None)
            }
            _ => {
                let err = sqlite_error(handle.db, ErrorSite::Step);
                self.finalize();
                Err(err)
            }
        }
    }

    fn close(&mut self) -> NativeResult<()> {
        if self.closed {
            return Ok(());
        }
        let handle_ref = Arc::clone(&self.handle);
        let _guard = lock(&handle_ref);
        self.finalize();
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed || lock(&self.handle).closed
    }
}

impl Drop for SqliteCursor {
    fn drop(&mut self) {
        if !self.stmt.is_null() {
            let handle_ref = Arc::clone(&self.handle);
            let _guard = lock(&handle_ref);
            self.finalize();
        }
    }
}

fn describe(stmt: *mut ffi::sqlite3_stmt, col_count: c_int) -> Vec<NativeColumn> {
    (0..col_count)
        .map(|i| {
            // SAFETY: stmt is valid and i < col_count
            let name = unsafe { types::column_name(stmt, i) }.unwrap_or_else(|| format!("col{}", i));
            // SAFETY: as above
            let decltype = unsafe { types::column_decltype(stmt, i) };
            let mut col = NativeColumn::new(name, code_for_declared_type(decltype.as_deref()));
            if let Some(decltype) = decltype {
                col = col.type_name(decltype);
            }
            col
        })
        .collect()
}

fn exec(db: *mut ffi::sqlite3, sql: &str) -> NativeResult<()> {
    let c_sql = CString::new(sql).map_err(|_| null_byte_error())?;
    let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc =
        unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

    if rc != ffi::SQLITE_OK {
        let msg = if errmsg.is_null() {
            ffi::error_string(rc).to_string()
        } else {
            // SAFETY: errmsg was allocated by SQLite and is NUL-terminated
            let msg = unsafe { CStr::from_ptr(errmsg).to_string_lossy().into_owned() };
            // SAFETY: errmsg must be released with sqlite3_free
            unsafe { ffi::sqlite3_free(errmsg.cast()) };
            msg
        };
        return Err(NativeError::new(error_code_to_kind(rc, ErrorSite::Prepare), msg)
            .with_vendor_code(rc));
    }
    Ok(())
}

fn null_byte_error() -> NativeError {
    NativeError::new(NativeErrorKind::Programming, "SQL contains null byte")
}

/// Prepare `sql`; `None` if it contains no statement.
fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> NativeResult<Option<*mut ffi::sqlite3_stmt>> {
    let c_sql = CString::new(sql).map_err(|_| null_byte_error())?;
    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        return Err(sqlite_error(db, ErrorSite::Prepare));
    }
    tracing::trace!(sql, "sqlite statement prepared");
    Ok((!stmt.is_null()).then_some(stmt))
}

fn bind_all(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    params: &[NativeValue],
) -> NativeResult<()> {
    // SAFETY: stmt is valid
    let expected = unsafe { ffi::sqlite3_bind_parameter_count(stmt) } as usize;
    if expected != params.len() {
        return Err(NativeError::new(
            NativeErrorKind::Programming,
            format!(
                "Incorrect number of bindings supplied. The current statement uses {}, and there are {} supplied.",
                expected,
                params.len()
            ),
        ));
    }

    for (i, param) in params.iter().enumerate() {
        // SAFETY: stmt is valid, index is 1-based and within the parameter count
        let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param)? };
        if rc != ffi::SQLITE_OK {
            let err = sqlite_error(db, ErrorSite::Bind);
            return Err(NativeError {
                message: format!("failed to bind parameter {}: {}", i + 1, err.message),
                ..err
            });
        }
    }
    Ok(())
}

/// Step a statement without result columns to completion.
///
/// Returns the number of rows it changed.
fn step_to_done(db: *mut ffi::sqlite3, stmt: *mut ffi::sqlite3_stmt) -> NativeResult<i64> {
    // SAFETY: db is valid
    let before = unsafe { ffi::sqlite3_total_changes(db) };
    loop {
        // SAFETY: stmt is valid
        match unsafe { ffi::sqlite3_step(stmt) } {
            ffi::SQLITE_ROW => {}
            ffi::SQLITE_DONE => break,
            _ => return Err(sqlite_error(db, ErrorSite::Step)),
        }
    }
    // SAFETY: db is valid
    let after = unsafe { ffi::sqlite3_total_changes(db) };
    if after == before {
        Ok(0)
    } else {
        // SAFETY: db is valid
        Ok(i64::from(unsafe { ffi::sqlite3_changes(db) }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorSite {
    Prepare,
    Bind,
    Step,
}

fn sqlite_error(db: *mut ffi::sqlite3, site: ErrorSite) -> NativeError {
    // SAFETY: db is valid, errmsg returns a valid C string
    let (msg, code, extended) = unsafe {
        (
            CStr::from_ptr(ffi::sqlite3_errmsg(db))
                .to_string_lossy()
                .into_owned(),
            ffi::sqlite3_errcode(db),
            ffi::sqlite3_extended_errcode(db),
        )
    };
    NativeError::new(error_code_to_kind(code, site), msg).with_vendor_code(extended)
}

fn error_code_to_kind(code: c_int, site: ErrorSite) -> NativeErrorKind {
    match code & 0xff {
        ffi::SQLITE_ERROR if site == ErrorSite::Prepare => NativeErrorKind::Programming,
        ffi::SQLITE_ERROR => NativeErrorKind::Database,
        ffi::SQLITE_CONSTRAINT => NativeErrorKind::Integrity,
        ffi::SQLITE_MISMATCH | ffi::SQLITE_TOOBIG => NativeErrorKind::Data,
        ffi::SQLITE_RANGE | ffi::SQLITE_MISUSE => NativeErrorKind::Programming,
        ffi::SQLITE_INTERNAL | ffi::SQLITE_CORRUPT | ffi::SQLITE_NOTADB => {
            NativeErrorKind::Internal
        }
        ffi::SQLITE_BUSY
        | ffi::SQLITE_LOCKED
        | ffi::SQLITE_NOMEM
        | ffi::SQLITE_READONLY
        | ffi::SQLITE_INTERRUPT
        | ffi::SQLITE_IOERR
        | ffi::SQLITE_FULL
        | ffi::SQLITE_CANTOPEN
        | ffi::SQLITE_PROTOCOL
        | ffi::SQLITE_SCHEMA
        | ffi::SQLITE_ABORT
        | ffi::SQLITE_PERM
        | ffi::SQLITE_AUTH => NativeErrorKind::Operational,
        ffi::SQLITE_NOTFOUND => NativeErrorKind::NotSupported,
        _ => NativeErrorKind::Database,
    }
}
