//! An in-process native runtime hosting the SQLite driver.
//!
//! SQLite needs no VM, but the runtime still keeps the bookkeeping a hosted
//! driver runtime has: whether it has been started, which threads are
//! attached, and a driver manager holding registered drivers.

use crate::connection::{DSN_PREFIX, SqliteConfig, SqliteConnection};
use jdbcbridge_core::{
    DriverLoader, DriverProperties, NativeConnection, NativeDriver, NativeError, NativeErrorKind,
    NativeResult, NativeRuntime,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::ThreadId;

/// Class name the SQLite driver registers under.
pub const SQLITE_DRIVER_CLASS: &str = "org.sqlite.JDBC";

/// The SQLite native driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl NativeDriver for SqliteDriver {
    fn class_name(&self) -> &str {
        SQLITE_DRIVER_CLASS
    }

    fn accepts_url(&self, dsn: &str) -> bool {
        dsn.starts_with(DSN_PREFIX)
    }

    fn connect(
        &self,
        dsn: &str,
        properties: &DriverProperties,
    ) -> NativeResult<Box<dyn NativeConnection>> {
        let config = SqliteConfig::from_dsn(dsn, properties)?;
        Ok(Box::new(SqliteConnection::open(&config)?))
    }
}

/// Loads the drivers this runtime knows how to build.
///
/// Every module path must exist; the class name selects the driver.
#[derive(Debug, Default)]
pub struct SqliteLoader;

impl DriverLoader for SqliteLoader {
    fn load(&self, class_name: &str, modules: &[PathBuf]) -> NativeResult<Arc<dyn NativeDriver>> {
        if let Some(missing) = modules.iter().find(|m| !Path::new(m).exists()) {
            return Err(NativeError::new(
                NativeErrorKind::ClassNotFound,
                format!("module not found: {}", missing.display()),
            ));
        }
        match class_name {
            SQLITE_DRIVER_CLASS => Ok(Arc::new(SqliteDriver)),
            other => Err(NativeError::new(
                NativeErrorKind::ClassNotFound,
                format!("driver class not found: {}", other),
            )),
        }
    }
}

/// The native runtime.
#[derive(Default)]
pub struct SqliteRuntime {
    started: AtomicBool,
    modules: Mutex<Vec<PathBuf>>,
    attached: Mutex<HashSet<ThreadId>>,
    drivers: RwLock<Vec<Arc<dyn NativeDriver>>>,
    loader: SqliteLoader,
}

impl std::fmt::Debug for SqliteRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRuntime")
            .field("started", &self.is_started())
            .field("attached_threads", &self.attached_threads())
            .finish_non_exhaustive()
    }
}

impl SqliteRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Module paths the runtime was started with.
    pub fn modules(&self) -> Vec<PathBuf> {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of distinct threads attached so far.
    pub fn attached_threads(&self) -> usize {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_current_thread_attached(&self) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&std::thread::current().id())
    }
}

impl NativeRuntime for SqliteRuntime {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn start(&self, modules: &[PathBuf]) -> NativeResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(NativeError::new(
                NativeErrorKind::Runtime,
                "runtime already started",
            ));
        }
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(modules);
        // the bundled driver self-registers, like a service-loaded driver
        self.register_driver(Arc::new(SqliteDriver));
        tracing::debug!(
            runtime = "sqlite",
            version = crate::sqlite_version(),
            modules = modules.len(),
            "native runtime started"
        );
        Ok(())
    }

    fn attach_current_thread(&self) -> NativeResult<()> {
        if !self.is_started() {
            return Err(NativeError::new(
                NativeErrorKind::Runtime,
                "runtime is not started",
            ));
        }
        let id = std::thread::current().id();
        if self
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
        {
            tracing::debug!(thread = ?id, "thread attached to native runtime");
        }
        Ok(())
    }

    fn registered_drivers(&self) -> Vec<Arc<dyn NativeDriver>> {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn register_driver(&self, driver: Arc<dyn NativeDriver>) {
        let mut drivers = self.drivers.write().unwrap_or_else(PoisonError::into_inner);
        if drivers
            .iter()
            .all(|d| d.class_name() != driver.class_name())
        {
            tracing::debug!(driver = driver.class_name(), "driver registered");
            drivers.push(driver);
        }
    }

    fn loader(&self) -> &dyn DriverLoader {
        &self.loader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_registers_bundled_driver_once() {
        let rt = SqliteRuntime::new();
        assert!(rt.registered_drivers().is_empty());
        rt.start(&[]).unwrap();
        assert!(rt.is_started());
        assert!(rt.start(&[]).is_err());

        rt.register_driver(Arc::new(SqliteDriver));
        let drivers = rt.registered_drivers();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].class_name(), SQLITE_DRIVER_CLASS);
    }

    #[test]
    fn test_attach_requires_start_and_is_per_thread() {
        let rt = SqliteRuntime::new();
        assert!(rt.attach_current_thread().is_err());
        rt.start(&[]).unwrap();
        rt.attach_current_thread().unwrap();
        rt.attach_current_thread().unwrap();
        assert_eq!(rt.attached_threads(), 1);
        assert!(rt.is_current_thread_attached());

        std::thread::scope(|s| {
            s.spawn(|| rt.attach_current_thread().unwrap());
        });
        assert_eq!(rt.attached_threads(), 2);
    }

    #[test]
    fn test_loader() {
        let loader = SqliteLoader;
        assert!(loader.load(SQLITE_DRIVER_CLASS, &[]).is_ok());

        let unknown = loader.load("com.example.Driver", &[]).unwrap_err();
        assert!(unknown.kind.is_a(NativeErrorKind::Interface));

        let missing = loader
            .load(SQLITE_DRIVER_CLASS, &[PathBuf::from("/definitely/not/here.jar")])
            .unwrap_err();
        assert_eq!(missing.kind, NativeErrorKind::ClassNotFound);
    }

    #[test]
    fn test_driver_accepts_and_connects() {
        let driver = SqliteDriver;
        assert!(driver.accepts_url("jdbc:sqlite::memory:"));
        assert!(!driver.accepts_url("jdbc:postgresql://localhost/db"));
        let mut conn = driver
            .connect("jdbc:sqlite::memory:", &DriverProperties::new())
            .unwrap();
        assert!(!conn.is_closed());
        conn.close().unwrap();
    }
}
