//! The process-wide bridge context.
//!
//! A [`Context`] owns everything that is shared by every connection in the
//! process: the native runtime (started at most once), the set of threads
//! attached to it, the type registry, and the cache of driver instances keyed
//! by driver class name.

#![allow(clippy::result_large_err)]

use crate::async_connection::AsyncConnection;
use crate::connection::Connection;
use jdbcbridge_core::{
    DriverProperties, Error, NativeDriver, NativeRuntime, Result, TypeRegistry, translate,
};
use jdbcbridge_sqlite::SqliteRuntime;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::thread::ThreadId;

type ReadyHook = Box<dyn FnOnce(&Context) + Send>;

static GLOBAL: LazyLock<Arc<Context>> =
    LazyLock::new(|| Arc::new(Context::new(Arc::new(SqliteRuntime::new()))));

/// Arguments of a connect call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectArgs {
    pub dsn: String,
    /// Fully-qualified driver class name
    pub driver: String,
    /// Driver modules to make available before the driver is resolved
    pub modules: Vec<PathBuf>,
    /// Native driver properties
    pub driver_args: BTreeMap<String, serde_json::Value>,
    pub is_async: bool,
}

impl ConnectArgs {
    pub fn new(dsn: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            driver: driver.into(),
            ..Self::default()
        }
    }

    pub fn module(mut self, path: impl Into<PathBuf>) -> Self {
        self.modules.push(path.into());
        self
    }

    pub fn modules<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.modules.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn driver_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.driver_args.insert(key.into(), value.into());
        self
    }

    pub fn is_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    fn properties(&self) -> DriverProperties {
        self.driver_args.clone()
    }
}

/// Result of [`Context::connect`].
#[derive(Debug)]
pub enum DbConnection {
    Sync(Connection),
    Async(AsyncConnection),
}

impl DbConnection {
    pub fn into_sync(self) -> Option<Connection> {
        match self {
            DbConnection::Sync(conn) => Some(conn),
            DbConnection::Async(_) => None,
        }
    }

    pub fn into_async(self) -> Option<AsyncConnection> {
        match self {
            DbConnection::Sync(_) => None,
            DbConnection::Async(conn) => Some(conn),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, DbConnection::Async(_))
    }
}

/// Shared state of the native runtime and its drivers.
pub struct Context {
    runtime: Arc<dyn NativeRuntime>,
    registry: Arc<TypeRegistry>,
    started: Mutex<bool>,
    attached: Mutex<HashSet<ThreadId>>,
    drivers: Mutex<HashMap<String, Arc<dyn NativeDriver>>>,
    ready_hooks: Mutex<Vec<ReadyHook>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("runtime", &self.runtime.name())
            .field("started", &self.is_started())
            .field("pipelines", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// A context over `runtime` with the built-in type pipelines queued.
    pub fn new(runtime: Arc<dyn NativeRuntime>) -> Self {
        Self::with_registry(runtime, TypeRegistry::with_builtins())
    }

    pub fn with_registry(runtime: Arc<dyn NativeRuntime>, registry: TypeRegistry) -> Self {
        Self {
            runtime,
            registry: Arc::new(registry),
            started: Mutex::new(false),
            attached: Mutex::new(HashSet::new()),
            drivers: Mutex::new(HashMap::new()),
            ready_hooks: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide context over the embedded SQLite runtime.
    pub fn global() -> Arc<Context> {
        Arc::clone(&GLOBAL)
    }

    pub fn runtime(&self) -> &Arc<dyn NativeRuntime> {
        &self.runtime
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn is_started(&self) -> bool {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `hook` once the native runtime is up; immediately if it already is.
    pub fn on_ready(&self, hook: impl FnOnce(&Context) + Send + 'static) {
        let started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if !*started {
            self.ready_hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Box::new(hook));
            return;
        }
        drop(started);
        hook(self);
    }

    /// Start the native runtime if it is not running yet.
    ///
    /// The first successful start initializes the type registry and fires
    /// every ready hook, exactly once.
    pub fn start(&self, modules: &[PathBuf]) -> Result<()> {
        let hooks = {
            let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
            if *started {
                return Ok(());
            }
            translate(|| self.runtime.start(modules))?;
            // pipelines are in place before any other thread sees the start
            self.registry.initialize();
            let mut hooks = self
                .ready_hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *started = true;
            std::mem::take(&mut *hooks)
        };
        tracing::debug!(runtime = self.runtime.name(), "bridge context started");
        for hook in hooks {
            hook(self);
        }
        Ok(())
    }

    /// Attach the calling thread to the native runtime, once per thread.
    pub fn attach_current_thread(&self) -> Result<()> {
        self.start(&[])?;
        let id = std::thread::current().id();
        let mut attached = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        if attached.contains(&id) {
            return Ok(());
        }
        translate(|| self.runtime.attach_current_thread())?;
        attached.insert(id);
        Ok(())
    }

    pub fn is_current_thread_attached(&self) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&std::thread::current().id())
    }

    /// Find the driver for `class_name`.
    ///
    /// Looks in the instance cache, then among drivers already registered
    /// with the runtime, and finally loads the class from `modules` and
    /// registers it. The first instance cached under a name is kept.
    pub fn resolve_driver(
        &self,
        class_name: &str,
        modules: &[PathBuf],
    ) -> Result<Arc<dyn NativeDriver>> {
        if let Some(driver) = self
            .drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class_name)
        {
            tracing::debug!(driver = class_name, path = "cache", "driver resolved");
            return Ok(Arc::clone(driver));
        }

        let found = self
            .runtime
            .registered_drivers()
            .into_iter()
            .find(|d| d.class_name() == class_name);
        let driver = if let Some(driver) = found {
            tracing::debug!(driver = class_name, path = "registered", "driver resolved");
            driver
        } else {
            let driver = translate(|| self.runtime.loader().load(class_name, modules))?;
            self.runtime.register_driver(Arc::clone(&driver));
            tracing::debug!(
                driver = class_name,
                path = "loaded",
                modules = modules.len(),
                "driver resolved"
            );
            driver
        };

        let mut cache = self.drivers.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            cache.entry(class_name.to_string()).or_insert(driver),
        ))
    }

    /// Open a native connection on the calling thread.
    pub(crate) fn open(self: &Arc<Self>, args: &ConnectArgs) -> Result<Connection> {
        if args.driver.is_empty() {
            return Err(Error::interface("a driver class name is required"));
        }
        self.start(&args.modules)?;
        self.attach_current_thread()?;
        let driver = self.resolve_driver(&args.driver, &args.modules)?;
        if !driver.accepts_url(&args.dsn) {
            tracing::debug!(driver = %args.driver, dsn = %args.dsn, "driver does not claim dsn");
        }
        let properties = args.properties();
        let native = translate(|| driver.connect(&args.dsn, &properties))?;
        tracing::debug!(driver = %args.driver, dsn = %args.dsn, "connection opened");
        let conn = Connection::new(Arc::clone(self), native, args.dsn.clone());
        conn.set_autocommit(false)?;
        Ok(conn)
    }

    /// Open a synchronous connection.
    pub fn connect_sync(self: &Arc<Self>, args: &ConnectArgs) -> Result<Connection> {
        self.open(args)
    }

    /// Open a connection; asynchronous when `args.is_async` is set.
    ///
    /// The native connect of an async connection happens on its bridge worker,
    /// so this blocks the caller until the worker has connected.
    pub fn connect(self: &Arc<Self>, args: ConnectArgs) -> Result<DbConnection> {
        if args.is_async {
            AsyncConnection::open_blocking(Arc::clone(self), args).map(DbConnection::Async)
        } else {
            self.open(&args).map(DbConnection::Sync)
        }
    }
}

/// Connect through the process-wide context.
pub fn connect(args: ConnectArgs) -> Result<DbConnection> {
    Context::global().connect(args)
}
