use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use jdbcbridge::{AsyncConnection, ConnectArgs, Context, Error, Value};
use jdbcbridge_core::{
    DriverLoader, DriverProperties, NativeColumn, NativeConnection, NativeCursor, NativeDriver,
    NativeError, NativeErrorKind, NativeResult, NativeRuntime, NativeValue,
};
use jdbcbridge_sqlite::{SqliteDriver, SqliteRuntime};
use std::future::Future;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::{Arc, Mutex};
use std::task::Poll;
use std::time::Duration;

const DELAYED_DRIVER: &str = "test.DelayedDriver";
const DELAY: Duration = Duration::from_millis(150);

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// SQLite whose statements take `DELAY` to execute.
#[derive(Debug)]
struct DelayedDriver;

impl NativeDriver for DelayedDriver {
    fn class_name(&self) -> &str {
        DELAYED_DRIVER
    }

    fn accepts_url(&self, dsn: &str) -> bool {
        SqliteDriver.accepts_url(dsn)
    }

    fn connect(
        &self,
        dsn: &str,
        properties: &DriverProperties,
    ) -> NativeResult<Box<dyn NativeConnection>> {
        Ok(Box::new(DelayedConnection(
            SqliteDriver.connect(dsn, properties)?,
        )))
    }
}

struct DelayedConnection(Box<dyn NativeConnection>);

impl NativeConnection for DelayedConnection {
    fn create_cursor(&mut self) -> NativeResult<Box<dyn NativeCursor>> {
        Ok(Box::new(DelayedCursor(self.0.create_cursor()?)))
    }

    fn commit(&mut self) -> NativeResult<()> {
        self.0.commit()
    }

    fn rollback(&mut self) -> NativeResult<()> {
        self.0.rollback()
    }

    fn close(&mut self) -> NativeResult<()> {
        self.0.close()
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    fn autocommit(&self) -> NativeResult<bool> {
        self.0.autocommit()
    }

    fn set_autocommit(&mut self, autocommit: bool) -> NativeResult<()> {
        self.0.set_autocommit(autocommit)
    }
}

struct DelayedCursor(Box<dyn NativeCursor>);

impl NativeCursor for DelayedCursor {
    fn execute(&mut self, sql: &str, params: &[NativeValue]) -> NativeResult<()> {
        std::thread::sleep(DELAY);
        self.0.execute(sql, params)
    }

    fn execute_batch(&mut self, sql: &str, batches: &[Vec<NativeValue>]) -> NativeResult<()> {
        std::thread::sleep(DELAY);
        self.0.execute_batch(sql, batches)
    }

    fn columns(&self) -> Option<&[NativeColumn]> {
        self.0.columns()
    }

    fn update_count(&self) -> i64 {
        self.0.update_count()
    }

    fn last_row_id(&self) -> Option<i64> {
        self.0.last_row_id()
    }

    fn fetch_next(&mut self) -> NativeResult<Option<Vec<NativeValue>>> {
        self.0.fetch_next()
    }

    fn close(&mut self) -> NativeResult<()> {
        self.0.close()
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

struct DelayedLoader;

impl DriverLoader for DelayedLoader {
    fn load(&self, class_name: &str, _modules: &[PathBuf]) -> NativeResult<Arc<dyn NativeDriver>> {
        if class_name == DELAYED_DRIVER {
            Ok(Arc::new(DelayedDriver))
        } else {
            Err(NativeError::new(
                NativeErrorKind::ClassNotFound,
                format!("driver class not found: {}", class_name),
            ))
        }
    }
}

/// The embedded runtime, able to load the delayed driver on demand.
#[derive(Default)]
struct DelayedRuntime {
    inner: SqliteRuntime,
}

impl NativeRuntime for DelayedRuntime {
    fn name(&self) -> &str {
        "delayed"
    }

    fn start(&self, modules: &[PathBuf]) -> NativeResult<()> {
        self.inner.start(modules)
    }

    fn attach_current_thread(&self) -> NativeResult<()> {
        self.inner.attach_current_thread()
    }

    fn registered_drivers(&self) -> Vec<Arc<dyn NativeDriver>> {
        self.inner.registered_drivers()
    }

    fn register_driver(&self, driver: Arc<dyn NativeDriver>) {
        self.inner.register_driver(driver);
    }

    fn loader(&self) -> &dyn DriverLoader {
        &DelayedLoader
    }
}

/// Poll both futures until both finish.
async fn join(a: impl Future<Output = ()>, b: impl Future<Output = ()>) {
    let mut a = pin!(a);
    let mut b = pin!(b);
    let (mut a_done, mut b_done) = (false, false);
    std::future::poll_fn(|task| {
        if !a_done {
            a_done = a.as_mut().poll(task).is_ready();
        }
        if !b_done {
            b_done = b.as_mut().poll(task).is_ready();
        }
        if a_done && b_done {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    })
    .await;
}

#[test]
fn slow_native_call_does_not_block_other_tasks() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let ctx = Arc::new(Context::new(Arc::new(DelayedRuntime::default())));

    rt.block_on(async {
        let args = ConnectArgs::new("jdbc:sqlite::memory:", DELAYED_DRIVER).is_async(true);
        let conn = unwrap_outcome(AsyncConnection::connect(&cx, Arc::clone(&ctx), args).await);
        let cur = unwrap_outcome(conn.cursor(&cx).await);

        let order = Mutex::new(Vec::new());
        let query = async {
            unwrap_outcome(cur.execute(&cx, "SELECT ?", vec![Value::Int(5)]).await);
            let row = unwrap_outcome(cur.fetchone(&cx).await).expect("one row");
            assert_eq!(row.get(0), Some(&Value::Int(5)));
            order.lock().unwrap().push("query");
        };
        let noop = async {
            order.lock().unwrap().push("noop");
        };
        join(query, noop).await;

        assert_eq!(*order.lock().unwrap(), vec!["noop", "query"]);
        assert_eq!(cur.thread_id(), conn.bridge().worker_thread_id());
        assert_ne!(cur.thread_id(), std::thread::current().id());
        unwrap_outcome(conn.close(&cx).await);
    });
}

#[test]
fn operations_on_one_connection_keep_their_order() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let ctx = Arc::new(Context::new(Arc::new(DelayedRuntime::default())));

    rt.block_on(async {
        let args = ConnectArgs::new("jdbc:sqlite::memory:", DELAYED_DRIVER).is_async(true);
        let conn = unwrap_outcome(AsyncConnection::connect(&cx, Arc::clone(&ctx), args).await);
        let writer = unwrap_outcome(conn.cursor(&cx).await);
        let reader = unwrap_outcome(conn.cursor(&cx).await);

        unwrap_outcome(writer.execute(&cx, "CREATE TABLE t (x INTEGER)", ()).await);
        join(
            async {
                unwrap_outcome(
                    writer
                        .execute(&cx, "INSERT INTO t VALUES (?)", vec![Value::Int(1)])
                        .await,
                );
            },
            async {
                unwrap_outcome(reader.execute(&cx, "SELECT COUNT(*) FROM t", ()).await);
            },
        )
        .await;
        let count = unwrap_outcome(reader.fetchone(&cx).await).expect("count row");
        assert_eq!(count.get(0), Some(&Value::Int(1)));
    });
}
