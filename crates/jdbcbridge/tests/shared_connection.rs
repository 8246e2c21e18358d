use jdbcbridge::{ConnectArgs, Context, Value};
use jdbcbridge_sqlite::{SQLITE_DRIVER_CLASS, SqliteRuntime};
use std::collections::BTreeSet;
use std::sync::Arc;

#[test]
fn ten_threads_share_one_connection() {
    let ctx = Arc::new(Context::new(Arc::new(SqliteRuntime::new())));
    let conn = ctx
        .connect_sync(&ConnectArgs::new("jdbc:sqlite::memory:", SQLITE_DRIVER_CLASS))
        .expect("connect");

    let handles: Vec<_> = (0..10_i64)
        .map(|i| {
            let conn = conn.clone();
            std::thread::spawn(move || {
                let mut cur = conn.cursor().expect("cursor");
                cur.execute("SELECT ?", vec![Value::Int(i)]).expect("execute");
                let row = cur.fetchone().expect("fetch").expect("one row");
                assert_eq!(cur.thread_id(), std::thread::current().id());
                row.get_as::<i64>(0).expect("integer")
            })
        })
        .collect();

    let seen: BTreeSet<i64> = handles
        .into_iter()
        .map(|h| h.join().expect("worker thread"))
        .collect();
    assert_eq!(seen, (0..10).collect());
    conn.close().unwrap();
}
