use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use jdbcbridge::{BlockingConnection, Error, Value, connect};
use jdbcbridge_dialect::{
    AsyncSqliteDialect, ConnectionUrl, Dialect, DialectRegistry, IsClosed, SqliteDialect,
    connect_url, create_url,
};
use jdbcbridge_sqlite::SQLITE_DRIVER_CLASS;
use std::path::PathBuf;

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn temp_db(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "jdbcbridge-dialect-{}-{}.db",
        tag,
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

#[test]
fn url_to_file_database_and_back() {
    let path = temp_db("file");
    let url = ConnectionUrl::parse(&format!(
        "sqlite+jdbc_wrapper:///{}?jdbc_driver={}",
        path.display(),
        SQLITE_DRIVER_CLASS
    ))
    .unwrap();
    let args = SqliteDialect.create_connect_args(&url).unwrap();
    assert_eq!(args.dsn, format!("jdbc:sqlite:{}", path.display()));

    let conn = connect(args).unwrap().into_sync().unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", ())
        .unwrap();
    cur.execute("INSERT INTO notes (body) VALUES (?)", vec![Value::from("hello")])
        .unwrap();
    conn.commit().unwrap();
    conn.close().unwrap();

    // a second connection through the DSN's URL form sees the committed row
    let reopened = DialectRegistry::global()
        .dsn_to_url(&format!("jdbc:sqlite:{}", path.display()))
        .unwrap()
        .with_query_param("jdbc_driver", SQLITE_DRIVER_CLASS);
    let conn = connect_url(&reopened.to_string())
        .unwrap()
        .into_sync()
        .unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("SELECT body FROM notes", ()).unwrap();
    let row = cur.fetchone().unwrap().unwrap();
    assert_eq!(row.get(0), Some(&Value::from("hello")));
    conn.close().unwrap();

    let _ = std::fs::remove_file(&path);
}

#[test]
fn create_url_connects_in_memory() {
    let url = create_url("jdbc:sqlite::memory:", SQLITE_DRIVER_CLASS, Vec::<PathBuf>::new())
        .unwrap();
    let conn = connect_url(&url.to_string()).unwrap().into_sync().unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("SELECT 1 + 1", ()).unwrap();
    assert_eq!(cur.fetchone().unwrap().unwrap().get(0), Some(&Value::Int(2)));
    conn.close().unwrap();
}

#[test]
fn disconnect_follows_connection_state() {
    let url = ConnectionUrl::parse("sqlite+jdbc_wrapper://?jdbc_driver=org.sqlite.JDBC").unwrap();
    let conn = connect(SqliteDialect.create_connect_args(&url).unwrap())
        .unwrap()
        .into_sync()
        .unwrap();
    let cur = conn.cursor().unwrap();
    let err = Error::operational("lost");

    assert!(!SqliteDialect.is_disconnect(&err, Some(&conn), Some(&cur)));
    conn.close().unwrap();
    assert!(SqliteDialect.is_disconnect(&err, Some(&conn), None));
    assert!(SqliteDialect.is_disconnect(&err, None, Some(&cur)));
    assert!(cur.is_closed());
    assert!(IsClosed::is_closed(&conn));
}

#[test]
fn isolation_level_drives_autocommit() {
    let url = ConnectionUrl::parse("sqlite+jdbc_wrapper://?jdbc_driver=org.sqlite.JDBC").unwrap();
    let conn = connect(SqliteDialect.create_connect_args(&url).unwrap())
        .unwrap()
        .into_sync()
        .unwrap();
    assert!(!conn.autocommit().unwrap());
    SqliteDialect.set_isolation_level(&conn, "AUTOCOMMIT").unwrap();
    assert!(conn.autocommit().unwrap());
    SqliteDialect
        .set_isolation_level(&conn, "SERIALIZABLE")
        .unwrap();
    assert!(!conn.autocommit().unwrap());
}

#[test]
fn async_dialect_opens_async_connection() {
    let url =
        ConnectionUrl::parse("sqlite+jdbc_async_wrapper://?jdbc_driver=org.sqlite.JDBC").unwrap();
    let args = DialectRegistry::global().create_connect_args(&url).unwrap();
    assert!(args.is_async);
    let conn = connect(args).unwrap().into_async().unwrap();

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let cur = unwrap_outcome(conn.cursor(&cx).await);
        unwrap_outcome(cur.execute(&cx, "SELECT ?", vec![Value::Int(9)]).await);
        let row = unwrap_outcome(cur.fetchone(&cx).await).expect("one row");
        assert_eq!(row.get(0), Some(&Value::Int(9)));
        assert!(!AsyncSqliteDialect.is_disconnect(
            &Error::operational("x"),
            Some(&conn),
            None
        ));
    });

    let blocking = BlockingConnection::new(conn).unwrap();
    AsyncSqliteDialect
        .set_isolation_level(&blocking, "AUTOCOMMIT")
        .unwrap();
    assert!(blocking.autocommit().unwrap());
    blocking.close().unwrap();
    assert!(AsyncSqliteDialect.is_disconnect(&Error::operational("x"), Some(&blocking), None));
}
