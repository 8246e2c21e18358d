use chrono::NaiveDate;
use jdbcbridge::{ConnectArgs, Connection, Context, DriverErrorKind, Value};
use jdbcbridge_sqlite::{SQLITE_DRIVER_CLASS, SqliteRuntime};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

fn open_memory() -> Connection {
    let ctx = Arc::new(Context::new(Arc::new(SqliteRuntime::new())));
    ctx.connect(ConnectArgs::new("jdbc:sqlite::memory:", SQLITE_DRIVER_CLASS))
        .expect("connect to in-memory sqlite")
        .into_sync()
        .expect("sync connection")
}

#[test]
fn create_insert_select_star() {
    let conn = open_memory();
    let mut cur = conn.cursor().unwrap();
    cur.execute(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        (),
    )
    .unwrap();
    cur.execute(
        "INSERT INTO users (id, name) VALUES (?, ?)",
        vec![Value::Int(1), Value::from("Alice")],
    )
    .unwrap();
    conn.commit().unwrap();

    cur.execute("SELECT * FROM users", ()).unwrap();
    let names: Vec<&str> = cur
        .description()
        .expect("select has a description")
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(names, vec!["id", "name"]);

    let rows = cur.fetchall().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values(), &[Value::Int(1), Value::Text("Alice".into())]);
    assert_eq!(rows[0].get_named::<String>("name").unwrap(), "Alice");
}

#[test]
fn invalid_sql_is_a_programming_error() {
    let conn = open_memory();
    let mut cur = conn.cursor().unwrap();
    let err = cur.execute("SELEKT * FROM nowhere", ()).unwrap_err();
    assert_eq!(err.kind(), Some(DriverErrorKind::Programming));
    assert!(err.is_a(DriverErrorKind::Database));
    assert!(err.to_string().starts_with("ProgrammingError"));
    assert!(err.native_cause().is_some());
}

#[test]
fn constraint_violation_is_an_integrity_error() {
    let conn = open_memory();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", ())
        .unwrap();
    let err = cur
        .execute("INSERT INTO t (id, name) VALUES (1, NULL)", ())
        .unwrap_err();
    assert!(err.is_integrity_error());
}

#[test]
fn empty_results_and_fresh_cursor() {
    let conn = open_memory();
    let mut cur = conn.cursor().unwrap();
    assert_eq!(cur.rowcount(), -1);
    assert!(cur.description().is_none());

    cur.execute("CREATE TABLE t (x INTEGER)", ()).unwrap();
    cur.execute("SELECT x FROM t", ()).unwrap();
    assert!(cur.fetchone().unwrap().is_none());
    cur.execute("SELECT x FROM t", ()).unwrap();
    assert!(cur.fetchall().unwrap().is_empty());
}

#[test]
fn close_twice_is_harmless() {
    let conn = open_memory();
    let mut cur = conn.cursor().unwrap();
    cur.close().unwrap();
    cur.close().unwrap();
    assert!(cur.is_closed());
    conn.close().unwrap();
    conn.close().unwrap();
    assert!(conn.is_closed());
}

#[test]
fn semantic_values_survive_the_database() {
    let conn = open_memory();
    let mut cur = conn.cursor().unwrap();
    cur.execute(
        "CREATE TABLE samples (flag BOOLEAN, born DATE, seen TIMESTAMP, blob BLOB, amount DECIMAL(10, 2))",
        (),
    )
    .unwrap();

    let born = NaiveDate::from_ymd_opt(1990, 4, 12).unwrap();
    let seen = born.and_hms_opt(8, 30, 15).unwrap();
    let amount = Decimal::from_str("1.10").unwrap();
    cur.execute(
        "INSERT INTO samples VALUES (?, ?, ?, ?, ?)",
        vec![
            Value::Bool(true),
            Value::Date(born),
            Value::Timestamp(seen),
            Value::Bytes(vec![0, 1, 2]),
            Value::Decimal(amount),
        ],
    )
    .unwrap();

    cur.execute("SELECT flag, born, seen, blob, amount FROM samples", ())
        .unwrap();
    let row = cur.fetchone().unwrap().unwrap();
    assert_eq!(row.get(0), Some(&Value::Bool(true)));
    assert_eq!(row.get(1), Some(&Value::Date(born)));
    assert_eq!(row.get(2), Some(&Value::Timestamp(seen)));
    assert_eq!(row.get(3), Some(&Value::Bytes(vec![0, 1, 2])));

    // decimals travel as doubles: equal numerically, not necessarily in scale
    let back = row.get_as::<f64>(4).unwrap();
    assert!((back - 1.10).abs() < 1e-9);
}

#[test]
fn named_parameters_follow_insertion_order() {
    let conn = open_memory();
    let mut cur = conn.cursor().unwrap();
    cur.execute("SELECT ? - ?", [("a", Value::Int(10)), ("b", Value::Int(3))])
        .unwrap();
    let row = cur.fetchone().unwrap().unwrap();
    assert_eq!(row.get_as::<i64>(0).unwrap(), 7);
}
