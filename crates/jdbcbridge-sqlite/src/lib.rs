//! Embedded SQLite native runtime for JDBC Bridge.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! [`SqliteRuntime`] plays the part of a hosted driver runtime: it is started
//! once, threads attach to it, and it keeps a driver manager where
//! [`SqliteDriver`] (class `org.sqlite.JDBC`) registers itself. Connections
//! take `jdbc:sqlite:<path>` or `jdbc:sqlite::memory:` DSNs.
//!
//! # Storage mapping
//!
//! | Native value | SQLite storage |
//! |--------------|----------------|
//! | boolean, byte, short, int, long | INTEGER |
//! | float, double | REAL |
//! | string, char, clob, big decimal | TEXT |
//! | bytes, blob | BLOB |
//! | date, time, timestamp | TEXT (ISO-8601) |
//!
//! Result columns are described with `java.sql.Types` codes derived from each
//! column's declared type.

// links the bundled library the bindings in `ffi` resolve against
use libsqlite3_sys as _;

pub mod connection;
pub mod ffi;
pub mod runtime;
pub mod types;

pub use connection::{DSN_PREFIX, OpenFlags, SqliteConfig, SqliteConnection, SqliteCursor};
pub use runtime::{SQLITE_DRIVER_CLASS, SqliteDriver, SqliteLoader, SqliteRuntime};

pub fn sqlite_version() -> &'static str {
    ffi::version()
}

pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
        assert!(sqlite_version_number() >= 3_000_000);
    }
}
