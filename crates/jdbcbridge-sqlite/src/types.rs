//! Moving native values in and out of SQLite statements.
//!
//! SQLite stores five classes of value: INTEGER, REAL, TEXT, BLOB and NULL.
//! Temporal values are bound as ISO-8601 text and come back as text; the type
//! registry turns that text back into dates, times and timestamps when the
//! column is declared with a temporal type.

#![allow(clippy::cast_possible_truncation)]

use crate::ffi;
use jdbcbridge_core::{NativeError, NativeErrorKind, NativeValue};
use std::ffi::{CStr, c_int};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
pub const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Text form of a value SQLite stores as TEXT, `None` for everything else.
pub fn text_form(value: &NativeValue) -> Option<String> {
    match value {
        NativeValue::String(s) | NativeValue::Clob(s) => Some(s.clone()),
        NativeValue::Char(c) => Some(c.to_string()),
        NativeValue::BigDecimal(d) => Some(d.to_string()),
        NativeValue::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
        NativeValue::Time(t) => Some(t.format(TIME_FORMAT).to_string()),
        NativeValue::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
        NativeValue::TimestampTz(ts) => Some(ts.format(TIMESTAMP_TZ_FORMAT).to_string()),
        _ => None,
    }
}

/// Bind a native value to a 1-based statement parameter.
///
/// Returns the SQLite result code of the bind call.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
pub unsafe fn bind_value(
    stmt: *mut ffi::sqlite3_stmt,
    index: c_int,
    value: &NativeValue,
) -> Result<c_int, NativeError> {
    if let Some(text) = text_form(value) {
        let bytes = text.as_bytes();
        // SAFETY: SQLITE_TRANSIENT makes SQLite copy `bytes` before returning
        return Ok(unsafe {
            ffi::sqlite3_bind_text(
                stmt,
                index,
                bytes.as_ptr().cast(),
                bytes.len() as c_int,
                ffi::SQLITE_TRANSIENT,
            )
        });
    }

    // SAFETY: caller guarantees `stmt`; blob data is copied by SQLite
    let rc = unsafe {
        match value {
            NativeValue::Null => ffi::sqlite3_bind_null(stmt, index),
            NativeValue::Boolean(b) => ffi::sqlite3_bind_int64(stmt, index, i64::from(*b)),
            NativeValue::Byte(v) => ffi::sqlite3_bind_int64(stmt, index, i64::from(*v)),
            NativeValue::Short(v) => ffi::sqlite3_bind_int64(stmt, index, i64::from(*v)),
            NativeValue::Int(v) => ffi::sqlite3_bind_int64(stmt, index, i64::from(*v)),
            NativeValue::Long(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            NativeValue::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),
            NativeValue::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            NativeValue::Bytes(b) | NativeValue::Blob(b) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::SQLITE_TRANSIENT,
            ),
            NativeValue::Object(obj) => {
                return Err(NativeError::new(
                    NativeErrorKind::NotSupported,
                    format!("cannot bind object of class {}", obj.class_name()),
                ));
            }
            // text forms were handled above
            _ => ffi::SQLITE_MISMATCH,
        }
    };
    Ok(rc)
}

/// Read a column of the current row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> NativeValue {
    // SAFETY: guaranteed by caller
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => NativeValue::Long(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => NativeValue::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    NativeValue::Null
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    NativeValue::String(String::from_utf8_lossy(slice).into_owned())
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    NativeValue::Bytes(Vec::new())
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    NativeValue::Bytes(slice.to_vec())
                }
            }
            _ => NativeValue::Null,
        }
    }
}

/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: guaranteed by caller
    unsafe { c_string(ffi::sqlite3_column_name(stmt, index)) }
}

/// Declared type of a result column; `None` for expressions.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_decltype(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: guaranteed by caller
    unsafe { c_string(ffi::sqlite3_column_decltype(stmt, index)) }
}

unsafe fn c_string(ptr: *const std::ffi::c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: SQLite returns NUL-terminated strings valid until the next call
        unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .ok()
            .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    #[test]
    fn test_temporal_text_forms() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(7, 5, 3, 120)
            .unwrap();
        assert_eq!(
            text_form(&NativeValue::Date(ts.date())).as_deref(),
            Some("2024-03-09")
        );
        assert_eq!(
            text_form(&NativeValue::Time(ts.time())).as_deref(),
            Some("07:05:03.120")
        );
        assert_eq!(
            text_form(&NativeValue::Timestamp(ts)).as_deref(),
            Some("2024-03-09 07:05:03.120")
        );

        let whole = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 3)
            .unwrap();
        assert_eq!(
            text_form(&NativeValue::Timestamp(whole)).as_deref(),
            Some("2024-03-09 07:05:03")
        );

        let offset = FixedOffset::east_opt(3600).unwrap();
        let tz = offset.with_ymd_and_hms(2024, 3, 9, 7, 5, 3).unwrap();
        assert_eq!(
            text_form(&NativeValue::TimestampTz(tz)).as_deref(),
            Some("2024-03-09 07:05:03+01:00")
        );
    }

    #[test]
    fn test_non_text_values_have_no_text_form() {
        assert!(text_form(&NativeValue::Long(1)).is_none());
        assert!(text_form(&NativeValue::Null).is_none());
        assert!(text_form(&NativeValue::Bytes(vec![1])).is_none());
    }
}
