//! Contracts for the native runtime.
//!
//! The native runtime is the foreign driver ecosystem that actually talks to
//! the database. This module only describes what the bridge needs from it:
//!
//! - [`NativeRuntime`]: process-wide start, per-thread attach, the set of
//!   registered drivers and a [`DriverLoader`] for loading new ones
//! - [`NativeDriver`]: turns a DSN plus properties into a connection
//! - [`NativeConnection`] / [`NativeCursor`]: the statement-level surface
//!
//! Native values ([`NativeValue`]) carry the native class of each value so the
//! type registry can pick a pipeline by native type identifier.

use crate::value::Value;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Driver properties handed to [`NativeDriver::connect`].
pub type DriverProperties = BTreeMap<String, serde_json::Value>;

/// Result alias for native runtime calls.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// A wrapped native object that is not one of the primitive native classes.
pub trait NativeObject: fmt::Debug + Send + Sync {
    /// Fully-qualified native class name.
    fn class_name(&self) -> &str;

    /// Capability check for objects that know their own language-side value.
    fn as_native_decode(&self) -> Option<&dyn HasNativeDecode> {
        None
    }
}

/// Implemented by native objects that expose a language-side representation.
pub trait HasNativeDecode {
    fn to_value(&self) -> Value;
}

/// Identifier of a native value class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NativeType {
    Null,
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    BigDecimal,
    String,
    Char,
    Clob,
    Bytes,
    Blob,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Object,
}

impl NativeType {
    /// Native class name, as the runtime reports it.
    pub const fn class_name(self) -> &'static str {
        match self {
            NativeType::Null => "null",
            NativeType::Boolean => "java.lang.Boolean",
            NativeType::Byte => "java.lang.Byte",
            NativeType::Short => "java.lang.Short",
            NativeType::Int => "java.lang.Integer",
            NativeType::Long => "java.lang.Long",
            NativeType::Float => "java.lang.Float",
            NativeType::Double => "java.lang.Double",
            NativeType::BigDecimal => "java.math.BigDecimal",
            NativeType::String => "java.lang.String",
            NativeType::Char => "java.lang.Character",
            NativeType::Clob => "java.sql.Clob",
            NativeType::Bytes => "byte[]",
            NativeType::Blob => "java.sql.Blob",
            NativeType::Date => "java.sql.Date",
            NativeType::Time => "java.sql.Time",
            NativeType::Timestamp => "java.sql.Timestamp",
            NativeType::TimestampTz => "java.time.OffsetDateTime",
            NativeType::Object => "java.lang.Object",
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// A value as the native runtime produces or accepts it.
#[derive(Debug, Clone)]
pub enum NativeValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigDecimal(Decimal),
    String(String),
    Char(char),
    Clob(String),
    Bytes(Vec<u8>),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Object(Arc<dyn NativeObject>),
}

impl NativeValue {
    /// The native class of this value.
    pub const fn native_type(&self) -> NativeType {
        match self {
            NativeValue::Null => NativeType::Null,
            NativeValue::Boolean(_) => NativeType::Boolean,
            NativeValue::Byte(_) => NativeType::Byte,
            NativeValue::Short(_) => NativeType::Short,
            NativeValue::Int(_) => NativeType::Int,
            NativeValue::Long(_) => NativeType::Long,
            NativeValue::Float(_) => NativeType::Float,
            NativeValue::Double(_) => NativeType::Double,
            NativeValue::BigDecimal(_) => NativeType::BigDecimal,
            NativeValue::String(_) => NativeType::String,
            NativeValue::Char(_) => NativeType::Char,
            NativeValue::Clob(_) => NativeType::Clob,
            NativeValue::Bytes(_) => NativeType::Bytes,
            NativeValue::Blob(_) => NativeType::Blob,
            NativeValue::Date(_) => NativeType::Date,
            NativeValue::Time(_) => NativeType::Time,
            NativeValue::Timestamp(_) => NativeType::Timestamp,
            NativeValue::TimestampTz(_) => NativeType::TimestampTz,
            NativeValue::Object(_) => NativeType::Object,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }
}

/// Column metadata reported by a native cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeColumn {
    pub name: String,
    /// `java.sql.Types` code
    pub type_code: i32,
    /// Declared type name, if the engine reports one
    pub type_name: Option<String>,
    pub display_size: Option<i32>,
    pub internal_size: Option<i32>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    pub nullable: Option<bool>,
}

impl NativeColumn {
    pub fn new(name: impl Into<String>, type_code: i32) -> Self {
        Self {
            name: name.into(),
            type_code,
            type_name: None,
            display_size: None,
            internal_size: None,
            precision: None,
            scale: None,
            nullable: None,
        }
    }

    pub fn type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    pub fn nullable(mut self, nullable: Option<bool>) -> Self {
        self.nullable = nullable;
        self
    }
}

/// Native exception classes.
///
/// The variants form a class hierarchy; see [`NativeErrorKind::parent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeErrorKind {
    Error,
    Warning,
    Interface,
    Database,
    Data,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
    /// A driver class could not be located
    ClassNotFound,
    /// Failure inside the runtime itself
    Runtime,
}

impl NativeErrorKind {
    /// Direct superclass, `None` for the root.
    pub const fn parent(self) -> Option<Self> {
        match self {
            NativeErrorKind::Error => None,
            NativeErrorKind::Warning
            | NativeErrorKind::Interface
            | NativeErrorKind::Database
            | NativeErrorKind::Runtime => Some(NativeErrorKind::Error),
            NativeErrorKind::Data
            | NativeErrorKind::Operational
            | NativeErrorKind::Integrity
            | NativeErrorKind::Internal
            | NativeErrorKind::Programming
            | NativeErrorKind::NotSupported => Some(NativeErrorKind::Database),
            NativeErrorKind::ClassNotFound => Some(NativeErrorKind::Interface),
        }
    }

    /// `true` if `self` is `ancestor` or one of its subclasses.
    pub fn is_a(self, ancestor: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// An exception raised by the native runtime.
#[derive(Debug, Clone)]
pub struct NativeError {
    pub kind: NativeErrorKind,
    pub message: String,
    pub sqlstate: Option<String>,
    pub vendor_code: Option<i32>,
}

impl NativeError {
    pub fn new(kind: NativeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sqlstate: None,
            vendor_code: None,
        }
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    pub fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = Some(code);
        self
    }

    /// The exception's constructor arguments.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.message.clone()];
        if let Some(state) = &self.sqlstate {
            args.push(state.clone());
        }
        if let Some(code) = self.vendor_code {
            args.push(code.to_string());
        }
        args
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(state) = &self.sqlstate {
            write!(f, " (SQLSTATE {})", state)?;
        }
        Ok(())
    }
}

impl std::error::Error for NativeError {}

/// The foreign runtime hosting native drivers.
pub trait NativeRuntime: Send + Sync {
    /// Runtime name, for diagnostics.
    fn name(&self) -> &str;

    /// Start the runtime with `modules` on its class path.
    ///
    /// Called at most once per process by the bridge context.
    fn start(&self, modules: &[PathBuf]) -> NativeResult<()>;

    /// Attach the calling OS thread to the runtime.
    ///
    /// Called at most once per thread by the bridge context.
    fn attach_current_thread(&self) -> NativeResult<()>;

    /// Drivers already registered with the runtime's driver manager.
    fn registered_drivers(&self) -> Vec<Arc<dyn NativeDriver>>;

    /// Register a driver with the runtime's driver manager.
    fn register_driver(&self, driver: Arc<dyn NativeDriver>);

    /// Loader used for drivers that are not registered yet.
    fn loader(&self) -> &dyn DriverLoader;
}

/// Loads a driver class out of auxiliary binary modules.
pub trait DriverLoader: Send + Sync {
    fn load(&self, class_name: &str, modules: &[PathBuf]) -> NativeResult<Arc<dyn NativeDriver>>;
}

/// A native driver instance.
pub trait NativeDriver: fmt::Debug + Send + Sync {
    /// Fully-qualified driver class name.
    fn class_name(&self) -> &str;

    /// Whether this driver understands `dsn`.
    fn accepts_url(&self, dsn: &str) -> bool;

    fn connect(
        &self,
        dsn: &str,
        properties: &DriverProperties,
    ) -> NativeResult<Box<dyn NativeConnection>>;
}

/// A native connection handle.
pub trait NativeConnection: Send {
    fn create_cursor(&mut self) -> NativeResult<Box<dyn NativeCursor>>;

    fn commit(&mut self) -> NativeResult<()>;

    fn rollback(&mut self) -> NativeResult<()>;

    fn close(&mut self) -> NativeResult<()>;

    fn is_closed(&self) -> bool;

    fn autocommit(&self) -> NativeResult<bool>;

    fn set_autocommit(&mut self, autocommit: bool) -> NativeResult<()>;
}

/// A native statement / result-set handle.
pub trait NativeCursor: Send {
    /// Execute one statement with positional parameters.
    fn execute(&mut self, sql: &str, params: &[NativeValue]) -> NativeResult<()>;

    /// Execute one statement once per parameter set as a single batch.
    fn execute_batch(&mut self, sql: &str, batches: &[Vec<NativeValue>]) -> NativeResult<()>;

    /// Result columns of the last statement, `None` if it produced no result set.
    fn columns(&self) -> Option<&[NativeColumn]>;

    /// Rows affected by the last statement, `-1` if unknown.
    fn update_count(&self) -> i64;

    /// Row id generated by the last insert, if any.
    fn last_row_id(&self) -> Option<i64>;

    /// Advance the result set by one row.
    fn fetch_next(&mut self) -> NativeResult<Option<Vec<NativeValue>>>;

    fn close(&mut self) -> NativeResult<()>;

    /// `true` if this handle or its connection has been closed.
    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_hierarchy() {
        assert!(NativeErrorKind::Integrity.is_a(NativeErrorKind::Database));
        assert!(NativeErrorKind::Integrity.is_a(NativeErrorKind::Error));
        assert!(!NativeErrorKind::Integrity.is_a(NativeErrorKind::Programming));
        assert!(NativeErrorKind::ClassNotFound.is_a(NativeErrorKind::Interface));
        assert!(!NativeErrorKind::Interface.is_a(NativeErrorKind::Database));
        assert!(NativeErrorKind::Warning.is_a(NativeErrorKind::Error));
        assert_eq!(NativeErrorKind::Error.parent(), None);
    }

    #[test]
    fn test_native_error_args() {
        let err = NativeError::new(NativeErrorKind::Integrity, "UNIQUE constraint failed")
            .with_sqlstate("23000")
            .with_vendor_code(19);
        assert_eq!(err.args(), vec!["UNIQUE constraint failed", "23000", "19"]);
        assert_eq!(
            err.to_string(),
            "Integrity: UNIQUE constraint failed (SQLSTATE 23000)"
        );
    }

    #[test]
    fn test_native_type_of_value() {
        assert_eq!(NativeValue::Long(1).native_type(), NativeType::Long);
        assert_eq!(
            NativeValue::Clob("x".into()).native_type(),
            NativeType::Clob
        );
        assert!(NativeValue::Null.is_null());
        assert_eq!(NativeType::Int.class_name(), "java.lang.Integer");
    }
}
