//! Error types for bridge operations.
//!
//! Database interaction failures surface as [`Error::Driver`], whose
//! [`DriverErrorKind`] follows the DBAPI hierarchy:
//!
//! ```text
//! Error
//! ├── Warning
//! ├── InterfaceError
//! └── DatabaseError
//!     ├── DataError
//!     ├── OperationalError
//!     ├── IntegrityError
//!     ├── InternalError
//!     ├── ProgrammingError
//!     └── NotSupportedError
//! ```
//!
//! Registry misses and configuration mistakes are not database failures and
//! use [`Error::Lookup`] and [`Error::Config`] instead.

use crate::native::{NativeError, NativeErrorKind, NativeResult};
use std::fmt;

/// The primary error type for all bridge operations.
#[derive(Debug)]
pub enum Error {
    /// DBAPI taxonomy member
    Driver(DriverError),
    /// Type registry lookup failed
    Lookup(LookupError),
    /// Row value could not be converted to the requested Rust type
    Type(TypeError),
    /// Configuration / settings errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
    /// Arguments of the originating native exception
    pub args: Vec<String>,
    pub sqlstate: Option<String>,
    pub vendor_code: Option<i32>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Caller-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
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
}

/// Most-specific-first order used by [`translate`].
pub const TRANSLATION_ORDER: [DriverErrorKind; 10] = [
    DriverErrorKind::NotSupported,
    DriverErrorKind::Programming,
    DriverErrorKind::Internal,
    DriverErrorKind::Integrity,
    DriverErrorKind::Operational,
    DriverErrorKind::Data,
    DriverErrorKind::Database,
    DriverErrorKind::Interface,
    DriverErrorKind::Warning,
    DriverErrorKind::Error,
];

impl DriverErrorKind {
    /// DBAPI class name of this kind.
    pub const fn class_name(self) -> &'static str {
        match self {
            DriverErrorKind::Error => "Error",
            DriverErrorKind::Warning => "Warning",
            DriverErrorKind::Interface => "InterfaceError",
            DriverErrorKind::Database => "DatabaseError",
            DriverErrorKind::Data => "DataError",
            DriverErrorKind::Operational => "OperationalError",
            DriverErrorKind::Integrity => "IntegrityError",
            DriverErrorKind::Internal => "InternalError",
            DriverErrorKind::Programming => "ProgrammingError",
            DriverErrorKind::NotSupported => "NotSupportedError",
        }
    }

    /// Direct parent in the taxonomy, `None` for the root.
    pub const fn parent(self) -> Option<Self> {
        match self {
            DriverErrorKind::Error => None,
            DriverErrorKind::Warning | DriverErrorKind::Interface | DriverErrorKind::Database => {
                Some(DriverErrorKind::Error)
            }
            DriverErrorKind::Data
            | DriverErrorKind::Operational
            | DriverErrorKind::Integrity
            | DriverErrorKind::Internal
            | DriverErrorKind::Programming
            | DriverErrorKind::NotSupported => Some(DriverErrorKind::Database),
        }
    }

    /// `true` if `self` is `ancestor` or rolls up under it.
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

    /// The native exception class this member wraps.
    pub const fn native_kind(self) -> NativeErrorKind {
        match self {
            DriverErrorKind::Error => NativeErrorKind::Error,
            DriverErrorKind::Warning => NativeErrorKind::Warning,
            DriverErrorKind::Interface => NativeErrorKind::Interface,
            DriverErrorKind::Database => NativeErrorKind::Database,
            DriverErrorKind::Data => NativeErrorKind::Data,
            DriverErrorKind::Operational => NativeErrorKind::Operational,
            DriverErrorKind::Integrity => NativeErrorKind::Integrity,
            DriverErrorKind::Internal => NativeErrorKind::Internal,
            DriverErrorKind::Programming => NativeErrorKind::Programming,
            DriverErrorKind::NotSupported => NativeErrorKind::NotSupported,
        }
    }

    /// Pick the taxonomy member for a native exception class.
    pub fn for_native(kind: NativeErrorKind) -> Self {
        TRANSLATION_ORDER
            .into_iter()
            .find(|member| kind.is_a(member.native_kind()))
            .unwrap_or(DriverErrorKind::Error)
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

#[derive(Debug)]
pub struct LookupError {
    /// Rendered registry key that was not found
    pub key: String,
    pub message: String,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            args: vec![message.clone()],
            message,
            sqlstate: None,
            vendor_code: None,
            source: None,
        }
    }
}

impl From<NativeError> for DriverError {
    fn from(err: NativeError) -> Self {
        Self {
            kind: DriverErrorKind::for_native(err.kind),
            message: err.message.clone(),
            args: err.args(),
            sqlstate: err.sqlstate.clone(),
            vendor_code: err.vendor_code,
            source: Some(Box::new(err)),
        }
    }
}

impl Error {
    fn driver(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Error::Driver(DriverError::new(kind, message))
    }

    pub fn interface(message: impl Into<String>) -> Self {
        Self::driver(DriverErrorKind::Interface, message)
    }

    pub fn operational(message: impl Into<String>) -> Self {
        Self::driver(DriverErrorKind::Operational, message)
    }

    pub fn programming(message: impl Into<String>) -> Self {
        Self::driver(DriverErrorKind::Programming, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::driver(DriverErrorKind::Data, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::driver(DriverErrorKind::Internal, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::driver(DriverErrorKind::NotSupported, message)
    }

    pub fn lookup(key: impl fmt::Display) -> Self {
        let key = key.to_string();
        Error::Lookup(LookupError {
            message: format!("no type pipeline registered for {}", key),
            key,
        })
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Taxonomy member, if this is a database interaction error.
    pub fn kind(&self) -> Option<DriverErrorKind> {
        match self {
            Error::Driver(e) => Some(e.kind),
            _ => None,
        }
    }

    /// `true` if this error is `kind` or rolls up under it.
    pub fn is_a(&self, kind: DriverErrorKind) -> bool {
        self.kind().is_some_and(|k| k.is_a(kind))
    }

    pub fn is_programming_error(&self) -> bool {
        self.is_a(DriverErrorKind::Programming)
    }

    pub fn is_operational_error(&self) -> bool {
        self.is_a(DriverErrorKind::Operational)
    }

    pub fn is_integrity_error(&self) -> bool {
        self.is_a(DriverErrorKind::Integrity)
    }

    pub fn is_interface_error(&self) -> bool {
        self.is_a(DriverErrorKind::Interface)
    }

    /// Get SQLSTATE if available
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Driver(e) => e.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// The native exception this error was translated from, if any.
    pub fn native_cause(&self) -> Option<&NativeError> {
        match self {
            Error::Driver(e) => e.source.as_deref().and_then(|s| s.downcast_ref()),
            _ => None,
        }
    }
}

/// Run a native call, translating any native exception into the taxonomy.
///
/// The native exception is kept as the translated error's source.
#[allow(clippy::result_large_err)]
pub fn translate<T>(call: impl FnOnce() -> NativeResult<T>) -> Result<T> {
    call().map_err(Error::from)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Driver(e) => write!(f, "{}", e),
            Error::Lookup(e) => write!(f, "Lookup error: {}", e.message),
            Error::Type(e) => write!(f, "{}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Driver(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{}: {} (SQLSTATE {})", self.kind, self.message, sqlstate)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "Type error in column '{}': expected {}, found {}",
                col, self.expected, self.actual
            )
        } else {
            write!(f, "Type error: expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        Error::Driver(DriverError::from(err))
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        Error::Driver(err)
    }
}

impl From<LookupError> for Error {
    fn from(err: LookupError) -> Self {
        Error::Lookup(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn translation_prefers_most_specific_member() {
        let cases = [
            (NativeErrorKind::NotSupported, DriverErrorKind::NotSupported),
            (NativeErrorKind::Programming, DriverErrorKind::Programming),
            (NativeErrorKind::Internal, DriverErrorKind::Internal),
            (NativeErrorKind::Integrity, DriverErrorKind::Integrity),
            (NativeErrorKind::Operational, DriverErrorKind::Operational),
            (NativeErrorKind::Data, DriverErrorKind::Data),
            (NativeErrorKind::Database, DriverErrorKind::Database),
            (NativeErrorKind::Interface, DriverErrorKind::Interface),
            (NativeErrorKind::ClassNotFound, DriverErrorKind::Interface),
            (NativeErrorKind::Warning, DriverErrorKind::Warning),
            (NativeErrorKind::Runtime, DriverErrorKind::Error),
            (NativeErrorKind::Error, DriverErrorKind::Error),
        ];
        for (native, expected) in cases {
            assert_eq!(DriverErrorKind::for_native(native), expected, "{native:?}");
        }
    }

    #[test]
    fn translate_preserves_cause_and_args() {
        let result: Result<()> = translate(|| {
            Err(NativeError::new(NativeErrorKind::Programming, "near \"SELEC\": syntax error")
                .with_vendor_code(1))
        });
        let err = result.unwrap_err();
        assert!(err.is_programming_error());
        assert!(err.is_a(DriverErrorKind::Database));
        assert!(err.is_a(DriverErrorKind::Error));
        assert!(!err.is_a(DriverErrorKind::Interface));

        let Error::Driver(driver) = &err else {
            panic!("expected driver error");
        };
        assert_eq!(driver.args, vec!["near \"SELEC\": syntax error", "1"]);

        let cause = err.native_cause().expect("native cause kept");
        assert_eq!(cause.kind, NativeErrorKind::Programming);
        assert!(err.source().is_some());
    }

    #[test]
    fn translate_passes_success_through() {
        let value = translate(|| Ok::<_, NativeError>(42)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn lookup_and_config_errors_are_not_taxonomy_members() {
        let lookup = Error::lookup("Name(\"VARCHAR2\")");
        assert_eq!(lookup.kind(), None);
        assert!(!lookup.is_a(DriverErrorKind::Error));

        let config = Error::config("bad setting");
        assert_eq!(config.kind(), None);
        assert_eq!(config.to_string(), "Configuration error: bad setting");
    }

    #[test]
    fn display_includes_class_name() {
        let err = Error::operational("Connection is closed");
        assert_eq!(err.to_string(), "OperationalError: Connection is closed");
    }
}
