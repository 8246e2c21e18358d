//! Dialect capability settings and their inheritance.
//!
//! Every capability is optional. A dialect declares only what it changes and
//! resolves the rest from a base with [`merge_settings`]; a field still unset
//! after resolution means "use the engine framework's own default".

use jdbcbridge_core::{Value, ValueType};
use serde::Serialize;

/// Post-processing applied to a decoded result value of one semantic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnProcessor {
    /// Leave the value untouched.
    Passthrough,
    /// Promote a calendar date to midnight of that day.
    DateAsTimestamp,
}

impl ColumnProcessor {
    pub fn apply(self, value: Value) -> Value {
        match (self, value) {
            (ColumnProcessor::DateAsTimestamp, Value::Date(date)) => {
                Value::Timestamp(date.and_time(chrono::NaiveTime::MIN))
            }
            (_, value) => value,
        }
    }
}

macro_rules! dialect_settings {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty ),* $(,)?) => {
        /// Capability settings of a dialect.
        ///
        /// `name` and `driver` identify the dialect and are never inherited.
        #[derive(Debug, Clone, Default, PartialEq, Serialize)]
        pub struct DialectSettings {
            pub name: String,
            pub driver: String,
            $(
                $(#[$meta])*
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl DialectSettings {
            /// Names of every optional field.
            pub const FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];

            fn fill_from(&mut self, base: &DialectSettings) {
                $(
                    if self.$field.is_none() {
                        self.$field.clone_from(&base.$field);
                    }
                )*
            }

            /// Optional fields still unset.
            pub fn unset_fields(&self) -> Vec<&'static str> {
                let mut unset = Vec::new();
                $(
                    if self.$field.is_none() {
                        unset.push(stringify!($field));
                    }
                )*
                unset
            }
        }
    };
}

dialect_settings! {
    supports_alter: bool,
    supports_comments: bool,
    supports_statement_cache: bool,
    supports_sequences: bool,
    supports_native_boolean: bool,
    supports_native_decimal: bool,
    supports_native_enum: bool,
    supports_native_uuid: bool,
    /// `rowcount` is reliable for UPDATE / DELETE
    supports_sane_rowcount: bool,
    /// `rowcount` is reliable after `executemany`
    supports_sane_multi_rowcount: bool,
    supports_multivalues_insert: bool,
    supports_default_values: bool,
    supports_empty_insert: bool,
    insert_returning: bool,
    update_returning: bool,
    delete_returning: bool,
    use_insertmanyvalues: bool,
    insertmanyvalues_page_size: usize,
    max_identifier_length: usize,
    requires_name_normalize: bool,
    default_paramstyle: String,
    is_async: bool,
    has_terminate: bool,
    div_is_floordiv: bool,
    /// Tokens concatenated to form the native DSN prefix
    jdbc_dsn_prefix: Vec<String>,
    /// Result processors by semantic type
    colspecs: Vec<(ValueType, ColumnProcessor)>,
}

impl DialectSettings {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            ..Self::default()
        }
    }

    /// `name+driver`, the form used in connection URL schemes.
    pub fn description(&self) -> String {
        format!("{}+{}", self.name, self.driver)
    }

    /// The full native DSN prefix.
    pub fn dsn_prefix(&self) -> String {
        self.jdbc_dsn_prefix
            .as_deref()
            .map(|tokens| tokens.concat())
            .unwrap_or_default()
    }

    pub fn is_async(&self) -> bool {
        self.is_async.unwrap_or(false)
    }

    pub fn colspec(&self, value_type: ValueType) -> Option<ColumnProcessor> {
        self.colspecs
            .as_deref()?
            .iter()
            .find(|(ty, _)| *ty == value_type)
            .map(|(_, processor)| *processor)
    }

    /// The resolved settings as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Resolve `derived` against `base`.
///
/// Every optional field unset on `derived` takes `base`'s value, which may
/// itself be unset. `name` and `driver` always stay `derived`'s.
pub fn merge_settings(mut derived: DialectSettings, base: &DialectSettings) -> DialectSettings {
    derived.fill_from(base);
    derived
}

/// Resolve `derived` against each base in turn, nearest first.
pub fn resolve_settings<'a>(
    derived: DialectSettings,
    bases: impl IntoIterator<Item = &'a DialectSettings>,
) -> DialectSettings {
    bases.into_iter().fold(derived, merge_settings)
}

/// Engine framework defaults shared by every dialect.
pub fn default_engine() -> DialectSettings {
    DialectSettings {
        supports_alter: Some(true),
        supports_comments: Some(false),
        supports_statement_cache: Some(true),
        supports_sequences: Some(false),
        supports_native_boolean: Some(false),
        supports_native_decimal: Some(false),
        supports_native_enum: Some(false),
        supports_native_uuid: Some(false),
        supports_sane_rowcount: Some(true),
        supports_sane_multi_rowcount: Some(true),
        supports_multivalues_insert: Some(false),
        supports_default_values: Some(false),
        supports_empty_insert: Some(true),
        insert_returning: Some(false),
        update_returning: Some(false),
        delete_returning: Some(false),
        use_insertmanyvalues: Some(false),
        insertmanyvalues_page_size: Some(1000),
        max_identifier_length: Some(9999),
        requires_name_normalize: Some(false),
        default_paramstyle: Some("named".to_string()),
        is_async: Some(false),
        has_terminate: Some(false),
        div_is_floordiv: Some(true),
        ..DialectSettings::new("default", "default")
    }
}

pub fn sqlite_engine() -> DialectSettings {
    DialectSettings {
        supports_alter: Some(false),
        supports_default_values: Some(true),
        supports_empty_insert: Some(false),
        supports_multivalues_insert: Some(true),
        use_insertmanyvalues: Some(true),
        insert_returning: Some(true),
        update_returning: Some(true),
        delete_returning: Some(true),
        div_is_floordiv: Some(false),
        default_paramstyle: Some("qmark".to_string()),
        ..DialectSettings::new("sqlite", "pysqlite")
    }
}

pub fn postgresql_engine() -> DialectSettings {
    DialectSettings {
        max_identifier_length: Some(63),
        supports_comments: Some(true),
        supports_sequences: Some(true),
        supports_native_boolean: Some(true),
        supports_native_decimal: Some(true),
        supports_native_enum: Some(true),
        supports_native_uuid: Some(true),
        supports_default_values: Some(true),
        supports_empty_insert: Some(false),
        supports_multivalues_insert: Some(true),
        insert_returning: Some(true),
        update_returning: Some(true),
        delete_returning: Some(true),
        use_insertmanyvalues: Some(true),
        default_paramstyle: Some("pyformat".to_string()),
        ..DialectSettings::new("postgresql", "psycopg2")
    }
}

pub fn mssql_engine() -> DialectSettings {
    DialectSettings {
        max_identifier_length: Some(128),
        supports_comments: Some(true),
        supports_sequences: Some(true),
        supports_native_boolean: Some(false),
        supports_native_decimal: Some(true),
        supports_native_uuid: Some(true),
        supports_default_values: Some(true),
        supports_empty_insert: Some(false),
        supports_multivalues_insert: Some(true),
        insert_returning: Some(true),
        update_returning: Some(true),
        delete_returning: Some(true),
        use_insertmanyvalues: Some(true),
        div_is_floordiv: Some(false),
        default_paramstyle: Some("named".to_string()),
        ..DialectSettings::new("mssql", "pyodbc")
    }
}

/// Settings every JDBC-backed dialect shares, ahead of its engine's.
pub fn jdbc_connector() -> DialectSettings {
    DialectSettings {
        jdbc_dsn_prefix: Some(vec!["jdbc://".to_string()]),
        supports_sane_rowcount: Some(true),
        supports_sane_multi_rowcount: Some(false),
        supports_native_decimal: Some(true),
        default_paramstyle: Some(jdbcbridge_core::PARAMSTYLE.to_string()),
        ..DialectSettings::new("jdbc_wrapper_base_connector", "jdbc_wrapper_base_driver")
    }
}

/// Resolve a JDBC dialect: its own settings, then the connector's, then
/// `engine`'s, then the framework defaults.
pub fn resolve_jdbc_dialect(own: DialectSettings, engine: &DialectSettings) -> DialectSettings {
    resolve_settings(own, [&jdbc_connector(), engine, &default_engine()])
}

/// Driver name of the synchronous JDBC dialects.
pub const SYNC_DRIVER: &str = "jdbc_wrapper";

/// Driver name of the async JDBC dialects.
pub const ASYNC_DRIVER: &str = "jdbc_async_wrapper";

/// The async sibling of a resolved sync dialect: same name and settings,
/// async driver identity and `is_async` set.
pub fn async_sibling(sync: &DialectSettings) -> DialectSettings {
    merge_settings(
        DialectSettings {
            is_async: Some(true),
            ..DialectSettings::new(sync.name.clone(), ASYNC_DRIVER)
        },
        sync,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_unset_fields_inherit_from_base() {
        let base = DialectSettings {
            supports_alter: Some(true),
            max_identifier_length: Some(63),
            ..DialectSettings::new("base", "base_driver")
        };
        let derived = DialectSettings {
            supports_alter: Some(false),
            ..DialectSettings::new("derived", "derived_driver")
        };
        let merged = merge_settings(derived, &base);
        assert_eq!(merged.supports_alter, Some(false));
        assert_eq!(merged.max_identifier_length, Some(63));
        assert_eq!(merged.supports_sequences, None);
        assert_eq!(merged.name, "derived");
        assert_eq!(merged.driver, "derived_driver");
    }

    #[test]
    fn test_every_field_follows_the_merge_rule() {
        let empty = DialectSettings::new("x", "y");
        let full = merge_settings(empty.clone(), &default_engine());
        let with_prefix = merge_settings(full, &jdbc_connector());
        let complete = merge_settings(
            with_prefix,
            &DialectSettings {
                colspecs: Some(Vec::new()),
                ..DialectSettings::new("z", "z")
            },
        );
        assert!(complete.unset_fields().is_empty());
        assert_eq!(empty.unset_fields().len(), DialectSettings::FIELDS.len());

        // unset on both sides stays unset
        let still_empty = merge_settings(empty.clone(), &DialectSettings::new("a", "b"));
        assert_eq!(still_empty, empty);
    }

    #[test]
    fn test_connector_overrides_engine_defaults() {
        let resolved = resolve_jdbc_dialect(
            DialectSettings::new("postgresql", "jdbc_wrapper"),
            &postgresql_engine(),
        );
        assert_eq!(resolved.default_paramstyle.as_deref(), Some("qmark"));
        assert_eq!(resolved.supports_sane_multi_rowcount, Some(false));
        assert_eq!(resolved.max_identifier_length, Some(63));
        assert_eq!(resolved.supports_statement_cache, Some(true));
        assert_eq!(resolved.dsn_prefix(), "jdbc://");
        assert!(!resolved.is_async());
    }

    #[test]
    fn test_async_sibling_shares_everything_else() {
        let sync = resolve_jdbc_dialect(
            DialectSettings {
                is_async: Some(false),
                ..DialectSettings::new("sqlite", SYNC_DRIVER)
            },
            &sqlite_engine(),
        );
        let sibling = async_sibling(&sync);
        assert_eq!(sibling.name, "sqlite");
        assert_eq!(sibling.driver, ASYNC_DRIVER);
        assert!(sibling.is_async());
        let normalize = |s: &DialectSettings| DialectSettings {
            driver: String::new(),
            is_async: None,
            ..s.clone()
        };
        assert_eq!(normalize(&sibling), normalize(&sync));
    }

    #[test]
    fn test_description_and_json_dump() {
        let settings = DialectSettings {
            is_async: Some(true),
            ..DialectSettings::new("sqlite", "jdbc_async_wrapper")
        };
        assert_eq!(settings.description(), "sqlite+jdbc_async_wrapper");
        let json = settings.to_json();
        assert_eq!(json["name"], "sqlite");
        assert_eq!(json["is_async"], true);
        assert!(json.get("supports_alter").is_none());
    }

    #[test]
    fn test_date_as_timestamp_processor() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let promoted = ColumnProcessor::DateAsTimestamp.apply(Value::Date(date));
        assert_eq!(
            promoted,
            Value::Timestamp(date.and_hms_opt(0, 0, 0).unwrap())
        );
        assert_eq!(
            ColumnProcessor::DateAsTimestamp.apply(Value::Int(3)),
            Value::Int(3)
        );
        assert_eq!(
            ColumnProcessor::Passthrough.apply(Value::Date(date)),
            Value::Date(date)
        );
    }
}
