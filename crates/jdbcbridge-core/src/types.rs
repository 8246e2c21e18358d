//! JDBC type codes.
//!
//! Native cursors describe result columns with `java.sql.Types` codes. Each
//! code is paired with the semantic [`ValueType`] its values decode to, which
//! is how a column's type code resolves to a type pipeline.

use crate::value::ValueType;

/// `java.sql.Types` constants.
#[allow(missing_docs)]
pub mod codes {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const FLOAT: i32 = 6;
    pub const REAL: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const LONGVARCHAR: i32 = -1;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const LONGVARBINARY: i32 = -4;
    pub const NULL: i32 = 0;
    pub const OTHER: i32 = 1111;
    pub const JAVA_OBJECT: i32 = 2000;
    pub const DISTINCT: i32 = 2001;
    pub const STRUCT: i32 = 2002;
    pub const ARRAY: i32 = 2003;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const REF: i32 = 2006;
    pub const DATALINK: i32 = 70;
    pub const BOOLEAN: i32 = 16;
    pub const ROWID: i32 = -8;
    pub const NCHAR: i32 = -15;
    pub const NVARCHAR: i32 = -9;
    pub const LONGNVARCHAR: i32 = -16;
    pub const NCLOB: i32 = 2011;
    pub const SQLXML: i32 = 2009;
    pub const REF_CURSOR: i32 = 2012;
    pub const TIME_WITH_TIMEZONE: i32 = 2013;
    pub const TIMESTAMP_WITH_TIMEZONE: i32 = 2014;
}

/// A JDBC type paired with the semantic type its values decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JdbcType {
    pub name: &'static str,
    pub code: i32,
    pub value_type: ValueType,
}

impl JdbcType {
    pub const fn new(name: &'static str, code: i32, value_type: ValueType) -> Self {
        Self {
            name,
            code,
            value_type,
        }
    }
}

/// Standard JDBC types known to the bridge.
pub const JDBC_TYPES: &[JdbcType] = &[
    JdbcType::new("ARRAY", codes::ARRAY, ValueType::Object),
    JdbcType::new("BIGINT", codes::BIGINT, ValueType::Int),
    JdbcType::new("BINARY", codes::BINARY, ValueType::Bytes),
    JdbcType::new("BIT", codes::BIT, ValueType::Bool),
    JdbcType::new("BLOB", codes::BLOB, ValueType::Bytes),
    JdbcType::new("BOOLEAN", codes::BOOLEAN, ValueType::Bool),
    JdbcType::new("CHAR", codes::CHAR, ValueType::Text),
    JdbcType::new("CLOB", codes::CLOB, ValueType::Text),
    JdbcType::new("DATALINK", codes::DATALINK, ValueType::Text),
    JdbcType::new("DATE", codes::DATE, ValueType::Date),
    JdbcType::new("DECIMAL", codes::DECIMAL, ValueType::Decimal),
    JdbcType::new("DISTINCT", codes::DISTINCT, ValueType::Object),
    JdbcType::new("DOUBLE", codes::DOUBLE, ValueType::Float),
    JdbcType::new("FLOAT", codes::FLOAT, ValueType::Float),
    JdbcType::new("INTEGER", codes::INTEGER, ValueType::Int),
    JdbcType::new("JAVA_OBJECT", codes::JAVA_OBJECT, ValueType::Object),
    JdbcType::new("LONGNVARCHAR", codes::LONGNVARCHAR, ValueType::Text),
    JdbcType::new("LONGVARBINARY", codes::LONGVARBINARY, ValueType::Bytes),
    JdbcType::new("LONGVARCHAR", codes::LONGVARCHAR, ValueType::Text),
    JdbcType::new("NCHAR", codes::NCHAR, ValueType::Text),
    JdbcType::new("NCLOB", codes::NCLOB, ValueType::Text),
    JdbcType::new("NULL", codes::NULL, ValueType::Null),
    JdbcType::new("NUMERIC", codes::NUMERIC, ValueType::Decimal),
    JdbcType::new("NVARCHAR", codes::NVARCHAR, ValueType::Text),
    JdbcType::new("OTHER", codes::OTHER, ValueType::Object),
    JdbcType::new("REAL", codes::REAL, ValueType::Float),
    JdbcType::new("REF", codes::REF, ValueType::Object),
    JdbcType::new("REF_CURSOR", codes::REF_CURSOR, ValueType::Object),
    JdbcType::new("ROWID", codes::ROWID, ValueType::Object),
    JdbcType::new("SMALLINT", codes::SMALLINT, ValueType::Int),
    JdbcType::new("SQLXML", codes::SQLXML, ValueType::Text),
    JdbcType::new("STRUCT", codes::STRUCT, ValueType::Object),
    JdbcType::new("TIME", codes::TIME, ValueType::Time),
    JdbcType::new(
        "TIME_WITH_TIMEZONE",
        codes::TIME_WITH_TIMEZONE,
        ValueType::Time,
    ),
    JdbcType::new("TIMESTAMP", codes::TIMESTAMP, ValueType::Timestamp),
    JdbcType::new(
        "TIMESTAMP_WITH_TIMEZONE",
        codes::TIMESTAMP_WITH_TIMEZONE,
        ValueType::Timestamp,
    ),
    JdbcType::new("TINYINT", codes::TINYINT, ValueType::Int),
    JdbcType::new("VARBINARY", codes::VARBINARY, ValueType::Bytes),
    JdbcType::new("VARCHAR", codes::VARCHAR, ValueType::Text),
];

/// Find a JDBC type by its type code.
pub fn jdbc_type(code: i32) -> Option<&'static JdbcType> {
    JDBC_TYPES.iter().find(|t| t.code == code)
}

/// Resolve a JDBC type name (case-insensitive) to its type code.
pub fn find_type_code(name: &str) -> Option<i32> {
    let name = name.trim();
    JDBC_TYPES
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .map(|t| t.code)
}

/// Map a declared SQL column type to a JDBC type code.
///
/// Follows the usual affinity rules: the first matching keyword wins, and an
/// unknown or missing declaration maps to `OTHER` / `NULL`.
pub fn code_for_declared_type(declared: Option<&str>) -> i32 {
    let Some(declared) = declared else {
        return codes::NULL;
    };
    let upper = declared.trim().to_ascii_uppercase();
    let base = upper.split('(').next().unwrap_or("").trim();

    match base {
        "" => codes::NULL,
        "BOOLEAN" | "BOOL" => codes::BOOLEAN,
        "BIT" => codes::BIT,
        "TINYINT" => codes::TINYINT,
        "SMALLINT" => codes::SMALLINT,
        "BIGINT" => codes::BIGINT,
        "INT" | "INTEGER" | "MEDIUMINT" => codes::INTEGER,
        "REAL" => codes::REAL,
        "FLOAT" => codes::FLOAT,
        "DOUBLE" | "DOUBLE PRECISION" => codes::DOUBLE,
        "NUMERIC" => codes::NUMERIC,
        "DECIMAL" => codes::DECIMAL,
        "CHAR" | "CHARACTER" => codes::CHAR,
        "NCHAR" => codes::NCHAR,
        "NVARCHAR" => codes::NVARCHAR,
        "VARCHAR" | "VARYING CHARACTER" | "TEXT" => codes::VARCHAR,
        "CLOB" => codes::CLOB,
        "BLOB" => codes::BLOB,
        "BINARY" => codes::BINARY,
        "VARBINARY" => codes::VARBINARY,
        "DATE" => codes::DATE,
        "TIME" => codes::TIME,
        "DATETIME" | "TIMESTAMP" => codes::TIMESTAMP,
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => codes::TIMESTAMP_WITH_TIMEZONE,
        _ if base.contains("INT") => codes::BIGINT,
        _ if base.contains("CHAR") || base.contains("CLOB") || base.contains("TEXT") => {
            codes::VARCHAR
        }
        _ if base.contains("BLOB") => codes::BLOB,
        _ if base.contains("REAL") || base.contains("FLOA") || base.contains("DOUB") => {
            codes::DOUBLE
        }
        _ => codes::NUMERIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_unique() {
        let mut seen = std::collections::HashSet::new();
        for t in JDBC_TYPES {
            assert!(seen.insert(t.code), "duplicate code for {}", t.name);
        }
    }

    #[test]
    fn test_find_type_code() {
        assert_eq!(find_type_code("VARCHAR"), Some(codes::VARCHAR));
        assert_eq!(find_type_code("integer"), Some(codes::INTEGER));
        assert_eq!(find_type_code("NOPE"), None);
    }

    #[test]
    fn test_jdbc_type_lookup() {
        let t = jdbc_type(codes::TIMESTAMP_WITH_TIMEZONE).unwrap();
        assert_eq!(t.value_type, ValueType::Timestamp);
        assert_eq!(jdbc_type(codes::CLOB).unwrap().value_type, ValueType::Text);
        assert!(jdbc_type(424_242).is_none());
    }

    #[test]
    fn test_declared_type_affinity() {
        assert_eq!(code_for_declared_type(Some("INTEGER")), codes::INTEGER);
        assert_eq!(code_for_declared_type(Some("varchar(20)")), codes::VARCHAR);
        assert_eq!(code_for_declared_type(Some("TEXT")), codes::VARCHAR);
        assert_eq!(code_for_declared_type(Some("NUMERIC(10, 2)")), codes::NUMERIC);
        assert_eq!(code_for_declared_type(Some("DATETIME")), codes::TIMESTAMP);
        assert_eq!(code_for_declared_type(Some("UNSIGNED BIG INT")), codes::BIGINT);
        assert_eq!(code_for_declared_type(Some("BOOLEAN")), codes::BOOLEAN);
        assert_eq!(code_for_declared_type(None), codes::NULL);
    }
}
