//! Typed statements and statement parameters.

use crate::row::Row;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A SQL statement tagged with the row shape it produces.
///
/// `R` exists only at compile time; re-typing with [`Query::as_type`] shares
/// the statement text.
pub struct Query<R = Row> {
    sql: Arc<str>,
    _row: PhantomData<fn() -> R>,
}

impl<R> Query<R> {
    pub fn new(sql: impl Into<Arc<str>>) -> Self {
        Self {
            sql: sql.into(),
            _row: PhantomData,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// View the same statement as producing rows of type `S`.
    pub fn as_type<S>(&self) -> Query<S> {
        Query {
            sql: Arc::clone(&self.sql),
            _row: PhantomData,
        }
    }
}

impl<R> Clone for Query<R> {
    fn clone(&self) -> Self {
        self.as_type()
    }
}

impl<R> fmt::Debug for Query<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("sql", &self.sql)
            .field("row", &std::any::type_name::<R>())
            .finish()
    }
}

impl<R> fmt::Display for Query<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl<R> PartialEq for Query<R> {
    fn eq(&self, other: &Self) -> bool {
        self.sql == other.sql
    }
}

impl<R> From<&str> for Query<R> {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

impl<R> From<String> for Query<R> {
    fn from(sql: String) -> Self {
        Query::new(sql)
    }
}

/// Statement parameters.
///
/// Named parameters are not bound by name: they are flattened to positional
/// order, in insertion order, before reaching the native driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(v) => v.len(),
            Params::Named(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten to positional order.
    pub fn into_positional(self) -> Vec<Value> {
        match self {
            Params::None => Vec::new(),
            Params::Positional(v) => v,
            Params::Named(v) => v.into_iter().map(|(_, value)| value).collect(),
        }
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Params::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<&[Value]> for Params {
    fn from(values: &[Value]) -> Self {
        Params::Positional(values.to_vec())
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Params::Positional(values.into())
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(pairs: Vec<(String, Value)>) -> Self {
        Params::Named(pairs)
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Params {
    fn from(pairs: [(&str, Value); N]) -> Self {
        Params::Named(
            pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, Value>> for Params {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Params::Named(map.into_iter().collect())
    }
}

impl<T: Into<Params>> From<Option<T>> for Params {
    fn from(params: Option<T>) -> Self {
        params.map_or(Params::None, Into::into)
    }
}
