//! Rewriting of native DSN tails into connection URL tails.

use jdbcbridge_core::{ConfigError, Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

type ConvertFn = dyn Fn(&str) -> String + Send + Sync;

/// Turns the part of a native DSN after its prefix into the part of a
/// connection URL after `://`.
#[derive(Clone)]
pub enum DsnConvertor {
    /// Substitutions applied in order, each to the previous one's output.
    Rules(Vec<(Regex, String)>),
    Function(Arc<ConvertFn>),
}

impl fmt::Debug for DsnConvertor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DsnConvertor::Rules(rules) => f
                .debug_tuple("Rules")
                .field(&rules.iter().map(|(re, rep)| (re.as_str(), rep.as_str())).collect::<Vec<_>>())
                .finish(),
            DsnConvertor::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl DsnConvertor {
    /// Build substitution rules; `replacement` may use `$1` / `${name}` captures.
    pub fn rules<'a>(rules: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let compiled = rules
            .into_iter()
            .map(|(pattern, replacement)| {
                Regex::new(pattern)
                    .map(|re| (re, replacement.to_string()))
                    .map_err(|e| {
                        Error::Config(ConfigError {
                            message: format!("invalid DSN rule {}: {}", pattern, e),
                            source: Some(Box::new(e)),
                        })
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DsnConvertor::Rules(compiled))
    }

    pub fn function(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        DsnConvertor::Function(Arc::new(f))
    }

    pub fn convert(&self, parts: &str) -> String {
        match self {
            DsnConvertor::Rules(rules) => rules.iter().fold(parts.to_string(), |acc, (re, rep)| {
                re.replace_all(&acc, rep.as_str()).into_owned()
            }),
            DsnConvertor::Function(f) => f(parts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_apply_in_order() {
        let convertor =
            DsnConvertor::rules([(r"^", "/"), (r";databaseName=([^;]*)", "/$1")]).unwrap();
        assert_eq!(convertor.convert("host;databaseName=db"), "/host/db");
    }

    #[test]
    fn test_later_rules_see_earlier_output() {
        let convertor = DsnConvertor::rules([("a", "b"), ("b", "c")]).unwrap();
        assert_eq!(convertor.convert("ab"), "cc");
    }

    #[test]
    fn test_function_convertor() {
        let convertor = DsnConvertor::function(|s| s.to_uppercase());
        assert_eq!(convertor.convert("abc"), "ABC");
        assert_eq!(format!("{:?}", convertor), "Function(..)");
    }

    #[test]
    fn test_invalid_rule_is_config_error() {
        let err = DsnConvertor::rules([("(", "")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
