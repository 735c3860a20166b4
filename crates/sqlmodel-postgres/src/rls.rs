//! Row-level-security session variables, applied via `SET SESSION`/`SET LOCAL`.
//!
//! An [`RlsContext`] is an ordered list of key/value pairs the pool or
//! transaction helper turns into one `SET` statement per entry. Keys are
//! validated up front so a malformed GUC name fails before any statement is
//! sent, rather than surfacing as a confusing server-side syntax error.

use crate::error::{Error, QueryError, QueryErrorKind};

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn invalid_key_error(key: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sqlstate: None,
        message: format!("'{key}' is not a valid session-variable name"),
        sql: None,
        detail: None,
        hint: Some("names may contain only letters, digits, '_' and '.'".to_string()),
        position: None,
        source: None,
    })
}

/// Quote a GUC value as a SQL string literal (doubling embedded single quotes).
fn quote_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// An ordered set of session-variable assignments for row-level-security policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RlsContext {
    entries: Vec<(String, String)>,
}

impl RlsContext {
    pub fn new() -> Self {
        RlsContext { entries: Vec::new() }
    }

    /// Add `key = value`, validating the key. Later calls with the same key
    /// append another entry rather than replacing — callers wanting
    /// replace-semantics should build a fresh context.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self, Error> {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(invalid_key_error(&key));
        }
        self.entries.push((key, value.into()));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Render as `SET SESSION "key" = 'value'` statements, in insertion order.
    pub fn to_session_statements(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("SET SESSION \"{k}\" = {}", quote_value(v)))
            .collect()
    }

    /// Render as `SET LOCAL "key" = 'value'` statements (scoped to the
    /// current transaction), in insertion order.
    pub fn to_local_statements(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("SET LOCAL \"{k}\" = {}", quote_value(v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_session_statements_in_order() {
        let ctx = RlsContext::new().set("app.user_id", "42").unwrap().set("app.tenant", "acme").unwrap();
        assert_eq!(
            ctx.to_session_statements(),
            vec!["SET SESSION \"app.user_id\" = '42'".to_string(), "SET SESSION \"app.tenant\" = 'acme'".to_string(),]
        );
    }

    #[test]
    fn renders_local_statements() {
        let ctx = RlsContext::new().set("app.user_id", "42").unwrap();
        assert_eq!(ctx.to_local_statements(), vec!["SET LOCAL \"app.user_id\" = '42'".to_string()]);
    }

    #[test]
    fn quotes_embedded_single_quotes() {
        let ctx = RlsContext::new().set("app.name", "O'Brien").unwrap();
        assert_eq!(ctx.to_session_statements()[0], "SET SESSION \"app.name\" = 'O''Brien'");
    }

    #[test]
    fn rejects_invalid_key() {
        assert!(RlsContext::new().set("app; DROP TABLE x", "1").is_err());
    }

    #[test]
    fn empty_context_has_no_statements() {
        let ctx = RlsContext::new();
        assert!(ctx.is_empty());
        assert!(ctx.to_session_statements().is_empty());
    }
}
