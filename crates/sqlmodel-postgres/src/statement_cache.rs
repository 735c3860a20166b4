//! Prepared-statement cache (C8): per-connection, keyed by statement name.
//!
//! Stores the "intent" (first SQL keyword) a name was prepared with so a
//! re-prepare under the same name can be recognized as idempotent versus a
//! conflicting redefinition.

use std::collections::HashMap;

use crate::error::{Error, StatementError, StatementErrorKind};

/// The first significant keyword of a statement, used to classify results
/// and to detect name/intent conflicts in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Explain,
}

impl Intent {
    /// Keywords accepted by `prepare` (C6/C7): SELECT, INSERT, UPDATE, DELETE.
    /// MERGE and EXPLAIN are recognized for classification but not prepareable.
    pub fn is_prepareable(self) -> bool {
        matches!(self, Intent::Select | Intent::Insert | Intent::Update | Intent::Delete)
    }
}

/// Scan past leading whitespace and `--`/`/* */` comments and classify the
/// first SQL keyword. Returns `None` for statements with no recognized intent
/// (DDL, `BEGIN`/`COMMIT`/`SET`/etc. have no cache-relevant intent).
pub fn extract_intent(sql: &str) -> Option<Intent> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = match stripped.find('\n') {
                Some(nl) => &stripped[nl + 1..],
                None => "",
            };
            continue;
        }
        if let Some(stripped) = rest.strip_prefix("/*") {
            rest = match stripped.find("*/") {
                Some(end) => &stripped[end + 2..],
                None => "",
            };
            continue;
        }
        break;
    }

    let keyword: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    match keyword.to_ascii_uppercase().as_str() {
        "SELECT" => Some(Intent::Select),
        "INSERT" => Some(Intent::Insert),
        "UPDATE" => Some(Intent::Update),
        "DELETE" => Some(Intent::Delete),
        "MERGE" => Some(Intent::Merge),
        "EXPLAIN" => Some(Intent::Explain),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    intent: Intent,
    sql: String,
}

/// Per-connection prepared-statement cache. Purge on reconnect: a fresh
/// connection has no server-side prepared statements regardless of what this
/// cache remembers.
#[derive(Debug, Default)]
pub struct StatementCache {
    entries: HashMap<String, CacheEntry>,
}

impl StatementCache {
    pub fn new() -> Self {
        StatementCache { entries: HashMap::new() }
    }

    /// Register `name` as prepared for `sql`, enforcing the intent-stability
    /// rule. Re-registering the same name with the same intent is a no-op
    /// (idempotent re-prepare); a different intent is a conflict.
    pub fn register(&mut self, name: &str, sql: &str) -> Result<Intent, Error> {
        let intent = extract_intent(sql).ok_or_else(|| {
            Error::Statement(StatementError {
                kind: StatementErrorKind::UnsupportedPrepareCommand,
                name: name.to_string(),
                message: "statement's first keyword has no recognized intent".to_string(),
            })
        })?;

        if !intent.is_prepareable() {
            return Err(Error::Statement(StatementError {
                kind: StatementErrorKind::UnsupportedPrepareCommand,
                name: name.to_string(),
                message: format!("{intent:?} is not a prepareable statement kind"),
            }));
        }

        if let Some(existing) = self.entries.get(name) {
            if existing.intent != intent {
                return Err(Error::Statement(StatementError {
                    kind: StatementErrorKind::PreparedStatementConflict,
                    name: name.to_string(),
                    message: format!("'{name}' is already prepared with intent {:?}, cannot redefine as {intent:?}", existing.intent),
                }));
            }
            return Ok(intent);
        }

        tracing::debug!(name, ?intent, "statement cache miss, registering new prepared statement");
        self.entries.insert(name.to_string(), CacheEntry { intent, sql: sql.to_string() });
        Ok(intent)
    }

    pub fn intent_of(&self, name: &str) -> Result<Intent, Error> {
        self.entries
            .get(name)
            .map(|e| e.intent)
            .ok_or_else(|| {
                tracing::debug!(name, "statement cache miss, name not prepared on this connection");
                Error::Statement(StatementError {
                    kind: StatementErrorKind::CacheMiss,
                    name: name.to_string(),
                    message: "statement name not found in cache".to_string(),
                })
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn sql_of(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.sql.as_str())
    }

    /// Drop every entry. Called on reconnect.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_intent_ignoring_leading_whitespace() {
        assert_eq!(extract_intent("  \n select 1").unwrap(), Intent::Select);
    }

    #[test]
    fn extracts_intent_past_line_comment() {
        assert_eq!(extract_intent("-- note\nINSERT INTO t VALUES (1)").unwrap(), Intent::Insert);
    }

    #[test]
    fn extracts_intent_past_block_comment() {
        assert_eq!(extract_intent("/* note */ UPDATE t SET x = 1").unwrap(), Intent::Update);
    }

    #[test]
    fn unrecognized_keyword_has_no_intent() {
        assert_eq!(extract_intent("BEGIN"), None);
    }

    #[test]
    fn reregistering_same_intent_is_idempotent() {
        let mut cache = StatementCache::new();
        cache.register("s1", "SELECT 1").unwrap();
        assert!(cache.register("s1", "SELECT 2").is_ok());
    }

    #[test]
    fn reregistering_different_intent_conflicts() {
        let mut cache = StatementCache::new();
        cache.register("s1", "SELECT 1").unwrap();
        let err = cache.register("s1", "UPDATE t SET x = 1");
        assert!(matches!(err, Err(Error::Statement(e)) if e.kind == StatementErrorKind::PreparedStatementConflict));
    }

    #[test]
    fn non_prepareable_intent_is_rejected() {
        let mut cache = StatementCache::new();
        let err = cache.register("s1", "EXPLAIN SELECT 1");
        assert!(matches!(err, Err(Error::Statement(e)) if e.kind == StatementErrorKind::UnsupportedPrepareCommand));
    }

    #[test]
    fn cache_miss_on_unknown_name() {
        let cache = StatementCache::new();
        assert!(matches!(cache.intent_of("nope"), Err(Error::Statement(e)) if e.kind == StatementErrorKind::CacheMiss));
    }
}
