//! `TSVECTOR` / `TSQUERY` — opaque passthrough.
//!
//! Per this crate's scope, lexeme weights and query tree structure are not
//! parsed; callers get the server's textual representation verbatim.

use crate::error::DecodeError;

/// A `tsvector` value, carried as its textual representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TsVector(pub String);

impl TsVector {
    pub fn parse_text(s: &str) -> Result<Self, DecodeError> {
        Ok(TsVector(s.to_string()))
    }

    pub fn format_text(&self) -> String {
        self.0.clone()
    }
}

/// A `tsquery` value, carried as its textual representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TsQuery(pub String);

impl TsQuery {
    pub fn parse_text(s: &str) -> Result<Self, DecodeError> {
        Ok(TsQuery(s.to_string()))
    }

    pub fn format_text(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsvector_is_a_passthrough() {
        let v = TsVector::parse_text("'cat':1 'sat':2").unwrap();
        assert_eq!(v.format_text(), "'cat':1 'sat':2");
    }

    #[test]
    fn tsquery_is_a_passthrough() {
        let q = TsQuery::parse_text("'cat' & 'sat'").unwrap();
        assert_eq!(q.format_text(), "'cat' & 'sat'");
    }
}
