//! Identifier quoting and qualified-name parsing
//!
//! Portable identifiers are compared textually across nodes, so every name that
//! leaves this crate goes through [`quote_identifier`]. The rules follow the
//! server's `quote_ident()`: lower-case ASCII words that are not keywords stay
//! bare, everything else is double-quoted with embedded quotes doubled.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DistError, DistResult};

/// Keywords that cannot appear as bare identifiers
/// (reserved, type/function-name and column-name categories)
const QUOTE_REQUIRED_KEYWORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "between", "bigint", "binary", "bit", "boolean", "both", "case", "cast",
    "char", "character", "check", "coalesce", "collate", "collation", "column",
    "concurrently", "constraint", "create", "cross", "current_catalog", "current_date",
    "current_role", "current_schema", "current_time", "current_timestamp", "current_user",
    "dec", "decimal", "default", "deferrable", "desc", "distinct", "do", "else", "end",
    "except", "exists", "extract", "false", "fetch", "float", "for", "foreign", "freeze",
    "from", "full", "grant", "greatest", "group", "grouping", "having", "ilike", "in",
    "initially", "inner", "inout", "int", "integer", "intersect", "interval", "into", "is",
    "isnull", "join", "json", "json_array", "json_arrayagg", "json_exists", "json_object",
    "json_objectagg", "json_query", "json_scalar", "json_serialize", "json_table",
    "json_value", "lateral", "leading", "least", "left", "like", "limit", "localtime",
    "localtimestamp", "merge_action", "national", "natural", "nchar", "none", "normalize",
    "not", "notnull", "null", "nullif", "numeric", "offset", "on", "only", "or", "order",
    "out", "outer", "overlaps", "overlay", "placing", "position", "precision", "primary",
    "real", "references", "returning", "right", "row", "select", "session_user", "setof",
    "similar", "smallint", "some", "substring", "symmetric", "system_user", "table",
    "tablesample", "then", "time", "timestamp", "to", "trailing", "treat", "trim", "true",
    "union", "unique", "user", "using", "values", "varchar", "variadic", "verbose", "when",
    "where", "window", "with", "xmlattributes", "xmlconcat", "xmlelement", "xmlexists",
    "xmlforest", "xmlnamespaces", "xmlparse", "xmlpi", "xmlroot", "xmlserialize",
    "xmltable",
];

/// Quote an identifier only when the server would require it
pub fn quote_identifier(ident: &str) -> String {
    let safe = ident
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !QUOTE_REQUIRED_KEYWORDS.contains(&ident);

    if safe {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Render `schema.name`, quoting each part independently
pub fn quote_qualified_identifier(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(name)),
        None => quote_identifier(name),
    }
}

/// Render a string literal; backslashes switch to the `E''` form like `quote_literal()`
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if value.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

/// A dotted name split into its parts, with quoting already removed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    parts: Vec<String>,
}

impl QualifiedName {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        let mut parts = Vec::with_capacity(2);
        if let Some(schema) = schema {
            parts.push(schema.to_string());
        }
        parts.push(name.to_string());
        Self { parts }
    }

    /// Split a possibly quoted, dotted name the way the server's name-list parser does:
    /// unquoted parts are down-cased, `""` inside quotes is a literal quote.
    pub fn parse(raw: &str) -> DistResult<Self> {
        let invalid = |reason: &str| DistError::InvalidQualifiedName {
            name: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        let mut chars = raw.chars().peekable();

        loop {
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }

            let mut part = String::new();
            if chars.peek() == Some(&'"') {
                chars.next();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            part.push('"');
                        }
                        Some('"') => break,
                        Some(c) => part.push(c),
                        None => return Err(invalid("unterminated quoted identifier")),
                    }
                }
                if part.is_empty() {
                    return Err(invalid("zero-length quoted identifier"));
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == '.' || c.is_whitespace() {
                        break;
                    }
                    if c == '"' {
                        return Err(invalid("quote inside unquoted identifier"));
                    }
                    part.extend(c.to_lowercase());
                    chars.next();
                }
                if part.is_empty() {
                    return Err(invalid("empty name part"));
                }
            }
            parts.push(part);

            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }

            match chars.next() {
                None => break,
                Some('.') => continue,
                Some(c) => return Err(invalid(&format!("unexpected character '{}'", c))),
            }
        }

        if parts.len() > 3 {
            return Err(invalid("too many dotted names"));
        }

        Ok(Self { parts })
    }

    /// Last part: the object's own name
    pub fn name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Second-to-last part, if the name was qualified
    pub fn schema(&self) -> Option<&str> {
        if self.parts.len() >= 2 {
            Some(self.parts[self.parts.len() - 2].as_str())
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.parts.iter().map(|p| quote_identifier(p)).collect();
        write!(f, "{}", quoted.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_rules() {
        assert_eq!(quote_identifier("app"), "app");
        assert_eq!(quote_identifier("order_status2"), "order_status2");
        assert_eq!(quote_identifier("Order"), "\"Order\"");
        assert_eq!(quote_identifier("my schema"), "\"my schema\"");
        assert_eq!(quote_identifier("user"), "\"user\"");
        assert_eq!(quote_identifier("1abc"), "\"1abc\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
        // unreserved keywords stay bare
        assert_eq!(quote_identifier("status"), "status");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("archived"), "'archived'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("a\\b"), "E'a\\\\b'");
    }

    #[test]
    fn test_parse_downcases_unquoted_parts() {
        let name = QualifiedName::parse("App.Order_Status").unwrap();
        assert_eq!(name.schema(), Some("app"));
        assert_eq!(name.name(), "order_status");
        assert_eq!(name.to_string(), "app.order_status");
    }

    #[test]
    fn test_parse_preserves_quoted_parts() {
        let name = QualifiedName::parse(r#""My Schema" . "Weird""Type""#).unwrap();
        assert_eq!(name.schema(), Some("My Schema"));
        assert_eq!(name.name(), "Weird\"Type");
        assert_eq!(name.to_string(), r#""My Schema"."Weird""Type""#);
    }

    #[test]
    fn test_parse_single_part() {
        let name = QualifiedName::parse("app").unwrap();
        assert_eq!(name.schema(), None);
        assert_eq!(name.len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        assert!(QualifiedName::parse("").is_err());
        assert!(QualifiedName::parse("a..b").is_err());
        assert!(QualifiedName::parse("\"open").is_err());
        assert!(QualifiedName::parse("a.b.c.d").is_err());
        assert!(QualifiedName::parse("a b").is_err());
        assert!(QualifiedName::parse("\"\"").is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let original = QualifiedName::new(Some("Sales"), "select");
        let reparsed = QualifiedName::parse(&original.to_string()).unwrap();
        assert_eq!(reparsed, original);
    }
}
