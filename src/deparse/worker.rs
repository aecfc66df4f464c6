//! Classification of the creation statements replayed on workers

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DistError, DistResult};
use crate::object::{ObjectKind, QualifiedName};

/// `CREATE TYPE <name> AS [ENUM] ( ... )`
static CREATE_TYPE_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(
        r#"(?is)^\s*CREATE\s+TYPE\s+((?:"(?:[^"]|"")+"|[^\s."(]+)(?:\s*\.\s*(?:"(?:[^"]|"")+"|[^\s."(]+))*)\s+AS\s*(ENUM\s*)?\((.*)\)\s*;?\s*$"#,
    )
});

/// What `worker_create_if_not_exists` needs to know about its argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTypeStatement {
    pub name: QualifiedName,
    pub kind: ObjectKind,
}

/// Recognize an enum or composite `CREATE TYPE`; anything else is rejected
///
/// # Errors
/// `UnsupportedKind` for other statements, `InvalidQualifiedName` for a
/// malformed type name.
pub fn parse_create_type(sql: &str) -> DistResult<CreateTypeStatement> {
    let rejected = || DistError::UnsupportedKind {
        kind: format!("statement '{}'", sql.chars().take(60).collect::<String>()),
    };

    // the pattern only looks at the ends; the body must be one statement
    if !is_single_definition(sql) {
        return Err(rejected());
    }

    let re = CREATE_TYPE_RE.as_ref().map_err(|e| DistError::from(e.clone()))?;
    let caps = re.captures(sql).ok_or_else(rejected)?;

    let raw_name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let kind = if caps.get(2).is_some() {
        ObjectKind::EnumType
    } else {
        ObjectKind::CompositeType
    };

    Ok(CreateTypeStatement {
        name: QualifiedName::parse(raw_name)?,
        kind,
    })
}

/// True when `sql` is one statement whose first top-level parenthesized
/// group closes at its end, optionally followed by a single `;`.
/// String literals, quoted identifiers, dollar quotes and comments are skipped.
fn is_single_definition(sql: &str) -> bool {
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;
    let mut depth = 0usize;
    let mut group_closed = false;
    let mut terminated = false;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '-' && next == Some('-') {
            i = chars[i..].iter().position(|&ch| ch == '\n').map_or(chars.len(), |p| i + p + 1);
            continue;
        }
        if c == '/' && next == Some('*') {
            match skip_block_comment(&chars, i) {
                Some(end) => i = end,
                None => return false,
            }
            continue;
        }
        if terminated || (group_closed && depth == 0 && c != ';') {
            return false;
        }

        let skipped = match c {
            '\'' => {
                let escaped = i > 0
                    && matches!(chars[i - 1], 'e' | 'E')
                    && !(i > 1 && is_ident_char(chars[i - 2]));
                skip_string(&chars, i, escaped)
            }
            '"' => skip_quoted_identifier(&chars, i),
            '$' => match dollar_tag(&chars, i) {
                Some(tag) => skip_dollar_quoted(&chars, i, &tag),
                None => Some(i + 1),
            },
            '(' => {
                depth += 1;
                Some(i + 1)
            }
            ')' => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
                if depth == 0 {
                    group_closed = true;
                }
                Some(i + 1)
            }
            ';' => {
                if depth > 0 || !group_closed {
                    return false;
                }
                terminated = true;
                Some(i + 1)
            }
            _ => Some(i + 1),
        };

        match skipped {
            Some(end) => i = end,
            None => return false,
        }
    }

    depth == 0 && group_closed
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Index after the closing quote of a `'...'` literal
fn skip_string(chars: &[char], start: usize, backslash_escapes: bool) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if backslash_escapes => i += 2,
            '\'' if chars.get(i + 1) == Some(&'\'') => i += 2,
            '\'' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn skip_quoted_identifier(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '"' if chars.get(i + 1) == Some(&'"') => i += 2,
            '"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// `$tag$` opener at `start`, if any; `$1` style parameters are not openers
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    if start > 0 && is_ident_char(chars[start - 1]) {
        return None;
    }
    let mut i = start + 1;
    while i < chars.len() && chars[i] != '$' {
        let c = chars[i];
        let valid = c.is_alphabetic() || c == '_' || (i > start + 1 && c.is_ascii_digit());
        if !valid {
            return None;
        }
        i += 1;
    }
    (i < chars.len()).then(|| chars[start..=i].iter().collect())
}

fn skip_dollar_quoted(chars: &[char], start: usize, tag: &str) -> Option<usize> {
    let tag: Vec<char> = tag.chars().collect();
    let body = start + tag.len();
    (body..chars.len())
        .find(|&i| chars[i..].starts_with(&tag))
        .map(|i| i + tag.len())
}

/// Block comments nest
fn skip_block_comment(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < chars.len() {
        if chars[i] == '/' && chars[i + 1] == '*' {
            depth += 1;
            i += 2;
        } else if chars[i] == '*' && chars[i + 1] == '/' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Some(i);
            }
        } else {
            i += 1;
        }
    }
    None
}
