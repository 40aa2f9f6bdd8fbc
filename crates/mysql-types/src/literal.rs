//! SQL literals and identifiers.
//!
//! Identifiers and literals are separate token classes. Column and table
//! names only ever pass through [`quote_identifier`] (or are emitted bare
//! where the statement shape calls for it); column values only ever pass
//! through [`format_value`].

use sync_core::ColumnValue;

use crate::error::StatementError;
use crate::json::document_to_text;

/// Text that stands for SQL NULL when it arrives as a string value.
const NULL_TOKEN: &str = "NULL";

/// Render a column value as a MySQL literal.
///
/// - `Null` and the string `"NULL"` become the bare `NULL` token
/// - numbers are written unquoted
/// - booleans become `1` / `0`
/// - documents are written as canonical JSON text, escaped and single-quoted
/// - any other string is escaped and single-quoted
pub fn format_value(value: &ColumnValue) -> Result<String, StatementError> {
    let literal = match value {
        ColumnValue::Null => NULL_TOKEN.to_string(),
        ColumnValue::Text(s) if s == NULL_TOKEN => NULL_TOKEN.to_string(),
        ColumnValue::Integer(i) => i.to_string(),
        ColumnValue::Float(f) => float_literal(*f),
        ColumnValue::Boolean(b) => u8::from(*b).to_string(),
        ColumnValue::Document(doc) => quote_string(&document_to_text(doc)?),
        ColumnValue::Text(s) => quote_string(s),
    };
    Ok(literal)
}

/// Whether [`format_value`] renders this value as a quoted string literal.
pub fn is_quoted_literal(value: &ColumnValue) -> bool {
    match value {
        ColumnValue::Text(s) => s != NULL_TOKEN,
        ColumnValue::Document(_) => true,
        ColumnValue::Null
        | ColumnValue::Integer(_)
        | ColumnValue::Float(_)
        | ColumnValue::Boolean(_) => false,
    }
}

/// Magnitudes outside this range are written in exponent form so MySQL reads
/// them as DOUBLE instead of an exact DECIMAL literal.
const PLAIN_FLOAT_RANGE: std::ops::Range<f64> = 1e-4..1e15;

fn float_literal(f: f64) -> String {
    if f == 0.0 || PLAIN_FLOAT_RANGE.contains(&f.abs()) {
        f.to_string()
    } else {
        format!("{f:e}")
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", escape_string(s))
}

/// Escape a string for use inside a single-quoted MySQL literal.
///
/// Backslash, single quote, NUL, newline, carriage return and Ctrl-Z are
/// backslash-escaped. Double quotes are inert inside single quotes and are
/// left as they are.
pub fn escape_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\0' => escaped.push_str("\\0"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\x1a' => escaped.push_str("\\Z"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Quote an identifier with backticks, doubling any embedded backtick.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
