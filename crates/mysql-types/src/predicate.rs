//! Primary-key predicates for UPDATE and DELETE.

use sync_core::ColumnMap;

use crate::error::StatementError;
use crate::literal::{format_value, is_quoted_literal};

/// Build the `WHERE` predicate that identifies a row by its primary key.
///
/// Clauses follow `primary_key_columns` order and are joined with ` AND `.
/// Key columns are written bare. String and document values are written as
/// `col = 'v'`, everything else as `col=v`.
pub fn build_key_predicate(
    data: &ColumnMap,
    primary_key_columns: &[String],
) -> Result<String, StatementError> {
    if primary_key_columns.is_empty() {
        return Err(StatementError::EmptyPrimaryKey);
    }

    let clauses = primary_key_columns
        .iter()
        .map(|column| {
            let value = data
                .get(column)
                .ok_or_else(|| StatementError::MissingKeyColumn(column.clone()))?;
            let literal = format_value(value)?;
            Ok(if is_quoted_literal(value) {
                format!("{column} = {literal}")
            } else {
                format!("{column}={literal}")
            })
        })
        .collect::<Result<Vec<_>, StatementError>>()?;

    Ok(clauses.join(" AND "))
}
