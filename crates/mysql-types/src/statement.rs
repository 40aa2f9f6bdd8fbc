//! Statement generation from change events.
//!
//! | operation                | statement                                               |
//! |--------------------------|---------------------------------------------------------|
//! | insert, bootstrap-insert | ``INSERT IGNORE INTO t (`a`, `b`) VALUES (1, 'x')``     |
//! | update                   | ``UPDATE t SET `b` = 'x' WHERE a=1``                    |
//! | delete                   | `DELETE FROM t WHERE a=1`                               |
//! | table-create/table-alter | the event's `sql`, verbatim                             |
//! | anything else            | nothing                                                 |
//!
//! Inserts use `INSERT IGNORE` so that replaying an already-applied insert
//! is a no-op instead of a duplicate-key failure.

use std::fmt;
use sync_core::{ChangeEvent, OperationKind};

use crate::error::StatementError;
use crate::literal::{format_value, quote_identifier};
use crate::predicate::build_key_predicate;

/// A complete, non-empty SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement(String);

impl Statement {
    pub fn as_sql(&self) -> &str {
        &self.0
    }

    pub fn into_sql(self) -> String {
        self.0
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the statement that replays `event`.
///
/// Returns `Ok(None)` for operations that have no statement.
pub fn build_statement(event: &ChangeEvent) -> Result<Option<Statement>, StatementError> {
    let sql = match &event.kind {
        OperationKind::Insert | OperationKind::BootstrapInsert => insert_sql(event)?,
        OperationKind::Update => update_sql(event)?,
        OperationKind::Delete => delete_sql(event)?,
        OperationKind::CreateTable | OperationKind::AlterTable => ddl_sql(event)?,
        OperationKind::Unknown(_) => return Ok(None),
    };
    Ok(Some(Statement(sql)))
}

fn target_table(event: &ChangeEvent) -> Result<&str, StatementError> {
    if event.table.is_empty() {
        return Err(StatementError::MissingTable);
    }
    Ok(&event.table)
}

fn insert_sql(event: &ChangeEvent) -> Result<String, StatementError> {
    let table = target_table(event)?;
    if event.data.is_empty() {
        return Err(StatementError::NoColumns(table.to_string()));
    }

    let mut columns = Vec::with_capacity(event.data.len());
    let mut values = Vec::with_capacity(event.data.len());
    for (name, value) in event.data.iter() {
        columns.push(quote_identifier(name));
        values.push(format_value(value)?);
    }

    Ok(format!(
        "INSERT IGNORE INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        values.join(", ")
    ))
}

fn update_sql(event: &ChangeEvent) -> Result<String, StatementError> {
    let table = target_table(event)?;
    let predicate = build_key_predicate(&event.data, &event.primary_key_columns)?;

    let assignments = event
        .data
        .iter()
        .filter(|(name, _)| !event.is_key_column(name))
        .map(|(name, value)| Ok(format!("{} = {}", quote_identifier(name), format_value(value)?)))
        .collect::<Result<Vec<_>, StatementError>>()?;

    if assignments.is_empty() {
        return Err(StatementError::NothingToUpdate(table.to_string()));
    }

    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        table,
        assignments.join(", "),
        predicate
    ))
}

fn delete_sql(event: &ChangeEvent) -> Result<String, StatementError> {
    let table = target_table(event)?;
    let predicate = build_key_predicate(&event.data, &event.primary_key_columns)?;
    Ok(format!("DELETE FROM {table} WHERE {predicate}"))
}

fn ddl_sql(event: &ChangeEvent) -> Result<String, StatementError> {
    event
        .raw_statement
        .as_ref()
        .filter(|sql| !sql.trim().is_empty())
        .cloned()
        .ok_or_else(|| StatementError::MissingRawStatement(event.kind.to_string()))
}
