//! Statement execution on a batch's connection.

use anyhow::Result;
use mysql_types::Statement;
use tracing::{debug, error};

use crate::connection::{FailureClass, SqlConnection};

/// Result of executing one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The statement ran and was committed
    Applied,
    /// The server rejected the statement; the connection is still usable
    Rejected,
}

/// Runs statements one at a time on a single autocommit connection.
///
/// A rejected statement is logged and reported as
/// [`ExecutionOutcome::Rejected`]; the executor stays usable. A fatal
/// failure is returned as an error and the caller is expected to
/// [`close`](Self::close) the executor and stop the batch.
pub struct StatementExecutor<C: SqlConnection> {
    connection: C,
    database: String,
}

impl<C: SqlConnection> StatementExecutor<C> {
    pub fn new(connection: C, database: impl Into<String>) -> Self {
        Self {
            connection,
            database: database.into(),
        }
    }

    /// Database the connection is bound to.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub async fn execute(&mut self, statement: &Statement) -> Result<ExecutionOutcome> {
        debug!("Executing on {}: {}", self.database, statement);

        match self.connection.execute(statement.as_sql()).await {
            Ok(()) => Ok(ExecutionOutcome::Applied),
            Err(e) => match e.class {
                FailureClass::RecoverableData => {
                    error!(
                        "Statement rejected on {} ({}): {}\n  statement: {}",
                        self.database, e.class, e.source, statement
                    );
                    Ok(ExecutionOutcome::Rejected)
                }
                FailureClass::Fatal => {
                    error!(
                        "Execution failed on {} ({}): {}\n  statement: {}",
                        self.database, e.class, e.source, statement
                    );
                    let database = self.database.clone();
                    Err(anyhow::Error::new(e)
                        .context(format!("Fatal error executing statement on {database}")))
                }
            },
        }
    }

    /// Close the underlying connection.
    pub async fn close(self) -> Result<()> {
        debug!("Closing connection to {}", self.database);
        self.connection.close().await
    }
}
