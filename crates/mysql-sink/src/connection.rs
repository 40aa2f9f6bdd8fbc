//! Database connections and failure classification
//!
//! [`Connector`] opens one [`SqlConnection`] per batch. The MySQL
//! implementation wraps a single `mysql_async::Conn` in autocommit mode;
//! [`DryRunConnector`] prints statements instead of running them.
//!
//! Every driver failure is classified into a [`FailureClass`]: statements
//! the server rejected because of their data or their text are
//! recoverable, anything that says the connection itself is in trouble is
//! fatal.

use anyhow::{Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::credentials::Credentials;

/// How a failed statement affects the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The server rejected this statement; later statements can still run
    RecoverableData,
    /// The connection or driver failed; the batch must stop
    Fatal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecoverableData => write!(f, "recoverable data error"),
            Self::Fatal => write!(f, "fatal execution error"),
        }
    }
}

/// Server error codes for integrity constraint violations.
const INTEGRITY_ERROR_CODES: &[u16] = &[
    1022, // ER_DUP_KEY
    1048, // ER_BAD_NULL_ERROR
    1052, // ER_NON_UNIQ_ERROR
    1062, // ER_DUP_ENTRY
    1169, // ER_DUP_UNIQUE
    1215, // ER_CANNOT_ADD_FOREIGN
    1216, // ER_NO_REFERENCED_ROW
    1217, // ER_ROW_IS_REFERENCED
    1451, // ER_ROW_IS_REFERENCED_2
    1452, // ER_NO_REFERENCED_ROW_2
    1557, // ER_FOREIGN_DUPLICATE_KEY
    1586, // ER_DUP_ENTRY_WITH_KEY_NAME
    1761, // ER_FOREIGN_DUPLICATE_KEY_WITH_CHILD_INFO
    1762, // ER_FOREIGN_DUPLICATE_KEY_WITHOUT_CHILD_INFO
    3819, // ER_CHECK_CONSTRAINT_VIOLATED
    4025, // ER_CONSTRAINT_FAILED (MariaDB)
];

/// Server error codes for statements that are malformed or reference
/// objects that do not exist.
const STATEMENT_ERROR_CODES: &[u16] = &[
    1007, // ER_DB_CREATE_EXISTS
    1049, // ER_BAD_DB_ERROR
    1050, // ER_TABLE_EXISTS_ERROR
    1054, // ER_BAD_FIELD_ERROR
    1060, // ER_DUP_FIELDNAME
    1061, // ER_DUP_KEYNAME
    1064, // ER_PARSE_ERROR
    1091, // ER_CANT_DROP_FIELD_OR_KEY
    1102, // ER_WRONG_DB_NAME
    1103, // ER_WRONG_TABLE_NAME
    1110, // ER_FIELD_SPECIFIED_TWICE
    1111, // ER_INVALID_GROUP_FUNC_USE
    1112, // ER_UNSUPPORTED_EXTENSION
    1113, // ER_TABLE_MUST_HAVE_COLUMNS
    1146, // ER_NO_SUCH_TABLE
    1149, // ER_SYNTAX_ERROR
    1166, // ER_WRONG_COLUMN_NAME
    1179, // ER_CANT_DO_THIS_DURING_AN_TRANSACTION
];

/// Server error codes for values the column cannot hold.
const DATA_ERROR_CODES: &[u16] = &[
    1264, // ER_WARN_DATA_OUT_OF_RANGE
    1265, // WARN_DATA_TRUNCATED
    1292, // ER_TRUNCATED_WRONG_VALUE
    1366, // ER_TRUNCATED_WRONG_VALUE_FOR_FIELD
    1406, // ER_DATA_TOO_LONG
];

/// Classify a MySQL server error code.
pub fn classify_server_code(code: u16) -> FailureClass {
    if INTEGRITY_ERROR_CODES.contains(&code)
        || STATEMENT_ERROR_CODES.contains(&code)
        || DATA_ERROR_CODES.contains(&code)
    {
        FailureClass::RecoverableData
    } else {
        FailureClass::Fatal
    }
}

/// Classify a driver error. Only server-side rejections can be recoverable.
pub fn classify_error(err: &mysql_async::Error) -> FailureClass {
    match err {
        mysql_async::Error::Server(server) => classify_server_code(server.code),
        _ => FailureClass::Fatal,
    }
}

/// A statement that failed to execute.
#[derive(Debug, Error)]
#[error("{class}: {source}")]
pub struct ExecuteError {
    pub class: FailureClass,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl ExecuteError {
    pub fn new(
        class: FailureClass,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            class,
            source: source.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class == FailureClass::Fatal
    }
}

impl From<mysql_async::Error> for ExecuteError {
    fn from(err: mysql_async::Error) -> Self {
        Self::new(classify_error(&err), err)
    }
}

/// One live session bound to one database.
#[async_trait]
pub trait SqlConnection: Send {
    /// Run one statement. Each statement commits on its own.
    async fn execute(&mut self, sql: &str) -> Result<(), ExecuteError>;

    /// Release the session.
    async fn close(self) -> Result<()>;
}

/// Opens connections for a batch.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: SqlConnection;

    async fn connect(&self, credentials: &Credentials, database: &str)
        -> Result<Self::Connection>;
}

/// Opens autocommit `mysql_async` connections.
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector {
    host_override: Option<String>,
}

impl MySqlConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to `host` (e.g. a proxy endpoint) instead of the host in the credentials.
    pub fn with_host_override(mut self, host: impl Into<String>) -> Self {
        self.host_override = Some(host.into());
        self
    }

    /// Driver options for a session on `database`.
    pub fn opts(&self, credentials: &Credentials, database: &str) -> OptsBuilder {
        let host = self
            .host_override
            .clone()
            .unwrap_or_else(|| credentials.host.clone());

        OptsBuilder::default()
            .ip_or_hostname(host)
            .tcp_port(credentials.port)
            .user(Some(credentials.username.clone()))
            .pass(Some(credentials.password.clone()))
            .db_name(Some(database.to_string()))
            .init(vec!["SET autocommit=1".to_string()])
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Connection = MySqlConnection;

    async fn connect(&self, credentials: &Credentials, database: &str) -> Result<MySqlConnection> {
        let opts = self.opts(credentials, database);
        let conn = Conn::new(opts).await.with_context(|| {
            format!(
                "Failed to connect to MySQL at {}:{} (database {database})",
                self.host_override.as_deref().unwrap_or(&credentials.host),
                credentials.port
            )
        })?;
        info!("MySQL connection established for database: {database}");
        Ok(MySqlConnection { conn })
    }
}

/// A single `mysql_async` session.
pub struct MySqlConnection {
    conn: Conn,
}

#[async_trait]
impl SqlConnection for MySqlConnection {
    async fn execute(&mut self, sql: &str) -> Result<(), ExecuteError> {
        self.conn.query_drop(sql).await?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .context("Failed to disconnect from MySQL")
    }
}

/// Connector whose connections print each statement to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunConnector;

/// Connection returned by [`DryRunConnector`].
#[derive(Debug)]
pub struct DryRunConnection {
    database: String,
    statements: usize,
}

#[async_trait]
impl Connector for DryRunConnector {
    type Connection = DryRunConnection;

    async fn connect(&self, _credentials: &Credentials, database: &str) -> Result<DryRunConnection> {
        info!("Dry run: statements for database {database} will be printed, not executed");
        Ok(DryRunConnection {
            database: database.to_string(),
            statements: 0,
        })
    }
}

/// A statement as printed by the dry run, terminated by exactly one `;`.
fn dry_run_line(sql: &str) -> String {
    format!("{};", sql.trim_end().trim_end_matches(';').trim_end())
}

#[async_trait]
impl SqlConnection for DryRunConnection {
    async fn execute(&mut self, sql: &str) -> Result<(), ExecuteError> {
        self.statements += 1;
        println!("{}", dry_run_line(sql));
        Ok(())
    }

    async fn close(self) -> Result<()> {
        debug!(
            "Dry run for database {} printed {} statements",
            self.database, self.statements
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql_async::{DriverError, ServerError};

    fn server_error(code: u16) -> mysql_async::Error {
        mysql_async::Error::Server(ServerError {
            code,
            message: format!("server error {code}"),
            state: "HY000".to_string(),
        })
    }

    #[test]
    fn test_constraint_violations_are_recoverable() {
        for code in [1062, 1452, 1451, 1048, 3819] {
            assert_eq!(
                classify_server_code(code),
                FailureClass::RecoverableData,
                "code {code}"
            );
        }
    }

    #[test]
    fn test_statement_errors_are_recoverable() {
        for code in [1064, 1146, 1054, 1149, 1050] {
            assert_eq!(
                classify_server_code(code),
                FailureClass::RecoverableData,
                "code {code}"
            );
        }
    }

    #[test]
    fn test_data_errors_are_recoverable() {
        for code in [1406, 1366, 1264] {
            assert_eq!(classify_server_code(code), FailureClass::RecoverableData);
        }
    }

    #[test]
    fn test_connection_level_server_errors_are_fatal() {
        // access denied, lost connection, server gone away, deadlock
        for code in [1045, 2013, 2006, 1213, 1205] {
            assert_eq!(classify_server_code(code), FailureClass::Fatal, "code {code}");
        }
    }

    #[test]
    fn test_driver_errors_are_fatal() {
        let err = mysql_async::Error::Driver(DriverError::ConnectionClosed);
        assert_eq!(classify_error(&err), FailureClass::Fatal);

        let err = mysql_async::Error::Other("pool disconnected".into());
        assert_eq!(classify_error(&err), FailureClass::Fatal);
    }

    #[test]
    fn test_execute_error_from_driver_error() {
        let err = ExecuteError::from(server_error(1062));
        assert_eq!(err.class, FailureClass::RecoverableData);
        assert!(!err.is_fatal());
        assert!(err.to_string().starts_with("recoverable data error: "));

        let err = ExecuteError::from(server_error(1045));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_dry_run_line_has_single_terminator() {
        assert_eq!(dry_run_line("DELETE FROM t WHERE id=1"), "DELETE FROM t WHERE id=1;");
        assert_eq!(dry_run_line("ALTER TABLE t ADD c INT;"), "ALTER TABLE t ADD c INT;");
        assert_eq!(dry_run_line("ALTER TABLE t ADD c INT ; \n"), "ALTER TABLE t ADD c INT;");
    }

    #[test]
    fn test_host_override_is_applied() {
        let credentials = Credentials {
            host: "db.internal".to_string(),
            username: "maxwell".to_string(),
            password: "secret".to_string(),
            port: 3307,
        };

        let opts: mysql_async::Opts = MySqlConnector::new().opts(&credentials, "shop").into();
        assert_eq!(opts.ip_or_hostname(), "db.internal");
        assert_eq!(opts.tcp_port(), 3307);
        assert_eq!(opts.db_name(), Some("shop"));
        assert_eq!(opts.user(), Some("maxwell"));

        let opts: mysql_async::Opts = MySqlConnector::new()
            .with_host_override("proxy.internal")
            .opts(&credentials, "shop")
            .into();
        assert_eq!(opts.ip_or_hostname(), "proxy.internal");
    }
}
