//! Event dispatch for one batch
//!
//! An [`EventDispatcher`] owns at most one connection. It stays
//! uninitialized until the first decodable event arrives, then resolves
//! credentials, connects to that event's database, and routes every
//! following event through the statement builder and executor.
//!
//! ```text
//! Uninitialized --first event--> Active --close() or fatal error--> Closed
//! ```

use anyhow::{bail, Context, Result};
use mysql_types::build_statement;
use serde_json::Value;
use std::fmt;
use sync_core::ChangeEvent;
use tracing::{debug, error, info, warn};

use crate::connection::Connector;
use crate::credentials::CredentialProvider;
use crate::executor::{ExecutionOutcome, StatementExecutor};

/// What happened to one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// A statement was executed and committed
    Applied,
    /// The server rejected the statement
    Rejected,
    /// The operation has no statement
    Skipped,
    /// The event could not be turned into a statement for this batch
    Invalid,
}

/// Per-batch event counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub applied: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub invalid: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Applied => self.applied += 1,
            EventOutcome::Rejected => self.rejected += 1,
            EventOutcome::Skipped => self.skipped += 1,
            EventOutcome::Invalid => self.invalid += 1,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} applied={} rejected={} skipped={} invalid={}",
            self.received, self.applied, self.rejected, self.skipped, self.invalid
        )
    }
}

enum DispatcherState<C: Connector> {
    Uninitialized,
    Active(StatementExecutor<C::Connection>),
    Closed,
}

/// Routes decoded change events to a single database connection.
pub struct EventDispatcher<'a, C: Connector> {
    credentials: &'a dyn CredentialProvider,
    connector: &'a C,
    secret_name: String,
    state: DispatcherState<C>,
    summary: BatchSummary,
}

impl<'a, C: Connector> EventDispatcher<'a, C> {
    pub fn new(
        credentials: &'a dyn CredentialProvider,
        connector: &'a C,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            connector,
            secret_name: secret_name.into(),
            state: DispatcherState::Uninitialized,
            summary: BatchSummary::default(),
        }
    }

    /// Counts so far.
    pub fn summary(&self) -> BatchSummary {
        self.summary
    }

    /// Database of the open connection, if any.
    pub fn database(&self) -> Option<&str> {
        match &self.state {
            DispatcherState::Active(executor) => Some(executor.database()),
            _ => None,
        }
    }

    /// Dispatch one raw payload.
    ///
    /// Only fatal failures are returned as errors: credential resolution,
    /// connecting, or a statement failure classified as fatal. Everything
    /// else is reported through the returned [`EventOutcome`].
    ///
    /// A fatal failure closes the dispatcher; later calls return an error.
    pub async fn dispatch(&mut self, payload: &Value) -> Result<EventOutcome> {
        if matches!(self.state, DispatcherState::Closed) {
            bail!("Cannot dispatch events after the dispatcher was closed");
        }

        self.summary.received += 1;
        match self.route(payload).await {
            Ok(outcome) => {
                self.summary.record(outcome);
                Ok(outcome)
            }
            Err(e) => {
                self.close().await;
                Err(e)
            }
        }
    }

    async fn route(&mut self, payload: &Value) -> Result<EventOutcome> {
        let event = match ChangeEvent::from_payload(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping undecodable event: {e}; payload: {payload}");
                return Ok(EventOutcome::Invalid);
            }
        };

        let executor = self.executor_for(&event.database).await?;

        if executor.database() != event.database {
            warn!(
                "Dropping event for database {} on a batch bound to {}; payload: {payload}",
                event.database,
                executor.database()
            );
            return Ok(EventOutcome::Invalid);
        }

        debug!(
            "Routing {} event for {}.{} (xid: {:?}, ts: {:?})",
            event.kind, event.database, event.table, event.xid, event.timestamp
        );

        let statement = match build_statement(&event) {
            Ok(Some(statement)) => statement,
            Ok(None) => {
                warn!("Skipping unsupported operation '{}': {payload}", event.kind);
                return Ok(EventOutcome::Skipped);
            }
            Err(e) => {
                error!(
                    "Invalid {} event for {}.{}: {e}; payload: {payload}",
                    event.kind, event.database, event.table
                );
                return Ok(EventOutcome::Invalid);
            }
        };

        debug!("Generated statement: {statement}");

        Ok(match executor.execute(&statement).await? {
            ExecutionOutcome::Applied => EventOutcome::Applied,
            ExecutionOutcome::Rejected => EventOutcome::Rejected,
        })
    }

    async fn executor_for(
        &mut self,
        database: &str,
    ) -> Result<&mut StatementExecutor<C::Connection>> {
        if matches!(self.state, DispatcherState::Uninitialized) {
            let credentials = self
                .credentials
                .get_credentials(&self.secret_name)
                .await
                .with_context(|| {
                    format!("Failed to resolve credentials for secret {}", self.secret_name)
                })?;
            let connection = self.connector.connect(&credentials, database).await?;
            info!("Processing records for: {database}");
            self.state = DispatcherState::Active(StatementExecutor::new(connection, database));
        }

        match &mut self.state {
            DispatcherState::Active(executor) => Ok(executor),
            _ => bail!("Dispatcher has no open connection"),
        }
    }

    /// Release the connection and return the batch counts.
    ///
    /// Safe to call more than once; only the first call closes anything.
    /// Close failures are logged and not returned.
    pub async fn close(&mut self) -> BatchSummary {
        match std::mem::replace(&mut self.state, DispatcherState::Closed) {
            DispatcherState::Active(executor) => {
                let database = executor.database().to_string();
                if let Err(e) = executor.close().await {
                    error!("Failed to close connection to {database}: {e:#}");
                }
                info!("Number of records processed: {}", self.summary.received);
                info!("Batch summary for {database}: {}", self.summary);
            }
            DispatcherState::Uninitialized => {
                info!("Number of records processed: {}", self.summary.received);
            }
            DispatcherState::Closed => {}
        }
        self.summary
    }
}

/// Replay `payloads` in order against one connection.
///
/// The connection is always closed before returning, including when a fatal
/// error stops the batch.
pub async fn process_batch<C: Connector>(
    credentials: &dyn CredentialProvider,
    connector: &C,
    secret_name: &str,
    payloads: &[Value],
) -> Result<BatchSummary> {
    let mut dispatcher = EventDispatcher::new(credentials, connector, secret_name);

    for payload in payloads {
        // a failed dispatch has already closed the connection
        dispatcher.dispatch(payload).await?;
    }

    Ok(dispatcher.close().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ExecuteError, FailureClass, SqlConnection};
    use crate::credentials::{Credentials, StaticCredentialProvider};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        connects: Vec<(String, String)>,
        executed: Vec<(u32, String)>,
        closes: usize,
    }

    /// Connector whose connections fail the statements listed in `failures`
    /// (by 1-based statement number, counted per batch).
    #[derive(Default)]
    struct ScriptedConnector {
        failures: HashMap<usize, FailureClass>,
        refuse_connect: bool,
        fail_close: bool,
        log: Arc<Mutex<Log>>,
    }

    impl ScriptedConnector {
        fn failing(failures: &[(usize, FailureClass)]) -> Self {
            Self {
                failures: failures.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    struct ScriptedConnection {
        id: u32,
        failures: HashMap<usize, FailureClass>,
        fail_close: bool,
        log: Arc<Mutex<Log>>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Connection = ScriptedConnection;

        async fn connect(
            &self,
            credentials: &Credentials,
            database: &str,
        ) -> Result<ScriptedConnection> {
            if self.refuse_connect {
                bail!("connection refused");
            }
            let mut log = self.log.lock().unwrap();
            log.connects
                .push((credentials.host.clone(), database.to_string()));
            Ok(ScriptedConnection {
                id: log.connects.len() as u32,
                failures: self.failures.clone(),
                fail_close: self.fail_close,
                log: self.log.clone(),
            })
        }
    }

    #[async_trait]
    impl SqlConnection for ScriptedConnection {
        async fn execute(&mut self, sql: &str) -> Result<(), ExecuteError> {
            let mut log = self.log.lock().unwrap();
            log.executed.push((self.id, sql.to_string()));
            match self.failures.get(&log.executed.len()) {
                Some(class) => Err(ExecuteError::new(*class, "scripted failure")),
                None => Ok(()),
            }
        }

        async fn close(self) -> Result<()> {
            self.log.lock().unwrap().closes += 1;
            if self.fail_close {
                bail!("connection reset while closing");
            }
            Ok(())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl CredentialProvider for FailingProvider {
        async fn get_credentials(&self, name: &str) -> Result<Credentials> {
            bail!("secret {name} not found")
        }
    }

    fn provider() -> StaticCredentialProvider {
        StaticCredentialProvider::new(Credentials {
            host: "db.internal".to_string(),
            username: "maxwell".to_string(),
            password: "secret".to_string(),
            port: 3306,
        })
    }

    fn insert(id: i64) -> Value {
        json!({
            "database": "shop",
            "table": "orders",
            "type": "insert",
            "data": {"id": id, "status": "new"}
        })
    }

    #[tokio::test]
    async fn test_constraint_failure_does_not_stop_batch() {
        let provider = provider();
        let connector = ScriptedConnector::failing(&[(2, FailureClass::RecoverableData)]);
        let payloads = vec![insert(1), insert(2), insert(3)];

        let summary = process_batch(&provider, &connector, "/maxwell/prod", &payloads)
            .await
            .unwrap();

        assert_eq!(
            summary,
            BatchSummary {
                received: 3,
                applied: 2,
                rejected: 1,
                skipped: 0,
                invalid: 0,
            }
        );

        let log = connector.log.lock().unwrap();
        assert_eq!(log.connects.len(), 1);
        assert_eq!(log.executed.len(), 3);
        // all three ran on the one connection
        assert!(log.executed.iter().all(|(id, _)| *id == 1));
        assert_eq!(
            log.executed[2].1,
            "INSERT IGNORE INTO orders (`id`, `status`) VALUES (3, 'new')"
        );
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_connection_opened_lazily_for_event_database() {
        let provider = provider();
        let connector = ScriptedConnector::default();
        let mut dispatcher = EventDispatcher::new(&provider, &connector, "/maxwell/prod");

        assert_eq!(dispatcher.database(), None);
        assert!(connector.log.lock().unwrap().connects.is_empty());

        dispatcher.dispatch(&insert(1)).await.unwrap();
        assert_eq!(dispatcher.database(), Some("shop"));
        assert_eq!(
            connector.log.lock().unwrap().connects,
            vec![("db.internal".to_string(), "shop".to_string())]
        );

        dispatcher.close().await;
    }

    #[tokio::test]
    async fn test_update_with_empty_key_executes_nothing() {
        let provider = provider();
        let connector = ScriptedConnector::default();
        let payloads = vec![json!({
            "database": "shop",
            "table": "orders",
            "type": "update",
            "data": {"id": 7, "status": "shipped"},
            "primary_key_columns": []
        })];

        let summary = process_batch(&provider, &connector, "s", &payloads)
            .await
            .unwrap();

        assert_eq!(summary.invalid, 1);
        assert!(connector.log.lock().unwrap().executed.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_operation_is_skipped() {
        let provider = provider();
        let connector = ScriptedConnector::default();
        let payloads = vec![
            json!({"database": "shop", "table": "orders", "type": "bootstrap-start", "data": {}}),
            insert(1),
        ];

        let summary = process_batch(&provider, &connector, "s", &payloads)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.applied, 1);
        assert_eq!(connector.log.lock().unwrap().executed.len(), 1);
    }

    #[tokio::test]
    async fn test_database_mismatch_is_invalid() {
        let provider = provider();
        let connector = ScriptedConnector::default();
        let payloads = vec![
            insert(1),
            json!({
                "database": "billing",
                "table": "invoices",
                "type": "insert",
                "data": {"id": 1}
            }),
        ];

        let summary = process_batch(&provider, &connector, "s", &payloads)
            .await
            .unwrap();

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.invalid, 1);
        let log = connector.log.lock().unwrap();
        assert_eq!(log.executed.len(), 1);
        assert!(!log.executed[0].1.contains("invoices"));
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_invalid() {
        let provider = provider();
        let connector = ScriptedConnector::default();
        let payloads = vec![json!({"table": "orders", "type": "insert"}), insert(1)];

        let summary = process_batch(&provider, &connector, "s", &payloads)
            .await
            .unwrap();

        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.applied, 1);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_and_closes() {
        let provider = provider();
        let connector = ScriptedConnector::failing(&[(2, FailureClass::Fatal)]);
        let payloads = vec![insert(1), insert(2), insert(3)];

        let err = process_batch(&provider, &connector, "s", &payloads)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ExecuteError>().is_some());

        let log = connector.log.lock().unwrap();
        assert_eq!(log.executed.len(), 2);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_fatal_error_closes_dispatcher() {
        let provider = provider();
        let connector = ScriptedConnector::failing(&[(1, FailureClass::Fatal)]);
        let mut dispatcher = EventDispatcher::new(&provider, &connector, "s");

        assert!(dispatcher.dispatch(&insert(1)).await.is_err());
        assert_eq!(dispatcher.database(), None);

        let err = dispatcher.dispatch(&insert(2)).await.unwrap_err();
        assert!(err.to_string().contains("closed"));

        let log = connector.log.lock().unwrap();
        assert_eq!(log.executed.len(), 1);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_close_failure_is_not_escalated() {
        let provider = provider();
        let connector = ScriptedConnector {
            fail_close: true,
            ..ScriptedConnector::default()
        };

        let summary = process_batch(&provider, &connector, "s", &[insert(1), insert(2)])
            .await
            .unwrap();

        assert_eq!(summary.applied, 2);
        let log = connector.log.lock().unwrap();
        assert_eq!(log.executed.len(), 2);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_credential_failure_is_fatal() {
        let connector = ScriptedConnector::default();
        let err = process_batch(&FailingProvider, &connector, "/maxwell/prod", &[insert(1)])
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("/maxwell/prod"));
        let log = connector.log.lock().unwrap();
        assert!(log.connects.is_empty());
        assert!(log.executed.is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let provider = provider();
        let connector = ScriptedConnector {
            refuse_connect: true,
            ..ScriptedConnector::default()
        };

        let err = process_batch(&provider, &connector, "s", &[insert(1)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_dispatch() {
        let provider = provider();
        let connector = ScriptedConnector::default();
        let mut dispatcher = EventDispatcher::new(&provider, &connector, "s");

        dispatcher.dispatch(&insert(1)).await.unwrap();
        let first = dispatcher.close().await;
        let second = dispatcher.close().await;
        assert_eq!(first, second);
        assert_eq!(connector.log.lock().unwrap().closes, 1);

        assert!(dispatcher.dispatch(&insert(2)).await.is_err());
        assert_eq!(dispatcher.summary().received, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_never_connects() {
        let provider = provider();
        let connector = ScriptedConnector::default();

        let summary = process_batch(&provider, &connector, "s", &[]).await.unwrap();

        assert_eq!(summary, BatchSummary::default());
        let log = connector.log.lock().unwrap();
        assert!(log.connects.is_empty());
        assert_eq!(log.closes, 0);
    }

    #[tokio::test]
    async fn test_ddl_and_dml_run_in_order() {
        let provider = provider();
        let connector = ScriptedConnector::default();
        let payloads = vec![
            json!({
                "database": "shop",
                "table": "orders",
                "type": "table-alter",
                "sql": "ALTER TABLE orders ADD COLUMN note TEXT"
            }),
            json!({
                "database": "shop",
                "table": "orders",
                "type": "delete",
                "data": {"id": 7, "region": "us"},
                "primary_key_columns": ["id", "region"]
            }),
        ];

        process_batch(&provider, &connector, "s", &payloads)
            .await
            .unwrap();

        let executed: Vec<String> = connector
            .log
            .lock()
            .unwrap()
            .executed
            .iter()
            .map(|(_, sql)| sql.clone())
            .collect();
        assert_eq!(
            executed,
            vec![
                "ALTER TABLE orders ADD COLUMN note TEXT".to_string(),
                "DELETE FROM orders WHERE id=7 AND region = 'us'".to_string(),
            ]
        );
    }
}
