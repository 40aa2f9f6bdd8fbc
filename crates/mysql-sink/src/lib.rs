//! MySQL sink for maxwell-sync
//!
//! Replays a batch of Maxwell change events against one MySQL database:
//! each payload is decoded, turned into a statement by `mysql-types`, and
//! executed on a single autocommit connection that lives for the batch.
//!
//! ```text
//! payload → ChangeEvent → Statement → StatementExecutor → MySQL
//!              (sync-core)   (mysql-types)   (this crate)
//! ```

pub mod connection;
pub mod credentials;
pub mod dispatcher;
pub mod executor;
pub mod testing;

pub use connection::{
    classify_error, classify_server_code, Connector, DryRunConnector, ExecuteError, FailureClass,
    MySqlConnection, MySqlConnector, SqlConnection,
};
pub use credentials::{
    CachedCredentialProvider, CredentialProvider, Credentials, SecretsFileProvider,
    StaticCredentialProvider, DEFAULT_CACHE_CAPACITY,
};
pub use dispatcher::{process_batch, BatchSummary, EventDispatcher, EventOutcome};
pub use executor::{ExecutionOutcome, StatementExecutor};
