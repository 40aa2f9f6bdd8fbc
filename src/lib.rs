//! maxwell-sync
//!
//! Replays batches of Maxwell change-data-capture events into MySQL.
//!
//! # Crates
//!
//! - `sync_core` - decoded change events and column values
//! - `mysql_types` - MySQL literals, key predicates and statements
//! - `maxwell_sync_mysql_sink` - credentials, connections and the batch dispatcher
//!
//! # CLI Usage
//!
//! ```bash
//! # Replay a JSON Lines batch using credentials from a secrets file
//! maxwell-sync replay --input batch.jsonl \
//!   --cluster-name prod --secrets-file secrets.yaml
//!
//! # Replay a Kinesis trigger event read from stdin, printing instead of executing
//! maxwell-sync replay --input - --format kinesis --dry-run \
//!   --mysql-host 127.0.0.1 --mysql-password secret
//!
//! # Print the SQL for a batch without any database
//! maxwell-sync render --input batch.jsonl
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use maxwell_sync_mysql_sink::{
    CachedCredentialProvider, CredentialProvider, Credentials, MySqlConnector,
    SecretsFileProvider, StaticCredentialProvider, DEFAULT_CACHE_CAPACITY,
};
use mysql_types::build_statement;
use serde_json::Value;
use std::path::PathBuf;
use sync_core::ChangeEvent;
use tracing::warn;

pub mod config;
pub mod input;

pub use input::BatchFormat;

#[derive(Parser, Clone, Debug)]
pub struct InputOpts {
    /// Batch file to read, or `-` for stdin
    #[arg(long, value_name = "PATH|-")]
    pub input: String,

    /// Batch format
    #[arg(long, value_enum, default_value = "jsonl")]
    pub format: BatchFormat,
}

impl InputOpts {
    pub async fn read_batch(&self) -> Result<Vec<Value>> {
        input::read_batch(&self.input, self.format).await
    }
}

#[derive(Parser, Clone, Debug)]
pub struct CredentialOpts {
    /// Secret holding the MySQL credentials
    #[arg(long, env = "MAXWELL_SECRET_NAME")]
    pub secret_name: Option<String>,

    /// Cluster name; the secret defaults to /maxwell/<cluster>
    #[arg(long, env = "CLUSTER_NAME")]
    pub cluster_name: Option<String>,

    /// YAML or JSON file mapping secret names to credentials
    #[arg(long, env = "MAXWELL_SECRETS_FILE", value_name = "PATH", conflicts_with = "mysql_host")]
    pub secrets_file: Option<PathBuf>,

    /// MySQL host, used instead of a secrets file
    #[arg(long, env = "MYSQL_HOST")]
    pub mysql_host: Option<String>,

    /// MySQL port
    #[arg(long, default_value = "3306", env = "MYSQL_PORT")]
    pub mysql_port: u16,

    /// MySQL username
    #[arg(long, default_value = "root", env = "MYSQL_USERNAME")]
    pub mysql_username: String,

    /// MySQL password
    #[arg(long, default_value = "", env = "MYSQL_PASSWORD", hide_env_values = true)]
    pub mysql_password: String,

    /// Connect to this host (e.g. a proxy) instead of the one in the credentials
    #[arg(long, env = "MYSQL_HOST_OVERRIDE")]
    pub host_override: Option<String>,

    /// Number of secrets to keep cached (0 disables caching)
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub credential_cache_size: usize,

    /// How long cached secrets stay valid, e.g. 300, 15m, 1h
    #[arg(long, value_name = "DURATION")]
    pub credential_cache_ttl: Option<String>,
}

impl CredentialOpts {
    /// Name of the secret to resolve for this run.
    pub fn secret_name(&self) -> Result<String> {
        if let Some(name) = &self.secret_name {
            return Ok(name.clone());
        }
        if let Some(cluster) = &self.cluster_name {
            return Ok(config::cluster_secret_name(cluster));
        }
        if let Some(host) = &self.mysql_host {
            // static credentials ignore the name
            return Ok(host.clone());
        }
        bail!("Either --secret-name or --cluster-name is required")
    }

    /// Build the cached provider shared by every batch of this process.
    pub fn credential_provider(&self) -> Result<CachedCredentialProvider> {
        let inner: Box<dyn CredentialProvider> = if let Some(path) = &self.secrets_file {
            Box::new(SecretsFileProvider::new(path.clone()))
        } else if let Some(host) = &self.mysql_host {
            Box::new(StaticCredentialProvider::new(Credentials {
                host: host.clone(),
                username: self.mysql_username.clone(),
                password: self.mysql_password.clone(),
                port: self.mysql_port,
            }))
        } else {
            bail!("No credential source configured: pass --secrets-file or --mysql-host");
        };

        let mut provider =
            CachedCredentialProvider::new(inner).with_capacity(self.credential_cache_size);
        if let Some(ttl) = &self.credential_cache_ttl {
            provider = provider.with_ttl(config::duration::parse_duration(ttl)?);
        }
        Ok(provider)
    }

    pub fn connector(&self) -> MySqlConnector {
        match &self.host_override {
            Some(host) => MySqlConnector::new().with_host_override(host.clone()),
            None => MySqlConnector::new(),
        }
    }
}

/// Render the SQL for each payload without executing anything.
///
/// Events that produce no statement are logged and left out.
pub fn render_batch(payloads: &[Value]) -> Vec<String> {
    payloads
        .iter()
        .filter_map(|payload| {
            let event = match ChangeEvent::from_payload(payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Dropping undecodable event: {e}; payload: {payload}");
                    return None;
                }
            };
            match build_statement(&event) {
                Ok(Some(statement)) => Some(statement.into_sql()),
                Ok(None) => {
                    warn!("Skipping unsupported operation '{}': {payload}", event.kind);
                    None
                }
                Err(e) => {
                    warn!("Invalid {} event for {}.{}: {e}", event.kind, event.database, event.table);
                    None
                }
            }
        })
        .collect()
}
