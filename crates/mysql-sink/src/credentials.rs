//! Database credentials
//!
//! Credentials are looked up by secret name through a [`CredentialProvider`].
//! Lookups are usually expensive (a secret store round trip), so the CLI
//! wraps its provider in a [`CachedCredentialProvider`] that is built once
//! per process and shared by reference with every batch.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{de::Error as _, Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Default number of secrets kept by [`CachedCredentialProvider`].
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

fn default_port() -> u16 {
    3306
}

/// Connection credentials for one MySQL server.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Secret stores write the port either as a number or as a string
    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    match PortValue::deserialize(deserializer)? {
        PortValue::Number(port) => Ok(port),
        PortValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid port '{s}': {e}"))),
    }
}

/// Resolves credentials by secret name.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credentials(&self, name: &str) -> Result<Credentials>;
}

/// Returns the same credentials for every secret name.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: Credentials,
}

impl StaticCredentialProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_credentials(&self, _name: &str) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

/// Reads credentials from a YAML (or JSON) file mapping secret name to
/// `{host, username, password, port}`.
///
/// ```yaml
/// /maxwell/prod:
///   host: db.internal
///   username: maxwell
///   password: secret
///   port: 3306
/// ```
#[derive(Debug, Clone)]
pub struct SecretsFileProvider {
    path: PathBuf,
}

impl SecretsFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialProvider for SecretsFileProvider {
    async fn get_credentials(&self, name: &str) -> Result<Credentials> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read secrets file {:?}", self.path))?;
        let mut secrets: HashMap<String, Credentials> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse secrets file {:?}", self.path))?;
        secrets
            .remove(name)
            .ok_or_else(|| anyhow!("No secret named '{name}' in {:?}", self.path))
    }
}

struct CachedEntry {
    credentials: Credentials,
    fetched_at: Instant,
}

/// Memoizes another provider, bounded by entry count and optionally by age.
///
/// Failed lookups are never cached. When the cache is full the entry fetched
/// longest ago is evicted.
pub struct CachedCredentialProvider {
    inner: Box<dyn CredentialProvider>,
    capacity: usize,
    ttl: Option<Duration>,
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl CachedCredentialProvider {
    pub fn new(inner: Box<dyn CredentialProvider>) -> Self {
        Self {
            inner,
            capacity: DEFAULT_CACHE_CAPACITY,
            ttl: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Set the maximum number of cached secrets. Zero disables caching.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Expire cached secrets after `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn is_fresh(&self, entry: &CachedEntry) -> bool {
        self.ttl
            .map_or(true, |ttl| entry.fetched_at.elapsed() < ttl)
    }

    /// Number of secrets currently cached.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CredentialProvider for CachedCredentialProvider {
    async fn get_credentials(&self, name: &str) -> Result<Credentials> {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(name).filter(|e| self.is_fresh(e)) {
                debug!("Using cached credentials for secret: {name}");
                return Ok(entry.credentials.clone());
            }
        }

        debug!("Resolving credentials for secret: {name}");
        let credentials = self.inner.get_credentials(name).await?;

        if self.capacity > 0 {
            let mut entries = self.entries.lock().await;
            if !entries.contains_key(name) && entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.fetched_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
            entries.insert(
                name.to_string(),
                CachedEntry {
                    credentials: credentials.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }

        Ok(credentials)
    }
}
