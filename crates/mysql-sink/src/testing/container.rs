//! Docker container management for MySQL testing

use anyhow::{Context, Result};
use mysql_async::prelude::Queryable;
use mysql_async::Conn;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::connection::MySqlConnector;
use crate::credentials::Credentials;

const ROOT_PASSWORD: &str = "testpass";

/// A throwaway MySQL 8 server in Docker, removed on drop.
pub struct MySQLContainer {
    pub container_name: String,
    pub host_port: u16,
    pub image_name: String,
    /// Database created at startup
    pub database: String,
}

impl MySQLContainer {
    pub fn new(container_name: &str, host_port: u16) -> Self {
        Self {
            container_name: container_name.to_string(),
            host_port,
            image_name: "mysql:8.0".to_string(),
            database: "testdb".to_string(),
        }
    }

    /// Root credentials for the container.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: "127.0.0.1".to_string(),
            username: "root".to_string(),
            password: ROOT_PASSWORD.to_string(),
            port: self.host_port,
        }
    }

    fn docker_quiet(&self, action: &str) {
        let _ = Command::new("docker")
            .args([action, &self.container_name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }

    pub fn start(&self) -> Result<()> {
        info!("Starting MySQL container: {}", self.container_name);

        // Leftovers from an aborted run
        self.docker_quiet("stop");
        self.docker_quiet("rm");

        let output = Command::new("docker")
            .args([
                "run",
                "--name",
                &self.container_name,
                "-e",
                &format!("MYSQL_ROOT_PASSWORD={ROOT_PASSWORD}"),
                "-e",
                &format!("MYSQL_DATABASE={}", self.database),
                "-p",
                &format!("{}:3306", self.host_port),
                "-d",
                &self.image_name,
            ])
            .output()
            .context("Failed to start Docker container")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to start container: {stderr}");
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("Started container: {container_id}");
        Ok(())
    }

    /// Poll until the server accepts connections on the test database.
    pub async fn wait_until_ready(&self, timeout_secs: u64) -> Result<()> {
        info!("Waiting for MySQL to be ready...");

        let start = Instant::now();
        let timeout = Duration::from_secs(timeout_secs);

        while start.elapsed() < timeout {
            match self.connect().await {
                Ok(mut conn) => {
                    let ping: Result<Option<i32>> = conn
                        .query_first("SELECT 1")
                        .await
                        .context("Failed to execute test query");
                    let _ = conn.disconnect().await;
                    match ping {
                        Ok(_) => {
                            info!("MySQL is ready!");
                            return Ok(());
                        }
                        Err(e) => debug!("Readiness query failed: {e:#}"),
                    }
                }
                Err(e) => debug!("Connection attempt failed: {e:#}"),
            }
            tokio::time::sleep(Duration::from_millis(1000)).await;
        }

        anyhow::bail!("MySQL did not become ready within {timeout_secs} seconds")
    }

    /// Open a plain driver connection to the test database, for assertions.
    pub async fn connect(&self) -> Result<Conn> {
        let opts = MySqlConnector::new().opts(&self.credentials(), &self.database);
        Conn::new(opts)
            .await
            .context("Failed to connect to test container")
    }

    pub fn stop(&self) -> Result<()> {
        info!("Stopping container: {}", self.container_name);

        for action in ["stop", "rm"] {
            let output = Command::new("docker")
                .args([action, &self.container_name])
                .output()
                .with_context(|| format!("Failed to run docker {action}"))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!("docker {action} failed (container may not exist): {stderr}");
            }
        }

        info!("Container stopped and removed");
        Ok(())
    }
}

impl Drop for MySQLContainer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
