//! Configuration helpers shared by the CLI options.

pub mod duration;

/// Secret name used for a cluster when none is given explicitly.
pub fn cluster_secret_name(cluster: &str) -> String {
    format!("/maxwell/{cluster}")
}
