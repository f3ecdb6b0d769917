//! Process configuration
//!
//! Values come from command-line flags with environment fallbacks (see
//! [`crate::cli`]). Nothing here reads global state after construction; the
//! resolved [`Config`] is passed explicitly to the session and resolver.

use crate::k8s::session::SessionConfig;
use crate::{MeshwatchError, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub node_name: String,
    pub sandbox: bool,
    pub ip_list_file: Option<PathBuf>,
    pub resync_interval: Duration,
}

impl Config {
    /// Resolve and validate configuration.
    ///
    /// A missing node name falls back to the host name.
    pub fn new(
        node_name: Option<String>,
        sandbox: bool,
        ip_list_file: Option<PathBuf>,
        resync_secs: u64,
    ) -> Result<Self> {
        let node_name = match node_name.filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => current_hostname()?,
        };

        if node_name.is_empty() && !sandbox {
            return Err(MeshwatchError::ConfigError(
                "node name is required outside sandbox mode".to_string(),
            ));
        }

        if resync_secs == 0 {
            return Err(MeshwatchError::ConfigError(
                "resync interval must be at least one second".to_string(),
            ));
        }

        Ok(Self {
            node_name,
            sandbox,
            ip_list_file: ip_list_file.filter(|p| !p.as_os_str().is_empty()),
            resync_interval: Duration::from_secs(resync_secs),
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.node_name.clone())
            .sandbox(self.sandbox)
            .resync_interval(self.resync_interval)
    }
}

fn current_hostname() -> Result<String> {
    let name = hostname::get()?.to_string_lossy().into_owned();
    debug!("Node name not set, using hostname {}", name);
    Ok(name)
}
