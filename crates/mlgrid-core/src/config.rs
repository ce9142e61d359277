//! mlgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MlgridConfig {
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

/// Identity and driver selection for the local compute service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Hostname this compute service registers under.
    pub host: String,
    /// Driver kind key ("tensorflow", "noop").
    pub driver: String,
    /// Seconds between inventory refreshes.
    pub inventory_interval: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            host: hostname_fallback(),
            driver: "tensorflow".to_string(),
            inventory_interval: 60,
        }
    }
}

/// Where the infrastructure provisioner lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Base URL of the orchestration API (e.g. `http://heat:8004/v1`).
    pub endpoint: String,
    /// Stack name used for provisioned compute nodes.
    pub stack_name: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8004/v1".to_string(),
            stack_name: "TENSORFLOW".to_string(),
        }
    }
}

/// Timing bounds for the deployment polling loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Seconds between provisioning / host-registration polls.
    pub poll_interval: u64,
    /// Hard ceiling in seconds for a single deploy, across both polls.
    pub timeout: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            poll_interval: 5,
            timeout: 500,
        }
    }
}

impl MlgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MlgridConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl DeployConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_intervals() {
        let config = MlgridConfig::default();
        assert_eq!(config.compute.inventory_interval, 60);
        assert_eq!(config.deploy.poll_interval, 5);
        assert_eq!(config.deploy.timeout, 500);
    }

    #[test]
    fn parses_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[compute]
host = "compute-1"
driver = "noop"
inventory_interval = 10

[deploy]
poll_interval = 1
timeout = 30
"#
        )
        .unwrap();

        let config = MlgridConfig::from_file(file.path()).unwrap();
        assert_eq!(config.compute.host, "compute-1");
        assert_eq!(config.compute.driver, "noop");
        assert_eq!(config.deploy.timeout().as_secs(), 30);
        // Absent sections fall back to defaults.
        assert_eq!(config.provisioner.stack_name, "TENSORFLOW");
    }
}
