/*!
Runtime settings for the relay.

Settings come from an optional YAML file (`--config` or `VPP_MCP_CONFIG`).
Every key is optional; missing keys fall back to the Calico/VPP defaults
below. Unknown keys are rejected so typos surface at startup instead of
silently using a default.

Example:
```yaml
namespace: calico-vpp-dataplane
vpp_container: vpp
agent_container: agent
command_timeout_secs: 10
capture_wait_secs: 20
```
*/

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// kubectl executable (name on PATH or absolute path)
    pub kubectl: String,
    /// Namespace holding the dataplane pods
    pub namespace: String,
    /// Container running vppctl
    pub vpp_container: String,
    /// Container running gobgp
    pub agent_container: String,
    /// ConfigMap carrying the uplink interface configuration
    pub config_map: String,
    /// Key inside `config_map` holding the interfaces JSON
    pub interfaces_key: String,
    pub command_timeout_secs: u64,
    pub cluster_timeout_secs: u64,
    /// Fixed capture window between start and stop
    pub capture_wait_secs: u64,
    /// Packet count used when a capture request leaves `count` unset
    pub capture_count: u32,
    /// Directory on the pod where pcap artifacts are written
    pub capture_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".into(),
            namespace: "calico-vpp-dataplane".into(),
            vpp_container: "vpp".into(),
            agent_container: "agent".into(),
            config_map: "calico-vpp-config".into(),
            interfaces_key: "CALICOVPP_INTERFACES".into(),
            command_timeout_secs: 10,
            cluster_timeout_secs: 30,
            capture_wait_secs: 15,
            capture_count: 500,
            capture_dir: "/tmp".into(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(raw).context("failed to parse YAML")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.capture_count == 0 {
            bail!("capture_count must be greater than zero");
        }
        if self.command_timeout_secs == 0 || self.cluster_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }
        for (key, value) in [
            ("kubectl", &self.kubectl),
            ("namespace", &self.namespace),
            ("vpp_container", &self.vpp_container),
            ("agent_container", &self.agent_container),
        ] {
            if value.trim().is_empty() {
                bail!("{key} cannot be empty");
            }
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn cluster_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster_timeout_secs)
    }

    pub fn capture_wait(&self) -> Duration {
        Duration::from_secs(self.capture_wait_secs)
    }
}
