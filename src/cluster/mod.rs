/*!
Cluster inventory and target resolution.

The inventory is always queried live through kubectl; nothing is cached,
so membership changes between calls are visible immediately.

- `Inventory::node_names`: node names from `kubectl get nodes`
- `Inventory::uplink_driver`: `vppDriver` of the first uplink interface in
  the calico-vpp ConfigMap
- `validate`: exact-match a caller hint against the live candidates
*/

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::Settings;
use crate::error::RelayError;
use crate::exec::{CommandRunner, Invocation, Outcome};

#[async_trait]
pub trait Inventory: Send + Sync {
    async fn node_names(&self) -> Result<Vec<String>, RelayError>;
    async fn uplink_driver(&self) -> Result<String, RelayError>;
}

/// Resolve `hint` against the live node list.
///
/// Exact match only. An empty hint auto-selects when the cluster has a
/// single node; anything else unmatched lists all candidates.
pub async fn validate(inventory: &dyn Inventory, hint: &str) -> Result<String, RelayError> {
    let candidates = inventory.node_names().await?;
    if candidates.is_empty() {
        return Err(RelayError::NoTargets);
    }
    if hint.is_empty() && candidates.len() == 1 {
        debug!(node = %candidates[0], "auto-selected only node");
        return Ok(candidates[0].clone());
    }
    if candidates.iter().any(|c| c == hint) {
        return Ok(hint.to_string());
    }
    Err(RelayError::TargetNotFound {
        requested: hint.to_string(),
        candidates,
    })
}

/* ---- kubectl-backed inventory ---- */

pub struct KubectlInventory {
    runner: Arc<dyn CommandRunner>,
    settings: Arc<Settings>,
}

impl KubectlInventory {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: Arc<Settings>) -> Self {
        Self { runner, settings }
    }

    async fn query(&self, args: &[&str]) -> Result<String, RelayError> {
        let invocation = Invocation::kubectl(&self.settings, "cluster", args);
        let result = self
            .runner
            .run(&invocation, self.settings.cluster_timeout())
            .await;
        match result.outcome {
            Outcome::Succeeded { output } => Ok(output),
            Outcome::Failed { detail, .. } => Err(RelayError::ClusterQuery(format!(
                "{}: {detail}",
                result.command
            ))),
        }
    }
}

#[async_trait]
impl Inventory for KubectlInventory {
    async fn node_names(&self) -> Result<Vec<String>, RelayError> {
        let out = self
            .query(&["get", "nodes", "-o", "jsonpath={.items[*].metadata.name}"])
            .await?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    async fn uplink_driver(&self) -> Result<String, RelayError> {
        let out = self
            .query(&[
                "get",
                "configmap",
                &self.settings.config_map,
                "-n",
                &self.settings.namespace,
                "-o",
                "json",
            ])
            .await?;
        parse_uplink_driver(&out, &self.settings.config_map, &self.settings.interfaces_key)
    }
}

#[derive(Deserialize)]
struct ConfigMap {
    #[serde(default)]
    data: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterfacesConfig {
    #[serde(default)]
    uplink_interfaces: Vec<UplinkInterface>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UplinkInterface {
    #[serde(default)]
    vpp_driver: String,
}

/// Extract the first uplink's `vppDriver` from a ConfigMap JSON document.
pub fn parse_uplink_driver(
    config_map_json: &str,
    config_map: &str,
    key: &str,
) -> Result<String, RelayError> {
    let cm: ConfigMap = serde_json::from_str(config_map_json).map_err(|e| {
        RelayError::ClusterQuery(format!("failed to parse {config_map} ConfigMap: {e}"))
    })?;
    let raw = cm
        .data
        .get(key)
        .ok_or_else(|| RelayError::ClusterQuery(format!("{key} not found in ConfigMap")))?;
    let interfaces: InterfacesConfig = serde_json::from_str(raw)
        .map_err(|e| RelayError::ClusterQuery(format!("failed to parse {key} JSON: {e}")))?;
    let first = interfaces.uplink_interfaces.first().ok_or_else(|| {
        RelayError::ClusterQuery("no uplink interfaces found in configuration".into())
    })?;
    let driver = first.vpp_driver.trim();
    if driver.is_empty() {
        return Err(RelayError::ClusterQuery(
            "vppDriver not found or is empty".into(),
        ));
    }
    Ok(driver.to_string())
}

/* ---- Test double ---- */


#[cfg(test)]
mod tests {
    use super::fake::StaticInventory;
    use super::*;
    use crate::exec::fake::ScriptedRunner;

    #[tokio::test]
    async fn empty_hint_auto_selects_single_node() {
        let inv = StaticInventory::new(&["only-node"]);
        assert_eq!(validate(&inv, "").await.unwrap(), "only-node");
    }

    #[tokio::test]
    async fn exact_match_required() {
        let inv = StaticInventory::new(&["node-1", "node-10"]);
        assert_eq!(validate(&inv, "node-10").await.unwrap(), "node-10");
        let err = validate(&inv, "node").await.unwrap_err();
        assert!(matches!(err, RelayError::TargetNotFound { .. }));
    }

    #[tokio::test]
    async fn unmatched_hint_lists_every_candidate() {
        let inv = StaticInventory::new(&["a", "b", "c"]);
        let text = validate(&inv, "z").await.unwrap_err().to_string();
        for (i, n) in ["a", "b", "c"].iter().enumerate() {
            assert!(text.contains(&format!("\n{}. {}", i + 1, n)), "{text}");
        }
    }

    #[tokio::test]
    async fn empty_hint_with_many_nodes_fails() {
        let inv = StaticInventory::new(&["a", "b"]);
        assert!(validate(&inv, "").await.is_err());
    }

    #[tokio::test]
    async fn no_nodes_is_reported() {
        let inv = StaticInventory::new(&[]);
        assert!(matches!(
            validate(&inv, "x").await.unwrap_err(),
            RelayError::NoTargets
        ));
    }

    #[tokio::test]
    async fn kubectl_inventory_splits_node_names() {
        let runner = Arc::new(ScriptedRunner::new().ok("get nodes", "node-a node-b\n"));
        let inv = KubectlInventory::new(runner.clone(), Arc::new(Settings::default()));
        assert_eq!(inv.node_names().await.unwrap(), vec!["node-a", "node-b"]);
        assert_eq!(runner.count("kubectl get nodes"), 1);
    }

    #[tokio::test]
    async fn kubectl_failure_is_cluster_query_error() {
        let runner = Arc::new(ScriptedRunner::new().fail("get nodes", "forbidden"));
        let inv = KubectlInventory::new(runner, Arc::new(Settings::default()));
        let err = inv.node_names().await.unwrap_err();
        assert!(matches!(err, RelayError::ClusterQuery(ref m) if m.contains("forbidden")));
    }

    #[tokio::test]
    async fn kubectl_inventory_reads_driver_from_configmap() {
        let cm = serde_json::json!({
            "data": {
                "CALICOVPP_INTERFACES":
                    r#"{"uplinkInterfaces":[{"interfaceName":"eth0","vppDriver":" avf "}]}"#
            }
        })
        .to_string();
        let runner = Arc::new(ScriptedRunner::new().ok("configmap calico-vpp-config", &cm));
        let inv = KubectlInventory::new(runner, Arc::new(Settings::default()));
        assert_eq!(inv.uplink_driver().await.unwrap(), "avf");
    }

    #[test]
    fn driver_parse_errors_are_specific() {
        let key = "CALICOVPP_INTERFACES";
        let missing = parse_uplink_driver(r#"{"data":{}}"#, "cm", key).unwrap_err();
        assert!(missing.to_string().contains("not found in ConfigMap"));

        let empty_list = serde_json::json!({"data":{"CALICOVPP_INTERFACES": r#"{"uplinkInterfaces":[]}"#}}).to_string();
        let err = parse_uplink_driver(&empty_list, "cm", key).unwrap_err();
        assert!(err.to_string().contains("no uplink interfaces"));

        let blank = serde_json::json!({"data":{"CALICOVPP_INTERFACES": r#"{"uplinkInterfaces":[{"vppDriver":""}]}"#}})
            .to_string();
        let err = parse_uplink_driver(&blank, "cm", key).unwrap_err();
        assert!(err.to_string().contains("vppDriver"));

        let garbage = serde_json::json!({"data":{"CALICOVPP_INTERFACES": "not json"}}).to_string();
        let err = parse_uplink_driver(&garbage, "cm", key).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
