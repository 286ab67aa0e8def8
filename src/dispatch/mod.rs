/*!
Dispatcher: tool name + arguments in, one response body out.

`Relay` owns the shared collaborators (runner, inventory, settings, capture
locks) and is cheap to clone; every MCP session holds a clone.

Flow for one call:
  1. look the tool up in the catalog (unknown name: no process is spawned)
  2. bind + validate arguments (missing / invalid: no process is spawned)
  3. run the action: a pod command, the pod listing, or a capture sequence
  4. fold the outcome into `ToolResponse`

Every failure is folded into `ToolResponse::Failure`; nothing here escapes
as a protocol error.
*/

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use crate::capture::{self, CaptureLocks};
use crate::catalog::{self, Action, Arguments, BoundParams, ToolDescriptor};
use crate::cluster::Inventory;
use crate::config::Settings;
use crate::error::RelayError;
use crate::exec::{CommandResult, CommandRunner, Invocation, PodTarget, RemoteCli};

/// Outcome of one tool call, as reported to the MCP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResponse {
    Success(String),
    Failure(String),
}

impl ToolResponse {
    pub fn is_failure(&self) -> bool {
        matches!(self, ToolResponse::Failure(_))
    }

    pub fn text(&self) -> &str {
        match self {
            ToolResponse::Success(t) | ToolResponse::Failure(t) => t,
        }
    }
}

impl From<RelayError> for ToolResponse {
    fn from(err: RelayError) -> Self {
        ToolResponse::Failure(format!("Error: {err}"))
    }
}

#[derive(Clone)]
pub struct Relay {
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) inventory: Arc<dyn Inventory>,
    pub(crate) settings: Arc<Settings>,
    pub(crate) captures: Arc<CaptureLocks>,
    span: Span,
}

impl Relay {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        inventory: Arc<dyn Inventory>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            runner,
            inventory,
            settings,
            captures: Arc::new(CaptureLocks::default()),
            span: Span::none(),
        }
    }

    /// Parent span for every call handled by this relay.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Handle one call. `cancel` fires when the client abandons the request.
    pub async fn dispatch(
        &self,
        tool: &str,
        args: &Arguments,
        cancel: CancellationToken,
    ) -> ToolResponse {
        let span = tracing::info_span!(parent: &self.span, "tool", name = %tool);
        async {
            match self.try_dispatch(tool, args, cancel).await {
                Ok(body) => ToolResponse::Success(body),
                Err(err) => {
                    warn!(error = %err, "tool call failed");
                    err.into()
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn try_dispatch(
        &self,
        tool: &str,
        args: &Arguments,
        cancel: CancellationToken,
    ) -> Result<String, RelayError> {
        let descriptor =
            catalog::lookup(tool).ok_or_else(|| RelayError::UnknownTool(tool.to_string()))?;
        let params = descriptor.bind(args)?;
        debug!(params = ?params, "arguments bound");

        match descriptor.action {
            Action::Remote { cli, template } => {
                let target = self.pod_target(&params, cli);
                let words = catalog::render(template, &params);
                let result = self.run_in_pod(&target, cli, &words).await;
                let echo = result.command.clone();
                let output = result.into_output()?;
                Ok(format_success(descriptor, &output, &echo, &target))
            }
            Action::ListPods => self.list_pods(descriptor, &params).await,
            Action::Capture(kind) => capture::run(self, descriptor, kind, &params, cancel).await,
        }
    }

    /// Pod target with namespace / container defaults filled in.
    pub(crate) fn pod_target(&self, params: &BoundParams, cli: RemoteCli) -> PodTarget {
        PodTarget {
            pod: params.get("pod_name").unwrap_or_default().to_string(),
            namespace: params
                .get("namespace")
                .unwrap_or(&self.settings.namespace)
                .to_string(),
            container: params
                .get("container_name")
                .unwrap_or(cli.default_container(&self.settings))
                .to_string(),
        }
    }

    pub(crate) async fn run_in_pod(
        &self,
        target: &PodTarget,
        cli: RemoteCli,
        words: &[String],
    ) -> CommandResult {
        let invocation = Invocation::exec_in_pod(&self.settings, target, cli, words);
        self.runner
            .run(&invocation, self.settings.command_timeout())
            .await
    }

    async fn list_pods(
        &self,
        descriptor: &ToolDescriptor,
        params: &BoundParams,
    ) -> Result<String, RelayError> {
        let namespace = params.get("namespace").unwrap_or(&self.settings.namespace);
        let invocation = Invocation::kubectl(
            &self.settings,
            namespace,
            &["get", "pods", "-n", namespace, "-owide"],
        );
        let result = self
            .runner
            .run(&invocation, self.settings.command_timeout())
            .await;
        let echo = result.command.clone();
        let output = result.into_output()?;
        info!(%namespace, "listed pods");
        Ok(format!(
            "{}:\n\n{output}\n\nCommand executed: {echo}\nNamespace: {namespace}",
            descriptor.title
        ))
    }
}

/// `<title>:\n\n<stdout>` followed by the audit footer.
pub(crate) fn format_success(
    descriptor: &ToolDescriptor,
    output: &str,
    echo: &str,
    target: &PodTarget,
) -> String {
    format!(
        "{}:\n\n{output}\n\nCommand executed: {echo}\nPod: {}\nNamespace: {}",
        descriptor.title, target.pod, target.namespace
    )
}


#[cfg(test)]
mod tests {
    use super::testing::{args, relay};
    use super::*;
    use crate::cluster::fake::StaticInventory;
    use crate::exec::fake::ScriptedRunner;
    use serde_json::json;

    fn inventory() -> Arc<StaticInventory> {
        Arc::new(StaticInventory::new(&["node-1"]))
    }

    #[tokio::test]
    async fn show_version_end_to_end() {
        let runner = Arc::new(ScriptedRunner::new().ok("vppctl show version", "vpp v24.02\n"));
        let relay = relay(runner.clone(), inventory());
        let response = relay
            .dispatch(
                "vpp_show_version",
                &args(json!({"pod_name": "node-1"})),
                CancellationToken::new(),
            )
            .await;

        assert!(!response.is_failure(), "{response:?}");
        let text = response.text();
        assert!(text.starts_with("VPP Version Information:\n\nvpp v24.02"));
        assert!(text.contains("Command executed: vppctl show version"));
        assert!(text.contains("Pod: node-1"));
        assert!(text.contains("Namespace: calico-vpp-dataplane"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].command_line(),
            "kubectl exec -n calico-vpp-dataplane node-1 -c vpp -- vppctl show version"
        );
    }

    #[tokio::test]
    async fn unknown_tool_spawns_nothing() {
        let runner = Arc::new(ScriptedRunner::new());
        let relay = relay(runner.clone(), inventory());
        let response = relay
            .dispatch("vpp_reboot", &Arguments::new(), CancellationToken::new())
            .await;
        assert_eq!(
            response,
            ToolResponse::Failure("Error: unknown tool 'vpp_reboot'".into())
        );
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_required_param_spawns_nothing() {
        let runner = Arc::new(ScriptedRunner::new());
        let relay = relay(runner.clone(), inventory());
        let err = relay
            .try_dispatch(
                "vpp_show_ip_fib",
                &args(json!({"pod_name": "node-1"})),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingParameter { ref name, .. } if name == "fib_index"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn flag_shaped_target_spawns_nothing() {
        let runner = Arc::new(ScriptedRunner::new());
        let relay = relay(runner.clone(), inventory());
        let response = relay
            .dispatch(
                "vpp_show_version",
                &args(json!({
                    "pod_name": "--as=system:admin",
                    "namespace": "--kubeconfig=/tmp/evil"
                })),
                CancellationToken::new(),
            )
            .await;
        assert!(response.is_failure());
        assert!(response.text().contains("pod_name"), "{response:?}");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn process_failure_names_pod_and_command() {
        let runner = Arc::new(ScriptedRunner::new().fail("show errors", "exit status: 1 - no vpp"));
        let relay = relay(runner, inventory());
        let response = relay
            .dispatch(
                "vpp_show_errors",
                &args(json!({"pod_name": "node-1"})),
                CancellationToken::new(),
            )
            .await;
        assert!(response.is_failure());
        let text = response.text();
        assert!(text.contains("node-1"), "{text}");
        assert!(text.contains("no vpp"), "{text}");
        assert!(text.contains("Command attempted: vppctl show errors"), "{text}");
    }

    #[tokio::test]
    async fn gobgp_runs_in_agent_container() {
        let runner = Arc::new(ScriptedRunner::new().ok("gobgp neighbor", "peer up"));
        let relay = relay(runner.clone(), inventory());
        let response = relay
            .dispatch(
                "bgp_show_neighbors",
                &args(json!({"pod_name": "node-1"})),
                CancellationToken::new(),
            )
            .await;
        assert!(!response.is_failure(), "{response:?}");
        assert_eq!(runner.count("-c agent -- gobgp neighbor"), 1);
    }

    #[tokio::test]
    async fn caller_overrides_namespace_and_container() {
        let runner = Arc::new(ScriptedRunner::new());
        let relay = relay(runner.clone(), inventory());
        relay
            .dispatch(
                "vpp_show_int",
                &args(json!({
                    "pod_name": "p",
                    "namespace": "other-ns",
                    "container_name": "debug"
                })),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(runner.count("exec -n other-ns p -c debug -- vppctl"), 1);
    }

    #[tokio::test]
    async fn fib_params_land_in_template_order() {
        let runner = Arc::new(ScriptedRunner::new());
        let relay = relay(runner.clone(), inventory());
        let response = relay
            .dispatch(
                "vpp_show_ip_fib_prefix",
                &args(json!({"prefix": "10.0.0.0/24", "pod_name": "p", "fib_index": 2})),
                CancellationToken::new(),
            )
            .await;
        assert!(!response.is_failure(), "{response:?}");
        assert!(response.text().contains("Command executed: vppctl show ip fib index 2 10.0.0.0/24"));
    }

    #[tokio::test]
    async fn pods_are_listed_in_default_namespace() {
        let runner = Arc::new(ScriptedRunner::new().ok("get pods", "NAME READY\ncalico-vpp-node-x 2/2"));
        let relay = relay(runner.clone(), inventory());
        let response = relay
            .dispatch("vpp_get_pods", &Arguments::new(), CancellationToken::new())
            .await;
        assert!(response.text().starts_with("Calico VPP Pods:\n\nNAME READY"));
        assert_eq!(runner.count("kubectl get pods -n calico-vpp-dataplane -owide"), 1);
    }
}
