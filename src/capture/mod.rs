/*!
Capture sequences: trace, pcap and dispatch trace.

Every capture walks the same stages against one pod:

```text
VALIDATE_NODE -> RESOLVE_INTERFACE -> CLEAR -> START -> WAIT -> STOP -> RETRIEVE -> CLEANUP
```

- a failure before WAIT aborts; nothing after the failed stage runs
- once START succeeded, STOP and CLEANUP always run (best effort) so the
  dataplane is never left capturing
- WAIT ends early when the request is cancelled; the sequence then
  continues with STOP as usual
- captures on the same namespace/pod are serialized
*/

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::interface::{self, InputNode};
use crate::catalog::{BoundParams, CaptureKind, ToolDescriptor};
use crate::cluster;
use crate::dispatch::Relay;
use crate::error::RelayError;
use crate::exec::{Outcome, PodTarget, RemoteCli};

type Slot = Arc<tokio::sync::Mutex<()>>;

/// One async mutex per `namespace/pod`. Entries live only while a capture
/// holds or waits for them.
#[derive(Debug, Default)]
pub struct CaptureLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

impl CaptureLocks {
    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Drop the entry for `key` when `slot` is the map's copy and nobody
    /// else holds it.
    fn release(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = slots
            .get(key)
            .is_some_and(|s| Arc::ptr_eq(s, slot) && Arc::strong_count(slot) == 2);
        if idle {
            slots.remove(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held for the duration of one capture; releases the map entry on drop.
struct SlotGuard {
    locks: Arc<CaptureLocks>,
    key: String,
    slot: Slot,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.held.take();
        self.locks.release(&self.key, &self.slot);
    }
}

/// Wait for the capture lock on `key`. Cancellation while queued is `CaptureBusy`.
async fn acquire(
    locks: &Arc<CaptureLocks>,
    key: String,
    cancel: &CancellationToken,
) -> Result<SlotGuard, RelayError> {
    let slot = locks.slot(&key);
    let mut entry = SlotGuard {
        locks: locks.clone(),
        key,
        slot: slot.clone(),
        held: None,
    };
    let held = tokio::select! {
        biased;
        held = slot.lock_owned() => Some(held),
        _ = cancel.cancelled() => None,
    };
    match held {
        Some(held) => {
            entry.held = Some(held);
            Ok(entry)
        }
        None => Err(RelayError::CaptureBusy {
            target: entry.key.clone(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Clear,
    Start,
    Stop,
    Retrieve,
    Cleanup,
}

impl Stage {
    fn describe(self) -> &'static str {
        match self {
            Stage::Clear => "clearing previous capture state",
            Stage::Start => "starting capture",
            Stage::Stop => "stopping capture",
            Stage::Retrieve => "retrieving capture results",
            Stage::Cleanup => "cleaning up capture state",
        }
    }
}

/// Where packets are captured.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Node(InputNode),
    Interface(String),
}

/// The vppctl commands for one capture, fixed before anything runs.
#[derive(Debug)]
struct Plan {
    clear: String,
    /// A failed clear aborts the capture
    clear_required: bool,
    start: String,
    stop: Option<String>,
    retrieve: String,
    cleanup: Option<String>,
    file: Option<String>,
}

impl Source {
    /// The word placed in the start command: input node or interface name.
    fn subject(&self) -> &str {
        match self {
            Source::Node(input) => input.node,
            Source::Interface(iface) => iface,
        }
    }
}

impl Plan {
    fn new(kind: CaptureKind, source: &Source, count: u64, dir: &str, stamp: u64) -> Self {
        let dir = dir.trim_end_matches('/');
        let subject = source.subject();
        match kind {
            CaptureKind::Trace => Plan {
                clear: "clear trace".into(),
                clear_required: true,
                start: format!("trace add {subject} {count}"),
                stop: None,
                retrieve: "show trace".into(),
                cleanup: Some("clear trace".into()),
                file: None,
            },
            CaptureKind::Pcap => {
                let file = format!("{dir}/vpp-capture-{stamp}.pcap");
                Plan {
                    clear: "pcap trace off".into(),
                    clear_required: false,
                    start: format!("pcap trace tx rx max {count} intfc {subject} file {file}"),
                    stop: Some("pcap trace off".into()),
                    retrieve: "show pcap".into(),
                    cleanup: None,
                    file: Some(file),
                }
            }
            CaptureKind::Dispatch => {
                let file = format!("{dir}/vpp-dispatch-{stamp}.pcap");
                Plan {
                    clear: "pcap dispatch trace off".into(),
                    clear_required: false,
                    start: format!(
                        "pcap dispatch trace on max {count} buffer-trace {subject} {count} file {file}"
                    ),
                    stop: Some("pcap dispatch trace off".into()),
                    retrieve: "show pcap".into(),
                    cleanup: None,
                    file: Some(file),
                }
            }
        }
    }
}

/// Run a capture described by `descriptor` on the pod named in `params`.
pub async fn run(
    relay: &Relay,
    descriptor: &ToolDescriptor,
    kind: CaptureKind,
    params: &BoundParams,
    cancel: CancellationToken,
) -> Result<String, RelayError> {
    let settings = relay.settings.as_ref();
    let target = relay.pod_target(params, RemoteCli::Vppctl);
    let count = params
        .get("count")
        .and_then(|c| c.parse::<u64>().ok())
        .filter(|c| *c > 0)
        .unwrap_or(u64::from(settings.capture_count));

    // VALIDATE_NODE
    let node = match params.get("node_name") {
        Some(hint) => Some(cluster::validate(relay.inventory.as_ref(), hint).await?),
        None => None,
    };

    // RESOLVE_INTERFACE
    let source = match kind {
        CaptureKind::Pcap => {
            let requested = params.get("interface").unwrap_or("any");
            Source::Interface(resolve_interface(relay, &target, requested).await?)
        }
        CaptureKind::Trace | CaptureKind::Dispatch => {
            let token = params.get("interface").unwrap_or("");
            Source::Node(interface::resolve_input_node(token, relay.inventory.as_ref()).await?)
        }
    };

    let plan = Plan::new(kind, &source, count, &settings.capture_dir, unix_seconds());
    debug!(?plan, "capture plan");

    let _slot = acquire(&relay.captures, target.key(), &cancel).await?;

    // CLEAR
    if let Err(err) = step(relay, &target, Stage::Clear, &plan.clear).await {
        if plan.clear_required {
            return Err(err);
        }
        warn!(error = %err, "clearing previous capture failed, continuing");
    }

    // START
    step(relay, &target, Stage::Start, &plan.start).await?;
    info!(pod = %target.pod, command = %plan.start, "capture started");

    // WAIT
    let interrupted = wait(settings.capture_wait(), &cancel).await;
    if interrupted {
        info!(pod = %target.pod, "capture window interrupted by cancellation");
    }

    // STOP
    if let Some(stop) = &plan.stop {
        best_effort(relay, &target, Stage::Stop, stop).await;
    }

    // RETRIEVE
    let retrieved = step(relay, &target, Stage::Retrieve, &plan.retrieve).await;

    // CLEANUP
    if let Some(cleanup) = &plan.cleanup {
        best_effort(relay, &target, Stage::Cleanup, cleanup).await;
    }

    let output = retrieved?;
    Ok(render(
        descriptor,
        &output,
        &Report {
            plan: &plan,
            source: &source,
            count,
            node: node.as_deref(),
            target: &target,
            interrupted,
        },
    ))
}

/// pcap only: `any` passes through, anything else must be an up interface.
async fn resolve_interface(
    relay: &Relay,
    target: &PodTarget,
    requested: &str,
) -> Result<String, RelayError> {
    if requested == "any" {
        return Ok(requested.to_string());
    }
    let words = vec!["show".to_string(), "int".to_string()];
    let listing = relay
        .run_in_pod(target, RemoteCli::Vppctl, &words)
        .await
        .into_output()?;
    let up = parse_up_interfaces(&listing);
    if up.is_empty() {
        return Err(RelayError::NoInterfacesUp);
    }
    if !up.iter().any(|name| name == requested) {
        return Err(RelayError::InterfaceNotUp {
            requested: requested.to_string(),
            up,
        });
    }
    Ok(requested.to_string())
}

async fn step(
    relay: &Relay,
    target: &PodTarget,
    stage: Stage,
    command: &str,
) -> Result<String, RelayError> {
    let words: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    let result = relay.run_in_pod(target, RemoteCli::Vppctl, &words).await;
    match result.outcome {
        Outcome::Succeeded { output } => Ok(output),
        Outcome::Failed { detail, timed_out } => {
            if timed_out {
                warn!(pod = %target.pod, stage = stage.describe(), "capture step timed out");
            }
            Err(RelayError::CaptureStage {
                stage: stage.describe(),
                command: result.command,
                detail,
            })
        }
    }
}

async fn best_effort(relay: &Relay, target: &PodTarget, stage: Stage, command: &str) {
    if let Err(err) = step(relay, target, stage, command).await {
        warn!(pod = %target.pod, error = %err, "capture step failed, continuing");
    }
}

/// Sleep for `window`; returns true when cut short by `cancel`.
async fn wait(window: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(window) => false,
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Counter continuation rows in `show int` output.
const COUNTER_PREFIXES: &[&str] = &["rx ", "tx ", "drops", "punt", "ip4", "ip6"];

/// Names of interfaces whose state column reads `up` in `vppctl show int`.
pub fn parse_up_interfaces(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.contains("Name") || trimmed.contains("Count") {
                return None;
            }
            if COUNTER_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
                return None;
            }
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            match fields.as_slice() {
                [name, _, "up", ..] => Some((*name).to_string()),
                _ => None,
            }
        })
        .collect()
}

struct Report<'a> {
    plan: &'a Plan,
    source: &'a Source,
    count: u64,
    node: Option<&'a str>,
    target: &'a PodTarget,
    interrupted: bool,
}

fn render(descriptor: &ToolDescriptor, output: &str, report: &Report<'_>) -> String {
    let mut body = format!("{}:\n\n{output}\n\nCapture Parameters:\n", descriptor.title);
    match report.source {
        Source::Node(input) => {
            let _ = writeln!(
                body,
                "- Interface Type: {} ({})",
                input.driver.label(),
                input.node
            );
        }
        Source::Interface(iface) => {
            let _ = writeln!(body, "- Interface: {iface}");
        }
    }
    let _ = writeln!(body, "- Count: {}", report.count);
    if let Some(file) = &report.plan.file {
        let _ = writeln!(body, "- File: {file}");
    }
    if let Some(node) = report.node {
        let _ = writeln!(body, "- Node: {node}");
    }
    let _ = writeln!(body, "- Pod: {}", report.target.pod);
    let _ = write!(body, "- Namespace: {}", report.target.namespace);
    let _ = write!(body, "\n\nCommand executed: vppctl {}", report.plan.start);
    if let Some(file) = &report.plan.file {
        let _ = write!(
            body,
            "\n\nNote: The capture file is saved at {file} on pod {}",
            report.target.pod
        );
    }
    if report.interrupted {
        body.push_str("\n\nNote: The capture window was interrupted by cancellation; results cover the shortened window.");
    }
    body
}
