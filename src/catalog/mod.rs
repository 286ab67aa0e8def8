/*!
Command catalog: the fixed table of tools exposed over MCP.

Each `ToolDescriptor` declares:
  - its parameters (`ParamSpec`: name, type, required/optional + default)
  - what it runs (`Action`): a vppctl / gobgp template executed in a pod,
    the pod listing, or one of the capture sequences

Templates are token lists (`Token::Word` / `Token::Param`) rendered against
a `BoundParams` list, so each parameter value lands in exactly one argv
slot and the order is fixed by the template, not by argument position.

The table is immutable; `lookup` is the only entry point at runtime.
*/

pub mod interface;

use serde_json::{Map, Value, json};

use crate::error::RelayError;
use crate::exec::RemoteCli;

/// Argument bag as received in `tools/call`.
pub type Arguments = Map<String, Value>;

/* ---- Parameter declarations ---- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Free text; may not look like a command-line flag
    String,
    /// Kubernetes object name (lowercase DNS-1123 subdomain)
    Name,
    /// Non-negative integer
    Integer,
    /// One of a fixed set of strings
    Choice(&'static [&'static str]),
}

impl ParamKind {
    fn json_type(&self) -> &'static str {
        match self {
            ParamKind::Integer => "integer",
            ParamKind::String | ParamKind::Name | ParamKind::Choice(_) => "string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    /// Optional; `default` is substituted when the caller omits it.
    Optional { default: Option<&'static str> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub requirement: Requirement,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn is_required(&self) -> bool {
        matches!(self.requirement, Requirement::Required)
    }
}

/// Parameters after validation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundParams {
    values: Vec<(&'static str, String)>,
}

impl BoundParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/* ---- Templates / actions ---- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Word(&'static str),
    Param(&'static str),
}

/// Render template tokens into argv words.
pub fn render(template: &[Token], params: &BoundParams) -> Vec<String> {
    template
        .iter()
        .filter_map(|t| match t {
            Token::Word(w) => Some((*w).to_string()),
            Token::Param(name) => params.get(name).map(str::to_string),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// `trace add` packet trace
    Trace,
    /// pcap file of rx/tx on one interface
    Pcap,
    /// pcap dispatch trace with buffer tracing
    Dispatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Remote {
        cli: RemoteCli,
        template: &'static [Token],
    },
    /// `kubectl get pods -n <ns> -owide`
    ListPods,
    Capture(CaptureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: &'static str,
    /// Heading used in successful responses
    pub title: &'static str,
    pub description: &'static str,
    pub action: Action,
    pub params: &'static [ParamSpec],
}

impl ToolDescriptor {
    /// Validate `args` against the declared parameters.
    ///
    /// Required parameters are checked first, in declaration order, and the
    /// first missing one is reported. Values are then type-checked and
    /// optional defaults applied.
    pub fn bind(&self, args: &Arguments) -> Result<BoundParams, RelayError> {
        let mut present = Vec::with_capacity(self.params.len());
        for spec in self.params {
            let value = argument_text(spec.name, args.get(spec.name))?;
            if value.is_none() && spec.is_required() {
                return Err(RelayError::MissingParameter {
                    tool: self.name.to_string(),
                    name: spec.name.to_string(),
                });
            }
            present.push((spec, value));
        }

        let mut bound = BoundParams::default();
        for (spec, value) in present {
            let value = match (value, spec.requirement) {
                (Some(v), _) => v,
                (None, Requirement::Optional { default: Some(d) }) => d.to_string(),
                (None, _) => continue,
            };
            check_kind(spec, &value)?;
            bound.values.push((spec.name, value));
        }

        for key in args.keys() {
            if !self.params.iter().any(|p| p.name == key) {
                tracing::debug!(tool = self.name, argument = %key, "ignoring undeclared argument");
            }
        }
        Ok(bound)
    }

    /// JSON Schema for `tools/list`.
    pub fn input_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in self.params {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(p.kind.json_type()));
            prop.insert("description".into(), json!(p.description));
            if let ParamKind::Choice(options) = p.kind {
                prop.insert("enum".into(), json!(options));
            }
            if let Requirement::Optional { default: Some(d) } = p.requirement {
                prop.insert("default".into(), json!(d));
            }
            if p.is_required() {
                required.push(p.name);
            }
            properties.insert(p.name.into(), Value::Object(prop));
        }

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), Value::Object(properties));
        schema.insert("required".into(), json!(required));
        schema
    }
}

/// Render an argument as text. Null and blank strings count as absent.
fn argument_text(name: &str, value: Option<&Value>) -> Result<Option<String>, RelayError> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => {
            return Err(RelayError::InvalidParameter {
                name: name.to_string(),
                value: other.to_string(),
                reason: "expected a string or integer".into(),
            });
        }
    };
    Ok((!text.is_empty()).then_some(text))
}

fn check_kind(spec: &ParamSpec, value: &str) -> Result<(), RelayError> {
    let reason = match spec.kind {
        ParamKind::String if !value.starts_with('-') => return Ok(()),
        ParamKind::String => "values may not start with '-'".to_string(),
        ParamKind::Name if is_dns1123(value) => return Ok(()),
        ParamKind::Name => {
            "expected a lowercase DNS-1123 name (a-z, 0-9, '-', '.')".to_string()
        }
        ParamKind::Integer if value.parse::<u64>().is_ok() => return Ok(()),
        ParamKind::Integer => "expected a non-negative integer".to_string(),
        ParamKind::Choice(options) if options.contains(&value) => return Ok(()),
        ParamKind::Choice(options) => format!("expected one of: {}", options.join(", ")),
    };
    Err(RelayError::InvalidParameter {
        name: spec.name.to_string(),
        value: value.to_string(),
        reason,
    })
}

/// Lowercase alphanumerics, '-' and '.', starting and ending alphanumeric.
fn is_dns1123(value: &str) -> bool {
    let bytes = value.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    bytes.len() <= 253
        && first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'-' | b'.'))
}

/* ---- The table ---- */

const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        requirement: Requirement::Required,
        description,
    }
}

const fn optional(
    name: &'static str,
    kind: ParamKind,
    default: Option<&'static str>,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        requirement: Requirement::Optional { default },
        description,
    }
}

const POD_NAME: ParamSpec = required(
    "pod_name",
    ParamKind::Name,
    "The name of the Kubernetes pod running VPP",
);
const NAMESPACE: ParamSpec = optional(
    "namespace",
    ParamKind::Name,
    None,
    "Kubernetes namespace where the pod is running (default: calico-vpp-dataplane)",
);
const CONTAINER: ParamSpec = optional(
    "container_name",
    ParamKind::Name,
    None,
    "Container within the pod (default: vpp for vppctl tools, agent for gobgp tools)",
);
const FIB_INDEX: ParamSpec = required(
    "fib_index",
    ParamKind::Integer,
    "FIB table index (0 is the default table)",
);
const PREFIX: ParamSpec = required(
    "prefix",
    ParamKind::String,
    "IP prefix to look up, e.g. 10.0.0.0/24",
);
const NEIGHBOR_IP: ParamSpec = required(
    "neighbor_ip",
    ParamKind::String,
    "IP address of the BGP neighbor",
);
const RIB_IP: ParamSpec = required("ip", ParamKind::String, "IP address to look up in the RIB");
const ADDRESS_FAMILY: ParamSpec = optional(
    "address_family",
    ParamKind::Choice(&["ipv4", "ipv6"]),
    Some("ipv4"),
    "Address family of the RIB (ipv4 or ipv6)",
);
const NODE_NAME: ParamSpec = optional(
    "node_name",
    ParamKind::String,
    None,
    "Kubernetes node name (validated against the cluster)",
);
const COUNT: ParamSpec = optional(
    "count",
    ParamKind::Integer,
    None,
    "Number of packets to capture (default: 500)",
);
const INTERFACE_TYPE: ParamSpec = optional(
    "interface",
    ParamKind::String,
    None,
    "Interface type - phy|af_xdp|af_packet|avf|vmxnet3|virtio|rdma|dpdk|memif|vcl (default: virtio)",
);
const INTERFACE_NAME: ParamSpec = optional(
    "interface",
    ParamKind::String,
    None,
    "Interface name (e.g. host-eth0) or 'any' (default: any)",
);

const POD_PARAMS: &[ParamSpec] = &[POD_NAME, NAMESPACE, CONTAINER];
const FIB_PARAMS: &[ParamSpec] = &[POD_NAME, FIB_INDEX, NAMESPACE, CONTAINER];
const FIB_PREFIX_PARAMS: &[ParamSpec] = &[POD_NAME, FIB_INDEX, PREFIX, NAMESPACE, CONTAINER];
const TRACE_PARAMS: &[ParamSpec] = &[POD_NAME, NAMESPACE, CONTAINER, NODE_NAME, COUNT, INTERFACE_TYPE];
const PCAP_PARAMS: &[ParamSpec] = &[POD_NAME, NAMESPACE, CONTAINER, NODE_NAME, COUNT, INTERFACE_NAME];

use Token::{Param as P, Word as W};

const fn vppctl(
    name: &'static str,
    title: &'static str,
    description: &'static str,
    template: &'static [Token],
) -> ToolDescriptor {
    ToolDescriptor {
        name,
        title,
        description,
        action: Action::Remote {
            cli: RemoteCli::Vppctl,
            template,
        },
        params: POD_PARAMS,
    }
}

const fn gobgp(
    name: &'static str,
    title: &'static str,
    description: &'static str,
    template: &'static [Token],
    params: &'static [ParamSpec],
) -> ToolDescriptor {
    ToolDescriptor {
        name,
        title,
        description,
        action: Action::Remote {
            cli: RemoteCli::Gobgp,
            template,
        },
        params,
    }
}

pub static CATALOG: &[ToolDescriptor] = &[
    vppctl(
        "vpp_show_version",
        "VPP Version Information",
        "Get VPP version information by running 'vppctl show version' in a Kubernetes VPP container",
        &[W("show"), W("version")],
    ),
    vppctl(
        "vpp_show_int",
        "VPP Interface Information",
        "Get VPP interface information by running 'vppctl show int' in a Kubernetes VPP container",
        &[W("show"), W("int")],
    ),
    vppctl(
        "vpp_show_int_addr",
        "VPP Interface Address Information",
        "Get VPP interface address information by running 'vppctl show int addr' in a Kubernetes VPP container",
        &[W("show"), W("int"), W("addr")],
    ),
    vppctl(
        "vpp_show_errors",
        "VPP Error Counters",
        "Get VPP error counters by running 'vppctl show errors' in a Kubernetes VPP container",
        &[W("show"), W("errors")],
    ),
    vppctl(
        "vpp_clear_errors",
        "VPP Clear Error Counters",
        "Reset the error counters by running 'vppctl clear errors' in a Kubernetes VPP container",
        &[W("clear"), W("errors")],
    ),
    vppctl(
        "vpp_show_session_verbose",
        "VPP Session Information (Verbose)",
        "Get VPP session information by running 'vppctl show session verbose 2' in a Kubernetes VPP container",
        &[W("show"), W("session"), W("verbose"), W("2")],
    ),
    vppctl(
        "vpp_session_stats",
        "VPP Session Statistics",
        "Display global statistics reported by the session layer by running 'vppctl show session stats' in a Kubernetes VPP container",
        &[W("show"), W("session"), W("stats")],
    ),
    vppctl(
        "vpp_show_npol_rules",
        "VPP NPOL Rules",
        "List rules that are referenced by policies by running 'vppctl show npol rules' in a Kubernetes VPP container",
        &[W("show"), W("npol"), W("rules")],
    ),
    vppctl(
        "vpp_show_npol_policies",
        "VPP NPOL Policies",
        "List all the policies that are referenced on interfaces by running 'vppctl show npol policies' in a Kubernetes VPP container",
        &[W("show"), W("npol"), W("policies")],
    ),
    vppctl(
        "vpp_show_npol_ipset",
        "VPP NPOL IPset",
        "List ipsets that are referenced by rules (IPsets are just lists of IPs) by running 'vppctl show npol ipset' in a Kubernetes VPP container",
        &[W("show"), W("npol"), W("ipset")],
    ),
    vppctl(
        "vpp_show_npol_interfaces",
        "VPP NPOL Interfaces",
        "Show the resulting policies configured for every interface in VPP by running 'vppctl show npol interfaces' in a Kubernetes VPP container.\n\n\
         The first IPv4 address of every pod is provided to help identify which pod an interface belongs to.\n\n\
         Output interpretation:\n\
         - tx: rules applied on packets that LEAVE VPP on a given interface, top to bottom.\n\
         - rx: rules applied on packets that ENTER VPP on a given interface, top to bottom.\n\
         - profiles: rules enforced when a matched rule action is PASS or when no policies are configured.",
        &[W("show"), W("npol"), W("interfaces")],
    ),
    vppctl(
        "vpp_tcp_stats",
        "VPP TCP Statistics",
        "Display global statistics reported by TCP by running 'vppctl show tcp stats' in a Kubernetes VPP container",
        &[W("show"), W("tcp"), W("stats")],
    ),
    vppctl(
        "vpp_get_logs",
        "VPP Logs",
        "Display VPP logs by running 'vppctl show logging' in a Kubernetes VPP container",
        &[W("show"), W("logging")],
    ),
    vppctl(
        "vpp_show_cnat_translation",
        "VPP CNAT Translation",
        "Shows the active CNAT translations by running 'vppctl show cnat translation' in a Kubernetes VPP container",
        &[W("show"), W("cnat"), W("translation")],
    ),
    vppctl(
        "vpp_show_cnat_session",
        "VPP CNAT Session",
        "Lists the active CNAT sessions from the established five tuple to the five tuple rewrites by running 'vppctl show cnat session' in a Kubernetes VPP container.\n\n\
         Output interpretation: the incoming 5-tuple used to match packets comes first along with the protocol, \
         then the 5-tuple after dNAT & sNAT, the direction (input for PRE-ROUTING, output for POST-ROUTING) and the age in seconds.",
        &[W("show"), W("cnat"), W("session")],
    ),
    vppctl(
        "vpp_clear_run",
        "VPP Clear Runtime Statistics",
        "Clears live running error stats in VPP by running 'vppctl clear run' in a Kubernetes VPP container",
        &[W("clear"), W("run")],
    ),
    vppctl(
        "vpp_show_run",
        "VPP Runtime Statistics",
        "Shows live running stats in VPP by running 'vppctl show run' in a Kubernetes VPP container.\n\n\
         Debugging workflow: run vpp_clear_run to erase historic stats, reproduce the issue for a few seconds, then run vpp_show_run.\n\n\
         Output interpretation: a loaded VPP typically has a high Vectors/Call maxing out at 256 and a low loops/sec around 10000. \
         The Clocks column is the average cycles per node; beyond 1e3 is expensive.",
        &[W("show"), W("run")],
    ),
    ToolDescriptor {
        name: "vpp_show_ip_fib",
        title: "VPP IPv4 FIB",
        description: "Show the IPv4 forwarding table for a FIB index by running 'vppctl show ip fib index <fib_index>' in a Kubernetes VPP container",
        action: Action::Remote {
            cli: RemoteCli::Vppctl,
            template: &[W("show"), W("ip"), W("fib"), W("index"), P("fib_index")],
        },
        params: FIB_PARAMS,
    },
    ToolDescriptor {
        name: "vpp_show_ip6_fib",
        title: "VPP IPv6 FIB",
        description: "Show the IPv6 forwarding table for a FIB index by running 'vppctl show ip6 fib index <fib_index>' in a Kubernetes VPP container",
        action: Action::Remote {
            cli: RemoteCli::Vppctl,
            template: &[W("show"), W("ip6"), W("fib"), W("index"), P("fib_index")],
        },
        params: FIB_PARAMS,
    },
    ToolDescriptor {
        name: "vpp_show_ip_fib_prefix",
        title: "VPP IPv4 FIB Prefix Lookup",
        description: "Look up an IPv4 prefix in a FIB table by running 'vppctl show ip fib index <fib_index> <prefix>' in a Kubernetes VPP container",
        action: Action::Remote {
            cli: RemoteCli::Vppctl,
            template: &[
                W("show"),
                W("ip"),
                W("fib"),
                W("index"),
                P("fib_index"),
                P("prefix"),
            ],
        },
        params: FIB_PREFIX_PARAMS,
    },
    ToolDescriptor {
        name: "vpp_show_ip6_fib_prefix",
        title: "VPP IPv6 FIB Prefix Lookup",
        description: "Look up an IPv6 prefix in a FIB table by running 'vppctl show ip6 fib index <fib_index> <prefix>' in a Kubernetes VPP container",
        action: Action::Remote {
            cli: RemoteCli::Vppctl,
            template: &[
                W("show"),
                W("ip6"),
                W("fib"),
                W("index"),
                P("fib_index"),
                P("prefix"),
            ],
        },
        params: FIB_PREFIX_PARAMS,
    },
    gobgp(
        "bgp_show_neighbors",
        "BGP Neighbors",
        "List BGP peers and their session state by running 'gobgp neighbor' in the calico-vpp agent container",
        &[W("neighbor")],
        POD_PARAMS,
    ),
    gobgp(
        "bgp_show_neighbor",
        "BGP Neighbor Detail",
        "Show detailed state for one BGP peer by running 'gobgp neighbor <neighbor_ip>' in the calico-vpp agent container",
        &[W("neighbor"), P("neighbor_ip")],
        &[POD_NAME, NEIGHBOR_IP, NAMESPACE, CONTAINER],
    ),
    gobgp(
        "bgp_show_global_info",
        "BGP Global Information",
        "Show the local BGP speaker configuration (AS, router-id, listen port) by running 'gobgp global' in the calico-vpp agent container",
        &[W("global")],
        POD_PARAMS,
    ),
    gobgp(
        "bgp_show_global_rib",
        "BGP Global RIB",
        "Show the global BGP RIB for an address family by running 'gobgp global rib -a <address_family>' in the calico-vpp agent container",
        &[W("global"), W("rib"), W("-a"), P("address_family")],
        &[POD_NAME, ADDRESS_FAMILY, NAMESPACE, CONTAINER],
    ),
    gobgp(
        "bgp_show_global_rib_ip",
        "BGP RIB Lookup by IP",
        "Look up the best path for an IP address by running 'gobgp global rib -a <address_family> <ip>' in the calico-vpp agent container",
        &[W("global"), W("rib"), W("-a"), P("address_family"), P("ip")],
        &[POD_NAME, RIB_IP, ADDRESS_FAMILY, NAMESPACE, CONTAINER],
    ),
    gobgp(
        "bgp_show_global_rib_prefix",
        "BGP RIB Lookup by Prefix",
        "List RIB entries covered by a prefix by running 'gobgp global rib -a <address_family> <prefix> longer-prefixes' in the calico-vpp agent container",
        &[
            W("global"),
            W("rib"),
            W("-a"),
            P("address_family"),
            P("prefix"),
            W("longer-prefixes"),
        ],
        &[POD_NAME, PREFIX, ADDRESS_FAMILY, NAMESPACE, CONTAINER],
    ),
    ToolDescriptor {
        name: "vpp_get_pods",
        title: "Calico VPP Pods",
        description: "List all calico-vpp pods along with their IP addresses and the node on which they are running.\n\n\
                      Runs 'kubectl get pods -n calico-vpp-dataplane -owide' to display pod names, status, IPs, nodes and age.",
        action: Action::ListPods,
        params: &[NAMESPACE],
    },
    ToolDescriptor {
        name: "vpp_trace",
        title: "VPP Trace Capture Results",
        description: "Capture VPP packet traces by running 'vppctl trace add' in a Kubernetes VPP container.\n\n\
                      The tool will:\n\
                      1. Clear existing traces\n\
                      2. Start packet capture on the input node for the interface type\n\
                      3. Wait for the capture window or until count is reached\n\
                      4. Display captured traces",
        action: Action::Capture(CaptureKind::Trace),
        params: TRACE_PARAMS,
    },
    ToolDescriptor {
        name: "vpp_pcap",
        title: "VPP PCAP Capture Results",
        description: "Capture VPP packets to a pcap file by running 'vppctl pcap trace' in a Kubernetes VPP container.\n\n\
                      The tool will:\n\
                      1. Validate the interface exists and is up\n\
                      2. Start pcap capture on tx/rx\n\
                      3. Wait for the capture window or until count is reached\n\
                      4. Stop capture and save to /tmp/vpp-capture-<timestamp>.pcap on the pod\n\
                      5. Display capture status",
        action: Action::Capture(CaptureKind::Pcap),
        params: PCAP_PARAMS,
    },
    ToolDescriptor {
        name: "vpp_dispatch",
        title: "VPP Dispatch Trace Results",
        description: "Capture a VPP dispatch trace to a pcap file by running 'vppctl pcap dispatch trace' in a Kubernetes VPP container.\n\n\
                      The tool will:\n\
                      1. Start dispatch trace with buffer trace on the input node for the interface type\n\
                      2. Wait for the capture window or until count is reached\n\
                      3. Stop capture and save to /tmp/vpp-dispatch-<timestamp>.pcap on the pod\n\
                      4. Display capture status",
        action: Action::Capture(CaptureKind::Dispatch),
        params: TRACE_PARAMS,
    },
];

pub fn lookup(name: &str) -> Option<&'static ToolDescriptor> {
    CATALOG.iter().find(|d| d.name == name)
}
