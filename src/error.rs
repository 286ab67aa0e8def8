//! Tool-level error taxonomy.
//!
//! Every variant renders as the text a caller sees in the error response,
//! so messages carry what was attempted and, where possible, a hint.

use std::fmt::Write as _;

use thiserror::Error;

use crate::catalog::interface::TOKEN_HELP;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("missing required parameter '{name}' for tool '{tool}'")]
    MissingParameter { tool: String, name: String },

    #[error("invalid value '{value}' for parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("node '{requested}' not found.{}", numbered("Available nodes", .candidates))]
    TargetNotFound {
        requested: String,
        candidates: Vec<String>,
    },

    #[error("no nodes found. Is cluster running?")]
    NoTargets,

    #[error("Invalid interface type: {token}\n\n{}", TOKEN_HELP)]
    InterfaceTokenInvalid { token: String },

    #[error("physical driver '{driver}' from cluster config resolves to another physical driver")]
    DriverCycle { driver: String },

    #[error("interface '{requested}' is not up or does not exist.{}", numbered("Available interfaces", .up))]
    InterfaceNotUp { requested: String, up: Vec<String> },

    #[error("no up interfaces found in VPP")]
    NoInterfacesUp,

    #[error("executing command on pod {target} failed: {detail}\nCommand attempted: {command}")]
    CommandFailed {
        target: String,
        command: String,
        detail: String,
    },

    #[error("cluster query failed: {0}")]
    ClusterQuery(String),

    #[error("{stage} failed: {detail}\nCommand attempted: {command}")]
    CaptureStage {
        stage: &'static str,
        command: String,
        detail: String,
    },

    #[error("capture already running on {target} and the request was cancelled while waiting")]
    CaptureBusy { target: String },
}

/// Render a 1-indexed candidate list under `heading`.
fn numbered(heading: &str, items: &[String]) -> String {
    let mut out = format!("\n{heading}:");
    for (i, item) in items.iter().enumerate() {
        let _ = write!(out, "\n{}. {}", i + 1, item);
    }
    out
}
