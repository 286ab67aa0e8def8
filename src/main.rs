use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

mod capture;
mod catalog;
mod cluster;
mod config;
mod dispatch;
mod error;
mod exec;
mod server;
mod utils;

use cluster::KubectlInventory;
use config::Settings;
use dispatch::Relay;
use exec::KubectlRunner;
use server::VppServer;

/// VPP MCP - relay VPP / GoBGP debug commands into Calico/VPP pods over MCP
///
/// Every tool maps to one fixed `kubectl exec ... -- vppctl|gobgp <args>`
/// invocation (or a trace / pcap / dispatch capture sequence). Arguments are
/// validated against the tool's declared parameters before anything runs.
///
/// Transports:
///   stdio   JSON-RPC over stdin/stdout (default; logs go to stderr)
///   http    streamable HTTP at http://<bind>:<port>/mcp, plus /health
///
/// Global flags / env:
///   -v / -vv          Increase verbosity (RUST_LOG overrides)
///   -q / --quiet      Errors only
///   -c / --config     YAML settings file (or VPP_MCP_CONFIG env)
///
/// Examples:
///   vpp-mcp
///   vpp-mcp --transport http --port 8080
///   vpp-mcp -c /etc/vpp-mcp.yaml -v
#[derive(Parser, Debug)]
#[command(
    name = "vpp-mcp",
    version,
    author,
    about = "MCP server for debugging Calico/VPP dataplanes",
    propagate_version = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long)]
    quiet: bool,

    /// MCP transport
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// HTTP listen port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Settings file (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = utils::derive_level(cli.verbose, cli.quiet);
    utils::init_logging(level);

    // Settings path: CLI flag > VPP_MCP_CONFIG env
    let config_path = cli.config.clone().or_else(|| {
        std::env::var("VPP_MCP_CONFIG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    });
    let settings = Arc::new(Settings::load(config_path.as_deref())?);
    info!(
        namespace = %settings.namespace,
        transport = ?cli.transport,
        "starting vpp-mcp"
    );

    let runner = Arc::new(KubectlRunner);
    let inventory = Arc::new(KubectlInventory::new(runner.clone(), settings.clone()));
    let relay = Relay::new(runner, inventory, settings)
        .with_span(tracing::info_span!("relay", transport = ?cli.transport));
    let server = VppServer::new(relay);

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    rt.block_on(async {
        match cli.transport {
            Transport::Stdio => server::run_stdio(server).await,
            Transport::Http => server::run_http(server, &cli.bind, cli.port).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_stdio() {
        let cli = Cli::try_parse_from(["vpp-mcp"]).unwrap();
        assert_eq!(cli.transport, Transport::Stdio);
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.bind, "0.0.0.0");
        assert!(cli.config.is_none());
    }

    #[test]
    fn http_flags_parse() {
        let cli = Cli::try_parse_from([
            "vpp-mcp", "--transport", "http", "-p", "9000", "--bind", "127.0.0.1", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.transport, Transport::Http);
        assert_eq!(cli.port, 9000);
        assert_eq!(cli.bind, "127.0.0.1");
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn unknown_transport_is_rejected() {
        assert!(Cli::try_parse_from(["vpp-mcp", "--transport", "sse"]).is_err());
    }
}
