//! MCP surface: rmcp `ServerHandler` over the relay, plus the two transports.
//!
//! - stdio: JSON-RPC on stdin/stdout (logs stay on stderr)
//! - http: streamable HTTP at `/mcp`, with `/` (info page) and `/health`
//!
//! Tool failures are reported as `isError` results, never as JSON-RPC errors.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, response::Html, routing::get};
use rmcp::{
    RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation,
        ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
        Tool,
    },
    service::RequestContext,
    transport::streamable_http_server::{
        StreamableHttpService, session::local::LocalSessionManager,
    },
};
use tracing::{debug, info};

use crate::catalog::CATALOG;
use crate::dispatch::{Relay, ToolResponse};

const INSTRUCTIONS: &str = "Debugging tools for Calico/VPP clusters. Each tool runs one vppctl or \
gobgp command inside a calico-vpp-node pod (use vpp_get_pods to find pod names), or runs a \
trace / pcap / dispatch capture and returns its results.";

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>VPP MCP Server</title></head>
<body>
<h1>VPP MCP Server</h1>
<p>MCP endpoint: <code>/mcp</code> (streamable HTTP)</p>
<p>Health check: <code>/health</code></p>
</body>
</html>
"#;

#[derive(Clone)]
pub struct VppServer {
    relay: Relay,
}

impl VppServer {
    pub fn new(relay: Relay) -> Self {
        Self { relay }
    }
}

/// Tool list advertised in `tools/list`, one entry per catalog descriptor.
pub fn tools() -> Vec<Tool> {
    CATALOG
        .iter()
        .map(|d| Tool::new(d.name, d.description, Arc::new(d.input_schema())))
        .collect()
}

fn into_call_result(response: ToolResponse) -> CallToolResult {
    let content = vec![Content::text(response.text())];
    if response.is_failure() {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

impl ServerHandler for VppServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "vpp-mcp-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Implementation::from_build_env()
            },
            instructions: Some(INSTRUCTIONS.into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = request.arguments.unwrap_or_default();
        debug!(tool = %request.name, "tools/call");
        let response = self
            .relay
            .dispatch(&request.name, &args, context.ct.clone())
            .await;
        Ok(into_call_result(response))
    }
}

/* ---- Transports ---- */

pub async fn run_stdio(server: VppServer) -> Result<()> {
    info!("serving MCP over stdio");
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to initialize stdio session")?;
    let reason = service.waiting().await?;
    info!(?reason, "stdio session ended");
    Ok(())
}

pub fn router(server: VppServer) -> Router {
    let mcp = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    Router::new()
        .route("/", get(|| async { Html(INDEX_PAGE) }))
        .route("/health", get(|| async { "OK" }))
        .nest_service("/mcp", mcp)
}

pub async fn run_http(server: VppServer, bind: &str, port: u16) -> Result<()> {
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "serving MCP over streamable HTTP at /mcp");
    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;
    info!("http server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
