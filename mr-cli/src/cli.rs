//! CLI argument parsing for mcprouter-rs.

use clap::Parser;

/// mcprouter-rs — JSON-RPC proxy router between HTTP/SSE clients and
/// stdio-backed MCP servers.
#[derive(Parser, Debug)]
#[command(name = "mcprouter-rs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML config file (mcp_servers.<key>.cmd / .share_process,
    /// optional remote_api fallback).
    #[arg(long, env = "MCPROUTER_CONFIG", default_value = "config.yaml")]
    pub config: std::path::PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long, env = "MCPROUTER_BIND", default_value = "127.0.0.1:8765")]
    pub bind: std::net::SocketAddr,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
