//! Shared error types for mcprouter-rs.

use thiserror::Error;

/// Errors raised anywhere in the router core or its HTTP glue.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to spawn mcp server process: {0}")]
    Spawn(String),

    #[error("client closed with no response")]
    ClientClosed,

    #[error("mcp server transport error: {0}")]
    Upstream(String),

    #[error("invalid json-rpc message: {0}")]
    InvalidRequest(String),

    #[error("unknown or missing session")]
    UnknownSession,
}

pub type RouterResult<T> = Result<T, RouterError>;
