//! Subprocess RPC multiplexing engine and SSE session ↔ subprocess coupling.
//!
//! [`client::StdioClient`] owns one child process and demultiplexes requests
//! from many callers over its single stdio pipe. [`registry::ClientRegistry`]
//! pools clients by server key or, in share-process mode, by a content hash
//! of the command line. [`session::SseSession`] is the bounded outbound
//! queue an HTTP SSE handler drains. [`handler`] wires a single inbound
//! request through session lookup, client acquisition, and forwarding.

pub mod client;
pub mod handler;
pub mod registry;
pub mod session;
pub mod session_registry;

pub use client::StdioClient;
pub use registry::ClientRegistry;
pub use session::SseSession;
pub use session_registry::SessionRegistry;
