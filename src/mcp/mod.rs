//! Model Context Protocol: JSON-RPC 2.0 over a subprocess's stdio.
//!
//! The client side discovers remote tools for the catalog; the server side
//! backs the `declutter-notion-mcp` provider binary.

pub mod client;
pub mod config;
pub mod server;
pub mod transport;
pub mod types;

pub use client::{McpClient, McpTool, StdioProviderFactory};
pub use config::{DEFAULT_CONNECT_TIMEOUT, ProviderSpec, load_provider_specs, parse_provider_specs};
pub use server::McpServer;
pub use transport::{LineTransport, McpTransport};
