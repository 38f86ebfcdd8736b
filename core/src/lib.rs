// Core pieces shared by the Nidhogg crates:
// - JSON-RPC 2.0 and MCP wire structures
// - Configuration loading
// - Shared error types

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;

// Export shared RPC types
pub mod rpc_types;
pub use rpc_types::{
    CallToolResult, JsonRpcError, Request, Response, ServerInfo, TextContent, Tool,
};
