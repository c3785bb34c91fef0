//! MCP server for schema retrieval
//!
//! Exposes table search to MCP clients over stdio.

mod server;

pub use server::run_mcp_server;
