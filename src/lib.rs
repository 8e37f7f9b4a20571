//! Toolgate is an HTTP gateway that forwards namespaced tool calls to a
//! container-isolated postgres MCP server spoken to over stdio.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`mcp`] owns the protocol side: the stdio transport, the lazily created
//!   and failure-invalidated session, the deadline-bounded tool invoker, and
//!   content normalization.
//! - [`server`] exposes the invoker, the server registry and notes over HTTP.
//! - [`store`] persists MCP server records in a JSON file.
//! - [`notes`] persists markdown notes keyed by word id in a JSON file.
//! - [`core`] loads configuration from TOML and the environment.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod cli;
pub mod core;
pub mod mcp;
pub mod notes;
pub mod server;
pub mod store;
