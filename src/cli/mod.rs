//! Command-line interface parsing and handling
//!
//! `serve` runs the HTTP gateway; `call` performs one tool invocation and
//! prints its normalized result.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::mcp::client::{CallContext, ToolInvoker};
use crate::server;

const DEFAULT_LOG_FILTER: &str = "toolgate=info,tower_http=info";

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "HTTP gateway for the postgres MCP tool server")]
#[command(
    long_about = "Toolgate exposes the tools of a containerized postgres MCP server over HTTP. \
Calls to POST /mcp/call with a tool named postgres_mcp.<tool> are forwarded to one shared \
stdio session, which is started on first use and replaced after any failure.\n\n\
Environment Variables:\n\
  MCP_HTTP_ADDR               Listen address (default 0.0.0.0:8090, ':port' allowed)\n\
  MCP_SERVERS_PATH            Server registry file (default ./data/servers.json)\n\
  LEARNING_NOTES_PATH         Notes file (default ./data/notes.json)\n\
  POSTGRES_MCP_DATABASE_URI   Database URI (falls back to DATABASE_URI, DATABASE_URL)\n\
  POSTGRES_MCP_ACCESS_MODE    restricted (default) or unrestricted\n\
  POSTGRES_MCP_DOCKER_IMAGE   Server image (default crystaldba/postgres-mcp)\n\
  RUST_LOG                    Log filter (default toolgate=info,tower_http=info)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Listen address, overriding config and environment
    #[arg(short = 'b', long, global = true, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway (default)
    Serve,
    /// Invoke one tool and print the normalized result
    Call {
        /// Namespaced tool name, e.g. postgres_mcp.list_schemas
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(short = 'a', long, default_value = "{}")]
        args: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.http_addr = bind;
    }

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            server::serve(&config).await?;
            Ok(())
        }
        Commands::Call { tool, args } => call_once(&config, &tool, &args).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_call_args(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("--args must be a JSON object".to_string()),
        Err(err) => Err(format!("--args is not valid JSON: {err}")),
    }
}

async fn call_once(config: &Config, tool: &str, raw_args: &str) -> Result<(), Box<dyn Error>> {
    let tool = tool.trim();
    if !ToolInvoker::handles(tool) {
        return Err(format!("unknown_tool: {tool}").into());
    }
    let arguments = parse_call_args(raw_args)?;

    let invoker = ToolInvoker::new(config.postgres_mcp.clone());
    let cancel = CancellationToken::new();
    let ctx = CallContext::new().with_cancel(cancel.clone());

    let result = tokio::select! {
        result = invoker.call(&ctx, tool, arguments) => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            Err(crate::mcp::error::McpCallError::transport("MCP call cancelled."))
        }
    };
    invoker.shutdown().await;

    let value = result?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
