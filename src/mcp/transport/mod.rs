//! Launching the tool-serving process.
//!
//! The postgres MCP server runs as a throwaway container whose stdio is the
//! JSON-RPC channel. [`LaunchSpec`] describes the process; [`stdio`] owns the
//! running child and speaks the line-delimited protocol over its pipes.

use crate::core::config::data::PostgresMcpConfig;
use std::fmt;

pub mod stdio;

/// Environment variable the container reads its connection string from.
pub const DATABASE_URI_ENV: &str = "DATABASE_URI";

const CONTAINER_RUNTIME: &str = "docker";

/// Program, arguments and extra environment for one server process.
#[derive(Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Interactive, auto-removed container for the postgres MCP image.
    ///
    /// `-e DATABASE_URI` without a value makes docker forward the variable
    /// from our environment, so the connection string never appears in the
    /// process listing.
    pub fn postgres_container(config: &PostgresMcpConfig) -> Self {
        let args = vec![
            "run".to_string(),
            "-i".to_string(),
            "--rm".to_string(),
            "-e".to_string(),
            DATABASE_URI_ENV.to_string(),
            config.docker_image.clone(),
            format!("--access-mode={}", config.access_mode),
        ];
        Self {
            program: CONTAINER_RUNTIME.to_string(),
            args,
            env: vec![(DATABASE_URI_ENV.to_string(), config.database_uri.clone())],
        }
    }
}

impl fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("LaunchSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}
