use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8090";
pub const DEFAULT_SERVERS_PATH: &str = "./data/servers.json";
pub const DEFAULT_NOTES_PATH: &str = "./data/notes.json";
pub const DEFAULT_DOCKER_IMAGE: &str = "crystaldba/postgres-mcp";

/// How much the postgres MCP server is allowed to do against the database.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    Restricted,
    Unrestricted,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Restricted => "restricted",
            AccessMode::Unrestricted => "unrestricted",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "restricted" => Ok(AccessMode::Restricted),
            "unrestricted" => Ok(AccessMode::Unrestricted),
            other => Err(format!(
                "unknown access mode '{other}' (expected restricted or unrestricted)"
            )),
        }
    }
}

/// Connection parameters for the containerized postgres MCP server.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PostgresMcpConfig {
    /// Connection string handed to the container. Empty means unconfigured.
    pub database_uri: String,
    pub access_mode: AccessMode,
    pub docker_image: String,
}

impl Default for PostgresMcpConfig {
    fn default() -> Self {
        Self {
            database_uri: String::new(),
            access_mode: AccessMode::default(),
            docker_image: DEFAULT_DOCKER_IMAGE.to_string(),
        }
    }
}

impl fmt::Debug for PostgresMcpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let database_uri = if self.database_uri.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("PostgresMcpConfig")
            .field("database_uri", &database_uri)
            .field("access_mode", &self.access_mode)
            .field("docker_image", &self.docker_image)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Listen address; a bare `:port` binds every interface.
    pub http_addr: String,
    /// JSON document backing the MCP server registry.
    pub servers_path: PathBuf,
    /// JSON document backing the learning notes.
    pub notes_path: PathBuf,
    pub postgres_mcp: PostgresMcpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            servers_path: PathBuf::from(DEFAULT_SERVERS_PATH),
            notes_path: PathBuf::from(DEFAULT_NOTES_PATH),
            postgres_mcp: PostgresMcpConfig::default(),
        }
    }
}

impl Config {
    /// Address suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        let addr = self.http_addr.trim();
        if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        }
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
