use crate::core::config::data::{path_display, AccessMode, Config};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_HTTP_ADDR: &str = "MCP_HTTP_ADDR";
pub const ENV_SERVERS_PATH: &str = "MCP_SERVERS_PATH";
pub const ENV_NOTES_PATH: &str = "LEARNING_NOTES_PATH";
pub const ENV_ACCESS_MODE: &str = "POSTGRES_MCP_ACCESS_MODE";
pub const ENV_DOCKER_IMAGE: &str = "POSTGRES_MCP_DOCKER_IMAGE";
/// Checked in order; the first non-empty value wins.
pub const ENV_DATABASE_URI_KEYS: [&str; 3] =
    ["POSTGRES_MCP_DATABASE_URI", "DATABASE_URI", "DATABASE_URL"];

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config at {}: {source}", path_display(.path))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config at {}: {source}", path_display(.path))]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The access mode override is not a known mode.
    #[error("Invalid value for {key}: {reason}")]
    InvalidAccessMode { key: &'static str, reason: String },
}

impl Config {
    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides read through `lookup`. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(addr) = non_empty(ENV_HTTP_ADDR) {
            self.http_addr = addr;
        }
        if let Some(path) = non_empty(ENV_SERVERS_PATH) {
            self.servers_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty(ENV_NOTES_PATH) {
            self.notes_path = PathBuf::from(path);
        }
        if let Some(uri) = ENV_DATABASE_URI_KEYS.iter().copied().find_map(|key| non_empty(key)) {
            self.postgres_mcp.database_uri = uri;
        }
        if let Some(mode) = non_empty(ENV_ACCESS_MODE) {
            self.postgres_mcp.access_mode =
                mode.parse::<AccessMode>().map_err(|reason| ConfigError::InvalidAccessMode {
                    key: ENV_ACCESS_MODE,
                    reason,
                })?;
        }
        if let Some(image) = non_empty(ENV_DOCKER_IMAGE) {
            self.postgres_mcp.docker_image = image;
        }
        Ok(())
    }

    /// Platform config location, e.g. `~/.config/toolgate/config.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "toolgate", "toolgate")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
