pub mod data;
pub mod io;

pub use data::{AccessMode, Config, PostgresMcpConfig};
pub use io::ConfigError;

use std::path::Path;
use tracing::debug;

impl Config {
    /// Loads the file at `path` (or the platform default) and layers the
    /// process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Config::load_from_path(path)?,
            None => match Config::default_config_path() {
                Some(path) => Config::load_from_path(&path)?,
                None => Config::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        debug!(config = ?config, "Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests;
