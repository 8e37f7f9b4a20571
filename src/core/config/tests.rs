use super::data::{path_display, AccessMode, Config, DEFAULT_DOCKER_IMAGE};
use super::io::ConfigError;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.http_addr, "0.0.0.0:8090");
    assert_eq!(config.servers_path, PathBuf::from("./data/servers.json"));
    assert_eq!(config.notes_path, PathBuf::from("./data/notes.json"));
    assert_eq!(config.postgres_mcp.access_mode, AccessMode::Restricted);
    assert_eq!(config.postgres_mcp.docker_image, DEFAULT_DOCKER_IMAGE);
    assert!(config.postgres_mcp.database_uri.is_empty());
}

#[test]
fn test_load_partial_config_keeps_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
http_addr = ":9000"
notes_path = "/srv/toolgate/notes.json"

[postgres_mcp]
database_uri = "postgres://reader@db:5432/app"
access_mode = "unrestricted"
"#,
    )
    .expect("Failed to write config");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config.http_addr, ":9000");
    assert_eq!(config.bind_addr(), "0.0.0.0:9000");
    assert_eq!(config.notes_path, PathBuf::from("/srv/toolgate/notes.json"));
    assert_eq!(config.servers_path, PathBuf::from("./data/servers.json"));
    assert_eq!(
        config.postgres_mcp.database_uri,
        "postgres://reader@db:5432/app"
    );
    assert_eq!(config.postgres_mcp.access_mode, AccessMode::Unrestricted);
    assert_eq!(config.postgres_mcp.docker_image, DEFAULT_DOCKER_IMAGE);
}

#[test]
fn test_load_malformed_config_reports_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "http_addr = [").expect("Failed to write config");

    let err = Config::load_from_path(&config_path).expect_err("parse should fail");

    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("config.toml"));
}

#[test]
fn env_overrides_replace_file_values() {
    let mut config = Config::default();
    config
        .apply_env_overrides(env(&[
            ("MCP_HTTP_ADDR", "127.0.0.1:7000"),
            ("MCP_SERVERS_PATH", "/var/lib/toolgate/servers.json"),
            ("LEARNING_NOTES_PATH", "/var/lib/toolgate/notes.json"),
            ("POSTGRES_MCP_ACCESS_MODE", "Unrestricted"),
            ("POSTGRES_MCP_DOCKER_IMAGE", "example/postgres-mcp:dev"),
            ("DATABASE_URL", "postgres://fallback"),
        ]))
        .expect("overrides apply");

    assert_eq!(config.bind_addr(), "127.0.0.1:7000");
    assert_eq!(
        config.servers_path,
        PathBuf::from("/var/lib/toolgate/servers.json")
    );
    assert_eq!(
        config.notes_path,
        PathBuf::from("/var/lib/toolgate/notes.json")
    );
    assert_eq!(config.postgres_mcp.access_mode, AccessMode::Unrestricted);
    assert_eq!(config.postgres_mcp.docker_image, "example/postgres-mcp:dev");
    assert_eq!(config.postgres_mcp.database_uri, "postgres://fallback");
}

#[test]
fn database_uri_prefers_the_most_specific_variable() {
    let mut config = Config::default();
    config
        .apply_env_overrides(env(&[
            ("POSTGRES_MCP_DATABASE_URI", "postgres://specific"),
            ("DATABASE_URI", "postgres://generic"),
            ("DATABASE_URL", "postgres://fallback"),
        ]))
        .expect("overrides apply");
    assert_eq!(config.postgres_mcp.database_uri, "postgres://specific");

    let mut config = Config::default();
    config
        .apply_env_overrides(env(&[
            ("POSTGRES_MCP_DATABASE_URI", "  "),
            ("DATABASE_URI", "postgres://generic"),
        ]))
        .expect("overrides apply");
    assert_eq!(config.postgres_mcp.database_uri, "postgres://generic");
}

#[test]
fn empty_env_values_are_ignored() {
    let mut config = Config {
        http_addr: ":8100".to_string(),
        ..Default::default()
    };
    config
        .apply_env_overrides(env(&[("MCP_HTTP_ADDR", ""), ("POSTGRES_MCP_ACCESS_MODE", "")]))
        .expect("overrides apply");

    assert_eq!(config.http_addr, ":8100");
    assert_eq!(config.postgres_mcp.access_mode, AccessMode::Restricted);
}

#[test]
fn invalid_access_mode_is_rejected() {
    let mut config = Config::default();
    let err = config
        .apply_env_overrides(env(&[("POSTGRES_MCP_ACCESS_MODE", "readonly")]))
        .expect_err("unknown mode");

    assert!(matches!(
        err,
        ConfigError::InvalidAccessMode {
            key: "POSTGRES_MCP_ACCESS_MODE",
            ..
        }
    ));
    assert!(err.to_string().contains("readonly"));
}

#[test]
fn debug_output_hides_database_uri() {
    let mut config = Config::default();
    assert!(format!("{config:?}").contains("<unset>"));

    config.postgres_mcp.database_uri = "postgres://user:hunter2@db/app".to_string();
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
fn test_path_display() {
    let path = PathBuf::from("/tmp/toolgate/servers.json");
    assert!(path_display(&path).ends_with("servers.json"));

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let under_home = PathBuf::from(home).join(".config/toolgate/config.toml");
            assert_eq!(path_display(&under_home), "~/.config/toolgate/config.toml");
        }
    }
}
