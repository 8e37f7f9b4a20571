//! File-backed registry of MCP server records.
//!
//! The whole registry lives in one JSON array. Writes go through a temp file
//! in the same directory followed by an atomic rename, so readers never see a
//! half-written document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const ID_PREFIX: &str = "srv_";
const ID_RANDOM_BYTES: usize = 12;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Input rejected before touching disk; the payload is the wire code.
    #[error("{0}")]
    Validation(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: Map<String, Value>,
}

/// A record as submitted by a client, before it has an id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewServer {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: Option<Map<String, Value>>,
}

pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// All stored records, newest first. A missing file is an empty registry.
    pub async fn list(&self) -> Result<Vec<ServerRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        run_blocking(move || read_json(&path)).await
    }

    /// Validates and stores `server`, returning it with its assigned id.
    pub async fn create(&self, server: NewServer) -> Result<ServerRecord, StoreError> {
        let name = server.name.trim().to_string();
        let kind = server.kind.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::Validation("name_required"));
        }
        if kind.is_empty() {
            return Err(StoreError::Validation("type_required"));
        }

        let record = ServerRecord {
            id: new_id(),
            name,
            kind,
            config: server.config.unwrap_or_default(),
        };

        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let created = record.clone();
        run_blocking(move || {
            let mut servers: Vec<ServerRecord> = read_json(&path)?;
            servers.insert(0, created);
            write_json_atomic(&path, &servers)
        })
        .await?;

        info!(id = %record.id, name = %record.name, kind = %record.kind, "Stored MCP server");
        Ok(record)
    }
}

/// Runs synchronous file work off the async runtime.
pub(crate) async fn run_blocking<T, F>(task: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| StoreError::Io(std::io::Error::other(err.to_string())))?
}

/// Reads a JSON document; a missing file yields `T::default()`.
pub(crate) fn read_json<T>(path: &Path) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Data file not found; treating as empty");
            Ok(T::default())
        }
        Err(err) => Err(err.into()),
    }
}

/// Replaces `path` with `value` through a temp file in the same directory.
pub(crate) fn write_json_atomic<T>(path: &Path, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir)?;
    }

    let mut contents = serde_json::to_vec_pretty(value)?;
    contents.push(b'\n');

    let mut temp_file = match parent {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new_in(".")?,
    };
    temp_file.write_all(&contents)?;
    temp_file.as_file_mut().sync_all()?;
    temp_file.persist(path)?;
    Ok(())
}

/// `srv_` followed by 24 hex digits from the OS RNG.
fn new_id() -> String {
    let mut bytes = [0u8; ID_RANDOM_BYTES];
    if let Err(err) = getrandom::fill(&mut bytes) {
        warn!(error = %err, "OS RNG unavailable; using timestamp id");
        return format!(
            "{ID_PREFIX}{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
    }
    bytes
        .iter()
        .fold(String::from(ID_PREFIX), |mut id, byte| {
            let _ = write!(id, "{byte:02x}");
            id
        })
}
