//! JSON file backed session storage.
//!
//! All users share one JSON document mapping the user id to that user's
//! storage object:
//!
//! ```json
//! { "42": { "name": "Ada", "visits": 3 } }
//! ```
//!
//! The document is read once and kept in memory; every save rewrites the
//! whole file through a temporary file in the same directory, so a crash
//! never leaves a half-written document behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use parley_core::{ChatId, SessionStore, StorageBlob, StorageError, StorageResult};

/// A [`SessionStore`] keeping every user's blob in one JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<Option<Map<String, Value>>>,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> StorageResult<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "storage file does not exist yet");
                return Ok(Map::new());
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(document) => Ok(document),
            other => Err(StorageError::Serialization(format!(
                "expected a JSON object in {}, found {}",
                self.path.display(),
                kind_of(&other)
            ))),
        }
    }

    async fn write_document(&self, document: &Map<String, Value>) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| StorageError::from(e.error))?;
    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn load(&self, user: ChatId) -> StorageResult<StorageBlob> {
        let mut document = self.document.lock().await;
        if document.is_none() {
            *document = Some(self.read_document().await?);
        }
        let blob = document
            .as_ref()
            .and_then(|doc| doc.get(&user.to_string()))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        debug!(%user, keys = blob.len(), "storage loaded");
        Ok(blob)
    }

    async fn save(&self, user: ChatId, blob: &StorageBlob) -> StorageResult<()> {
        let mut guard = self.document.lock().await;
        let mut document = match guard.take() {
            Some(document) => document,
            None => self.read_document().await?,
        };
        document.insert(user.to_string(), Value::Object(blob.clone()));
        let result = self.write_document(&document).await;
        *guard = Some(document);
        result
    }
}
