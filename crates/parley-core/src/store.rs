//! The persistent storage collaborator.
//!
//! Every session owns a [`StorageBlob`], a JSON object loaded when the
//! session is created and flushed back after every handled update. Where it
//! is kept is up to the [`SessionStore`] implementation; [`MemoryStore`]
//! keeps blobs for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::StorageResult;
use crate::update::ChatId;

/// The per-user key-value payload.
pub type StorageBlob = Map<String, Value>;

/// Loads and saves per-user storage blobs.
///
/// Writes are last-write-wins; the engine does not lock against other
/// writers of the same backend.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Returns the stored blob for `user`, or an empty blob if unknown.
    async fn load(&self, user: ChatId) -> StorageResult<StorageBlob>;

    /// Replaces the stored blob for `user`.
    async fn save(&self, user: ChatId, blob: &StorageBlob) -> StorageResult<()>;
}

/// A shared storage trait object.
pub type BoxedStore = Arc<dyn SessionStore>;

/// A [`SessionStore`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<ChatId, StorageBlob>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of users with a stored blob.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns `true` if nothing has been saved yet.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, user: ChatId) -> StorageResult<StorageBlob> {
        Ok(self.blobs.read().get(&user).cloned().unwrap_or_default())
    }

    async fn save(&self, user: ChatId, blob: &StorageBlob) -> StorageResult<()> {
        self.blobs.write().insert(user, blob.clone());
        Ok(())
    }
}
