//! Concurrency wrapper that lets readers search while a rebuild is in flight.
//!
//! Readers take a cheap [`Arc`] snapshot of the current index and search it
//! without holding any lock. Writers are serialised by a dedicated mutex,
//! build and persist the replacement off to the side, and only then swap the
//! pointer. A reader therefore sees either the old or the new index, never a
//! partially built one.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::document::IndexEntry;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::store::IndexStore;

/// The live index shared between the query path and rebuilds.
#[derive(Debug, Default)]
pub struct SharedIndex {
    current: RwLock<Option<Arc<VectorIndex>>>,
    writer: Mutex<()>,
}

impl SharedIndex {
    /// Create a holder with no index yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a holder that starts with `index`.
    pub fn with_index(index: VectorIndex) -> Self {
        Self { current: RwLock::new(Some(Arc::new(index))), writer: Mutex::new(()) }
    }

    /// The index readers should use right now, if any.
    pub async fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        self.current.read().await.clone()
    }

    /// Whether a non-empty index is installed.
    pub async fn is_ready(&self) -> bool {
        self.current.read().await.as_ref().is_some_and(|index| !index.is_empty())
    }

    /// Install `index`, returning the one it replaced.
    pub async fn replace(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        let _writer = self.writer.lock().await;
        self.swap(Arc::new(index)).await
    }

    /// Build an index from `entries`, persist it through `store`, then install it.
    ///
    /// Nothing is persisted or swapped if building fails (for example on a
    /// [`RagError::DimensionMismatch`]); a failed save leaves the previous
    /// index installed.
    pub async fn rebuild(&self, entries: Vec<IndexEntry>, store: &IndexStore) -> Result<Arc<VectorIndex>> {
        let _writer = self.writer.lock().await;

        let index = Arc::new(VectorIndex::build(entries)?);
        let to_save = Arc::clone(&index);
        let store = store.clone();
        tokio::task::spawn_blocking(move || store.save(&to_save))
            .await
            .map_err(|e| RagError::Io(std::io::Error::other(e)))??;

        self.swap(Arc::clone(&index)).await;
        info!(entries = index.len(), dimension = index.dimension(), "index rebuilt and installed");
        Ok(index)
    }

    /// Load the persisted index from `store` and install it.
    ///
    /// # Errors
    ///
    /// Propagates [`RagError::NotFound`] so the caller can decide to rebuild.
    pub async fn load_from(&self, store: &IndexStore) -> Result<Arc<VectorIndex>> {
        let _writer = self.writer.lock().await;

        let store = store.clone();
        let index = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| RagError::Io(std::io::Error::other(e)))??;
        let index = Arc::new(index);
        self.swap(Arc::clone(&index)).await;
        info!(entries = index.len(), "index loaded and installed");
        Ok(index)
    }

    async fn swap(&self, index: Arc<VectorIndex>) -> Option<Arc<VectorIndex>> {
        let mut current = self.current.write().await;
        current.replace(index)
    }
}
