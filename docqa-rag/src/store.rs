//! On-disk persistence for [`VectorIndex`].
//!
//! An index directory holds two files:
//!
//! - `index.vec`: the primary store: a 20-byte header (`DQVI` magic, format
//!   version, dimension, entry count) followed by every vector as
//!   little-endian `f32`, row by row. Vectors round-trip bit for bit.
//! - `docstore.json`: maps each arena position to its [`Chunk`], plus the
//!   manifest fields needed to cross-check the primary store.
//!
//! Saving writes both files into a fresh staging directory next to the target
//! and renames it into place, so a reader never sees a half-written index.
//!
//! Replacing an existing index takes two renames: the old directory is moved
//! aside, then the staging directory is moved in. Between them the target path
//! does not exist, so another process loading at that instant gets
//! [`RagError::NotFound`]. Saves and loads made through one
//! [`SharedIndex`](crate::SharedIndex) hold its writer lock and never observe the gap.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::Chunk;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// File name of the vector store inside an index directory.
pub const INDEX_FILE: &str = "index.vec";

/// File name of the chunk mapping inside an index directory.
pub const DOCSTORE_FILE: &str = "docstore.json";

const MAGIC: &[u8; 4] = b"DQVI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 20;

#[derive(Debug, Serialize, Deserialize)]
struct DocStore {
    version: u32,
    dimension: usize,
    count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding_model: Option<String>,
    entries: Vec<StoredChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredChunk {
    position: usize,
    chunk: Chunk,
}

/// Reads and writes a [`VectorIndex`] under one directory.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::IndexStore;
///
/// let store = IndexStore::new("vector_store").with_embedding_model("all-MiniLM-L6-v2");
/// store.save(&index)?;
/// let reloaded = store.load()?;
/// ```
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
    embedding_model: Option<String>,
}

impl IndexStore {
    /// Create a store rooted at `dir`. Nothing is touched on disk yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), embedding_model: None }
    }

    /// Record the embedding model in saved indexes and warn when loading an
    /// index built with a different one.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// The index directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a primary store file is present.
    pub fn exists(&self) -> bool {
        self.dir.join(INDEX_FILE).is_file()
    }

    /// Persist `index`, replacing whatever the directory held before.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] or [`RagError::Serialization`] if writing
    /// fails. The previous contents of the directory are left intact in that case.
    pub fn save(&self, index: &VectorIndex) -> Result<()> {
        let parent = match self.dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        let staging = parent.join(format!(".{name}.staging-{}", uuid::Uuid::new_v4()));
        fs::create_dir(&staging)?;

        if let Err(e) = self.write_files(&staging, index) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        if self.dir.exists() {
            let retired = parent.join(format!(".{name}.old-{}", uuid::Uuid::new_v4()));
            if let Err(e) = fs::rename(&self.dir, &retired) {
                let _ = fs::remove_dir_all(&staging);
                return Err(e.into());
            }
            if let Err(e) = fs::rename(&staging, &self.dir) {
                // Put the previous index back before reporting.
                let _ = fs::rename(&retired, &self.dir);
                let _ = fs::remove_dir_all(&staging);
                return Err(e.into());
            }
            if let Err(e) = fs::remove_dir_all(&retired) {
                warn!(path = %retired.display(), error = %e, "failed to remove retired index");
            }
        } else {
            fs::rename(&staging, &self.dir)?;
        }

        info!(path = %self.dir.display(), entries = index.len(), dimension = index.dimension(), "index saved");
        Ok(())
    }

    fn write_files(&self, dir: &Path, index: &VectorIndex) -> Result<()> {
        let docstore = DocStore {
            version: FORMAT_VERSION,
            dimension: index.dimension(),
            count: index.len(),
            embedding_model: self.embedding_model.clone(),
            entries: index
                .chunks()
                .iter()
                .enumerate()
                .map(|(position, chunk)| StoredChunk { position, chunk: chunk.clone() })
                .collect(),
        };
        let mut writer = BufWriter::new(File::create(dir.join(DOCSTORE_FILE))?);
        serde_json::to_writer(&mut writer, &docstore)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        let dimension = u32::try_from(index.dimension()).map_err(|_| {
            RagError::ConfigError(format!("dimension {} does not fit the index format", index.dimension()))
        })?;
        let mut writer = BufWriter::new(File::create(dir.join(INDEX_FILE))?);
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&dimension.to_le_bytes())?;
        writer.write_all(&(index.len() as u64).to_le_bytes())?;
        for value in index.raw_vectors() {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Load the persisted index.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotFound`] if the directory has no primary store file;
    ///   callers are expected to rebuild
    /// - [`RagError::CorruptIndex`] if the files are malformed or disagree
    pub fn load(&self) -> Result<VectorIndex> {
        let index_path = self.dir.join(INDEX_FILE);
        if !index_path.is_file() {
            return Err(RagError::NotFound { path: self.dir.clone() });
        }

        let mut bytes = Vec::new();
        File::open(&index_path)?.read_to_end(&mut bytes)?;
        let (dimension, count, vectors) = decode_vectors(&index_path, &bytes)?;

        let docstore_path = self.dir.join(DOCSTORE_FILE);
        let file = File::open(&docstore_path).map_err(|e| corrupt(&docstore_path, e))?;
        let docstore: DocStore = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| corrupt(&docstore_path, e))?;

        if docstore.version != FORMAT_VERSION {
            return Err(corrupt(&docstore_path, format!("unsupported version {}", docstore.version)));
        }
        if docstore.dimension != dimension || docstore.count != count || docstore.entries.len() != count {
            return Err(corrupt(
                &docstore_path,
                format!(
                    "docstore describes {} entries of dimension {}, vector store has {count} of dimension {dimension}",
                    docstore.entries.len(),
                    docstore.dimension
                ),
            ));
        }

        let mut entries = docstore.entries;
        entries.sort_by_key(|e| e.position);
        for (expected, entry) in entries.iter().enumerate() {
            if entry.position != expected {
                return Err(corrupt(
                    &docstore_path,
                    format!("missing or duplicate position {expected}"),
                ));
            }
        }

        if let (Some(expected), Some(found)) = (&self.embedding_model, &docstore.embedding_model) {
            if expected != found {
                warn!(expected = %expected, found = %found, "index was built with a different embedding model");
            }
        }

        let chunks = entries.into_iter().map(|e| e.chunk).collect();
        debug!(path = %self.dir.display(), entries = count, dimension, "index loaded");
        Ok(VectorIndex::from_parts(dimension, vectors, chunks))
    }

    /// Delete the persisted index, if any.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

fn corrupt(path: &Path, message: impl ToString) -> RagError {
    RagError::CorruptIndex { path: path.to_path_buf(), message: message.to_string() }
}

fn decode_vectors(path: &Path, bytes: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(corrupt(path, "missing vector store header"));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(path, format!("unsupported version {version}")));
    }
    let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..HEADER_LEN]);
    let count = usize::try_from(u64::from_le_bytes(count_bytes))
        .map_err(|_| corrupt(path, "entry count overflows usize"))?;
    if dimension == 0 || count == 0 {
        return Err(corrupt(path, "vector store is empty"));
    }

    let expected_len = dimension
        .checked_mul(count)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| corrupt(path, "vector store size overflows"))?;
    let body = &bytes[HEADER_LEN..];
    if body.len() != expected_len {
        return Err(corrupt(
            path,
            format!("expected {expected_len} bytes of vectors, found {}", body.len()),
        ));
    }

    let vectors = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((dimension, count, vectors))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;
    use crate::document::IndexEntry;

    fn sample_index() -> VectorIndex {
        let entries = (0..3).map(|i| {
            IndexEntry::new(
                vec![i as f32, 0.1 + i as f32, -0.3],
                Chunk {
                    id: format!("doc_{i}"),
                    text: format!("chunk {i}"),
                    source_document_id: "doc".into(),
                    offset: i * 10,
                    metadata: HashMap::from([("source".into(), "doc.txt".into())]),
                },
            )
        });
        VectorIndex::build(entries).unwrap()
    }

    #[test]
    fn missing_directory_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path().join("absent"));
        assert!(!store.exists());
        assert!(matches!(store.load().unwrap_err(), RagError::NotFound { .. }));
    }

    #[test]
    fn save_then_load_is_identical() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path().join("vector_store"));
        let index = sample_index();
        store.save(&index).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), index);
    }

    #[test]
    fn save_replaces_previous_index_without_leftovers() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path().join("vector_store"));
        store.save(&sample_index()).unwrap();

        let smaller = VectorIndex::build(vec![IndexEntry::new(
            vec![1.0],
            sample_index().chunks()[0].clone(),
        )])
        .unwrap();
        store.save(&smaller).unwrap();

        assert_eq!(store.load().unwrap(), smaller);
        let names: Vec<_> = fs::read_dir(temp.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names, vec![std::ffi::OsString::from("vector_store")]);
    }

    #[test]
    fn missing_docstore_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path().join("vector_store"));
        store.save(&sample_index()).unwrap();
        fs::remove_file(store.dir().join(DOCSTORE_FILE)).unwrap();
        assert!(matches!(store.load().unwrap_err(), RagError::CorruptIndex { .. }));
    }

    #[test]
    fn truncated_vector_file_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path().join("vector_store"));
        store.save(&sample_index()).unwrap();
        let path = store.dir().join(INDEX_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        assert!(matches!(store.load().unwrap_err(), RagError::CorruptIndex { .. }));
    }

    #[test]
    fn clear_removes_directory() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::new(temp.path().join("vector_store"));
        store.save(&sample_index()).unwrap();
        store.clear().unwrap();
        assert!(!store.exists());
    }
}
