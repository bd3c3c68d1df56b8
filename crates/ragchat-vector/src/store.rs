//! On-disk vector store: a [`FlatIndex`] plus the parallel metadata and
//! chunk texts that give each row its meaning.
//!
//! A store directory holds two artifacts:
//! - `index.bin` - the vectors, see [`crate::flat_index`]
//! - `meta.json` - `{"meta": [{"source", "chunk_id"}...], "chunks": [...]}`
//!
//! Position `i` in the index, in `meta` and in `chunks` always describes the
//! same chunk. Saving writes both artifacts into a staging directory and
//! swaps it into place, so readers never observe a new index next to old
//! metadata.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ragchat_core::ChunkMetadata;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::flat_index::{FlatIndex, Neighbor};
use crate::{IndexError, VectorIndex};

/// File name of the vector artifact
pub const INDEX_FILE: &str = "index.bin";

/// File name of the metadata artifact
pub const META_FILE: &str = "meta.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetaDocument {
    meta: Vec<ChunkMetadata>,
    chunks: Vec<String>,
}

/// Local vector store backed by a flat index
#[derive(Debug, Clone)]
pub struct LocalVectorStore {
    index: FlatIndex,
    meta: Vec<ChunkMetadata>,
    chunks: Vec<String>,
}

impl LocalVectorStore {
    /// Create an empty store for vectors of `dimension` components
    pub fn new(dimension: usize) -> Self {
        Self {
            index: FlatIndex::new(dimension),
            meta: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Load both artifacts from `dir`, checking that they agree
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let dir = dir.as_ref();
        let index_path = dir.join(INDEX_FILE);
        let meta_path = dir.join(META_FILE);

        for path in [&index_path, &meta_path] {
            if !path.is_file() {
                return Err(IndexError::MissingArtifact(path.clone()));
            }
        }

        let index = FlatIndex::read_from(BufReader::new(open(&index_path)?))?;
        let document: MetaDocument = serde_json::from_reader(BufReader::new(open(&meta_path)?))?;

        let store = Self {
            index,
            meta: document.meta,
            chunks: document.chunks,
        };
        store.check_alignment()?;

        info!(
            "Loaded vector store from {} ({} vectors, dimension {})",
            dir.display(),
            store.len(),
            store.dimension()
        );
        Ok(store)
    }

    /// Persist both artifacts to `dir`, replacing any previous contents
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), IndexError> {
        let dir = dir.as_ref();
        self.check_alignment()?;

        let parent = match dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| artifact_error(&parent, e))?;

        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("vector_store");
        let staging = parent.join(format!(".{name}.staging-{}", Uuid::new_v4()));
        fs::create_dir(&staging).map_err(|e| artifact_error(&staging, e))?;

        if let Err(e) = self.write_artifacts(&staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let retired = parent.join(format!(".{name}.old-{}", Uuid::new_v4()));
        if dir.exists() {
            fs::rename(dir, &retired).map_err(|e| artifact_error(dir, e))?;
        }
        if let Err(e) = fs::rename(&staging, dir) {
            // Put the previous store back before reporting
            if retired.exists() {
                let _ = fs::rename(&retired, dir);
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(artifact_error(dir, e));
        }
        if retired.exists() {
            fs::remove_dir_all(&retired).map_err(|e| artifact_error(&retired, e))?;
        }

        info!("Saved vector store to {} ({} vectors)", dir.display(), self.len());
        Ok(())
    }

    fn write_artifacts(&self, dir: &Path) -> Result<(), IndexError> {
        let index_path = dir.join(INDEX_FILE);
        let file = File::create(&index_path).map_err(|e| artifact_error(&index_path, e))?;
        self.index.write_to(BufWriter::new(file))?;

        let meta_path = dir.join(META_FILE);
        let file = File::create(&meta_path).map_err(|e| artifact_error(&meta_path, e))?;
        let document = MetaDocument {
            meta: self.meta.clone(),
            chunks: self.chunks.clone(),
        };
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &document)?;
        writer.flush()?;

        debug!("Wrote index artifacts to {}", dir.display());
        Ok(())
    }

    fn check_alignment(&self) -> Result<(), IndexError> {
        if self.index.len() != self.meta.len() || self.meta.len() != self.chunks.len() {
            return Err(IndexError::Misaligned {
                vectors: self.index.len(),
                meta: self.meta.len(),
                chunks: self.chunks.len(),
            });
        }
        Ok(())
    }

    /// Metadata records in position order
    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.meta
    }

    /// Chunk texts in position order
    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }
}

impl VectorIndex for LocalVectorStore {
    fn add(
        &mut self,
        vectors: &[Vec<f32>],
        meta: Vec<ChunkMetadata>,
        chunks: Vec<String>,
    ) -> Result<(), IndexError> {
        if vectors.len() != meta.len() || meta.len() != chunks.len() {
            return Err(IndexError::Misaligned {
                vectors: vectors.len(),
                meta: meta.len(),
                chunks: chunks.len(),
            });
        }
        self.index.add(vectors)?;
        self.meta.extend(meta);
        self.chunks.extend(chunks);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Option<Neighbor>>, IndexError> {
        self.index.search(query, k)
    }

    fn entry(&self, position: usize) -> Option<(&str, &ChunkMetadata)> {
        Some((self.chunks.get(position)?.as_str(), self.meta.get(position)?))
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn dimension(&self) -> usize {
        self.index.dimension()
    }
}

fn open(path: &Path) -> Result<File, IndexError> {
    File::open(path).map_err(|e| artifact_error(path, e))
}

fn artifact_error(path: &Path, source: std::io::Error) -> IndexError {
    IndexError::Artifact {
        path: path.to_path_buf(),
        source,
    }
}
