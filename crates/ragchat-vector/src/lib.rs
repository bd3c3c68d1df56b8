//! RagChat Vector - Embeddings and the local vector index
//!
//! Provides the embedding clients that turn text into unit-length vectors
//! and an exhaustive inner-product index persisted as two artifacts
//! (`index.bin` and `meta.json`) for storing and searching chunk embeddings.

use std::path::PathBuf;

use ragchat_core::{ChatError, ChunkMetadata};
use thiserror::Error;

pub mod embedding;
pub mod flat_index;
pub mod store;

pub use embedding::{create_embedder, normalize_l2, Embedder, OllamaEmbedding, OpenAiEmbedding};
pub use flat_index::{FlatIndex, Neighbor};
pub use store::{LocalVectorStore, INDEX_FILE, META_FILE};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while building, loading or querying the index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot access {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing index artifact: {0}")]
    MissingArtifact(PathBuf),

    #[error("Corrupted index file: {0}")]
    Corrupted(String),

    #[error("Unsupported index format version {actual} (expected {expected})")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index artifacts disagree: {vectors} vectors, {meta} metadata records, {chunks} chunks")]
    Misaligned {
        vectors: usize,
        meta: usize,
        chunks: usize,
    },

    #[error("Invalid metadata file: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl From<IndexError> for ChatError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::DimensionMismatch { .. } => ChatError::Search(e.to_string()),
            other => ChatError::Index(other.to_string()),
        }
    }
}

// ============================================================================
// Index Trait
// ============================================================================

/// Similarity index over chunk embeddings.
///
/// Each position carries a vector, a [`ChunkMetadata`] record and the chunk
/// text; the three are added and stored together.
pub trait VectorIndex: Send + Sync {
    /// Append vectors with their metadata and texts, all the same length
    fn add(
        &mut self,
        vectors: &[Vec<f32>],
        meta: Vec<ChunkMetadata>,
        chunks: Vec<String>,
    ) -> Result<(), IndexError>;

    /// Return exactly `k` slots, best first; `None` marks "not found"
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Option<Neighbor>>, IndexError>;

    /// Chunk text and metadata stored at `position`
    fn entry(&self, position: usize) -> Option<(&str, &ChunkMetadata)>;

    /// Number of indexed vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension of the indexed vectors
    fn dimension(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: ChatError = IndexError::DimensionMismatch {
            expected: 768,
            actual: 3,
        }
        .into();
        assert!(matches!(err, ChatError::Search(_)));

        let err: ChatError = IndexError::MissingArtifact(PathBuf::from("rag/index.bin")).into();
        match err {
            ChatError::Index(msg) => assert!(msg.contains("index.bin")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
