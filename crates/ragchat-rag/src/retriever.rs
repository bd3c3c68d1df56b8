//! Dense retrieval over the local vector store
//!
//! The retriever embeds a question, searches the index and maps each hit
//! back to its chunk text and metadata. The index is loaded once and shared
//! read-only between concurrent callers.

use std::path::Path;
use std::sync::Arc;

use ragchat_core::{ChatError, Result, SearchResult};
use ragchat_vector::{Embedder, LocalVectorStore, VectorIndex};
use tracing::{debug, warn};

/// Embedder plus index, answering top-k chunk queries
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    /// Create a retriever over an already loaded index
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Load the index artifacts from `dir`
    pub fn open(dir: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = LocalVectorStore::load(dir)?;
        Ok(Self::new(embedder, Arc::new(store)))
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Top `k` chunks for `query`, best first.
    ///
    /// Returns at most `k` results; fewer when the index holds fewer chunks.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(ChatError::Validation("top_k must be at least 1".to_string()));
        }

        let vector = self.embedder.embed(query).await?;
        let slots = self.index.search(&vector, k)?;

        let results = slots
            .into_iter()
            .flatten()
            .map(|neighbor| {
                let (text, meta) = self.index.entry(neighbor.position).ok_or_else(|| {
                    ChatError::Index(format!(
                        "index returned position {} outside metadata",
                        neighbor.position
                    ))
                })?;
                Ok(SearchResult::new(text, meta.clone(), neighbor.score))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Retrieved {} of {} requested chunks", results.len(), k);
        Ok(results)
    }
}

/// Whether retrieval can be used for this process
#[derive(Clone)]
pub enum RetrieverState {
    Available(Arc<Retriever>),
    Unavailable(String),
}

impl RetrieverState {
    /// Try to load the index; a failure leaves retrieval unavailable
    pub fn load(dir: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Self {
        let dir = dir.as_ref();
        match Retriever::open(dir, embedder) {
            Ok(retriever) => Self::Available(Arc::new(retriever)),
            Err(e) => {
                warn!(
                    "Vector index at {} unavailable, answering without context: {e}",
                    dir.display()
                );
                Self::Unavailable(e.to_string())
            }
        }
    }

    pub fn retriever(&self) -> Option<&Arc<Retriever>> {
        match self {
            Self::Available(retriever) => Some(retriever),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Why retrieval is unavailable, if it is
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }
}

impl From<Retriever> for RetrieverState {
    fn from(retriever: Retriever) -> Self {
        Self::Available(Arc::new(retriever))
    }
}
