//! Offline indexing: documents to vector store artifacts
//!
//! Reads every supported file directly inside a directory, splits it into
//! overlapping chunks, embeds the chunks in batches and writes `index.bin`
//! and `meta.json`. Files that cannot be read or parsed are skipped.
//!
//! Author: hephaex@gmail.com

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use ragchat_core::{ChatError, DocumentChunk, EmbeddingConfig, IndexConfig, Result};
use ragchat_parser::{ChunkConfig, ParserRegistry};
use ragchat_vector::{Embedder, LocalVectorStore, VectorIndex};
use tracing::{debug, info, warn};

/// Outcome of an indexing run
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// Documents that produced at least one chunk
    pub documents: usize,

    /// Files skipped, with the reason
    pub skipped: Vec<(PathBuf, String)>,

    /// Chunks written to the index
    pub chunks: usize,

    /// Embedding dimension of the index
    pub dimension: usize,
}

/// Builds the vector store from a directory of documents
pub struct DocumentIndexer {
    embedder: Arc<dyn Embedder>,
    registry: ParserRegistry,
    chunking: ChunkConfig,
    batch_size: usize,
    concurrency: usize,
}

impl DocumentIndexer {
    /// Create an indexer with the default parsers
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkConfig) -> Self {
        Self {
            embedder,
            registry: ParserRegistry::with_defaults(),
            chunking,
            batch_size: 32,
            concurrency: 2,
        }
    }

    /// Create from config
    pub fn from_config(
        embedder: Arc<dyn Embedder>,
        index: &IndexConfig,
        embedding: &EmbeddingConfig,
    ) -> Result<Self> {
        let chunking = ChunkConfig::new(index.chunk_size, index.chunk_overlap)
            .map_err(|e| ChatError::Config(e.to_string()))?;

        Ok(Self::new(embedder, chunking)
            .with_batching(embedding.batch_size, embedding.concurrency))
    }

    /// Texts per embedding request and requests in flight
    pub fn with_batching(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    /// Use a custom parser registry
    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Supported files directly inside `dir`, in name order
    pub fn collect_documents(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(ChatError::NotFound(format!(
                "Documents directory {}",
                dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && self.registry.supports(path))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Parse and chunk each file, recording the ones that fail
    pub fn chunk_documents(&self, paths: &[PathBuf], report: &mut IndexReport) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();

        for path in paths {
            let document = match self.registry.parse(path) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Skipping {}: {e}", path.display());
                    report.skipped.push((path.clone(), e.to_string()));
                    continue;
                }
            };

            let source = document.source_name();
            let pieces = self.chunking.chunk(&document.content);
            debug!("{}: {} chunks", source, pieces.len());
            if pieces.is_empty() {
                continue;
            }

            report.documents += 1;
            chunks.extend(
                pieces
                    .into_iter()
                    .map(|piece| DocumentChunk::new(piece.content, source.clone(), piece.index)),
            );
        }

        chunks
    }

    /// Embed chunk texts in batches, preserving order
    async fn embed_chunks(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(self.batch_size))
            .map(|batch| async move {
                debug!("Embedding batch of {} chunks", batch.len());
                self.embedder.embed_batch(batch).await
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    /// Build an in-memory store from the documents in `docs_dir`
    pub async fn build(&self, docs_dir: &Path) -> Result<(LocalVectorStore, IndexReport)> {
        let mut report = IndexReport::default();

        let paths = self.collect_documents(docs_dir)?;
        info!("Found {} documents in {}", paths.len(), docs_dir.display());

        let chunks = self.chunk_documents(&paths, &mut report);
        if chunks.is_empty() {
            return Err(ChatError::Validation(format!(
                "No indexable text found in {}",
                docs_dir.display()
            )));
        }

        let (texts, meta): (Vec<String>, Vec<_>) = chunks
            .into_iter()
            .map(|chunk| {
                let meta = chunk.metadata();
                (chunk.text, meta)
            })
            .unzip();

        let vectors = self.embed_chunks(&texts).await?;
        let dimension = vectors.first().map(Vec::len).unwrap_or_default();

        let mut store = LocalVectorStore::new(dimension);
        store.add(&vectors, meta, texts)?;

        report.chunks = store.len();
        report.dimension = dimension;
        Ok((store, report))
    }

    /// Build the store and write its artifacts to `index_dir`, replacing
    /// any previous index
    pub async fn run(&self, docs_dir: &Path, index_dir: &Path) -> Result<IndexReport> {
        let start_time = Instant::now();

        let (store, report) = self.build(docs_dir).await?;
        store.save(index_dir)?;

        info!(
            "Indexed {} chunks from {} documents ({} skipped) in {} ms",
            report.chunks,
            report.documents,
            report.skipped.len(),
            start_time.elapsed().as_millis()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingEmbedder, HashingEmbedder};
    use ragchat_vector::{INDEX_FILE, META_FILE};
    use std::fs;
    use tempfile::TempDir;

    fn indexer() -> DocumentIndexer {
        DocumentIndexer::new(
            Arc::new(HashingEmbedder::default()),
            ChunkConfig::new(40, 8).unwrap(),
        )
        .with_batching(2, 2)
    }

    fn docs_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("policy.txt"),
            "Refunds are processed within 30 days. Digital goods are not refundable.",
        )
        .unwrap();
        fs::write(dir.path().join("faq.md"), "# FAQ\nSupport is open on weekdays.").unwrap();
        fs::write(dir.path().join("blank.txt"), "   \n").unwrap();
        fs::write(dir.path().join("notes.csv"), "a,b,c").unwrap();
        fs::write(dir.path().join("broken.pdf"), "not a pdf").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.txt"), "ignored").unwrap();
        dir
    }

    #[test]
    fn test_collect_documents_filters_and_sorts() {
        let dir = docs_dir();
        let names: Vec<String> = indexer()
            .collect_documents(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["blank.txt", "broken.pdf", "faq.md", "policy.txt"]);
    }

    #[test]
    fn test_missing_docs_dir() {
        let err = indexer()
            .collect_documents(Path::new("/nonexistent/ragchat-docs"))
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_build_skips_unreadable_and_keeps_alignment() {
        let dir = docs_dir();
        let (store, report) = indexer().build(dir.path()).await.unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.ends_with("broken.pdf"));
        assert_eq!(report.chunks, store.len());
        assert_eq!(report.dimension, HashingEmbedder::default().dimension());

        // Chunk ids count up from zero within each source
        let policy_ids: Vec<u32> = store
            .metadata()
            .iter()
            .filter(|m| m.source == "policy.txt")
            .map(|m| m.chunk_id)
            .collect();
        assert!(policy_ids.len() > 1);
        assert_eq!(policy_ids, (0..policy_ids.len() as u32).collect::<Vec<_>>());

        for (text, meta) in store.chunks().iter().zip(store.metadata()) {
            if meta.source == "faq.md" {
                assert!(text.contains("FAQ") || text.contains("weekdays"));
            }
        }
    }

    #[tokio::test]
    async fn test_run_writes_artifacts() {
        let docs = docs_dir();
        let out = TempDir::new().unwrap();
        let index_dir = out.path().join("vector_store");

        let report = indexer().run(docs.path(), &index_dir).await.unwrap();
        assert!(index_dir.join(INDEX_FILE).is_file());
        assert!(index_dir.join(META_FILE).is_file());
        assert_eq!(LocalVectorStore::load(&index_dir).unwrap().len(), report.chunks);
    }

    #[tokio::test]
    async fn test_empty_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = indexer().build(dir.path()).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts() {
        let dir = docs_dir();
        let indexer = DocumentIndexer::new(Arc::new(FailingEmbedder), ChunkConfig::default());
        let err = indexer.build(dir.path()).await.unwrap_err();
        assert!(matches!(err, ChatError::Embedding(_)));
    }

    #[test]
    fn test_from_config_validates_chunking() {
        let index = IndexConfig {
            chunk_size: 10,
            chunk_overlap: 10,
            ..IndexConfig::default()
        };
        let result = DocumentIndexer::from_config(
            Arc::new(HashingEmbedder::default()),
            &index,
            &EmbeddingConfig::default(),
        );
        assert!(matches!(result, Err(ChatError::Config(_))));
    }
}
