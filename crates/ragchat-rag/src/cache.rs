//! Query embedding cache
//!
//! Wraps an [`Embedder`] so repeated questions skip the embedding service.
//! Uses the moka crate for a thread-safe, async-compatible cache with
//! capacity bound and TTL.
//!
//! Author: hephaex@gmail.com

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use ragchat_core::{EmbeddingConfig, Result};
use ragchat_vector::Embedder;
use tracing::debug;

// ============================================================================
// Cached Embedder
// ============================================================================

/// Embedder that memoises single-text embeddings.
///
/// Batch calls, used when indexing documents, go straight to the wrapped
/// embedder.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Cache<String, Arc<Vec<f32>>>,
    stats: Arc<CacheStats>,
}

impl CachedEmbedder {
    /// Wrap `inner` with a cache of `capacity` entries living `ttl`
    pub fn new(inner: Arc<dyn Embedder>, capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Wrap `inner` using the embedding cache settings
    pub fn from_config(inner: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        Self::new(
            inner,
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Drop every cached embedding
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_batch(texts).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.get(text).await {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Query embedding cache hit");
            return Ok(hit.as_ref().clone());
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let embedding = self.inner.embed(text).await?;
        self.cache
            .insert(text.to_string(), Arc::new(embedding.clone()))
            .await;
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Hit and miss counters for a cache
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
