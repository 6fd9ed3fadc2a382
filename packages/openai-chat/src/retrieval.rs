//! Vector-similarity retrieval over a fixed corpus.
//!
//! The index is just the full set of embedding records; ranking is a
//! linear scan with an unnormalized dot product, which matches the
//! provider's near-unit-norm embedding space. There is no
//! approximate-nearest-neighbor structure and no paging.
//!
//! The flat JSON cache (`[item_id, vector]` pairs) is reloaded verbatim
//! on later runs. Known gap: the file has no versioning, so a corpus or
//! model change silently reuses stale vectors until the file is deleted.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{OpenAIError, Result};

/// Seam for computing embeddings; implemented by
/// [`crate::EmbeddingModel`], mocked in tests.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, input: &str) -> Result<Vec<f32>>;
}

/// One corpus item's embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub item_id: i64,
    pub vector: Vec<f32>,
}

/// The whole similarity index: every record, in corpus order.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    records: Vec<EmbeddingRecord>,
}

impl EmbeddingIndex {
    /// Embed every corpus item. Any embedding failure aborts the whole
    /// build; there is no partial index and no retry.
    pub async fn build(embedder: &dyn Embedder, corpus: &[(i64, String)]) -> Result<Self> {
        info!(items = corpus.len(), "building embedding index");

        let mut records = Vec::with_capacity(corpus.len());
        for (item_id, text) in corpus {
            let vector = embedder.embed(text).await?;
            debug!(item_id, dimensions = vector.len(), "embedded corpus item");
            records.push(EmbeddingRecord {
                item_id: *item_id,
                vector,
            });
        }

        Ok(Self { records })
    }

    /// Load a previously saved index verbatim.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| OpenAIError::Cache(format!("{}: {}", path.display(), e)))?;
        let pairs: Vec<(i64, Vec<f32>)> = serde_json::from_str(&text)
            .map_err(|e| OpenAIError::Cache(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            records: pairs
                .into_iter()
                .map(|(item_id, vector)| EmbeddingRecord { item_id, vector })
                .collect(),
        })
    }

    /// Persist as a JSON array of `[item_id, vector]` pairs.
    pub fn save(&self, path: &Path) -> Result<()> {
        let pairs: Vec<(i64, &[f32])> = self
            .records
            .iter()
            .map(|record| (record.item_id, record.vector.as_slice()))
            .collect();
        let text = serde_json::to_string(&pairs)
            .map_err(|e| OpenAIError::Cache(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| OpenAIError::Cache(format!("{}: {}", path.display(), e)))
    }

    /// Load the cache when present, otherwise build and persist it.
    pub async fn load_or_build(
        path: &Path,
        embedder: &dyn Embedder,
        corpus: &[(i64, String)],
    ) -> Result<Self> {
        if path.exists() {
            info!(path = %path.display(), "loading embedding index from cache");
            return Self::load(path);
        }

        let index = Self::build(embedder, corpus).await?;
        index.save(path)?;
        info!(path = %path.display(), "embedding index cached");
        Ok(index)
    }

    /// Top-`k` item ids by dot-product similarity, descending. Ties keep
    /// corpus order (stable, not guaranteed meaningful).
    pub fn rank(&self, query: &[f32], k: usize) -> Vec<(i64, f32)> {
        let mut scored: Vec<(i64, f32)> = self
            .records
            .iter()
            .map(|record| (record.item_id, dot(&record.vector, query)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder: one fixed vector per known input.
    struct TableEmbedder {
        entries: Vec<(&'static str, Vec<f32>)>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        async fn embed(&self, input: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entries
                .iter()
                .find(|(text, _)| *text == input)
                .map(|(_, vector)| vector.clone())
                .ok_or_else(|| OpenAIError::Api(format!("no embedding for '{input}'")))
        }
    }

    fn corpus() -> Vec<(i64, String)> {
        vec![
            (1, "road bike".into()),
            (2, "mountain bike".into()),
            (3, "bike helmet".into()),
        ]
    }

    fn embedder() -> TableEmbedder {
        TableEmbedder {
            entries: vec![
                ("road bike", vec![1.0, 0.0, 0.0]),
                ("mountain bike", vec![0.0, 1.0, 0.0]),
                ("bike helmet", vec![0.0, 0.0, 1.0]),
            ],
            calls: AtomicUsize::new(0),
        }
    }

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.json", name, std::process::id()))
    }

    #[tokio::test]
    async fn identical_vector_ranks_first_with_max_score() {
        let index = EmbeddingIndex::build(&embedder(), &corpus()).await.unwrap();

        let ranked = index.rank(&[0.0, 1.0, 0.0], 3);
        assert_eq!(ranked[0].0, 2);
        assert_eq!(ranked[0].1, 1.0);
        assert!(ranked[0].1 >= ranked[1].1 && ranked[1].1 >= ranked[2].1);
    }

    #[tokio::test]
    async fn k_bounds_the_result() {
        let index = EmbeddingIndex::build(&embedder(), &corpus()).await.unwrap();
        assert_eq!(index.rank(&[1.0, 1.0, 1.0], 2).len(), 2);
    }

    #[tokio::test]
    async fn ties_keep_corpus_order() {
        let index = EmbeddingIndex::build(&embedder(), &corpus()).await.unwrap();

        // Equidistant query: every score is identical.
        let ranked = index.rank(&[0.5, 0.5, 0.5], 3);
        assert_eq!(
            ranked.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn failing_item_aborts_the_whole_build() {
        let corpus = vec![
            (1, "road bike".into()),
            (2, "unknown thing".into()),
            (3, "bike helmet".into()),
        ];

        let err = EmbeddingIndex::build(&embedder(), &corpus).await.unwrap_err();
        assert!(matches!(err, OpenAIError::Api(_)));
    }

    #[tokio::test]
    async fn cache_round_trip_ranks_identically() {
        let path = scratch_file("embeddings-roundtrip");
        let _ = std::fs::remove_file(&path);

        let built = EmbeddingIndex::build(&embedder(), &corpus()).await.unwrap();
        built.save(&path).unwrap();

        let loaded = EmbeddingIndex::load(&path).unwrap();
        let query = [0.9, 0.1, 0.3];
        assert_eq!(built.rank(&query, 3), loaded.rank(&query, 3));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn load_or_build_prefers_the_cache() {
        let path = scratch_file("embeddings-cached");
        let _ = std::fs::remove_file(&path);

        let first = embedder();
        EmbeddingIndex::load_or_build(&path, &first, &corpus())
            .await
            .unwrap();
        assert_eq!(first.calls.load(Ordering::SeqCst), 3);

        // Second run never touches the embedder.
        let second = embedder();
        let index = EmbeddingIndex::load_or_build(&path, &second, &corpus())
            .await
            .unwrap();
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
        assert_eq!(index.len(), 3);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_cache_file_is_a_cache_error() {
        let err = EmbeddingIndex::load(Path::new("/nonexistent/embeddings.json")).unwrap_err();
        assert!(matches!(err, OpenAIError::Cache(_)));
    }
}
