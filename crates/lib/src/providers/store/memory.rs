//! # In-Memory Vector Store
//!
//! A brute-force cosine-similarity store. Chunks are embedded once on insert
//! through an [`Embedder`]; queries are embedded on every search.

use super::VectorStore;
use crate::{
    errors::StoreError,
    providers::ai::Embedder,
    similarity::{cosine_similarity, l2_norm},
    types::RetrievedChunk,
};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{fmt, path::Path};
use tokio::sync::RwLock;
use tracing::{debug, info};

const DEFAULT_EMBED_CONCURRENCY: usize = 8;

/// A normalized chunk as produced by the ingestion scripts.
///
/// `chunk_id` and `source_detail` are frequently numeric (slide or step
/// numbers), so scalar values are accepted and stored as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusChunk {
    #[serde(default, deserialize_with = "lenient_string")]
    pub chunk_id: Option<String>,
    pub text: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_detail: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CorpusChunk {
    fn store_id(&self) -> Option<String> {
        let chunk_id = self.chunk_id.as_deref()?;
        Some(format!(
            "{}_{}",
            self.source.as_deref().unwrap_or_default(),
            chunk_id
        ))
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

struct StoredChunk {
    id: Option<String>,
    chunk: CorpusChunk,
    embedding: Vec<f32>,
    norm: f32,
}

pub struct MemoryVectorStore {
    embedder: Box<dyn Embedder>,
    entries: RwLock<Vec<StoredChunk>>,
    embed_concurrency: usize,
}

impl fmt::Debug for MemoryVectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryVectorStore")
            .field("embedder", &self.embedder)
            .field("embed_concurrency", &self.embed_concurrency)
            .finish_non_exhaustive()
    }
}

impl MemoryVectorStore {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }

    pub fn with_embed_concurrency(mut self, embed_concurrency: usize) -> Self {
        self.embed_concurrency = embed_concurrency.max(1);
        self
    }

    /// Embeds and stores chunks, skipping those with blank text.
    ///
    /// A chunk whose `(source, chunk_id)` matches an existing entry replaces it.
    /// Returns the number of chunks written.
    pub async fn insert(&self, chunks: Vec<CorpusChunk>) -> Result<usize, StoreError> {
        let embedded = self.embed_chunks(chunks).await?;
        let written = embedded.len();
        let mut entries = self.entries.write().await;
        upsert(&mut entries, embedded);
        debug!(written, total = entries.len(), "Inserted chunks into memory store.");
        Ok(written)
    }

    async fn embed_chunks(&self, chunks: Vec<CorpusChunk>) -> Result<Vec<StoredChunk>, StoreError> {
        let chunks: Vec<CorpusChunk> = chunks
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .collect();

        stream::iter(chunks)
            .map(|chunk| async move {
                let embedding = self
                    .embedder
                    .embed(&chunk.text)
                    .await
                    .map_err(StoreError::Embedding)?;
                let norm = l2_norm(&embedding);
                Ok::<_, StoreError>(StoredChunk {
                    id: chunk.store_id(),
                    chunk,
                    embedding,
                    norm,
                })
            })
            .buffered(self.embed_concurrency)
            .try_collect()
            .await
    }

    /// Loads a JSON array of [`CorpusChunk`]s and indexes it.
    ///
    /// With `rebuild`, existing entries are replaced once every chunk has been
    /// embedded; a failed build leaves the store untouched. Fails with
    /// [`StoreError::EmptyCorpus`] when the file holds no non-blank chunk.
    pub async fn build_from_json(
        &self,
        path: impl AsRef<Path>,
        rebuild: bool,
    ) -> Result<usize, StoreError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let chunks: Vec<CorpusChunk> = serde_json::from_str(&content)?;
        if !chunks.iter().any(|c| !c.text.trim().is_empty()) {
            return Err(StoreError::EmptyCorpus);
        }
        info!(path = %path.display(), chunks = chunks.len(), rebuild, "Building memory store from corpus file.");
        let embedded = self.embed_chunks(chunks).await?;
        let written = embedded.len();

        let mut entries = self.entries.write().await;
        if rebuild {
            entries.clear();
        }
        upsert(&mut entries, embedded);
        Ok(written)
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_built(&self) -> bool {
        self.count().await > 0
    }

    pub async fn reset(&self) {
        self.entries.write().await.clear();
    }
}

fn upsert(entries: &mut Vec<StoredChunk>, embedded: Vec<StoredChunk>) {
    for stored in embedded {
        let existing = stored
            .id
            .as_ref()
            .and_then(|id| entries.iter().position(|e| e.id.as_ref() == Some(id)));
        match existing {
            Some(pos) => entries[pos] = stored,
            None => entries.push(stored),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = self
            .embedder
            .embed(text)
            .await
            .map_err(StoreError::Embedding)?;
        let query_norm = l2_norm(&query);

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &StoredChunk)> = entries
            .iter()
            .map(|e| {
                (
                    cosine_similarity(&query, &e.embedding, query_norm, e.norm),
                    e,
                )
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(_, e)| RetrievedChunk {
                text: e.chunk.text.clone(),
                source: e.chunk.source.clone(),
                source_detail: e.chunk.source_detail.clone(),
            })
            .collect())
    }
}
