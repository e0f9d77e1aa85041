pub mod memory;

use crate::{errors::StoreError, types::RetrievedChunk};
use async_trait::async_trait;
use std::fmt::Debug;

pub use memory::{CorpusChunk, MemoryVectorStore};

/// A similarity-search backend holding embedded chunks.
///
/// The pipeline treats a store as a black box: it only issues `search` calls,
/// which must be idempotent.
#[async_trait]
pub trait VectorStore: Send + Sync + Debug {
    /// Returns the name of the store (e.g., "memory").
    fn name(&self) -> &str;

    /// Returns up to `k` chunks most similar to `text`, best first.
    async fn search(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, StoreError>;
}
