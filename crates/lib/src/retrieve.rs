//! # Context Retrieval
//!
//! Fans one similarity search per sub-query out to the vector store, bounded by
//! a semaphore, then merges the results into a [`ContextBlock`]:
//! 1.  **Ordering**: results are concatenated by sub-query index, so the block is
//!     identical whatever order the searches complete in.
//! 2.  **Provenance filter**: chunks without a complete `(source, source_detail)`
//!     pair are dropped and counted.
//! 3.  **Deduplication**: exact `(text, source, source_detail)` matches are kept
//!     once, at their first position.
//!
//! A failing search is retried a fixed number of times and then contributes no
//! chunks. Only when every sub-query fails does retrieval itself fail.

use crate::{
    errors::{RagError, Stage, StoreError},
    providers::store::VectorStore,
    types::{ContextBlock, ContextStats, GroundedChunk, RetrievedChunk, SubQuery},
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_CONCURRENT_SEARCHES: usize = 4;
pub const DEFAULT_RETRIEVAL_RETRIES: u32 = 2;
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ContextRetriever {
    store: Arc<dyn VectorStore>,
    max_concurrent: usize,
    retries: u32,
    search_timeout: Duration,
    retry_backoff: Duration,
}

impl ContextRetriever {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            max_concurrent: DEFAULT_MAX_CONCURRENT_SEARCHES,
            retries: DEFAULT_RETRIEVAL_RETRIES,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Caps the number of searches in flight at once. Zero is treated as one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_search_timeout(mut self, search_timeout: Duration) -> Self {
        self.search_timeout = search_timeout;
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub async fn retrieve(
        &self,
        sub_queries: &[SubQuery],
        k: usize,
    ) -> Result<ContextBlock, RagError> {
        self.retrieve_with_cancel(sub_queries, k, &CancellationToken::new())
            .await
    }

    /// Like [`ContextRetriever::retrieve`], aborting every in-flight search when
    /// `cancel` fires.
    pub async fn retrieve_with_cancel(
        &self,
        sub_queries: &[SubQuery],
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<ContextBlock, RagError> {
        if sub_queries.is_empty() || k == 0 {
            return Ok(ContextBlock::default());
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for (index, sub_query) in sub_queries.iter().enumerate() {
            let search = SearchTask {
                store: Arc::clone(&self.store),
                text: sub_query.as_str().to_string(),
                k,
                retries: self.retries,
                timeout: self.search_timeout,
                backoff: self.retry_backoff,
            };
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => search.run().await,
                    Err(_) => Err(RagError::Retrieval(StoreError::Unreachable(
                        "search worker pool closed".to_string(),
                    ))),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<Vec<RetrievedChunk>, RagError>>> =
            (0..sub_queries.len()).map(|_| None).collect();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Retrieval cancelled; aborting {} search task(s).", tasks.len());
                    tasks.abort_all();
                    return Err(RagError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((index, result))) => results[index] = Some(result),
                    Some(Err(e)) => {
                        return Err(RagError::Retrieval(StoreError::Unreachable(format!(
                            "search task failed: {e}"
                        ))));
                    }
                },
            }
        }

        let mut per_sub_query = Vec::with_capacity(results.len());
        let mut failures = 0;
        let mut last_error = None;
        for (sub_query, result) in sub_queries.iter().zip(results) {
            match result {
                Some(Ok(chunks)) => per_sub_query.push(chunks),
                Some(Err(e)) => {
                    warn!(sub_query = %sub_query, "Treating sub-query context as empty: {e}");
                    failures += 1;
                    last_error = Some(e);
                    per_sub_query.push(Vec::new());
                }
                None => {
                    failures += 1;
                    per_sub_query.push(Vec::new());
                }
            }
        }

        if failures == sub_queries.len() {
            return Err(last_error.unwrap_or_else(|| {
                RagError::Retrieval(StoreError::Unreachable(
                    "no search produced a result".to_string(),
                ))
            }));
        }

        let mut block = merge_results(per_sub_query);
        block.stats_mut().failed_subqueries = failures;
        info!(
            chunks = block.len(),
            stats = ?block.stats(),
            "Assembled context block from {} sub-queries.",
            sub_queries.len()
        );
        Ok(block)
    }
}

struct SearchTask {
    store: Arc<dyn VectorStore>,
    text: String,
    k: usize,
    retries: u32,
    timeout: Duration,
    backoff: Duration,
}

impl SearchTask {
    async fn run(self) -> Result<Vec<RetrievedChunk>, RagError> {
        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(self.timeout, self.store.search(&self.text, self.k)).await;
            let error = match outcome {
                Ok(Ok(chunks)) => {
                    debug!(sub_query = %self.text, count = chunks.len(), "Search returned.");
                    return Ok(chunks);
                }
                Ok(Err(e)) => RagError::Retrieval(e),
                Err(_) => RagError::Timeout {
                    stage: Stage::Retrieval,
                    after: self.timeout,
                },
            };
            if attempt >= self.retries {
                return Err(error);
            }
            attempt += 1;
            warn!(sub_query = %self.text, attempt, "Search failed, retrying: {error}");
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }
}

/// Merges per-sub-query results, in sub-query order, into a context block.
///
/// Chunks lacking provenance are dropped and counted; exact duplicates keep
/// their first position.
pub fn merge_results(per_sub_query: Vec<Vec<RetrievedChunk>>) -> ContextBlock {
    let mut stats = ContextStats::default();
    let mut seen: HashSet<GroundedChunk> = HashSet::new();
    let mut chunks = Vec::new();

    for chunk in per_sub_query.into_iter().flatten() {
        stats.retrieved += 1;
        let Some(grounded) = chunk.into_grounded() else {
            stats.dropped_without_provenance += 1;
            continue;
        };
        if seen.insert(grounded.clone()) {
            chunks.push(grounded);
        } else {
            stats.duplicates_removed += 1;
        }
    }

    if stats.dropped_without_provenance > 0 {
        warn!(
            "Dropped {} retrieved chunk(s) without source provenance.",
            stats.dropped_without_provenance
        );
    }
    ContextBlock::new(chunks, stats)
}
