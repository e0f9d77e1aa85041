//! # Query Pipeline
//!
//! The orchestrator sequences the three stages of a request:
//! 1.  **Expanding**: the query is decomposed into sub-queries.
//! 2.  **Retrieving**: each sub-query is searched and the results merged.
//! 3.  **Generating**: a citation-grounded answer is produced from the merged context.
//!
//! Each request walks `Received → Expanding → Retrieving → Generating → Completed`.
//! Any failure moves it to `Failed` with the originating error and nothing
//! partial is returned. The pipeline holds no per-request state, so one instance
//! serves concurrent requests.

use crate::{
    errors::{PromptError, RagError},
    expand::QueryExpander,
    generate::AnswerGenerator,
    prompts::PromptTemplates,
    providers::{ai::AiProvider, store::VectorStore},
    retrieve::{
        ContextRetriever, DEFAULT_MAX_CONCURRENT_SEARCHES, DEFAULT_RETRIEVAL_RETRIES,
        DEFAULT_RETRY_BACKOFF, DEFAULT_SEARCH_TIMEOUT,
    },
    types::{Answer, ContextStats, Query, SubQuery},
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

/// The lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    Expanding,
    Retrieving,
    Generating,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Received, Expanding)
            | (Expanding, Retrieving)
            | (Retrieving, Generating)
            | (Generating, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Tunables for a [`RagPipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Chunks requested per sub-query.
    pub top_k: usize,
    pub max_concurrent_searches: usize,
    /// Extra attempts for a failing search before its context counts as empty.
    pub retrieval_retries: u32,
    pub retry_backoff: Duration,
    pub expansion_timeout: Duration,
    pub generation_timeout: Duration,
    pub search_timeout: Duration,
    pub regenerate_on_invalid_citations: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_k: 8,
            max_concurrent_searches: DEFAULT_MAX_CONCURRENT_SEARCHES,
            retrieval_retries: DEFAULT_RETRIEVAL_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            expansion_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(60),
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            regenerate_on_invalid_citations: true,
        }
    }
}

/// A successfully answered request.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub answer: Answer,
    pub sub_queries: Vec<SubQuery>,
    pub context_stats: ContextStats,
    pub context_chunks: usize,
    pub trace: Vec<PipelineState>,
}

/// A request that ended in [`PipelineState::Failed`].
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    #[source]
    pub error: RagError,
    pub trace: Vec<PipelineState>,
}

struct StateTracker {
    trace: Vec<PipelineState>,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            trace: vec![PipelineState::Received],
        }
    }

    fn current(&self) -> PipelineState {
        self.trace
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    fn advance(&mut self, next: PipelineState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {current:?} -> {next:?}"
        );
        info!(from = ?current, to = ?next, "Pipeline state transition.");
        self.trace.push(next);
    }

    fn fail(mut self, error: RagError) -> PipelineFailure {
        error!(state = ?self.current(), kind = ?error.kind(), "Pipeline failed: {error}");
        self.advance(PipelineState::Failed);
        PipelineFailure {
            error,
            trace: self.trace,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagPipeline {
    expander: QueryExpander,
    retriever: ContextRetriever,
    generator: AnswerGenerator,
    top_k: usize,
}

impl RagPipeline {
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::new()
    }

    pub fn new(
        expander: QueryExpander,
        retriever: ContextRetriever,
        generator: AnswerGenerator,
        top_k: usize,
    ) -> Self {
        Self {
            expander,
            retriever,
            generator,
            top_k,
        }
    }

    /// Answers `raw_query` end to end.
    pub async fn answer(&self, raw_query: &str) -> Result<PipelineOutcome, PipelineFailure> {
        self.answer_with_cancel(raw_query, CancellationToken::new())
            .await
    }

    /// Answers `raw_query`, aborting in-flight searches and the pending
    /// generation call when `cancel` fires.
    pub async fn answer_with_cancel(
        &self,
        raw_query: &str,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        self.run(raw_query, &cancel)
            .instrument(tracing::info_span!("rag_request"))
            .await
    }

    async fn run(
        &self,
        raw_query: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        let mut tracker = StateTracker::new();

        let query = match Query::new(raw_query) {
            Ok(query) => query,
            Err(e) => return Err(tracker.fail(e)),
        };
        info!(query = %query, "Received query.");

        tracker.advance(PipelineState::Expanding);
        let sub_queries = match cancellable(cancel, self.expander.expand(&query)).await {
            Ok(sub_queries) => sub_queries,
            Err(e) => return Err(tracker.fail(e)),
        };

        tracker.advance(PipelineState::Retrieving);
        let context = match self
            .retriever
            .retrieve_with_cancel(&sub_queries, self.top_k, cancel)
            .await
        {
            Ok(context) => context,
            Err(e) => return Err(tracker.fail(e)),
        };

        tracker.advance(PipelineState::Generating);
        let answer = match cancellable(cancel, self.generator.answer(&query, &context)).await {
            Ok(answer) => answer,
            Err(e) => return Err(tracker.fail(e)),
        };

        tracker.advance(PipelineState::Completed);
        Ok(PipelineOutcome {
            answer,
            sub_queries,
            context_stats: context.stats(),
            context_chunks: context.len(),
            trace: tracker.trace,
        })
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, RagError>>,
) -> Result<T, RagError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RagError::Cancelled),
        result = fut => result,
    }
}

/// A builder for creating `RagPipeline` instances.
///
/// The generation engine and the vector store are required; prompts and
/// options fall back to their defaults.
#[derive(Default)]
pub struct RagPipelineBuilder {
    ai_provider: Option<Box<dyn AiProvider>>,
    store: Option<Arc<dyn VectorStore>>,
    prompts: Option<Arc<PromptTemplates>>,
    options: PipelineOptions,
}

impl RagPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the generation engine used for both expansion and answering.
    pub fn ai_provider(mut self, ai_provider: Box<dyn AiProvider>) -> Self {
        self.ai_provider = Some(ai_provider);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = Some(Arc::new(prompts));
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the `RagPipeline`.
    ///
    /// Fails if a required provider is missing or the prompt templates lack
    /// their placeholders.
    pub fn build(self) -> Result<RagPipeline, PromptError> {
        let ai_provider = self
            .ai_provider
            .ok_or_else(|| PromptError::MissingAiProvider("no AI provider set".to_string()))?;
        let store = self.store.ok_or(PromptError::MissingStorageProvider)?;
        let prompts = self.prompts.unwrap_or_default();
        prompts.validate()?;
        let options = self.options;

        let expander = QueryExpander::new(
            dyn_clone::clone_box(&*ai_provider),
            Arc::clone(&prompts),
            options.expansion_timeout,
        );
        let generator = AnswerGenerator::new(ai_provider, prompts, options.generation_timeout)
            .with_regeneration(options.regenerate_on_invalid_citations);
        let retriever = ContextRetriever::new(store)
            .with_max_concurrent(options.max_concurrent_searches)
            .with_retries(options.retrieval_retries)
            .with_search_timeout(options.search_timeout)
            .with_retry_backoff(options.retry_backoff);

        Ok(RagPipeline::new(expander, retriever, generator, options.top_k))
    }
}
