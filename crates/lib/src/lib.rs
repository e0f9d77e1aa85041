//! # Grounded Retrieval-Augmented Question Answering
//!
//! This crate answers natural-language questions strictly from retrieved
//! context, in three stages:
//!
//! 1.  **Query Expansion** ([`expand`]): a generation engine splits the question
//!     into atomic sub-queries.
//! 2.  **Context Retrieval** ([`retrieve`]): each sub-query is searched against a
//!     [`providers::store::VectorStore`] and the results are merged into one
//!     deduplicated [`types::ContextBlock`].
//! 3.  **Grounded Generation** ([`generate`]): the engine answers from that
//!     context, and every claim must carry a `[Source: <source>, <source_detail>]`
//!     citation matching a retrieved chunk.
//!
//! [`pipeline::RagPipeline`] sequences the stages. The generation engine and the
//! vector store sit behind the [`providers::ai::AiProvider`] and
//! [`providers::store::VectorStore`] traits.

pub mod citation;
pub mod errors;
pub mod expand;
pub mod generate;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod retrieve;
pub mod similarity;
pub mod types;

pub use errors::{ErrorKind, PromptError, RagError, StoreError};
pub use pipeline::{
    PipelineFailure, PipelineOptions, PipelineOutcome, PipelineState, RagPipeline,
    RagPipelineBuilder,
};
pub use prompts::{PromptTemplates, REFUSAL_SENTENCE};
pub use types::{
    Answer, AnswerSegment, Citation, ContextBlock, ContextStats, GroundedChunk, Provenance, Query,
    RetrievedChunk, SubQuery,
};
