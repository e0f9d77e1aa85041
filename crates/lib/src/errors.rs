use crate::types::Citation;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised at the generation-engine boundary.
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to AI provider: {0}")]
    AiRequest(reqwest::Error),
    #[error("Failed to deserialize AI provider response: {0}")]
    AiDeserialization(reqwest::Error),
    #[error("AI provider returned an error: {0}")]
    AiApi(String),
    #[error("AI provider is not configured: {0}")]
    MissingAiProvider(String),
    #[error("Vector store is not configured")]
    MissingStorageProvider,
    #[error("Invalid prompt template: {0}")]
    InvalidTemplate(String),
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Errors raised at the vector-store boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector store is unreachable: {0}")]
    Unreachable(String),
    #[error("Vector store returned a malformed chunk: {0}")]
    MalformedChunk(String),
    #[error("Embedding generation failed: {0}")]
    Embedding(PromptError),
    #[error("Failed to read corpus file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse corpus file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corpus contains no non-empty chunks to index")]
    EmptyCorpus,
}

/// The pipeline stage a deadline applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Expansion,
    Retrieval,
    Generation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Expansion => "expansion",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
        };
        f.write_str(name)
    }
}

/// A stable, serializable discriminant for [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyQuery,
    MalformedExpansion,
    Retrieval,
    CitationValidation,
    Timeout,
    Generation,
    Cancelled,
}

/// Failures of the query pipeline.
///
/// A refusal ("the context does not contain...") is a successful answer and is
/// never represented here.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Query must not be empty")]
    EmptyQuery,
    #[error("Query expansion output is not a JSON array of strings: {reason}")]
    MalformedExpansion { raw: String, reason: String },
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] StoreError),
    #[error(
        "Generated answer failed citation validation ({} unknown citation(s), {uncited_claims} uncited claim(s))",
        unknown.len()
    )]
    CitationValidation {
        unknown: Vec<Citation>,
        uncited_claims: usize,
    },
    #[error("{stage} call timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
    #[error("Generation engine call failed: {0}")]
    Generation(#[from] PromptError),
    #[error("Request was cancelled")]
    Cancelled,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::EmptyQuery => ErrorKind::EmptyQuery,
            RagError::MalformedExpansion { .. } => ErrorKind::MalformedExpansion,
            RagError::Retrieval(_) => ErrorKind::Retrieval,
            RagError::CitationValidation { .. } => ErrorKind::CitationValidation,
            RagError::Timeout { .. } => ErrorKind::Timeout,
            RagError::Generation(_) => ErrorKind::Generation,
            RagError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Runs `fut` under a deadline, mapping expiry to [`RagError::Timeout`].
pub(crate) async fn with_deadline<F, T>(stage: Stage, after: Duration, fut: F) -> Result<T, RagError>
where
    F: std::future::Future<Output = Result<T, RagError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Timeout { stage, after }),
    }
}
