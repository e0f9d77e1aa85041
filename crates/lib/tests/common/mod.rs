#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Shared setup for the integration tests. The scripted providers themselves
//! live in `groundrag-test-utils`.

use groundrag::types::{ContextBlock, RetrievedChunk};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber once per test binary.
pub fn setup_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Builds a context block the same way the retriever does.
pub fn context_of(chunks: Vec<RetrievedChunk>) -> ContextBlock {
    groundrag::retrieve::merge_results(vec![chunks])
}

pub const ACME_QUERY: &str =
    "Did Acme Corp's Q3 payment get approved and what was the sentiment on the call?";
pub const ACME_APPROVAL: &str = "What is the approval status of Acme Corp's Q3 payment?";
pub const ACME_SENTIMENT: &str = "What was the sentiment on the call regarding Acme Corp?";
