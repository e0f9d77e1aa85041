//! # Application State
//!
//! This module defines the shared application state (`AppState`) and the logic
//! for building it at startup: the generation engine client, the embedding
//! client, the in-memory vector store (optionally loaded from the configured
//! corpus) and the `RagPipeline` wired over them.

use crate::config::{non_empty, AppConfig};
use groundrag::{
    providers::{
        ai::{AiProvider, HttpEmbedder, LocalAiProvider},
        store::{MemoryVectorStore, VectorStore},
    },
    RagPipeline,
};
use std::sync::Arc;
use tracing::{info, warn};

/// The shared application state, accessible from all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The application's configuration, loaded from `config.yml`.
    pub config: Arc<AppConfig>,
    /// The orchestrator; it holds no per-request state.
    pub pipeline: Arc<RagPipeline>,
}

/// Builds the shared application state from the configuration.
pub async fn build_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let mut ai_provider = LocalAiProvider::new(
        config.provider.api_url.clone(),
        non_empty(&config.provider.api_key),
        non_empty(&config.provider.model_name),
    )?;
    if let Some(temperature) = config.provider.temperature {
        ai_provider = ai_provider.with_temperature(temperature);
    }
    if let Some(max_tokens) = config.provider.max_tokens {
        ai_provider = ai_provider.with_max_tokens(max_tokens);
    }

    let embedder = HttpEmbedder::new(
        config.embedding.api_url.clone(),
        config.embedding.model_name.clone(),
        non_empty(&config.embedding.api_key),
    )?;
    let store = MemoryVectorStore::new(Box::new(embedder));

    match non_empty(&config.corpus_path) {
        Some(path) => {
            let indexed = store.build_from_json(&path, true).await?;
            info!(corpus_path = %path, indexed, "Initialized in-memory vector store.");
        }
        None => warn!("No corpus_path configured; the vector store starts empty."),
    }

    build_app_state_with(config, Box::new(ai_provider), Arc::new(store))
}

/// Builds the application state around already-constructed providers.
pub fn build_app_state_with(
    config: AppConfig,
    ai_provider: Box<dyn AiProvider>,
    store: Arc<dyn VectorStore>,
) -> anyhow::Result<AppState> {
    if config.auth_enabled && non_empty(&config.jwt_secret).is_none() {
        anyhow::bail!("auth_enabled is set but jwt_secret is empty");
    }

    info!(store = store.name(), "Building query pipeline.");
    let pipeline = RagPipeline::builder()
        .ai_provider(ai_provider)
        .vector_store(store)
        .prompts(config.prompts.clone())
        .options(config.pipeline.to_options())
        .build()?;

    Ok(AppState {
        config: Arc::new(config),
        pipeline: Arc::new(pipeline),
    })
}
