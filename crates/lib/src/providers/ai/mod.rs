pub mod embedding;
pub mod local;

use crate::errors::PromptError;
use async_trait::async_trait;
use dyn_clone::DynClone;
pub use embedding::{Embedder, HttpEmbedder};
pub use local::LocalAiProvider;
use std::fmt::Debug;

/// A trait for interacting with a text-generation engine.
///
/// The query expander and the answer generator only depend on this capability,
/// so both can be driven by a deterministic fake in tests.
#[async_trait]
pub trait AiProvider: Send + Sync + Debug + DynClone {
    /// Generates a response from a given system and user prompt.
    ///
    /// The result should be the raw text of the model's reply.
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, PromptError>;
}

dyn_clone::clone_trait_object!(AiProvider);
