//! # Grounded Answer Generation
//!
//! Produces the final answer from the original query and its context block.
//! Every draft is run through [`validate_answer`]; a draft citing an unknown
//! source or making an uncited claim is never returned. Such a draft may be
//! regenerated once before the call fails with
//! [`RagError::CitationValidation`].

use crate::{
    citation::{validate_answer, CitationReport},
    errors::{with_deadline, RagError, Stage},
    prompts::PromptTemplates,
    providers::ai::AiProvider,
    types::{Answer, ContextBlock, Query},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AnswerGenerator {
    ai_provider: Box<dyn AiProvider>,
    prompts: Arc<PromptTemplates>,
    timeout: Duration,
    regenerate_on_invalid: bool,
}

impl AnswerGenerator {
    pub fn new(
        ai_provider: Box<dyn AiProvider>,
        prompts: Arc<PromptTemplates>,
        timeout: Duration,
    ) -> Self {
        Self {
            ai_provider,
            prompts,
            timeout,
            regenerate_on_invalid: true,
        }
    }

    /// Whether a draft failing citation validation gets one more attempt.
    pub fn with_regeneration(mut self, regenerate_on_invalid: bool) -> Self {
        self.regenerate_on_invalid = regenerate_on_invalid;
        self
    }

    /// Generates a citation-grounded answer.
    ///
    /// An empty context yields the refusal sentence without calling the engine.
    pub async fn answer(&self, query: &Query, context: &ContextBlock) -> Result<Answer, RagError> {
        if context.is_empty() {
            info!("Context block is empty; returning refusal.");
            return Ok(Answer::refusal());
        }

        let allowed = context.provenances();
        let user_prompt = self
            .prompts
            .render_generation(query.as_str(), &context.render());
        let attempts = if self.regenerate_on_invalid { 2 } else { 1 };

        let mut last_report = CitationReport::default();
        for attempt in 1..=attempts {
            let draft = self.draft(&user_prompt).await?;
            let text = draft.trim();
            let report = validate_answer(text, &allowed);
            if report.is_valid() {
                info!(
                    attempt,
                    segments = report.segments.len(),
                    "Generated answer passed citation validation."
                );
                return Ok(Answer {
                    text: text.to_string(),
                    segments: report.segments,
                });
            }
            warn!(
                attempt,
                unknown = ?report.unknown,
                uncited = ?report.uncited_claims,
                "Rejected draft answer that failed citation validation."
            );
            last_report = report;
        }

        Err(RagError::CitationValidation {
            unknown: last_report.unknown,
            uncited_claims: last_report.uncited_claims.len(),
        })
    }

    async fn draft(&self, user_prompt: &str) -> Result<String, RagError> {
        let system_prompt = &self.prompts.answer_generation.system_prompt;
        debug!(system_prompt = %system_prompt, user_prompt = %user_prompt, "--> Sending answer generation prompt");
        let draft = with_deadline(Stage::Generation, self.timeout, async {
            Ok(self.ai_provider.generate(system_prompt, user_prompt).await?)
        })
        .await?;
        debug!("<-- Answer generation response: {}", draft);
        Ok(draft)
    }
}
