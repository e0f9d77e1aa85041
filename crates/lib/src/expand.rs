//! # Query Expansion
//!
//! Decomposes a user query into atomic sub-queries with one generation-engine
//! call. The engine must answer with a JSON array of strings; anything else is a
//! [`RagError::MalformedExpansion`]; the raw query is never substituted.

use crate::{
    errors::{with_deadline, RagError, Stage},
    prompts::PromptTemplates,
    providers::ai::AiProvider,
    types::{Query, SubQuery},
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct QueryExpander {
    ai_provider: Box<dyn AiProvider>,
    prompts: Arc<PromptTemplates>,
    timeout: Duration,
}

impl QueryExpander {
    pub fn new(
        ai_provider: Box<dyn AiProvider>,
        prompts: Arc<PromptTemplates>,
        timeout: Duration,
    ) -> Self {
        Self {
            ai_provider,
            prompts,
            timeout,
        }
    }

    /// Returns the ordered, duplicate-free sub-queries for `query`.
    ///
    /// When the engine yields a single sub-query the query is atomic, and the
    /// original text is returned unchanged as the only element.
    pub async fn expand(&self, query: &Query) -> Result<Vec<SubQuery>, RagError> {
        let system_prompt = &self.prompts.query_expansion.system_prompt;
        let user_prompt = self.prompts.render_expansion(query.as_str());
        debug!(system_prompt = %system_prompt, user_prompt = %user_prompt, "--> Sending query expansion prompt");

        let raw = with_deadline(Stage::Expansion, self.timeout, async {
            Ok(self.ai_provider.generate(system_prompt, &user_prompt).await?)
        })
        .await?;
        debug!("<-- Query expansion response: {}", raw);

        let sub_queries = parse_expansion(&raw)?;
        if sub_queries.len() == 1 {
            info!("Query is atomic; using it unchanged.");
            return Ok(vec![SubQuery::from_query(query)]);
        }

        info!("Expanded query into {} sub-queries.", sub_queries.len());
        Ok(sub_queries)
    }
}

/// Parses an expansion response into sub-queries.
///
/// A surrounding markdown code fence is tolerated, but its body must be a JSON
/// array of strings. Items are trimmed; blank items and repeats are dropped,
/// keeping first occurrences. An array with nothing left is malformed.
pub fn parse_expansion(raw: &str) -> Result<Vec<SubQuery>, RagError> {
    let body = strip_code_fence(raw);
    let items: Vec<String> =
        serde_json::from_str(body).map_err(|e| RagError::MalformedExpansion {
            raw: raw.to_string(),
            reason: e.to_string(),
        })?;

    let mut seen = HashSet::new();
    let sub_queries: Vec<SubQuery> = items
        .iter()
        .filter_map(|item| SubQuery::new_trimmed(item))
        .filter(|sq| seen.insert(sq.clone()))
        .collect();

    if sub_queries.is_empty() {
        return Err(RagError::MalformedExpansion {
            raw: raw.to_string(),
            reason: "expansion contained no sub-queries".to_string(),
        });
    }
    Ok(sub_queries)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(inner) = rest.trim_end().strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}
