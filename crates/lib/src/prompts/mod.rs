//! # Prompt Templates
//!
//! The prompt configuration is a process-wide, read-only value: it is loaded
//! once (defaults, or a `prompts.yml` file) and injected into the expander and
//! generator at construction.

pub mod tasks;

pub use tasks::REFUSAL_SENTENCE;

use crate::errors::PromptError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Placeholder for the user's query text.
pub const QUERY_TEXT_PLACEHOLDER: &str = "{query_text}";
/// Placeholder for the rendered context block.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// A system prompt and a user-prompt template for one generation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPrompts {
    pub system_prompt: String,
    pub user_prompt_template: String,
}

/// The prompt configuration for both generation-engine calls.
///
/// The YAML layout mirrors `prompts.yml`:
///
/// ```yaml
/// query_expansion:
///   system_prompt: "..."
///   user_prompt_template: "ORIGINAL QUERY: {query_text}"
/// answer_generation:
///   system_prompt: "..."
///   user_prompt_template: "QUESTION: {query_text}\nCONTEXT:\n{context}"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    pub query_expansion: TaskPrompts,
    pub answer_generation: TaskPrompts,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            query_expansion: TaskPrompts {
                system_prompt: tasks::QUERY_EXPANSION_SYSTEM_PROMPT.to_string(),
                user_prompt_template: tasks::QUERY_EXPANSION_USER_PROMPT.to_string(),
            },
            answer_generation: TaskPrompts {
                system_prompt: tasks::ANSWER_GENERATION_SYSTEM_PROMPT.to_string(),
                user_prompt_template: tasks::ANSWER_GENERATION_USER_PROMPT.to_string(),
            },
        }
    }
}

impl PromptTemplates {
    /// Parses and validates templates from a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, PromptError> {
        let templates: PromptTemplates = serde_yaml::from_str(content)
            .map_err(|e| PromptError::InvalidTemplate(format!("failed to parse YAML: {e}")))?;
        templates.validate()?;
        Ok(templates)
    }

    /// Reads and validates templates from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, PromptError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PromptError::InvalidTemplate(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Checks that each user template carries the slots it will be filled with.
    pub fn validate(&self) -> Result<(), PromptError> {
        let expansion = &self.query_expansion.user_prompt_template;
        if !expansion.contains(QUERY_TEXT_PLACEHOLDER) {
            return Err(PromptError::InvalidTemplate(format!(
                "query_expansion.user_prompt_template must contain {QUERY_TEXT_PLACEHOLDER}"
            )));
        }
        let generation = &self.answer_generation.user_prompt_template;
        for placeholder in [QUERY_TEXT_PLACEHOLDER, CONTEXT_PLACEHOLDER] {
            if !generation.contains(placeholder) {
                return Err(PromptError::InvalidTemplate(format!(
                    "answer_generation.user_prompt_template must contain {placeholder}"
                )));
            }
        }
        Ok(())
    }

    pub fn render_expansion(&self, query_text: &str) -> String {
        fill_template(
            &self.query_expansion.user_prompt_template,
            query_text,
            "",
        )
    }

    pub fn render_generation(&self, query_text: &str, context: &str) -> String {
        fill_template(
            &self.answer_generation.user_prompt_template,
            query_text,
            context,
        )
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(query_text|context)\}").expect("static placeholder regex"))
}

/// Substitutes both placeholders in a single pass, so placeholder-like text
/// inside the query or the context is never expanded again.
pub fn fill_template(template: &str, query_text: &str, context: &str) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures| match &caps[1] {
            "query_text" => query_text.to_string(),
            _ => context.to_string(),
        })
        .into_owned()
}
