//! # Configuration Loading Tests
//!
//! These tests verify the layering in `get_config`: YAML with `${VAR}`
//! substitution, library prompt defaults, partial prompt overrides and
//! `GROUNDRAG_`-prefixed environment overrides.

use groundrag::prompts::PromptTemplates;
use groundrag_server::config::{get_config, non_empty, ConfigError, PipelineConfig};
use serial_test::serial;
use std::{env, fs, time::Duration};
use tempfile::NamedTempFile;

const MINIMAL_YAML: &str = r#"
provider:
  api_url: "http://localhost:1234/v1/chat/completions"
embedding:
  api_url: "http://localhost:1234/v1/embeddings"
  model_name: "nomic-embed-text"
"#;

fn write_yaml(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("Failed to create temp config file");
    fs::write(file.path(), content).expect("Failed to write temp config file");
    file
}

fn load(content: &str) -> Result<groundrag_server::config::AppConfig, ConfigError> {
    let file = write_yaml(content);
    get_config(Some(file.path().to_str().unwrap()))
}

#[test]
#[serial]
fn test_minimal_config_uses_defaults() {
    let config = load(MINIMAL_YAML).unwrap();

    assert_eq!(config.port, 9090);
    assert!(!config.auth_enabled);
    assert!(config.corpus_path.is_none());
    assert_eq!(config.pipeline, PipelineConfig::default());
    assert_eq!(config.prompts, PromptTemplates::default());
}

#[test]
#[serial]
fn test_env_placeholders_are_substituted() {
    env::set_var("GROUNDRAG_TEST_CHAT_URL", "http://10.0.0.5:8080/v1/chat/completions");
    env::set_var("GROUNDRAG_TEST_MODEL", "llama3.1-8b");
    env::remove_var("GROUNDRAG_TEST_UNSET_KEY");

    let config = load(
        r#"
provider:
  api_url: "${GROUNDRAG_TEST_CHAT_URL}"
  api_key: "${GROUNDRAG_TEST_UNSET_KEY}"
  model_name: "${GROUNDRAG_TEST_MODEL}"
embedding:
  api_url: "http://localhost:1234/v1/embeddings"
  model_name: "nomic-embed-text"
"#,
    )
    .unwrap();

    env::remove_var("GROUNDRAG_TEST_CHAT_URL");
    env::remove_var("GROUNDRAG_TEST_MODEL");

    assert_eq!(
        config.provider.api_url,
        "http://10.0.0.5:8080/v1/chat/completions"
    );
    assert_eq!(config.provider.model_name.as_deref(), Some("llama3.1-8b"));
    // An unset variable leaves a blank string, which callers treat as absent.
    assert_eq!(non_empty(&config.provider.api_key), None);
}

#[test]
#[serial]
fn test_prefixed_env_overrides_nested_keys() {
    env::set_var("GROUNDRAG_PIPELINE__TOP_K", "3");
    env::set_var("GROUNDRAG_PIPELINE__REGENERATE_ON_INVALID_CITATIONS", "false");

    let result = load(&format!("{MINIMAL_YAML}\npipeline:\n  top_k: 12\n"));

    env::remove_var("GROUNDRAG_PIPELINE__TOP_K");
    env::remove_var("GROUNDRAG_PIPELINE__REGENERATE_ON_INVALID_CITATIONS");

    let config = result.unwrap();
    assert_eq!(config.pipeline.top_k, 3);
    assert!(!config.pipeline.regenerate_on_invalid_citations);
    assert_eq!(config.pipeline.max_concurrent_searches, 4);
}

#[test]
#[serial]
fn test_partial_prompt_override_keeps_other_defaults() {
    let config = load(&format!(
        "{MINIMAL_YAML}\nprompts:\n  query_expansion:\n    system_prompt: \"Split the question.\"\n"
    ))
    .unwrap();

    let defaults = PromptTemplates::default();
    assert_eq!(
        config.prompts.query_expansion.system_prompt,
        "Split the question."
    );
    assert_eq!(
        config.prompts.query_expansion.user_prompt_template,
        defaults.query_expansion.user_prompt_template
    );
    assert_eq!(config.prompts.answer_generation, defaults.answer_generation);
}

#[test]
#[serial]
fn test_template_without_context_placeholder_is_rejected() {
    let result = load(&format!(
        "{MINIMAL_YAML}\nprompts:\n  answer_generation:\n    user_prompt_template: \"QUESTION: {{query_text}}\"\n"
    ));

    match result {
        Err(ConfigError::General(msg)) => assert!(msg.contains("{context}"), "got: {msg}"),
        other => panic!("expected a template error, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_missing_config_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yml");

    let result = get_config(Some(path.to_str().unwrap()));

    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
#[serial]
fn test_missing_required_section_is_general_error() {
    let result = load("port: 8080\n");

    assert!(matches!(result, Err(ConfigError::General(_))));
}

#[test]
#[serial]
fn test_debug_output_masks_secrets() {
    let mut config = load(&format!(
        "{MINIMAL_YAML}\njwt_secret: \"jwt-very-secret\"\njwt_audience: \"authenticated\"\n"
    ))
    .unwrap();
    config.provider.api_key = Some("sk-provider-key".to_string());
    config.embedding.api_key = Some("sk-embedding-key".to_string());

    let rendered = format!("{config:?}");

    assert!(!rendered.contains("jwt-very-secret"));
    assert!(!rendered.contains("sk-provider-key"));
    assert!(!rendered.contains("sk-embedding-key"));
    assert!(rendered.contains("<redacted>"));
    assert!(rendered.contains("authenticated"));
}

#[test]
fn test_pipeline_config_converts_to_durations() {
    let pipeline = PipelineConfig {
        expansion_timeout_secs: 5,
        generation_timeout_secs: 20,
        search_timeout_secs: 2,
        ..PipelineConfig::default()
    };

    let options = pipeline.to_options();

    assert_eq!(options.top_k, 8);
    assert_eq!(options.expansion_timeout, Duration::from_secs(5));
    assert_eq!(options.generation_timeout, Duration::from_secs(20));
    assert_eq!(options.search_timeout, Duration::from_secs(2));
    assert!(options.regenerate_on_invalid_citations);
}

#[test]
fn test_non_empty_trims_blank_values() {
    assert_eq!(non_empty(&None), None);
    assert_eq!(non_empty(&Some("   ".to_string())), None);
    assert_eq!(
        non_empty(&Some(" secret ".to_string())),
        Some("secret".to_string())
    );
}
