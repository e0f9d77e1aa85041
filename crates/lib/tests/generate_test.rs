//! # Answer Generation Tests

mod common;

use common::{context_of, setup_tracing, ACME_QUERY};
use groundrag::{
    errors::{RagError, Stage},
    generate::AnswerGenerator,
    prompts::PromptTemplates,
    types::{AnswerSegment, ContextBlock, Provenance, Query},
    REFUSAL_SENTENCE,
};
use groundrag_test_utils::{chunk, MockAiProvider, GENERATION_KEY};
use std::sync::Arc;
use std::time::Duration;

fn generator(ai: &MockAiProvider) -> AnswerGenerator {
    AnswerGenerator::new(
        Box::new(ai.clone()),
        Arc::new(PromptTemplates::default()),
        Duration::from_secs(5),
    )
}

fn acme_context() -> ContextBlock {
    context_of(vec![
        chunk("The Q3 payment was approved on 3 Oct.", "Finance Guide", "Slide 4"),
        chunk("The call closed on a positive note.", "Call Notes", "Q3, call 2"),
    ])
}

#[tokio::test]
async fn test_empty_context_refuses_without_engine_call() {
    setup_tracing();
    let ai = MockAiProvider::new();

    let answer = generator(&ai)
        .answer(&Query::new(ACME_QUERY).unwrap(), &ContextBlock::default())
        .await
        .unwrap();

    assert_eq!(answer.text, REFUSAL_SENTENCE);
    assert!(answer.is_refusal());
    assert!(ai.get_calls().is_empty());
}

#[tokio::test]
async fn test_valid_answer_is_returned_with_segments() {
    let ai = MockAiProvider::new();
    ai.add_response(
        GENERATION_KEY,
        "  The Q3 payment was approved [Source: Finance Guide, Slide 4]. The call was positive [Source: Call Notes, Q3, call 2].\n",
    );

    let answer = generator(&ai)
        .answer(&Query::new(ACME_QUERY).unwrap(), &acme_context())
        .await
        .unwrap();

    assert!(answer.text.starts_with("The Q3 payment"));
    assert!(answer.text.ends_with("call 2]."));
    assert_eq!(
        answer.citations(),
        vec![
            Provenance::new("Finance Guide", "Slide 4"),
            Provenance::new("Call Notes", "Q3, call 2"),
        ]
    );

    let calls = ai.get_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1.starts_with(&format!("QUESTION: {ACME_QUERY}\nCONTEXT:\n")));
    assert!(calls[0]
        .1
        .contains("[Source: Finance Guide, Slide 4]\nThe Q3 payment was approved on 3 Oct."));
}

#[tokio::test]
async fn test_partial_support_refuses_the_unsupported_half() {
    let ai = MockAiProvider::new();
    ai.add_response(
        GENERATION_KEY,
        &format!("The Q3 payment was approved [Source: Finance Guide, Slide 4].\n{REFUSAL_SENTENCE}"),
    );
    let context = context_of(vec![chunk(
        "The Q3 payment was approved on 3 Oct.",
        "Finance Guide",
        "Slide 4",
    )]);

    let answer = generator(&ai)
        .answer(&Query::new(ACME_QUERY).unwrap(), &context)
        .await
        .unwrap();

    assert!(!answer.is_refusal());
    assert!(matches!(answer.segments[0], AnswerSegment::Supported { .. }));
    assert_eq!(answer.segments[1], AnswerSegment::Refusal);
}

#[tokio::test]
async fn test_invalid_draft_is_regenerated_once() {
    let ai = MockAiProvider::new();
    ai.add_response(
        GENERATION_KEY,
        "Approved [Source: Bank Statement, Line 3].",
    );
    ai.add_response(
        GENERATION_KEY,
        "Approved [Source: Finance Guide, Slide 4].",
    );

    let answer = generator(&ai)
        .answer(&Query::new(ACME_QUERY).unwrap(), &acme_context())
        .await
        .unwrap();

    assert_eq!(answer.text, "Approved [Source: Finance Guide, Slide 4].");
    assert_eq!(ai.call_count(GENERATION_KEY), 2);
}

#[tokio::test]
async fn test_repeatedly_invalid_draft_fails_validation() {
    let ai = MockAiProvider::new();
    ai.add_response(
        GENERATION_KEY,
        "Approved [Source: Bank Statement, Line 3]. Everyone was happy.",
    );

    let err = generator(&ai)
        .answer(&Query::new(ACME_QUERY).unwrap(), &acme_context())
        .await
        .unwrap_err();

    match err {
        RagError::CitationValidation {
            unknown,
            uncited_claims,
        } => {
            assert_eq!(unknown, vec![Provenance::new("Bank Statement", "Line 3")]);
            assert_eq!(uncited_claims, 1);
        }
        other => panic!("expected CitationValidation, got {other:?}"),
    }
    assert_eq!(ai.call_count(GENERATION_KEY), 2);
}

#[tokio::test]
async fn test_regeneration_can_be_disabled() {
    let ai = MockAiProvider::new();
    ai.add_response(GENERATION_KEY, "The payment was approved.");

    let err = generator(&ai)
        .with_regeneration(false)
        .answer(&Query::new(ACME_QUERY).unwrap(), &acme_context())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::CitationValidation { .. }));
    assert_eq!(ai.call_count(GENERATION_KEY), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_generation_times_out() {
    let ai = MockAiProvider::new().with_delay(Duration::from_secs(120));
    ai.add_response(GENERATION_KEY, "Approved [Source: Finance Guide, Slide 4].");

    let err = generator(&ai)
        .answer(&Query::new(ACME_QUERY).unwrap(), &acme_context())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RagError::Timeout {
            stage: Stage::Generation,
            ..
        }
    ));
}

#[tokio::test]
async fn test_rendered_label_with_comma_in_source_is_accepted() {
    let ai = MockAiProvider::new();
    ai.add_response(
        GENERATION_KEY,
        "The Q3 payment was approved [Source: Acme, Inc. Finance Guide, Slide 4].",
    );
    let context = context_of(vec![chunk(
        "The Q3 payment was approved on 3 Oct.",
        "Acme, Inc. Finance Guide",
        "Slide 4",
    )]);

    let answer = generator(&ai)
        .answer(&Query::new(ACME_QUERY).unwrap(), &context)
        .await
        .unwrap();

    assert_eq!(
        answer.citations(),
        vec![Provenance::new("Acme, Inc. Finance Guide", "Slide 4")]
    );
    assert_eq!(ai.call_count(GENERATION_KEY), 1);
    assert!(ai.get_calls()[0]
        .1
        .contains("[Source: Acme, Inc. Finance Guide, Slide 4]\nThe Q3 payment"));
}

#[tokio::test]
async fn test_uncited_leading_sentence_triggers_regeneration() {
    let ai = MockAiProvider::new();
    ai.add_response(
        GENERATION_KEY,
        "The CFO signed it last Friday. The Q3 payment was approved [Source: Finance Guide, Slide 4].",
    );
    ai.add_response(
        GENERATION_KEY,
        "The Q3 payment was approved [Source: Finance Guide, Slide 4].",
    );

    let answer = generator(&ai)
        .answer(&Query::new(ACME_QUERY).unwrap(), &acme_context())
        .await
        .unwrap();

    assert_eq!(answer.text, "The Q3 payment was approved [Source: Finance Guide, Slide 4].");
    assert_eq!(ai.call_count(GENERATION_KEY), 2);
}
