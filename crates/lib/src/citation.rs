//! # Citation Parsing and Validation
//!
//! Generated answers cite their evidence inline with the literal
//! `[Source: <source>, <source_detail>]`. This module extracts those pairs from
//! free text and checks a draft answer against the provenance available in its
//! context block. Everything here is pure text processing.

use crate::{
    prompts::REFUSAL_SENTENCE,
    types::{AnswerSegment, Citation, Provenance},
};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn citation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Captures the whole label body; it must hold at least one comma.
    RE.get_or_init(|| {
        Regex::new(r"\[Source:\s*([^\],]*,[^\]]*?)\s*\]").expect("static citation regex")
    })
}

/// Extracts every citation pair from `text`, in order of appearance.
///
/// Without a context to resolve against, each label is split at its first
/// comma and both halves are trimmed. A label with an empty detail is still
/// returned so validation can reject it.
pub fn parse_citations(text: &str) -> Vec<Citation> {
    citation_regex()
        .captures_iter(text)
        .map(|caps| split_label(&caps[1]))
        .collect()
}

/// Resolves a label body against the allowed pairs.
///
/// Sources and details may both contain commas, so every comma is tried as
/// the separator. A label matching no allowed pair falls back to the
/// first-comma split.
fn resolve_label(label: &str, allowed: &HashSet<Provenance>) -> Citation {
    label
        .match_indices(',')
        .map(|(i, _)| Provenance::new(label[..i].trim(), label[i + 1..].trim()))
        .find(|candidate| allowed.contains(candidate))
        .unwrap_or_else(|| split_label(label))
}

fn split_label(label: &str) -> Citation {
    match label.split_once(',') {
        Some((source, detail)) => Provenance::new(source.trim(), detail.trim()),
        None => Provenance::new(label.trim(), ""),
    }
}

/// The outcome of checking a draft answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationReport {
    pub segments: Vec<AnswerSegment>,
    /// Cited pairs that match no chunk in the context.
    pub unknown: Vec<Citation>,
    /// Claims that carry no citation at all.
    pub uncited_claims: Vec<String>,
}

impl CitationReport {
    /// A draft is acceptable when it says something, every claim is cited, and
    /// every citation is known.
    pub fn is_valid(&self) -> bool {
        !self.segments.is_empty() && self.unknown.is_empty() && self.uncited_claims.is_empty()
    }
}

/// Splits a draft answer into claims and checks each against `allowed`.
///
/// The answer is read line by line and each line is split into sentences. A
/// citation supports the sentence it closes; adjacent citations support the
/// same sentence. Any other sentence is an uncited claim unless it is only
/// punctuation. Headings and lead-in lines ending in `:` are
/// structure, not claims. Occurrences of the refusal sentence become
/// [`AnswerSegment::Refusal`].
pub fn validate_answer(answer: &str, allowed: &HashSet<Provenance>) -> CitationReport {
    let mut report = CitationReport::default();
    let mut unknown_seen = HashSet::new();

    for raw_line in answer.lines() {
        let mut line = raw_line.to_string();
        let refusals = line.matches(REFUSAL_SENTENCE).count();
        if refusals > 0 {
            line = line.replace(REFUSAL_SENTENCE, " ");
        }

        let line = strip_list_marker(line.trim());
        if !is_structural(line) {
            validate_line(line, allowed, &mut report, &mut unknown_seen);
        }

        for _ in 0..refusals {
            report.segments.push(AnswerSegment::Refusal);
        }
    }

    report
}

fn validate_line(
    line: &str,
    allowed: &HashSet<Provenance>,
    report: &mut CitationReport,
    unknown_seen: &mut HashSet<Provenance>,
) {
    let mut cursor = 0;
    let mut pending: Option<(String, Vec<Citation>)> = None;

    for caps in citation_regex().captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        let citation = resolve_label(&caps[1], allowed);
        let between = &line[cursor..whole.start()];
        cursor = whole.end();

        if !allowed.contains(&citation) && unknown_seen.insert(citation.clone()) {
            report.unknown.push(citation.clone());
        }

        let mut sentences: Vec<&str> = split_sentences(between)
            .into_iter()
            .filter(|s| has_content(s))
            .collect();
        match sentences.pop() {
            Some(claim) => {
                if let Some((text, citations)) = pending.take() {
                    report
                        .segments
                        .push(AnswerSegment::Supported { text, citations });
                }
                report
                    .uncited_claims
                    .extend(sentences.into_iter().map(clean_claim));
                pending = Some((clean_claim(claim), vec![citation]));
            }
            None => match pending.as_mut() {
                Some((_, citations)) => citations.push(citation),
                // A citation with nothing before it on the line.
                None => pending = Some((String::new(), vec![citation])),
            },
        }
    }

    if let Some((text, citations)) = pending.take() {
        report
            .segments
            .push(AnswerSegment::Supported { text, citations });
    }

    report.uncited_claims.extend(
        split_sentences(&line[cursor..])
            .into_iter()
            .filter(|s| has_content(s))
            .map(clean_claim),
    );
}

/// Splits `text` after each `.`, `!` or `?` that is followed by whitespace and
/// then something other than a lowercase letter. The last piece may be empty.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = i + c.len_utf8();
        let rest = &text[end..];
        let next = rest.trim_start();
        if next.len() == rest.len() || next.chars().next().is_some_and(char::is_lowercase) {
            continue;
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    pieces.push(&text[start..]);
    pieces
}

fn has_content(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

fn clean_claim(text: &str) -> String {
    text.trim()
        .trim_start_matches(|c: char| c == '.' || c == ',' || c == ';' || c.is_whitespace())
        .trim()
        .to_string()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim_start_matches(['-', '*', '•', '>']).trim_start();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return stripped.trim_start();
        }
    }
    line
}

fn is_structural(line: &str) -> bool {
    let line = line.trim();
    !has_content(line)
        || line.starts_with('#')
        || (line.ends_with(':') && citation_regex().find(line).is_none())
}
