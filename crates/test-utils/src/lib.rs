use async_trait::async_trait;
use groundrag::errors::{PromptError, StoreError};
use groundrag::providers::ai::{AiProvider, Embedder};
use groundrag::providers::store::VectorStore;
use groundrag::types::RetrievedChunk;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Substring unique to the default query-expansion system prompt.
pub const EXPANSION_KEY: &str = "query decomposition assistant";
/// Substring unique to the default answer-generation system prompt.
pub const GENERATION_KEY: &str = "strict, factual assistant";

/// Shorthand for a fully attributed chunk.
pub fn chunk(text: &str, source: &str, source_detail: &str) -> RetrievedChunk {
    RetrievedChunk::new(text, source, source_detail)
}

// --- Mock AI Provider ---

#[derive(Clone, Debug)]
enum MockReply {
    Text(String),
    Failure(String),
}

/// A scripted generation engine.
///
/// Replies are keyed by a substring of the system prompt and consumed in
/// order. The last reply for a key is repeated once the queue runs dry.
#[derive(Clone, Debug, Default)]
pub struct MockAiProvider {
    responses: Arc<Mutex<Vec<(String, VecDeque<MockReply>)>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    delay: Option<Duration>,
}

impl MockAiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a response for prompts whose system prompt contains `key`.
    pub fn add_response(&self, key: &str, response: &str) {
        self.push(key, MockReply::Text(response.to_string()));
    }

    /// Queues an engine failure for prompts whose system prompt contains `key`.
    pub fn add_failure(&self, key: &str, message: &str) {
        self.push(key, MockReply::Failure(message.to_string()));
    }

    fn push(&self, key: &str, reply: MockReply) {
        let mut responses = self.responses.lock().unwrap();
        match responses.iter_mut().find(|(k, _)| k == key) {
            Some((_, queue)) => queue.push_back(reply),
            None => responses.push((key.to_string(), VecDeque::from([reply]))),
        }
    }

    /// Retrieves the recorded `(system_prompt, user_prompt)` calls.
    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose system prompt contains `key`.
    pub fn call_count(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(system, _)| system.contains(key))
            .count()
    }

    fn next_reply(&self, system_prompt: &str) -> Option<MockReply> {
        let mut responses = self.responses.lock().unwrap();
        let (_, queue) = responses
            .iter_mut()
            .find(|(key, _)| system_prompt.contains(key.as_str()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, PromptError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(system_prompt) {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Failure(message)) => Err(PromptError::AiApi(message)),
            None => Err(PromptError::AiApi(format!(
                "MockAiProvider: No response programmed for system prompt. Got: '{system_prompt}'"
            ))),
        }
    }
}

// --- Mock Vector Store ---

#[derive(Debug, Default)]
struct ScriptedQuery {
    chunks: Vec<RetrievedChunk>,
    failures_left: usize,
    delay: Option<Duration>,
}

/// A vector store with canned results per query text.
///
/// Unknown queries return no chunks. Concurrency is tracked so tests can
/// assert on the fan-out bound.
#[derive(Debug, Default)]
pub struct MockVectorStore {
    scripted: Mutex<HashMap<String, ScriptedQuery>>,
    calls: Mutex<Vec<(String, usize)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl MockVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every search sleep for `delay` unless the query has its own.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add_results(&self, query: &str, chunks: Vec<RetrievedChunk>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(query.to_string())
            .or_default()
            .chunks = chunks;
    }

    /// Makes the next `times` searches for `query` fail as unreachable.
    pub fn fail_times(&self, query: &str, times: usize) {
        self.scripted
            .lock()
            .unwrap()
            .entry(query.to_string())
            .or_default()
            .failures_left = times;
    }

    pub fn set_query_delay(&self, query: &str, delay: Duration) {
        self.scripted
            .lock()
            .unwrap()
            .entry(query.to_string())
            .or_default()
            .delay = Some(delay);
    }

    /// Recorded `(query, k)` searches, in call order.
    pub fn get_calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, query: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(q, _)| q == query)
            .count()
    }

    /// Highest number of searches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    fn name(&self) -> &str {
        "MockStore"
    }

    async fn search(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        self.calls.lock().unwrap().push((text.to_string(), k));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let (delay, outcome) = {
            let mut scripted = self.scripted.lock().unwrap();
            match scripted.get_mut(text) {
                Some(entry) if entry.failures_left > 0 => {
                    entry.failures_left -= 1;
                    (
                        entry.delay.or(self.delay),
                        Err(StoreError::Unreachable(format!("scripted failure for '{text}'"))),
                    )
                }
                Some(entry) => (
                    entry.delay.or(self.delay),
                    Ok(entry.chunks.iter().take(k).cloned().collect()),
                ),
                None => (self.delay, Ok(Vec::new())),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

// --- Keyword Embedder ---

/// A deterministic embedder: one dimension per vocabulary word, counting
/// case-insensitive occurrences. Text sharing no vocabulary embeds to zero.
#[derive(Clone, Debug)]
pub struct KeywordEmbedder {
    vocabulary: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, input: &str) -> Result<Vec<f32>, PromptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let input = input.to_lowercase();
        Ok(self
            .vocabulary
            .iter()
            .map(|word| input.matches(word.as_str()).count() as f32)
            .collect())
    }
}
