//! In-memory store fakes and a scripted engine for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::DateTime;
use parking_lot::Mutex;

use genie_domain::chat::Message;
use genie_domain::config::Config;
use genie_domain::docs::{HistoryTurn, Prompt, Response};
use genie_domain::error::{Error, Result};
use genie_domain::stream::BoxStream;
use genie_engine::{GenerationEngine, GenerationParams, TemplateOptions};
use genie_store::{HistoryStore, PromptIntake, ResponseSink};
use genie_worker::state::WorkerState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MemoryStore {
    pub prompts: Mutex<HashMap<ObjectId, Prompt>>,
    pub responses: Mutex<HashMap<ObjectId, Response>>,
    pub history: Mutex<HashMap<String, Vec<HistoryTurn>>>,
    /// Every id `claim` was called for, in call order.
    pub claim_calls: Mutex<Vec<ObjectId>>,
    /// When set, every claim loses (simulates another worker winning).
    pub reject_claims: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_prompt(&self, user_id: &str, message: &str) -> ObjectId {
        let id = ObjectId::new();
        self.prompts.lock().insert(
            id,
            Prompt {
                id,
                user_id: user_id.to_owned(),
                message: message.to_owned(),
                processed: false,
                processing: false,
                response_id: None,
                processed_at: None,
                created_at: DateTime::now(),
            },
        );
        id
    }

    /// Seed a prompt already claimed `age_secs` ago and never finished.
    pub fn seed_stale_claim(&self, user_id: &str, message: &str, age_secs: i64) -> ObjectId {
        let id = self.seed_prompt(user_id, message);
        let mut prompts = self.prompts.lock();
        let prompt = prompts.get_mut(&id).unwrap();
        prompt.processing = true;
        prompt.response_id = Some(ObjectId::new());
        prompt.processed_at = Some(DateTime::from_millis(
            DateTime::now().timestamp_millis() - age_secs * 1000,
        ));
        id
    }

    pub fn seed_history(&self, user_id: &str, turns: Vec<HistoryTurn>) {
        self.history.lock().insert(user_id.to_owned(), turns);
    }

    pub fn prompt(&self, id: ObjectId) -> Prompt {
        self.prompts.lock().get(&id).cloned().unwrap()
    }

    pub fn response(&self, id: ObjectId) -> Option<Response> {
        self.responses.lock().get(&id).cloned()
    }

    pub fn history_for(&self, user_id: &str) -> Vec<HistoryTurn> {
        self.history.lock().get(user_id).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl PromptIntake for MemoryStore {
    async fn unprocessed(&self) -> Result<Vec<Prompt>> {
        let mut found: Vec<Prompt> = self
            .prompts
            .lock()
            .values()
            .filter(|p| !p.processed && !p.processing)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn claim(&self, prompt_id: ObjectId, response_id: ObjectId) -> Result<bool> {
        self.claim_calls.lock().push(prompt_id);
        if self.reject_claims.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut prompts = self.prompts.lock();
        match prompts.get_mut(&prompt_id) {
            Some(p) if !p.processed && !p.processing => {
                p.processing = true;
                p.response_id = Some(response_id);
                p.processed_at = Some(DateTime::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_processed(&self, prompt_id: ObjectId, response_id: ObjectId) -> Result<()> {
        let mut prompts = self.prompts.lock();
        let p = prompts
            .get_mut(&prompt_id)
            .ok_or_else(|| Error::Store("no such prompt".into()))?;
        p.processed = true;
        p.response_id = Some(response_id);
        Ok(())
    }

    async fn reclaim_stuck(&self, cutoff: DateTime) -> Result<u64> {
        let mut count = 0;
        for p in self.prompts.lock().values_mut() {
            if p.processing && !p.processed && p.processed_at.is_some_and(|t| t < cutoff) {
                p.processing = false;
                p.response_id = None;
                p.processed_at = None;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait::async_trait]
impl ResponseSink for MemoryStore {
    async fn init(&self, response_id: ObjectId, user_id: &str) -> Result<()> {
        self.responses.lock().insert(
            response_id,
            Response {
                id: response_id,
                user_id: user_id.to_owned(),
                tokens: Vec::new(),
                complete: false,
                error: None,
                full_response: None,
                updated_at: DateTime::now(),
            },
        );
        Ok(())
    }

    async fn append_fragment(&self, response_id: ObjectId, text: &str) -> Result<()> {
        if let Some(r) = self.responses.lock().get_mut(&response_id) {
            // Terminal states are absorbing, as in the Mongo adapter.
            if !r.complete {
                r.tokens.push(text.to_owned());
                r.updated_at = DateTime::now();
            }
        }
        Ok(())
    }

    async fn complete(&self, response_id: ObjectId, full_response: &str) -> Result<()> {
        if let Some(r) = self.responses.lock().get_mut(&response_id) {
            r.complete = true;
            r.full_response = Some(full_response.to_owned());
            r.updated_at = DateTime::now();
        }
        Ok(())
    }

    async fn fail(&self, response_id: ObjectId, error: &str) -> Result<()> {
        let mut responses = self.responses.lock();
        let r = responses.entry(response_id).or_insert_with(|| Response {
            id: response_id,
            user_id: String::new(),
            tokens: Vec::new(),
            complete: false,
            error: None,
            full_response: None,
            updated_at: DateTime::now(),
        });
        r.error = Some(error.to_owned());
        r.complete = true;
        r.updated_at = DateTime::now();
        Ok(())
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryStore {
    async fn read(&self, user_id: &str) -> Result<Vec<HistoryTurn>> {
        Ok(self.history.lock().get(user_id).cloned().unwrap_or_default())
    }

    async fn replace(&self, user_id: &str, turns: &[HistoryTurn]) -> Result<()> {
        self.history.lock().insert(user_id.to_owned(), turns.to_vec());
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ScriptedEngine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the fake backend does next: emit a fragment or fail mid-stream.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Text(&'static str),
    Fail(&'static str),
}

/// A deterministic engine: tokenization is byte values, templating is a
/// visible concatenation, and generation replays a fixed script while
/// honoring the token-suffix stop matcher like the real adapter.
pub struct ScriptedEngine {
    script: Vec<Step>,
    fail_template: bool,
    /// Message lists passed to `apply_template`, for context assertions.
    pub rendered: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script,
            fail_template: false,
            rendered: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_template() -> Arc<Self> {
        Arc::new(Self {
            script: Vec::new(),
            fail_template: true,
            rendered: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl GenerationEngine for ScriptedEngine {
    async fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.bytes().map(u32::from).collect())
    }

    async fn apply_template(
        &self,
        messages: &[Message],
        _options: &TemplateOptions,
    ) -> Result<String> {
        if self.fail_template {
            return Err(Error::Template("scripted template failure".into()));
        }
        self.rendered.lock().push(messages.to_vec());
        let text = messages
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text)
    }

    async fn generate(
        &self,
        _input: String,
        params: GenerationParams,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let script = self.script.clone();
        let stream = async_stream::stream! {
            let mut produced: Vec<u32> = Vec::new();
            for step in script {
                match step {
                    Step::Text(text) => {
                        if let Some(matcher) = &params.stop {
                            produced.extend(text.bytes().map(u32::from));
                            if matcher.matches(&produced) {
                                break;
                            }
                        }
                        yield Ok(text.to_owned());
                    }
                    Step::Fail(message) => {
                        yield Err(Error::Engine(message.to_owned()));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State builders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.worker.write_throttle_ms = 0;
    config.worker.poll_interval_ms = 1;
    config
}

pub fn worker_state(
    config: Config,
    store: Arc<MemoryStore>,
    engine: Arc<ScriptedEngine>,
) -> Arc<WorkerState> {
    Arc::new(WorkerState::new(
        Arc::new(config),
        store.clone(),
        store.clone(),
        store,
        engine,
    ))
}
