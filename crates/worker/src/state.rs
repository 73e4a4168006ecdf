//! Shared handles for the poller and orchestrator tasks, built once in main.

use std::sync::Arc;

use tokio::sync::Semaphore;

use genie_domain::config::Config;
use genie_engine::GenerationEngine;
use genie_store::{HistoryStore, PromptIntake, ResponseSink};

use crate::sanitize::Sanitizer;
use crate::user_lock::UserLockMap;

pub struct WorkerState {
    pub config: Arc<Config>,
    pub prompts: Arc<dyn PromptIntake>,
    pub responses: Arc<dyn ResponseSink>,
    pub history: Arc<dyn HistoryStore>,
    pub engine: Arc<dyn GenerationEngine>,
    pub sanitizer: Sanitizer,
    pub user_locks: UserLockMap,
    /// Bounds concurrent generation runs. `max_in_flight = 0` configures an
    /// effectively unbounded pool (one task per claimed prompt).
    pub pool: Arc<Semaphore>,
}

impl WorkerState {
    pub fn new(
        config: Arc<Config>,
        prompts: Arc<dyn PromptIntake>,
        responses: Arc<dyn ResponseSink>,
        history: Arc<dyn HistoryStore>,
        engine: Arc<dyn GenerationEngine>,
    ) -> Self {
        let permits = match config.worker.max_in_flight {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };
        Self {
            config,
            prompts,
            responses,
            history,
            engine,
            sanitizer: Sanitizer::new(),
            user_locks: UserLockMap::new(),
            pool: Arc::new(Semaphore::new(permits)),
        }
    }
}
