//! Intake poller — the outer loop that discovers unclaimed prompts, claims
//! each exactly once, and dispatches an orchestrator run per claim.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bson::oid::ObjectId;

use genie_domain::error::Result;

use crate::orchestrate::{self, PromptJob};
use crate::state::WorkerState;

const SEEN_HIGH_WATER: usize = 1000;
const SEEN_LOW_WATER: usize = 500;

/// Bounded, insertion-ordered record of prompt ids this process has already
/// dispatched.
///
/// Purely an optimization to skip store round-trips on already-claimed work:
/// the conditional claim update is the correctness mechanism, so pruning (or
/// losing this set entirely on restart) is safe.
pub struct SeenSet {
    order: VecDeque<ObjectId>,
    ids: HashSet<ObjectId>,
    high: usize,
    low: usize,
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SeenSet {
    pub fn new() -> Self {
        Self::with_limits(SEEN_HIGH_WATER, SEEN_LOW_WATER)
    }

    pub fn with_limits(high: usize, low: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            high,
            low,
        }
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.ids.contains(id)
    }

    /// Record an id; once the set grows past the high-water mark, the oldest
    /// entries are pruned down to the low-water mark.
    pub fn insert(&mut self, id: ObjectId) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > self.high {
            while self.order.len() > self.low {
                if let Some(old) = self.order.pop_front() {
                    self.ids.remove(&old);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Run the poll loop until the process exits. Transient store errors are
/// logged and the loop continues; nothing here ever crashes the worker.
pub async fn run(state: Arc<WorkerState>) {
    tracing::info!(
        poll_interval_ms = state.config.worker.poll_interval_ms,
        "intake poller started"
    );

    let interval = Duration::from_millis(state.config.worker.poll_interval_ms);
    let mut seen = SeenSet::new();

    loop {
        if let Err(e) = poll_once(&state, &mut seen).await {
            tracing::error!(error = %e, "intake poll failed");
        }
        tokio::time::sleep(interval).await;
    }
}

/// One poll iteration: optional stuck-claim sweep, then scan → claim →
/// dispatch for every unprocessed prompt.
pub async fn poll_once(state: &Arc<WorkerState>, seen: &mut SeenSet) -> Result<()> {
    if let Some(secs) = state.config.worker.reclaim_after_secs {
        reclaim_sweep(state, secs).await;
    }

    let prompts = state.prompts.unprocessed().await?;
    for prompt in prompts {
        if seen.contains(&prompt.id) {
            continue;
        }

        let response_id = ObjectId::new();
        match state.prompts.claim(prompt.id, response_id).await {
            Ok(true) => {}
            Ok(false) => {
                // Another worker won the claim; remember the id so we stop
                // re-checking it.
                seen.insert(prompt.id);
                continue;
            }
            Err(e) => {
                tracing::error!(prompt_id = %prompt.id, error = %e, "claim failed");
                continue;
            }
        }

        tracing::info!(
            prompt_id = %prompt.id,
            user_id = %prompt.user_id,
            preview = %preview(&prompt.message),
            "claimed prompt"
        );

        // With a configured cap this blocks the scan until a slot frees,
        // which is the intended backpressure. The default pool is unbounded.
        let permit = match state.pool.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break, // pool closed: shutting down
        };

        let job = PromptJob {
            prompt_id: prompt.id,
            response_id,
            user_id: prompt.user_id.clone(),
            message: prompt.message.clone(),
        };
        let run_state = state.clone();
        tokio::spawn(async move {
            let _permit = permit;
            orchestrate::run(run_state, job).await;
        });

        seen.insert(prompt.id);
    }

    Ok(())
}

async fn reclaim_sweep(state: &WorkerState, after_secs: u64) {
    let cutoff = bson::DateTime::from_millis(
        bson::DateTime::now().timestamp_millis() - (after_secs as i64) * 1000,
    );
    match state.prompts.reclaim_stuck(cutoff).await {
        Ok(0) => {}
        Ok(count) => tracing::warn!(count, "reclaimed stuck prompts"),
        Err(e) => tracing::warn!(error = %e, "reclaim sweep failed"),
    }
}

fn preview(message: &str) -> String {
    const MAX: usize = 50;
    if message.chars().count() <= MAX {
        message.to_owned()
    } else {
        let head: String = message.chars().take(MAX).collect();
        format!("{head}...")
    }
}
