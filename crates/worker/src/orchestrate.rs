//! Conversation orchestrator — runs one claimed prompt end to end: context
//! assembly, streamed generation, incremental persistence, history update.

use std::sync::Arc;
use std::time::Duration;

use bson::oid::ObjectId;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use genie_domain::chat::Message;
use genie_domain::docs::HistoryTurn;
use genie_domain::error::Result;
use genie_engine::{GenerationParams, StopTokenMatcher, TemplateOptions};

use crate::state::WorkerState;

/// Work handed from the poller to one orchestrator run.
#[derive(Debug, Clone)]
pub struct PromptJob {
    pub prompt_id: ObjectId,
    pub response_id: ObjectId,
    pub user_id: String,
    pub message: String,
}

/// Run one claimed prompt to completion.
///
/// Every failure is contained here and recorded on the response record; the
/// poller and sibling runs never see it. On failure the prompt stays claimed
/// (the reclaim sweep, when enabled, eventually returns it to the queue).
pub async fn run(state: Arc<WorkerState>, job: PromptJob) {
    // Serialize runs per user so concurrent prompts cannot drop each other's
    // history turns.
    let lock = state.user_locks.lock_for(&job.user_id);
    let _guard = lock.lock().await;

    if let Err(e) = run_inner(&state, &job).await {
        tracing::error!(
            prompt_id = %job.prompt_id,
            user_id = %job.user_id,
            error = %e,
            "conversation run failed"
        );
        if let Err(e) = state.responses.fail(job.response_id, &e.to_string()).await {
            tracing::error!(response_id = %job.response_id, error = %e, "error not recorded on response");
        }
    }
}

async fn run_inner(state: &WorkerState, job: &PromptJob) -> Result<()> {
    let cfg = &state.config;

    // History and sanitized input.
    let prior = state.history.read(&job.user_id).await?;
    let message = state.sanitizer.clean(&job.message);

    let mut history = prior.clone();
    history.push(HistoryTurn::user(&message));

    // Bounded context: system instruction, the most recent prior turns, then
    // the new message. Keeps prompt length flat regardless of conversation
    // age.
    let mut messages = Vec::with_capacity(cfg.worker.context_turns + 2);
    messages.push(Message::system(&cfg.worker.system_prompt));
    let skip = prior.len().saturating_sub(cfg.worker.context_turns);
    for turn in &prior[skip..] {
        messages.push(Message {
            role: turn.role,
            content: turn.content.clone(),
        });
    }
    messages.push(Message::user(&message));

    // Template render, thinking disabled. A failure here is terminal for the
    // run: recorded on the response, no retry.
    let input = state
        .engine
        .apply_template(&messages, &TemplateOptions::default())
        .await?;

    state.responses.init(job.response_id, &job.user_id).await?;

    // Stop phrases are tokenized once per run for the engine-side suffix
    // matcher; the raw phrases feed the substring check below.
    let stop =
        StopTokenMatcher::compile(state.engine.as_ref(), &cfg.generation.stop_words).await?;
    let stop_words = cfg.generation.stop_words.clone();

    let params = GenerationParams {
        max_tokens: cfg.generation.max_tokens,
        temperature: cfg.generation.temperature,
        sample: cfg.generation.sample,
        stop: Some(stop),
    };

    // Generation runs on its own task; this task consumes the fragments.
    let stream = state.engine.generate(input, params).await?;
    let (tx, mut rx) = mpsc::channel::<Result<String>>(64);
    tokio::spawn(async move {
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            if tx.send(item).await.is_err() {
                // Consumer hit a stop marker and went away.
                break;
            }
        }
    });

    let throttle = Duration::from_millis(cfg.worker.write_throttle_ms);
    let mut collected: Vec<String> = Vec::new();

    'consume: while let Some(item) = rx.recv().await {
        let fragment = item?;

        // Second stop layer, on decoded text: catches a stop phrase the
        // token-suffix matcher missed because it decoded across token
        // boundaries. The matched fragment is dropped entirely.
        for word in &stop_words {
            if fragment.contains(word.as_str()) {
                break 'consume;
            }
        }

        state
            .responses
            .append_fragment(job.response_id, &fragment)
            .await?;
        collected.push(fragment);
        tokio::time::sleep(throttle).await;
    }

    // Final text: everything collected, minus any residual stop marker.
    let mut full = collected.concat();
    for word in &stop_words {
        if full.contains(word.as_str()) {
            full = full.replace(word.as_str(), "");
        }
    }
    let full = full.trim().to_owned();

    // Persist the rolling window: assistant turn appended, oldest turns
    // dropped past the cap.
    history.push(HistoryTurn::assistant(&full));
    let skip = history.len().saturating_sub(cfg.worker.history_window);
    state.history.replace(&job.user_id, &history[skip..]).await?;

    state.responses.complete(job.response_id, &full).await?;
    state
        .prompts
        .mark_processed(job.prompt_id, job.response_id)
        .await?;

    tracing::info!(
        prompt_id = %job.prompt_id,
        user_id = %job.user_id,
        fragments = collected.len(),
        chars = full.len(),
        "prompt processed"
    );
    Ok(())
}
