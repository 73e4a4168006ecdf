use bson::oid::ObjectId;
use bson::DateTime;

use genie_domain::docs::{HistoryTurn, Prompt};
use genie_domain::error::Result;

/// The prompt work queue.
///
/// Claiming is the only correctness mechanism for exactly-once dispatch:
/// [`PromptIntake::claim`] must be a conditional atomic transition that at
/// most one caller can win per prompt.
#[async_trait::async_trait]
pub trait PromptIntake: Send + Sync {
    /// All prompts awaiting processing, oldest first.
    async fn unprocessed(&self) -> Result<Vec<Prompt>>;

    /// Try to claim a prompt for processing, recording the response id and a
    /// claim timestamp. Returns `true` only for the caller that won the
    /// unclaimed → claimed transition.
    async fn claim(&self, prompt_id: ObjectId, response_id: ObjectId) -> Result<bool>;

    /// Terminal transition: mark the prompt processed and link its response.
    /// Idempotent.
    async fn mark_processed(&self, prompt_id: ObjectId, response_id: ObjectId) -> Result<()>;

    /// Release claims older than `cutoff` that never completed back to the
    /// queue. Returns the number of prompts reclaimed.
    async fn reclaim_stuck(&self, cutoff: DateTime) -> Result<u64>;
}

/// The per-run response record receiving incremental output.
#[async_trait::async_trait]
pub trait ResponseSink: Send + Sync {
    /// Create (or reset) the response record: empty fragment list, not
    /// complete, no error.
    async fn init(&self, response_id: ObjectId, user_id: &str) -> Result<()>;

    /// Atomically append one text fragment and refresh the update timestamp.
    /// Must be a no-op once the response is complete.
    async fn append_fragment(&self, response_id: ObjectId, text: &str) -> Result<()>;

    /// Terminal success: set the final concatenated text.
    async fn complete(&self, response_id: ObjectId, full_response: &str) -> Result<()>;

    /// Terminal failure: record the error. Upserts, so an error raised before
    /// [`ResponseSink::init`] ran is still visible to readers.
    async fn fail(&self, response_id: ObjectId, error: &str) -> Result<()>;
}

/// A user's rolling conversation window.
///
/// `replace` is a full last-writer-wins upsert with no merge; callers that
/// need read-modify-write consistency must serialize per user themselves.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// The user's turns in chronological order, empty if absent.
    async fn read(&self, user_id: &str) -> Result<Vec<HistoryTurn>>;

    /// Replace the user's stored turns wholesale.
    async fn replace(&self, user_id: &str, turns: &[HistoryTurn]) -> Result<()>;
}
