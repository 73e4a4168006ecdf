//! Persisted document shapes for the `prompts`, `responses`, and
//! `chathistories` collections.
//!
//! Field names match what the API producer writes, so these structs
//! round-trip against documents this worker did not create.

use bson::oid::ObjectId;
use bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::chat::Role;

/// A queued unit of work: one user request for a response.
///
/// Lifecycle: `unprocessed → claimed (processing) → processed`. Created by
/// the API tier; claimed and finished exclusively by this worker; never
/// deleted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub processing: bool,
    /// Set at claim time, linking the response being generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<ObjectId>,
    /// Claim timestamp, also the basis for the stuck-claim reclaim sweep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime>,
    pub created_at: DateTime,
}

/// The record accumulating streamed output for one prompt.
///
/// `tokens` is append-only while `complete == false`; both terminal states
/// (completed, errored) set `complete = true` and are absorbing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_response: Option<String>,
    pub updated_at: DateTime,
}

/// One turn of a user's rolling conversation window.
///
/// User turns carry a timestamp; assistant turns do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime>,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Some(DateTime::now()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// Per-user history document, keyed by `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryDoc {
    pub user_id: String,
    #[serde(default)]
    pub messages: Vec<HistoryTurn>,
}
