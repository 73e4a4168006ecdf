//! MongoDB implementations of the store traits.
//!
//! One shared [`mongodb::Client`] handle serves every task. No multi-document
//! transactions are used: every operation here is a single-document atomic
//! update, which is all the claim/append/upsert contracts require.

use bson::oid::ObjectId;
use bson::{doc, Bson, DateTime};
use futures_util::TryStreamExt;
use mongodb::{Client, Collection};

use genie_domain::config::StoreConfig;
use genie_domain::docs::{HistoryDoc, HistoryTurn, Prompt, Response};
use genie_domain::error::{Error, Result};

use crate::traits::{HistoryStore, PromptIntake, ResponseSink};

fn from_mongo(e: mongodb::error::Error) -> Error {
    Error::Store(e.to_string())
}

/// Store adapters backed by the `prompts`, `responses`, and `chathistories`
/// collections of one database.
pub struct MongoStores {
    client: Client,
    prompts: Collection<Prompt>,
    responses: Collection<Response>,
    history: Collection<HistoryDoc>,
}

impl MongoStores {
    /// Connect and bind the collections. The client is the process-wide
    /// handle; hand this struct out behind `Arc`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri).await.map_err(from_mongo)?;
        let db = client.database(&config.database);

        tracing::info!(database = %config.database, "document store connected");

        Ok(Self {
            prompts: db.collection("prompts"),
            responses: db.collection("responses"),
            history: db.collection("chathistories"),
            client,
        })
    }

    /// Close the shared client. Called once at process exit.
    pub async fn shutdown(&self) {
        self.client.clone().shutdown().await;
        tracing::info!("document store connection closed");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt intake
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl PromptIntake for MongoStores {
    async fn unprocessed(&self) -> Result<Vec<Prompt>> {
        let cursor = self
            .prompts
            .find(doc! { "processed": false, "processing": false })
            .sort(doc! { "created_at": 1 })
            .await
            .map_err(from_mongo)?;
        cursor.try_collect().await.map_err(from_mongo)
    }

    async fn claim(&self, prompt_id: ObjectId, response_id: ObjectId) -> Result<bool> {
        // The `processing: false` filter makes this a compare-and-swap: of
        // any number of concurrent claimers, exactly one sees a match.
        let won = self
            .prompts
            .find_one_and_update(
                doc! { "_id": prompt_id, "processed": false, "processing": false },
                doc! { "$set": {
                    "processing": true,
                    "response_id": response_id,
                    "processed_at": DateTime::now(),
                }},
            )
            .await
            .map_err(from_mongo)?;
        Ok(won.is_some())
    }

    async fn mark_processed(&self, prompt_id: ObjectId, response_id: ObjectId) -> Result<()> {
        self.prompts
            .update_one(
                doc! { "_id": prompt_id },
                doc! { "$set": { "processed": true, "response_id": response_id } },
            )
            .await
            .map_err(from_mongo)?;
        Ok(())
    }

    async fn reclaim_stuck(&self, cutoff: DateTime) -> Result<u64> {
        let result = self
            .prompts
            .update_many(
                doc! {
                    "processing": true,
                    "processed": false,
                    "processed_at": { "$lt": cutoff },
                },
                doc! {
                    "$set": { "processing": false },
                    "$unset": { "response_id": "", "processed_at": "" },
                },
            )
            .await
            .map_err(from_mongo)?;
        Ok(result.modified_count)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ResponseSink for MongoStores {
    async fn init(&self, response_id: ObjectId, user_id: &str) -> Result<()> {
        self.responses
            .update_one(
                doc! { "_id": response_id },
                doc! { "$set": {
                    "user_id": user_id,
                    "tokens": Bson::Array(vec![]),
                    "complete": false,
                    "error": Bson::Null,
                    "updated_at": DateTime::now(),
                }},
            )
            .upsert(true)
            .await
            .map_err(from_mongo)?;
        Ok(())
    }

    async fn append_fragment(&self, response_id: ObjectId, text: &str) -> Result<()> {
        // The `complete: false` filter makes the terminal state absorbing at
        // the store level, not just by consumer discipline.
        self.responses
            .update_one(
                doc! { "_id": response_id, "complete": false },
                doc! {
                    "$push": { "tokens": text },
                    "$set": { "updated_at": DateTime::now() },
                },
            )
            .await
            .map_err(from_mongo)?;
        Ok(())
    }

    async fn complete(&self, response_id: ObjectId, full_response: &str) -> Result<()> {
        self.responses
            .update_one(
                doc! { "_id": response_id },
                doc! { "$set": {
                    "complete": true,
                    "full_response": full_response,
                    "updated_at": DateTime::now(),
                }},
            )
            .await
            .map_err(from_mongo)?;
        Ok(())
    }

    async fn fail(&self, response_id: ObjectId, error: &str) -> Result<()> {
        self.responses
            .update_one(
                doc! { "_id": response_id },
                doc! { "$set": {
                    "error": error,
                    "complete": true,
                    "updated_at": DateTime::now(),
                }},
            )
            .upsert(true)
            .await
            .map_err(from_mongo)?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl HistoryStore for MongoStores {
    async fn read(&self, user_id: &str) -> Result<Vec<HistoryTurn>> {
        let doc = self
            .history
            .find_one(doc! { "user_id": user_id })
            .await
            .map_err(from_mongo)?;
        Ok(doc.map(|d| d.messages).unwrap_or_default())
    }

    async fn replace(&self, user_id: &str, turns: &[HistoryTurn]) -> Result<()> {
        let messages = bson::to_bson(turns).map_err(|e| Error::Store(e.to_string()))?;
        self.history
            .update_one(
                doc! { "user_id": user_id },
                doc! { "$set": { "messages": messages } },
            )
            .upsert(true)
            .await
            .map_err(from_mongo)?;
        Ok(())
    }
}
