use anyhow::Context;
use async_trait::async_trait;
use bson::{doc, oid::ObjectId};
use chrono::{DateTime, Utc};
use mongodb::{options::ReturnDocument, Collection, Database};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Ai,
}

impl TurnRole {
    /// Label used when the turn is rendered into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            TurnRole::User => "User",
            TurnRole::Ai => "AI",
        }
    }
}

/// One message in a conversation. Turns are never edited or removed once
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn now(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The conversation transcript for one (user, mail) pair: an ordered,
/// append-only sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub mail_id: ObjectId,
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn object_id(&self) -> AppResult<ObjectId> {
        Ok(self.id.context("Stored chat is missing _id")?)
    }
}

/// Seam over turn persistence so conversation flows can be exercised with
/// an in-memory transcript.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn push_turn(&self, chat_id: ObjectId, turn: &ChatTurn) -> AppResult<Chat>;
}

#[async_trait]
impl TranscriptStore for Database {
    async fn push_turn(&self, chat_id: ObjectId, turn: &ChatTurn) -> AppResult<Chat> {
        ChatCtrl::push_turn(self, chat_id, turn).await
    }
}

pub struct ChatCtrl;

impl ChatCtrl {
    fn collection(db: &Database) -> Collection<Chat> {
        db.collection("chats")
    }

    pub async fn find_by_mail(
        db: &Database,
        user_id: ObjectId,
        mail_id: ObjectId,
    ) -> AppResult<Option<Chat>> {
        let chat = Self::collection(db)
            .find_one(doc! { "user_id": user_id, "mail_id": mail_id })
            .await?;

        Ok(chat)
    }

    /// Idempotent lookup: at most one chat exists per (user, mail) pair.
    /// Upserts atomically so concurrent first messages cannot create two.
    pub async fn find_or_create(
        db: &Database,
        user_id: ObjectId,
        mail_id: ObjectId,
    ) -> AppResult<Chat> {
        let now = bson::DateTime::now();
        let chat = Self::collection(db)
            .find_one_and_update(
                doc! { "user_id": user_id, "mail_id": mail_id },
                doc! { "$setOnInsert": {
                    "user_id": user_id,
                    "mail_id": mail_id,
                    "messages": [],
                    "created_at": now,
                    "updated_at": now,
                } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(AppError::NotFound("Chat not found".to_string()))?;

        Ok(chat)
    }

    /// Appends one turn and returns the updated chat. Append-only: existing
    /// turns are never touched. Two concurrent chats on the same mail may
    /// interleave their appends; both turns land, order follows commit
    /// order.
    pub async fn push_turn(db: &Database, chat_id: ObjectId, turn: &ChatTurn) -> AppResult<Chat> {
        let turn_bson = bson::to_bson(turn).context("Failed to serialize chat turn")?;

        let updated = Self::collection(db)
            .find_one_and_update(
                doc! { "_id": chat_id },
                doc! {
                    "$push": { "messages": turn_bson },
                    "$set": { "updated_at": bson::DateTime::now() },
                },
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(AppError::NotFound("Chat not found".to_string()))?;

        Ok(updated)
    }
}
