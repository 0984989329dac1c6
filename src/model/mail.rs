use bson::{doc, oid::ObjectId, Bson};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{options::ReturnDocument, Collection, Database};
use serde::{Deserialize, Serialize};

use crate::{
    email::client::FetchedEmail,
    error::{AppError, AppResult},
};

/// A stored email. Immutable once fetched, except for `summary`, which is
/// written once with the serialized analysis result (empty string until
/// then).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mail {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    /// Provider-side message id, unique per mailbox.
    pub mail_id: String,
    pub from_address: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub summary: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub received_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Mail {
    pub fn has_summary(&self) -> bool {
        !self.summary.trim().is_empty()
    }
}

pub struct MailCtrl;

impl MailCtrl {
    fn collection(db: &Database) -> Collection<Mail> {
        db.collection("mails")
    }

    pub async fn list_for_user(
        db: &Database,
        user_id: ObjectId,
        limit: i64,
    ) -> AppResult<Vec<Mail>> {
        let mails = Self::collection(db)
            .find(doc! { "user_id": user_id })
            .sort(doc! { "received_at": -1 })
            .limit(limit)
            .await?
            .try_collect()
            .await?;

        Ok(mails)
    }

    pub async fn find_for_user(
        db: &Database,
        user_id: ObjectId,
        mail_id: ObjectId,
    ) -> AppResult<Mail> {
        let mail = Self::collection(db)
            .find_one(doc! { "_id": mail_id, "user_id": user_id })
            .await?
            .ok_or(AppError::NotFound("Mail not found".to_string()))?;

        Ok(mail)
    }

    pub async fn exists_by_provider_id(db: &Database, provider_id: &str) -> AppResult<bool> {
        let existing = Self::collection(db)
            .find_one(doc! { "mail_id": provider_id })
            .await?;

        Ok(existing.is_some())
    }

    pub async fn insert_fetched(
        db: &Database,
        user_id: ObjectId,
        email: FetchedEmail,
    ) -> AppResult<Mail> {
        let mail = Mail {
            id: None,
            user_id,
            mail_id: email.external_id,
            from_address: email.from,
            subject: email.subject,
            body: email.body,
            summary: String::new(),
            received_at: email.received_at,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let insert_result = Self::collection(db).insert_one(&mail).await?;
        let id = insert_result.inserted_id.as_object_id();

        Ok(Mail { id, ..mail })
    }

    /// Writes the serialized analysis onto the mail and returns the updated
    /// document. Only already-normalized summaries reach this point.
    pub async fn set_summary(
        db: &Database,
        user_id: ObjectId,
        mail_id: ObjectId,
        summary: &str,
    ) -> AppResult<Mail> {
        let updated = Self::collection(db)
            .find_one_and_update(
                doc! { "_id": mail_id, "user_id": user_id },
                doc! { "$set": {
                    "summary": summary,
                    "updated_at": Bson::DateTime(bson::DateTime::now()),
                } },
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(AppError::NotFound("Mail not found".to_string()))?;

        Ok(updated)
    }

    pub async fn delete_for_user(
        db: &Database,
        user_id: ObjectId,
        mail_id: ObjectId,
    ) -> AppResult<()> {
        let result = Self::collection(db)
            .delete_one(doc! { "_id": mail_id, "user_id": user_id })
            .await?;

        if result.deleted_count == 0 {
            return Err(AppError::NotFound("Mail not found".to_string()));
        }

        Ok(())
    }
}
