use anyhow::Context;
use bson::{doc, oid::ObjectId, Bson};
use chrono::{DateTime, Utc};
use mongodb::{options::ReturnDocument, Collection, Database};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub firebase_uid: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub profile_pic: String,
    #[serde(default)]
    pub google_access_token: String,
    #[serde(default)]
    pub google_refresh_token: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn object_id(&self) -> AppResult<ObjectId> {
        Ok(self.id.context("Stored user is missing _id")?)
    }
}

/// Account fields supplied by the client on login, merged into the stored
/// user. Token fields are only written when present, so a login without
/// fresh Google tokens does not wipe the stored ones.
#[derive(Debug, Clone)]
pub struct LoginProfile {
    pub firebase_uid: String,
    pub email: String,
    pub name: Option<String>,
    pub profile_pic: Option<String>,
    pub google_access_token: Option<String>,
    pub google_refresh_token: Option<String>,
}

pub struct UserCtrl;

impl UserCtrl {
    fn collection(db: &Database) -> Collection<User> {
        db.collection("users")
    }

    pub async fn find_by_id(db: &Database, user_id: ObjectId) -> AppResult<User> {
        let user = Self::collection(db)
            .find_one(doc! { "_id": user_id })
            .await?
            .ok_or(AppError::NotFound("User not found".to_string()))?;

        Ok(user)
    }

    pub async fn find_by_firebase_uid(db: &Database, firebase_uid: &str) -> AppResult<Option<User>> {
        let user = Self::collection(db)
            .find_one(doc! { "firebase_uid": firebase_uid })
            .await?;

        Ok(user)
    }

    /// Find-or-create keyed on the unique email, updating profile fields
    /// and Google tokens on repeat logins.
    pub async fn upsert_from_login(db: &Database, profile: LoginProfile) -> AppResult<User> {
        let users = Self::collection(db);
        let now = Utc::now();

        if let Some(existing) = users.find_one(doc! { "email": &profile.email }).await? {
            let mut set = doc! { "updated_at": Bson::DateTime(bson::DateTime::from_chrono(now)) };
            if let Some(name) = profile.name {
                set.insert("name", name);
            }
            if let Some(profile_pic) = profile.profile_pic {
                set.insert("profile_pic", profile_pic);
            }
            if let Some(token) = profile.google_access_token {
                set.insert("google_access_token", token);
            }
            if let Some(token) = profile.google_refresh_token {
                set.insert("google_refresh_token", token);
            }

            let existing_id = existing.object_id()?;
            let updated = users
                .find_one_and_update(doc! { "_id": existing_id }, doc! { "$set": set })
                .return_document(ReturnDocument::After)
                .await?
                .ok_or(AppError::NotFound("User not found".to_string()))?;

            return Ok(updated);
        }

        let user = User {
            id: None,
            firebase_uid: profile.firebase_uid,
            name: profile.name.unwrap_or_else(|| profile.email.clone()),
            email: profile.email,
            profile_pic: profile.profile_pic.unwrap_or_default(),
            google_access_token: profile.google_access_token.unwrap_or_default(),
            google_refresh_token: profile.google_refresh_token.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let insert_result = users.insert_one(&user).await?;
        let user_id = insert_result
            .inserted_id
            .as_object_id()
            .context("Insert did not return an ObjectId")?;

        Self::find_by_id(db, user_id).await
    }
}
