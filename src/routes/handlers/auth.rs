use axum::{extract::State, Json};
use mongodb::Database;
use serde::Deserialize;

use crate::{
    auth::{CurrentUser, FirebaseClaims},
    error::{AppError, AppJsonResult},
    model::{
        response::AuthUserResponse,
        user::{LoginProfile, UserCtrl},
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub google_access_token: Option<String>,
    #[serde(default)]
    pub google_refresh_token: Option<String>,
}

/// Upserts the local account for a verified identity. Identity fields come
/// from the token, never the request body; the body only supplies profile
/// data and Google tokens.
pub async fn verify(
    claims: FirebaseClaims,
    State(db): State<Database>,
    Json(request): Json<VerifyUserRequest>,
) -> AppJsonResult<AuthUserResponse> {
    let email = claims
        .email
        .clone()
        .ok_or_else(|| AppError::BadRequest("Token has no email".to_string()))?;

    let profile = LoginProfile {
        firebase_uid: claims.sub.clone(),
        email,
        name: request.name.or_else(|| claims.display_name()),
        profile_pic: request.profile_pic,
        google_access_token: request.google_access_token,
        google_refresh_token: request.google_refresh_token,
    };

    let user = UserCtrl::upsert_from_login(&db, profile).await?;

    Ok(Json(AuthUserResponse {
        success: true,
        user: user.into(),
    }))
}

pub async fn me(CurrentUser(user): CurrentUser) -> AppJsonResult<AuthUserResponse> {
    Ok(Json(AuthUserResponse {
        success: true,
        user: user.into(),
    }))
}
