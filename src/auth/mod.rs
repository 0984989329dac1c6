pub mod firebase;

pub use firebase::{AuthError, FirebaseAuth, FirebaseClaims};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use mongodb::Database;

use crate::{
    error::AppError,
    model::user::{User, UserCtrl},
};

#[async_trait]
impl<S> FromRequestParts<S> for FirebaseClaims
where
    S: Send + Sync,
    FirebaseAuth: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingCredentials)?;

        let auth = FirebaseAuth::from_ref(state);
        let claims = auth.verify(bearer.token()).await?;

        Ok(claims)
    }
}

/// Verified token claims resolved to the stored user account.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    FirebaseAuth: FromRef<S>,
    Database: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = FirebaseClaims::from_request_parts(parts, state).await?;
        let db = Database::from_ref(state);

        let user = UserCtrl::find_by_firebase_uid(&db, &claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not registered".to_string()))?;

        Ok(CurrentUser(user))
    }
}
