use std::{collections::HashMap, sync::Arc};

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{server_config::cfg, HttpClient};

/// Google's public signing keys for Firebase ID tokens, in JWK form.
const JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    InvalidToken,
    KeyFetch(String),
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// Claims extracted from a verified Firebase ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl FirebaseClaims {
    /// Display name, falling back to the token email.
    pub fn display_name(&self) -> Option<String> {
        self.name.clone().or_else(|| self.email.clone())
    }
}

/// Verifies Firebase ID tokens (RS256) against Google's published JWKS.
///
/// Keys are cached by `kid`; an unknown `kid` triggers a refetch, which also
/// covers Google's key rotation.
#[derive(Clone)]
pub struct FirebaseAuth {
    http_client: HttpClient,
    project_id: String,
    keys: Arc<RwLock<HashMap<String, Jwk>>>,
}

impl FirebaseAuth {
    pub fn new(http_client: HttpClient) -> Self {
        Self {
            http_client,
            project_id: cfg.firebase.project_id.clone(),
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn verify(&self, token: &str) -> Result<FirebaseClaims, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| AuthError::InvalidToken)?;
        let kid = header.kid.ok_or(AuthError::InvalidToken)?;
        let jwk = self.key_for(&kid).await?;

        let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|_| AuthError::InvalidToken)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!(
            "https://securetoken.google.com/{}",
            self.project_id
        )]);

        let token_data = jsonwebtoken::decode::<FirebaseClaims>(token, &decoding_key, &validation)
            .map_err(|e| {
                tracing::error!("Error decoding Firebase token: {:?}", e);
                AuthError::InvalidToken
            })?;

        Ok(token_data.claims)
    }

    async fn key_for(&self, kid: &str) -> Result<Jwk, AuthError> {
        if let Some(jwk) = self.keys.read().await.get(kid) {
            return Ok(jwk.clone());
        }

        let jwk_set: JwkSet = self
            .http_client
            .get(JWKS_URL)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("Failed to fetch signing keys: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("Failed to parse signing keys: {e}")))?;

        let mut keys = self.keys.write().await;
        keys.clear();
        for jwk in jwk_set.keys {
            keys.insert(jwk.kid.clone(), jwk);
        }

        keys.get(kid).cloned().ok_or(AuthError::InvalidToken)
    }
}
