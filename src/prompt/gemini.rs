use std::env;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppResult, UpstreamError, UpstreamKind},
    rate_limiter::RateLimiter,
    server_config::cfg,
    HttpClient,
};

/// Seam over the generative model so services can be exercised with a
/// counting fake.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> AppResult<String>;
}

/// Client for Gemini's `generateContent` endpoint. Every call passes
/// through the shared rate limiter before it leaves the process.
#[derive(Clone)]
pub struct GeminiClient {
    http_client: HttpClient,
    rate_limiter: RateLimiter,
    api_key: String,
    model_id: String,
}

impl GeminiClient {
    pub fn new(
        http_client: HttpClient,
        rate_limiter: RateLimiter,
        api_key: String,
        model_id: String,
    ) -> Self {
        Self {
            http_client,
            rate_limiter,
            api_key,
            model_id,
        }
    }

    pub fn from_env(http_client: HttpClient) -> anyhow::Result<Self> {
        let api_key = env::var("GEMINI_API_KEY").context("GEMINI_API_KEY is not set")?;
        Ok(Self::new(
            http_client,
            RateLimiter::from_config(),
            api_key,
            cfg.api.model_id.clone(),
        ))
    }

    async fn generate_content(&self, prompt: &str) -> AppResult<String> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/{}:generateContent", cfg.api.endpoint, self.model_id);
        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "contents": [
                    { "parts": [ { "text": prompt } ] }
                ],
                "generationConfig": {
                    "temperature": cfg.api.temperature,
                    "maxOutputTokens": cfg.api.max_output_tokens,
                }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let api_error = response.json::<GenerateError>().await.ok();
            let (status_label, message) = match api_error {
                Some(err) => (err.error.status, err.error.message),
                None => (None, format!("Model API returned {status}")),
            };
            return Err(classify_model_error(status_label.as_deref(), &message).into());
        }

        let body: GenerateResponse = response.json().await?;
        extract_text(body).map_err(Into::into)
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        self.generate_content(prompt).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateError {
    error: GenerateErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GenerateErrorDetail {
    message: String,
    status: Option<String>,
}

fn extract_text(body: GenerateResponse) -> Result<String, UpstreamError> {
    if let Some(reason) = body
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(UpstreamError::new(
            UpstreamKind::SafetyBlocked,
            format!("Content blocked by safety filters: {reason}"),
        ));
    }

    let candidate = body.candidates.into_iter().next().ok_or_else(|| {
        UpstreamError::new(UpstreamKind::Other, "Model returned no candidates")
    })?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(UpstreamError::new(
            UpstreamKind::SafetyBlocked,
            "Content blocked by safety filters",
        ));
    }

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(UpstreamError::new(
            UpstreamKind::Other,
            "Model returned an empty response",
        ));
    }

    Ok(text)
}

/// Maps the provider's error signals onto the upstream taxonomy. The status
/// string is authoritative when present; the message is matched as a
/// fallback for proxies that rewrite the payload.
fn classify_model_error(status: Option<&str>, message: &str) -> UpstreamError {
    let kind = match status {
        Some("RESOURCE_EXHAUSTED") => UpstreamKind::QuotaExceeded,
        Some("UNAUTHENTICATED") => UpstreamKind::Auth,
        Some("PERMISSION_DENIED") => UpstreamKind::PermissionDenied,
        Some("DEADLINE_EXCEEDED") => UpstreamKind::DeadlineExceeded,
        _ => {
            if message.contains("quota") || message.contains("RESOURCE_EXHAUSTED") {
                UpstreamKind::QuotaExceeded
            } else if message.contains("API_KEY") || message.contains("UNAUTHENTICATED") {
                UpstreamKind::Auth
            } else if message.contains("PERMISSION_DENIED") {
                UpstreamKind::PermissionDenied
            } else if message.contains("safety") || message.contains("SAFETY") {
                UpstreamKind::SafetyBlocked
            } else if message.contains("DEADLINE_EXCEEDED") {
                UpstreamKind::DeadlineExceeded
            } else {
                UpstreamKind::Other
            }
        }
    };

    UpstreamError::new(kind, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_status_string() {
        assert_eq!(
            classify_model_error(Some("RESOURCE_EXHAUSTED"), "too many requests").kind,
            UpstreamKind::QuotaExceeded
        );
        assert_eq!(
            classify_model_error(Some("UNAUTHENTICATED"), "bad key").kind,
            UpstreamKind::Auth
        );
        assert_eq!(
            classify_model_error(Some("DEADLINE_EXCEEDED"), "timeout").kind,
            UpstreamKind::DeadlineExceeded
        );
    }

    #[test]
    fn classifies_by_message_when_status_missing() {
        assert_eq!(
            classify_model_error(None, "quota exceeded for project").kind,
            UpstreamKind::QuotaExceeded
        );
        assert_eq!(
            classify_model_error(None, "blocked for SAFETY reasons").kind,
            UpstreamKind::SafetyBlocked
        );
        assert_eq!(
            classify_model_error(None, "something else").kind,
            UpstreamKind::Other
        );
    }

    #[test]
    fn extracts_joined_candidate_text() {
        let body = GenerateResponse {
            candidates: vec![Candidate {
                content: Some(CandidateContent {
                    parts: vec![
                        CandidatePart {
                            text: Some("Hello ".to_string()),
                        },
                        CandidatePart {
                            text: Some("world".to_string()),
                        },
                    ],
                }),
                finish_reason: Some("STOP".to_string()),
            }],
            prompt_feedback: None,
        };

        assert_eq!(extract_text(body).unwrap(), "Hello world");
    }

    #[test]
    fn safety_block_surfaces_as_safety_kind() {
        let body = GenerateResponse {
            candidates: vec![],
            prompt_feedback: Some(PromptFeedback {
                block_reason: Some("SAFETY".to_string()),
            }),
        };

        let err = extract_text(body).unwrap_err();
        assert_eq!(err.kind, UpstreamKind::SafetyBlocked);
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let body = GenerateResponse {
            candidates: vec![],
            prompt_feedback: None,
        };
        assert_eq!(extract_text(body).unwrap_err().kind, UpstreamKind::Other);
    }
}
