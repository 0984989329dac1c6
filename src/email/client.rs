use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::{
    error::{AppResult, UpstreamError, UpstreamKind},
    server_config::cfg,
    HttpClient,
};

macro_rules! gmail_url {
    ($($params:expr),*) => {
        {
            const GMAIL_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
            let parts = vec![$($params),*];
            format!("{}/{}", GMAIL_ENDPOINT, parts.join("/"))
        }
    };
}

/// One message pulled from the provider, already flattened to the fields
/// the rest of the system stores.
#[derive(Debug, Clone)]
pub struct FetchedEmail {
    pub external_id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    headers: Vec<Header>,
    mime_type: Option<String>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailApiError {
    error: GmailApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GmailApiErrorDetail {
    message: String,
}

static RE_HTML_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Thin client over the Gmail REST API, authenticated with the user's
/// stored OAuth access token.
#[derive(Debug, Clone)]
pub struct GmailClient {
    http_client: HttpClient,
    access_token: String,
}

impl GmailClient {
    pub fn new(http_client: HttpClient, access_token: String) -> Self {
        Self {
            http_client,
            access_token,
        }
    }

    /// Lists matching message ids, then fetches each message in full
    /// concurrently. Any single failure fails the whole fetch.
    pub async fn fetch_messages(
        &self,
        max_results: u32,
        query: &str,
    ) -> AppResult<Vec<FetchedEmail>> {
        let list: MessageList = self
            .send_json(self.http_client.get(gmail_url!("messages")).query(&[
                ("maxResults", max_results.to_string().as_str()),
                ("q", query),
            ]))
            .await?;

        let detail_futures = list
            .messages
            .iter()
            .map(|message| self.get_message(&message.id));

        join_all(detail_futures).await.into_iter().collect()
    }

    async fn get_message(&self, id: &str) -> AppResult<FetchedEmail> {
        let message: Message = self
            .send_json(
                self.http_client
                    .get(gmail_url!("messages", id))
                    .query(&[("format", "full")]),
            )
            .await?;

        Ok(parse_message(message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> AppResult<T> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = match response.json::<GmailApiError>().await {
                Ok(api_error) => api_error.error.message,
                Err(_) => format!("Gmail API returned {status}"),
            };
            return Err(classify_fetch_error(status, message).into());
        }

        Ok(response.json::<T>().await?)
    }
}

fn classify_fetch_error(status: StatusCode, message: String) -> UpstreamError {
    let kind = match status {
        StatusCode::UNAUTHORIZED => UpstreamKind::Auth,
        StatusCode::FORBIDDEN => UpstreamKind::PermissionDenied,
        StatusCode::TOO_MANY_REQUESTS => UpstreamKind::QuotaExceeded,
        _ => UpstreamKind::Other,
    };

    UpstreamError::new(kind, format!("Failed to fetch emails: {message}"))
}

fn parse_message(message: Message) -> FetchedEmail {
    let empty_headers = Vec::new();
    let headers = message
        .payload
        .as_ref()
        .map_or(&empty_headers, |payload| &payload.headers);

    let subject = header_value(headers, "Subject").unwrap_or("No Subject");
    let from = header_value(headers, "From").unwrap_or("Unknown");
    let received_at = header_value(headers, "Date")
        .and_then(|date| DateTime::parse_from_rfc2822(date).ok())
        .map(|date| date.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let body = message
        .payload
        .as_ref()
        .map(extract_body)
        .unwrap_or_default();

    FetchedEmail {
        external_id: message.id,
        from: from.to_string(),
        subject: subject.to_string(),
        body: sanitize_body(&body),
        received_at,
    }
}

fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.as_str())
}

/// Body text lives either directly on the payload or in the first
/// text/plain or text/html part.
fn extract_body(payload: &MessagePart) -> String {
    if let Some(data) = payload.body.as_ref().and_then(|body| body.data.as_deref()) {
        return decode_body(data);
    }

    payload
        .parts
        .iter()
        .find(|part| {
            matches!(
                part.mime_type.as_deref(),
                Some("text/plain") | Some("text/html")
            )
        })
        .and_then(|part| part.body.as_ref())
        .and_then(|body| body.data.as_deref())
        .map(decode_body)
        .unwrap_or_default()
}

fn decode_body(data: &str) -> String {
    general_purpose::URL_SAFE
        .decode(data)
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(data))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Strips markup and caps length before the body is stored.
fn sanitize_body(body: &str) -> String {
    let stripped = RE_HTML_TAGS.replace_all(body, "");
    let max_chars = cfg.gmail.max_body_chars;
    match stripped.char_indices().nth(max_chars) {
        Some((idx, _)) => stripped[..idx].to_string(),
        None => stripped.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(text: &str) -> String {
        general_purpose::URL_SAFE.encode(text)
    }

    fn message_with(headers: Vec<(&str, &str)>, body: &str) -> Message {
        Message {
            id: "m1".to_string(),
            payload: Some(MessagePart {
                headers: headers
                    .into_iter()
                    .map(|(name, value)| Header {
                        name: name.to_string(),
                        value: value.to_string(),
                    })
                    .collect(),
                mime_type: Some("text/plain".to_string()),
                body: Some(PartBody {
                    data: Some(encode(body)),
                }),
                parts: vec![],
            }),
        }
    }

    #[test]
    fn parses_headers_and_body() {
        let message = message_with(
            vec![
                ("Subject", "Invoice Due"),
                ("From", "billing@acme.com"),
                ("Date", "Fri, 21 Nov 2025 09:30:00 +0000"),
            ],
            "Please pay by Friday.",
        );

        let email = parse_message(message);
        assert_eq!(email.external_id, "m1");
        assert_eq!(email.subject, "Invoice Due");
        assert_eq!(email.from, "billing@acme.com");
        assert_eq!(email.body, "Please pay by Friday.");
        assert_eq!(email.received_at.to_rfc2822(), "Fri, 21 Nov 2025 09:30:00 +0000");
    }

    #[test]
    fn missing_headers_fall_back_to_defaults() {
        let email = parse_message(message_with(vec![], "hi"));
        assert_eq!(email.subject, "No Subject");
        assert_eq!(email.from, "Unknown");
    }

    #[test]
    fn body_found_in_nested_text_part() {
        let message = Message {
            id: "m2".to_string(),
            payload: Some(MessagePart {
                headers: vec![],
                mime_type: Some("multipart/alternative".to_string()),
                body: None,
                parts: vec![
                    MessagePart {
                        headers: vec![],
                        mime_type: Some("application/pdf".to_string()),
                        body: Some(PartBody { data: None }),
                        parts: vec![],
                    },
                    MessagePart {
                        headers: vec![],
                        mime_type: Some("text/plain".to_string()),
                        body: Some(PartBody {
                            data: Some(encode("nested body")),
                        }),
                        parts: vec![],
                    },
                ],
            }),
        };

        assert_eq!(parse_message(message).body, "nested body");
    }

    #[test]
    fn html_tags_are_stripped() {
        let email = parse_message(message_with(
            vec![],
            "<div><p>Hello <b>there</b></p></div>",
        ));
        assert_eq!(email.body, "Hello there");
    }

    #[test]
    fn unpadded_base64_decodes() {
        assert_eq!(decode_body("aGVsbG8"), "hello");
        assert_eq!(decode_body("aGVsbG8="), "hello");
    }

    #[test]
    fn fetch_errors_classify_by_status() {
        let err = classify_fetch_error(StatusCode::UNAUTHORIZED, "bad token".to_string());
        assert_eq!(err.kind, UpstreamKind::Auth);
        let err = classify_fetch_error(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string());
        assert_eq!(err.kind, UpstreamKind::QuotaExceeded);
        let err = classify_fetch_error(StatusCode::BAD_GATEWAY, "boom".to_string());
        assert_eq!(err.kind, UpstreamKind::Other);
    }
}
