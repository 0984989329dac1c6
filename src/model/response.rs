use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    chat::{ChatTurn, TurnRole},
    mail::Mail,
    user::User,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
    pub id: String,
    pub firebase_uid: String,
    pub name: String,
    pub email: String,
    pub profile_pic: String,
}

impl From<User> for ApiUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            firebase_uid: user.firebase_uid,
            name: user.name,
            email: user.email,
            profile_pic: user.profile_pic,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiMail {
    pub id: String,
    pub mail_id: String,
    pub from_address: String,
    pub subject: String,
    pub body: String,
    pub summary: String,
    pub received_at: DateTime<Utc>,
}

impl From<Mail> for ApiMail {
    fn from(mail: Mail) -> Self {
        Self {
            id: mail.id.map(|id| id.to_hex()).unwrap_or_default(),
            mail_id: mail.mail_id,
            from_address: mail.from_address,
            subject: mail.subject,
            body: mail.body,
            summary: mail.summary,
            received_at: mail.received_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatTurn> for ApiTurn {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
            timestamp: turn.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthUserResponse {
    pub success: bool,
    pub user: ApiUser,
}

#[derive(Debug, Serialize)]
pub struct MailListResponse {
    pub success: bool,
    pub count: usize,
    pub mails: Vec<ApiMail>,
}

#[derive(Debug, Serialize)]
pub struct MailResponse {
    pub success: bool,
    pub mail: ApiMail,
}

#[derive(Debug, Serialize)]
pub struct FetchMailsResponse {
    pub success: bool,
    pub fetched: usize,
    pub saved: usize,
    pub skipped: usize,
    pub mails: Vec<ApiMail>,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub success: bool,
    pub message: String,
    pub mail: ApiMail,
}

#[derive(Debug, Serialize)]
pub struct DeleteMailResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ActionItemsResponse {
    pub success: bool,
    pub actions: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ReplySuggestionsResponse {
    pub success: bool,
    pub suggestions: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub mail_id: String,
    pub messages: Vec<ApiTurn>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub chat_id: String,
    pub user_message: String,
    pub ai_response: String,
    pub messages: Vec<ApiTurn>,
}
