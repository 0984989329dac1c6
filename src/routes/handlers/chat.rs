use axum::{
    extract::{Path, State},
    Json,
};
use mongodb::Database;
use serde::Deserialize;

use bson::oid::ObjectId;

use crate::{
    auth::CurrentUser,
    error::{AppError, AppJsonResult, AppResult},
    model::{
        chat::{Chat, ChatCtrl, ChatTurn, TranscriptStore, TurnRole},
        mail::MailCtrl,
        response::{ChatHistoryResponse, SendMessageResponse},
    },
    prompt::{self, GeminiClient, TextModel},
};

use super::parse_object_id;

pub async fn history(
    CurrentUser(user): CurrentUser,
    State(db): State<Database>,
    Path(mail_id): Path<String>,
) -> AppJsonResult<ChatHistoryResponse> {
    let user_id = user.object_id()?;
    let mail_oid = parse_object_id(&mail_id, "mail")?;
    MailCtrl::find_for_user(&db, user_id, mail_oid).await?;

    let chat = ChatCtrl::find_by_mail(&db, user_id, mail_oid).await?;

    let response = match chat {
        Some(chat) => ChatHistoryResponse {
            success: true,
            chat_id: chat.id.map(|id| id.to_hex()),
            mail_id,
            messages: chat.messages.iter().map(Into::into).collect(),
        },
        None => ChatHistoryResponse {
            success: true,
            chat_id: None,
            mail_id,
            messages: vec![],
        },
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// One chat turn against the email's transcript. The user turn is persisted
/// before the model is invoked, so a failed model call never loses the
/// message; the AI turn is only appended on success.
pub async fn send_message(
    CurrentUser(user): CurrentUser,
    State(db): State<Database>,
    State(gemini): State<GeminiClient>,
    Path(mail_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> AppJsonResult<SendMessageResponse> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message is required".to_string()));
    }

    let user_id = user.object_id()?;
    let mail_oid = parse_object_id(&mail_id, "mail")?;
    let mail = MailCtrl::find_for_user(&db, user_id, mail_oid).await?;

    let chat = ChatCtrl::find_or_create(&db, user_id, mail_oid).await?;
    let chat_id = chat.object_id()?;

    let context = prompt::email_context(&mail);
    let (reply, chat) = run_chat_turn(&db, &gemini, chat_id, &context, message).await?;

    Ok(Json(SendMessageResponse {
        success: true,
        chat_id: chat_id.to_hex(),
        user_message: message.to_string(),
        ai_response: reply,
        messages: chat.messages.iter().map(Into::into).collect(),
    }))
}

/// Appends the user turn, replays the transcript through the model, and
/// appends the reply. The user turn is committed before the model call and
/// stays committed if that call fails.
async fn run_chat_turn<S, M>(
    store: &S,
    model: &M,
    chat_id: ObjectId,
    email_context: &str,
    message: &str,
) -> AppResult<(String, Chat)>
where
    S: TranscriptStore + ?Sized,
    M: TextModel + ?Sized,
{
    let user_turn = ChatTurn::now(TurnRole::User, message);
    let chat = store.push_turn(chat_id, &user_turn).await?;

    let reply = prompt::chat_reply(model, email_context, &chat.messages).await?;

    let ai_turn = ChatTurn::now(TurnRole::Ai, reply.clone());
    let chat = store.push_turn(chat_id, &ai_turn).await?;

    Ok((reply, chat))
}
