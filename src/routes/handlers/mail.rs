use axum::{
    extract::{Path, Query, State},
    Json,
};
use mongodb::Database;
use serde::Deserialize;

use crate::{
    auth::CurrentUser,
    email::client::GmailClient,
    error::{AppError, AppJsonResult},
    model::{
        mail::MailCtrl,
        response::{
            ActionItemsResponse, DeleteMailResponse, FetchMailsResponse, MailListResponse,
            MailResponse, ReplySuggestionsResponse, SummarizeResponse,
        },
    },
    prompt::{self, GeminiClient, SummarizeOutcome},
    server_config::cfg,
    HttpClient,
};

use super::parse_object_id;

const DEFAULT_LIST_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListMailsParams {
    pub limit: Option<i64>,
}

pub async fn get_all(
    CurrentUser(user): CurrentUser,
    State(db): State<Database>,
    Query(params): Query<ListMailsParams>,
) -> AppJsonResult<MailListResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
    let mails = MailCtrl::list_for_user(&db, user.object_id()?, limit).await?;

    Ok(Json(MailListResponse {
        success: true,
        count: mails.len(),
        mails: mails.into_iter().map(Into::into).collect(),
    }))
}

pub async fn get_by_id(
    CurrentUser(user): CurrentUser,
    State(db): State<Database>,
    Path(id): Path<String>,
) -> AppJsonResult<MailResponse> {
    let mail_id = parse_object_id(&id, "mail")?;
    let mail = MailCtrl::find_for_user(&db, user.object_id()?, mail_id).await?;

    Ok(Json(MailResponse {
        success: true,
        mail: mail.into(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMailsRequest {
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// Pulls messages from the user's mailbox and stores the ones not seen
/// before, keyed on the provider message id.
pub async fn fetch(
    CurrentUser(user): CurrentUser,
    State(db): State<Database>,
    State(http_client): State<HttpClient>,
    Json(request): Json<FetchMailsRequest>,
) -> AppJsonResult<FetchMailsResponse> {
    if user.google_access_token.is_empty() {
        return Err(AppError::BadRequest("Access token is required".to_string()));
    }

    let user_id = user.object_id()?;
    let max_results = request.max_results.unwrap_or(cfg.gmail.default_max_results);

    let client = GmailClient::new(http_client, user.google_access_token);
    let emails = client
        .fetch_messages(max_results, &cfg.gmail.default_query)
        .await?;

    let fetched = emails.len();
    let mut saved_mails = Vec::new();
    let mut skipped = 0usize;

    for email in emails {
        if MailCtrl::exists_by_provider_id(&db, &email.external_id).await? {
            skipped += 1;
            continue;
        }
        saved_mails.push(MailCtrl::insert_fetched(&db, user_id, email).await?);
    }

    tracing::info!(
        fetched,
        saved = saved_mails.len(),
        skipped,
        "Mailbox fetch for {}",
        user.email
    );

    Ok(Json(FetchMailsResponse {
        success: true,
        fetched,
        saved: saved_mails.len(),
        skipped,
        mails: saved_mails.into_iter().map(Into::into).collect(),
    }))
}

/// Analyzes the email unless a summary is already stored. The normalized
/// result is persisted before it is returned, and only on a fresh run.
pub async fn summarize(
    CurrentUser(user): CurrentUser,
    State(db): State<Database>,
    State(gemini): State<GeminiClient>,
    Path(id): Path<String>,
) -> AppJsonResult<SummarizeResponse> {
    let user_id = user.object_id()?;
    let mail_id = parse_object_id(&id, "mail")?;
    let mail = MailCtrl::find_for_user(&db, user_id, mail_id).await?;

    match prompt::summarize_email(&gemini, &mail).await? {
        SummarizeOutcome::Cached(_) => Ok(Json(SummarizeResponse {
            success: true,
            message: "Summary already exists".to_string(),
            mail: mail.into(),
        })),
        SummarizeOutcome::Fresh(summary) => {
            let updated = MailCtrl::set_summary(&db, user_id, mail_id, &summary).await?;

            Ok(Json(SummarizeResponse {
                success: true,
                message: "Email summarized successfully".to_string(),
                mail: updated.into(),
            }))
        }
    }
}

pub async fn action_items(
    CurrentUser(user): CurrentUser,
    State(db): State<Database>,
    State(gemini): State<GeminiClient>,
    Path(id): Path<String>,
) -> AppJsonResult<ActionItemsResponse> {
    let mail_id = parse_object_id(&id, "mail")?;
    let mail = MailCtrl::find_for_user(&db, user.object_id()?, mail_id).await?;

    let actions = prompt::extract_action_items(&gemini, &mail).await?;

    Ok(Json(ActionItemsResponse {
        success: true,
        actions,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplySuggestionsRequest {
    #[serde(default)]
    pub style: Option<String>,
}

pub async fn reply_suggestions(
    CurrentUser(user): CurrentUser,
    State(db): State<Database>,
    State(gemini): State<GeminiClient>,
    Path(id): Path<String>,
    Json(request): Json<ReplySuggestionsRequest>,
) -> AppJsonResult<ReplySuggestionsResponse> {
    let mail_id = parse_object_id(&id, "mail")?;
    let mail = MailCtrl::find_for_user(&db, user.object_id()?, mail_id).await?;

    let style = request.style.as_deref().unwrap_or("professional");
    let suggestions = prompt::reply_suggestions(&gemini, &mail, style).await?;

    Ok(Json(ReplySuggestionsResponse {
        success: true,
        suggestions,
    }))
}

pub async fn delete(
    CurrentUser(user): CurrentUser,
    State(db): State<Database>,
    Path(id): Path<String>,
) -> AppJsonResult<DeleteMailResponse> {
    let mail_id = parse_object_id(&id, "mail")?;
    MailCtrl::delete_for_user(&db, user.object_id()?, mail_id).await?;

    Ok(Json(DeleteMailResponse {
        success: true,
        message: "Mail deleted successfully".to_string(),
    }))
}
