use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::ServerState;

use super::handlers::{auth, chat, mail};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        // The original deployment served arbitrary app origins.
        let cors_layer = CorsLayer::permissive();

        Router::new()
            .route("/", get(handler_root))
            .route("/health", get(handler_health))
            .nest(
                "/api/auth",
                Router::new()
                    .route("/verify", post(auth::verify))
                    .route("/me", get(auth::me)),
            )
            .nest(
                "/api/mails",
                Router::new()
                    .route("/", get(mail::get_all))
                    .route("/fetch", post(mail::fetch))
                    .route("/summarize/:id", post(mail::summarize))
                    .route("/actions/:id", post(mail::action_items))
                    .route("/suggestions/:id", post(mail::reply_suggestions))
                    .route("/:id", get(mail::get_by_id).delete(mail::delete)),
            )
            .nest(
                "/api/chat",
                Router::new().route("/:mail_id", get(chat::history).post(chat::send_message)),
            )
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer)
            .with_state(state)
            .fallback(handler_404)
    }
}

async fn handler_root() -> impl IntoResponse {
    Json(json!({
        "message": "Mailbrief API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/api/auth",
            "mails": "/api/mails",
            "chat": "/api/chat",
        },
    }))
}

async fn handler_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}
