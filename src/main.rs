mod auth;
mod email;
mod error;
mod model;
mod prompt;
mod rate_limiter;
mod routes;
mod server_config;

use std::{env, net::SocketAddr};

use anyhow::Context;
use auth::FirebaseAuth;
use axum::extract::FromRef;
use mimalloc::MiMalloc;
use mongodb::Database;
use prompt::GeminiClient;
use routes::AppRouter;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
struct ServerState {
    db: Database,
    http_client: HttpClient,
    gemini: GeminiClient,
    firebase: FirebaseAuth,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let mongo_uri = env::var("MONGODB_URI").context("MONGODB_URI is not set in .env file")?;
    let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
        .await
        .context("MongoDB connection failed")?;
    let db = mongo_client.database(&server_config::cfg.database.name);

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let firebase = FirebaseAuth::new(http_client.clone());
    let gemini = GeminiClient::from_env(http_client.clone())?;

    let state = ServerState {
        db,
        http_client,
        gemini,
        firebase,
    };

    let router = AppRouter::create(state);

    let port = env::var("PORT").unwrap_or("5000".to_string());
    let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>()?));
    tracing::info!("Mailbrief server running on http://{addr}");
    tracing::debug!("{}", *server_config::cfg);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Shutting down");
        },
        _ = terminate => {
            tracing::info!("Shutting down");
        },
    }
}
