use config::Config;
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub endpoint: String,
    pub model_id: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    /// Minimum spacing between outbound model calls, process-wide.
    pub min_request_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
    /// Email bodies are truncated to this many characters before they are
    /// embedded in a prompt, to cap token usage.
    pub max_body_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    pub default_max_results: u32,
    pub default_query: String,
    pub max_body_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseConfig {
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub prompt: PromptConfig,
    pub gmail: GmailConfig,
    pub firebase: FirebaseConfig,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\nDatabase: {:?}\nApi: {:?}\nPrompt: {:?}\nGmail: {:?}\nFirebase project: {}",
            self.database, self.api, self.prompt, self.gmail, self.firebase.project_id,
        )
    }
}

lazy_static! {
    pub static ref cfg: ServerConfig = {
        let root = env::var("APP_DIR").unwrap_or_else(|_| {
            let dir =
                env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
            Path::new(&dir).join("config").display().to_string()
        });
        let path = format!("{root}/config.toml");
        let mut config: ServerConfig = Config::builder()
            .add_source(config::File::with_name(&path))
            .build()
            .expect("config.toml is required")
            .try_deserialize()
            .expect("config.toml is invalid");

        if let Ok(project_id) = env::var("FIREBASE_PROJECT_ID") {
            config.firebase.project_id = project_id;
        }

        config
    };
}
