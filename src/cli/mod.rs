use clap::{ Parser, ValueEnum };
use std::fmt;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Development,
    Testing,
    Production,
}

impl DeploymentMode {
    /// Whether raw error details may be shown to the browser.
    pub fn exposes_errors(&self) -> bool {
        !matches!(self, DeploymentMode::Production)
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentMode::Development => "development",
            DeploymentMode::Testing => "testing",
            DeploymentMode::Production => "production",
        };
        write!(f, "{}", name)
    }
}

pub const DEFAULT_SECRET_KEY: &str = "hard-to-guess-string";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- General App Args ---
    /// Deployment mode (development, testing, production)
    #[arg(long, env = "APP_ENV", value_enum, default_value = "development")]
    pub mode: DeploymentMode,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:5000")]
    pub server_addr: String,

    /// Key used to sign session cookies.
    #[arg(long, env = "SECRET_KEY", default_value = DEFAULT_SECRET_KEY, hide_env_values = true)]
    pub secret_key: String,

    /// Lifetime of a login session in hours.
    #[arg(long, env = "SESSION_TTL_HOURS", default_value = "24")]
    pub session_ttl_hours: i64,

    // --- Persistence Args ---
    /// SQLite connection string for users and chat history.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://chatbridge.db?mode=rwc")]
    pub database_url: String,

    /// Number of past questions shown in the history pane.
    #[arg(long, env = "HISTORY_LIMIT", default_value = "20")]
    pub history_limit: i64,

    /// Offset from UTC, in hours, used when rendering history timestamps.
    #[arg(long, env = "DISPLAY_UTC_OFFSET_HOURS", default_value = "9", allow_hyphen_values = true)]
    pub display_utc_offset_hours: i32,

    // --- Chat LLM Provider Args ---
    /// API key for the upstream model provider. Falls back to --api-key-file.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Mounted secret file holding the API key.
    #[arg(long, env = "OPENAI_API_KEY_FILE", default_value = "/run/secrets/openai_api_key")]
    pub api_key_file: String,

    /// Base URL for the Responses API.
    #[arg(long, env = "CHAT_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub chat_base_url: String,

    /// Model name used for every upstream call.
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4.1")]
    pub chat_model: String,

    /// Timeout in seconds for a single upstream call.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "300")]
    pub upstream_timeout_secs: u64,

    /// Number of top matches requested from a vector store search.
    #[arg(long, env = "RAG_MAX_RESULTS", default_value = "3")]
    pub rag_max_results: u32,

    // --- Upload Args ---
    /// Maximum accepted request size in bytes.
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "5242880")]
    pub max_upload_bytes: usize,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
