pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod db;
pub mod history;
pub mod llm;
pub mod models;
pub mod rag;
pub mod server;

use agent::ChatAgent;
use auth::{ AuthService, SessionKeys };
use cli::{ Args, DeploymentMode, DEFAULT_SECRET_KEY };
use config::resolve_api_key;
use llm::LlmConfig;
use llm::chat::new_client;
use log::{ info, warn };
use server::{ AppSettings, AppState, Server };
use server::templates::Templates;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Deployment Mode: {}", args.mode);
    info!("Server Address: {}", args.server_addr);
    info!("Database URL: {}", args.database_url);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Upstream Timeout: {}s", args.upstream_timeout_secs);
    info!("Max Upload Bytes: {}", args.max_upload_bytes);
    info!("History Limit: {}", args.history_limit);
    info!("Display UTC Offset: {}h", args.display_utc_offset_hours);
    info!("RAG Max Results: {}", args.rag_max_results);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    if args.mode == DeploymentMode::Production && args.secret_key == DEFAULT_SECRET_KEY {
        warn!("SECRET_KEY is the built-in default; session cookies can be forged. Set SECRET_KEY.");
    }

    // No credential, no service.
    let api_key = resolve_api_key(args.api_key.as_deref(), &args.api_key_file)?;

    let pool = db::connect(&args.database_url).await?;
    let history_store = history::initialize_history_store(pool.clone());

    let llm_config = LlmConfig {
        api_key,
        model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
        timeout: Duration::from_secs(args.upstream_timeout_secs),
    };
    let client = new_client(&llm_config)?;
    let agent = Arc::new(ChatAgent::new(client, history_store, args.rag_max_results));

    let state = AppState {
        agent,
        auth: AuthService::new(pool),
        sessions: SessionKeys::new(&args.secret_key, args.session_ttl_hours),
        templates: Arc::new(Templates::load()?),
        settings: Arc::new(AppSettings::from_args(&args)?),
    };

    let server = Server::new(args.server_addr.clone(), state, args.clone());
    server.run().await?;

    Ok(())
}
