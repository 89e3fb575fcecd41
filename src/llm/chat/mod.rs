pub mod openai;

use async_trait::async_trait;
use base64::{ engine::general_purpose::STANDARD, Engine as _ };
use serde::Serialize;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

use self::openai::OpenAIResponsesClient;
use super::LlmConfig;

/// An uploaded file forwarded inline to the model.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, STANDARD.encode(&self.data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    /// Response identifier used to chain the next turn.
    pub id: String,
    pub text: String,
    /// Unique source filenames cited by a file search, in first-seen order.
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VectorStoreInfo {
    pub id: String,
    pub name: String,
    pub usage_bytes: u64,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("status {status}: {message}")]
    Api {
        status: u16,
        message: String,
    },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// The call shapes the chat front end issues against a Responses-style API.
/// Every shape optionally chains onto `previous` to continue a dialogue.
#[async_trait]
pub trait ResponsesClient: Send + Sync {
    /// Plain text turn with a mandatory web-search tool.
    async fn web_search(
        &self,
        text: &str,
        previous: Option<&str>
    ) -> Result<ModelReply, UpstreamError>;

    /// Text plus an inline document, with a mandatory web-search tool.
    async fn document(
        &self,
        text: &str,
        file: &Attachment,
        previous: Option<&str>
    ) -> Result<ModelReply, UpstreamError>;

    /// Text plus an inline image; tool use is left to the model.
    async fn image(
        &self,
        text: &str,
        file: &Attachment,
        previous: Option<&str>
    ) -> Result<ModelReply, UpstreamError>;

    /// Text answered from one named vector store.
    async fn file_search(
        &self,
        text: &str,
        vector_store_id: &str,
        max_results: u32,
        previous: Option<&str>
    ) -> Result<ModelReply, UpstreamError>;

    async fn list_vector_stores(&self) -> Result<Vec<VectorStoreInfo>, UpstreamError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ResponsesClient>, Box<dyn StdError + Send + Sync>> {
    let client = OpenAIResponsesClient::from_config(config)?;
    Ok(Arc::new(client))
}
