use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ Attachment, ModelReply, ResponsesClient, UpstreamError, VectorStoreInfo };
use crate::llm::LlmConfig;

pub struct OpenAIResponsesClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct ResponsesRequest<'a> {
    model: &'a str,
    input: ResponseInput<'a>,
    tools: Vec<Tool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<&'a str>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum ResponseInput<'a> {
    Text(&'a str),
    Messages(Vec<InputMessage<'a>>),
}

#[derive(Serialize, Debug)]
struct InputMessage<'a> {
    role: &'static str,
    content: Vec<InputContent<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputContent<'a> {
    InputFile {
        filename: &'a str,
        file_data: String,
    },
    InputImage {
        image_url: String,
    },
    InputText {
        text: &'a str,
    },
}

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tool<'a> {
    WebSearchPreview,
    FileSearch {
        vector_store_ids: Vec<&'a str>,
        max_num_results: u32,
    },
}

#[derive(Deserialize, Debug)]
pub(crate) struct ResponsesResponse {
    id: String,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentItem>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentItem {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Annotation>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Annotation {
    FileCitation {
        #[serde(default)]
        filename: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct VectorStoreList {
    data: Vec<VectorStoreEntry>,
}

#[derive(Deserialize)]
struct VectorStoreEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    usage_bytes: u64,
}

impl ResponsesResponse {
    /// Concatenation of every `output_text` part, matching the SDK's `output_text`.
    pub(crate) fn output_text(&self) -> String {
        let mut text = String::new();
        for item in &self.output {
            if let OutputItem::Message { content } = item {
                for part in content {
                    if let ContentItem::OutputText { text: t, .. } = part {
                        text.push_str(t);
                    }
                }
            }
        }
        text
    }

    pub(crate) fn cited_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for item in &self.output {
            let OutputItem::Message { content } = item else {
                continue;
            };
            for part in content {
                let ContentItem::OutputText { annotations, .. } = part else {
                    continue;
                };
                for annotation in annotations {
                    if let Annotation::FileCitation { filename: Some(name) } = annotation {
                        if !files.contains(name) {
                            files.push(name.clone());
                        }
                    }
                }
            }
        }
        files
    }

    pub(crate) fn into_reply(self) -> ModelReply {
        let text = self.output_text();
        let citations = self.cited_files();
        ModelReply {
            id: self.id,
            text,
            citations,
        }
    }
}

impl<'a> ResponsesRequest<'a> {
    pub(crate) fn web_search(model: &'a str, text: &'a str, previous: Option<&'a str>) -> Self {
        Self {
            model,
            input: ResponseInput::Text(text),
            tools: vec![Tool::WebSearchPreview],
            tool_choice: Some("required"),
            previous_response_id: previous,
        }
    }

    pub(crate) fn document(
        model: &'a str,
        text: &'a str,
        file: &'a Attachment,
        previous: Option<&'a str>
    ) -> Self {
        let content = vec![
            InputContent::InputFile {
                filename: &file.filename,
                file_data: file.data_url(),
            },
            InputContent::InputText { text }
        ];
        Self {
            model,
            input: ResponseInput::Messages(vec![InputMessage { role: "user", content }]),
            tools: vec![Tool::WebSearchPreview],
            tool_choice: Some("required"),
            previous_response_id: previous,
        }
    }

    pub(crate) fn image(
        model: &'a str,
        text: &'a str,
        file: &'a Attachment,
        previous: Option<&'a str>
    ) -> Self {
        let content = vec![
            InputContent::InputImage { image_url: file.data_url() },
            InputContent::InputText { text }
        ];
        Self {
            model,
            input: ResponseInput::Messages(vec![InputMessage { role: "user", content }]),
            tools: vec![Tool::WebSearchPreview],
            tool_choice: Some("auto"),
            previous_response_id: previous,
        }
    }

    pub(crate) fn file_search(
        model: &'a str,
        text: &'a str,
        vector_store_id: &'a str,
        max_results: u32,
        previous: Option<&'a str>
    ) -> Self {
        Self {
            model,
            input: ResponseInput::Text(text),
            tools: vec![Tool::FileSearch {
                vector_store_ids: vec![vector_store_id],
                max_num_results: max_results,
            }],
            tool_choice: None,
            previous_response_id: previous,
        }
    }
}

impl OpenAIResponsesClient {
    pub fn new(
        api_key: &str,
        model: String,
        base_url: String,
        timeout: std::time::Duration
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| format!("Invalid API key format: {}", e))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.api_key.trim().is_empty() {
            return Err("OpenAI API key is required".into());
        }
        Self::new(&config.api_key, config.model.clone(), config.base_url.clone(), config.timeout)
    }

    async fn create_response(
        &self,
        req: &ResponsesRequest<'_>
    ) -> Result<ModelReply, UpstreamError> {
        let url = format!("{}/responses", self.base_url);
        debug!(
            "POST {} (tools={}, chained={})",
            url,
            req.tools.len(),
            req.previous_response_id.is_some()
        );

        let resp = self.http.post(&url).json(req).send().await?;
        let resp = check_status(resp).await?;
        let body = resp.text().await?;
        let parsed: ResponsesResponse = serde_json
            ::from_str(&body)
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        info!("Upstream response {} received", parsed.id);
        Ok(parsed.into_reply())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json
        ::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);
    Err(UpstreamError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ResponsesClient for OpenAIResponsesClient {
    async fn web_search(
        &self,
        text: &str,
        previous: Option<&str>
    ) -> Result<ModelReply, UpstreamError> {
        self.create_response(&ResponsesRequest::web_search(&self.model, text, previous)).await
    }

    async fn document(
        &self,
        text: &str,
        file: &Attachment,
        previous: Option<&str>
    ) -> Result<ModelReply, UpstreamError> {
        self.create_response(&ResponsesRequest::document(&self.model, text, file, previous)).await
    }

    async fn image(
        &self,
        text: &str,
        file: &Attachment,
        previous: Option<&str>
    ) -> Result<ModelReply, UpstreamError> {
        self.create_response(&ResponsesRequest::image(&self.model, text, file, previous)).await
    }

    async fn file_search(
        &self,
        text: &str,
        vector_store_id: &str,
        max_results: u32,
        previous: Option<&str>
    ) -> Result<ModelReply, UpstreamError> {
        let req = ResponsesRequest::file_search(
            &self.model,
            text,
            vector_store_id,
            max_results,
            previous
        );
        self.create_response(&req).await
    }

    async fn list_vector_stores(&self) -> Result<Vec<VectorStoreInfo>, UpstreamError> {
        let url = format!("{}/vector_stores", self.base_url);
        let resp = self.http.get(&url).send().await?;
        let resp = check_status(resp).await?;
        let list = resp
            .json::<VectorStoreList>().await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        Ok(
            list.data
                .into_iter()
                .map(|vs| VectorStoreInfo {
                    name: vs.name.unwrap_or_default(),
                    id: vs.id,
                    usage_bytes: vs.usage_bytes,
                })
                .collect()
        )
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
