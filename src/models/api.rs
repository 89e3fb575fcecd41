use serde::{ Serialize, Deserialize };

use crate::llm::chat::VectorStoreInfo;

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Serialize, Debug)]
pub struct StoresResponse {
    pub stores: Vec<VectorStoreInfo>,
}

#[derive(Deserialize, Debug)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct RagSubmitForm {
    pub message: String,
    pub vector_store_id: String,
    pub session_mode: Option<String>,
    pub max_results: Option<u32>,
}
