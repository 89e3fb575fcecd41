/// `file_search` accepts between 1 and 50 results per call.
pub const MAX_RESULTS_CAP: u32 = 50;

#[derive(Debug, Clone)]
pub struct RagQueryArgs {
    pub query: String,
    pub vector_store_id: String,
    pub limit: Option<u32>,
}

/// Appends the list of source files a file-search answer was drawn from.
pub fn with_citations(text: &str, citations: &[String]) -> String {
    if citations.is_empty() {
        return text.to_string();
    }
    format!("{}\n***\nAnswer based on: {}", text, citations.join(", "))
}
