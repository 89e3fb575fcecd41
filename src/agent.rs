use crate::conversation::{ ConversationTracker, SessionMode, UserId };
use crate::history::HistoryStore;
use crate::llm::chat::{ Attachment, ModelReply, ResponsesClient, UpstreamError, VectorStoreInfo };
use crate::rag::{ self, RagQueryArgs };

use log::{ info, warn, error };
use std::sync::Arc;

/// Which upstream request a submission turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    WebSearch,
    Document,
    Image,
}

impl CallShape {
    pub fn classify(file: Option<&Attachment>) -> Self {
        match file {
            None => CallShape::WebSearch,
            Some(f) if f.content_type == "application/pdf" => CallShape::Document,
            Some(f) if f.content_type.starts_with("image/") => CallShape::Image,
            // Any other upload is sent as a generic file.
            Some(_) => CallShape::Document,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub text: String,
    pub file: Option<Attachment>,
    pub mode: SessionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Generated,
    UpstreamFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
    pub outcome: ReplyOutcome,
}

impl AgentReply {
    fn failed(err: &UpstreamError) -> Self {
        Self {
            text: format!("API error occurred<br>\n{}", err),
            outcome: ReplyOutcome::UpstreamFailed,
        }
    }
}

#[derive(Clone)]
pub struct ChatAgent {
    client: Arc<dyn ResponsesClient>,
    tracker: Arc<ConversationTracker>,
    history_store: Arc<dyn HistoryStore>,
    rag_default_limit: u32,
}

impl ChatAgent {
    pub fn new(
        client: Arc<dyn ResponsesClient>,
        history_store: Arc<dyn HistoryStore>,
        rag_default_limit: u32
    ) -> Self {
        info!(
            "Chat agent configured: Model={}, BaseURL={}",
            client.get_model(),
            client.get_base_url().as_deref().unwrap_or("adapter default")
        );
        Self {
            client,
            tracker: Arc::new(ConversationTracker::new()),
            history_store,
            rag_default_limit,
        }
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history_store
    }

    pub fn tracker(&self) -> &ConversationTracker {
        &self.tracker
    }

    /// Routes a submission to its call shape, chains it onto the user's
    /// conversation and records the exchange when a reply was generated.
    pub async fn respond(&self, user: UserId, submission: Submission) -> AgentReply {
        let previous = self.tracker.begin(user, submission.mode).await;
        let shape = CallShape::classify(submission.file.as_ref());
        info!(
            "Dispatching {:?} for user {} (mode={:?}, chained={})",
            shape,
            user,
            submission.mode,
            previous.is_some()
        );

        let text = submission.text.as_str();
        let previous = previous.as_deref();
        let result = match (shape, submission.file.as_ref()) {
            (CallShape::Image, Some(file)) => self.client.image(text, file, previous).await,
            (CallShape::Document, Some(file)) => self.client.document(text, file, previous).await,
            _ => self.client.web_search(text, previous).await,
        };

        self.finish(user, text, result.map(|reply| {
            let rendered = reply.text.clone();
            (reply, rendered)
        })).await
    }

    /// Answers from a single vector store, listing the cited source files.
    pub async fn respond_from_store(
        &self,
        user: UserId,
        query: RagQueryArgs,
        mode: SessionMode
    ) -> AgentReply {
        let previous = self.tracker.begin(user, mode).await;
        let limit = query.limit.unwrap_or(self.rag_default_limit).clamp(1, rag::MAX_RESULTS_CAP);
        info!(
            "Dispatching file search on {} for user {} (limit={}, chained={})",
            query.vector_store_id,
            user,
            limit,
            previous.is_some()
        );

        let result = self.client.file_search(
            &query.query,
            &query.vector_store_id,
            limit,
            previous.as_deref()
        ).await;

        self.finish(user, &query.query, result.map(|reply| {
            let rendered = rag::with_citations(&reply.text, &reply.citations);
            (reply, rendered)
        })).await
    }

    pub async fn vector_stores(&self) -> Result<Vec<VectorStoreInfo>, UpstreamError> {
        self.client.list_vector_stores().await
    }

    pub async fn end_conversation(&self, user: UserId) {
        self.tracker.reset(user).await;
    }

    async fn finish(
        &self,
        user: UserId,
        question: &str,
        result: Result<(ModelReply, String), UpstreamError>
    ) -> AgentReply {
        let (reply, rendered) = match result {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Upstream call failed for user {}: {}", user, e);
                return AgentReply::failed(&e);
            }
        };

        self.tracker.set(user, reply.id).await;

        if let Err(e) = self.history_store.record_exchange(user, question, &rendered).await {
            error!("Failed to persist exchange for user {}; turn dropped from history: {}", user, e);
        }

        AgentReply {
            text: rendered,
            outcome: ReplyOutcome::Generated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        shape: &'static str,
        previous: Option<String>,
    }

    #[derive(Default)]
    struct FakeClient {
        calls: Mutex<Vec<Call>>,
        fail: bool,
        citations: Vec<String>,
        limits: Mutex<Vec<u32>>,
    }

    impl FakeClient {
        fn reply(&self, shape: &'static str, previous: Option<&str>) -> Result<ModelReply, UpstreamError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call { shape, previous: previous.map(str::to_string) });
            if self.fail {
                return Err(UpstreamError::Api { status: 500, message: "boom".into() });
            }
            Ok(ModelReply {
                id: format!("resp_{}", calls.len()),
                text: format!("{} reply", shape),
                citations: self.citations.clone(),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResponsesClient for FakeClient {
        async fn web_search(&self, _: &str, previous: Option<&str>) -> Result<ModelReply, UpstreamError> {
            self.reply("web_search", previous)
        }
        async fn document(&self, _: &str, _: &Attachment, previous: Option<&str>) -> Result<ModelReply, UpstreamError> {
            self.reply("document", previous)
        }
        async fn image(&self, _: &str, _: &Attachment, previous: Option<&str>) -> Result<ModelReply, UpstreamError> {
            self.reply("image", previous)
        }
        async fn file_search(&self, _: &str, _: &str, max_results: u32, previous: Option<&str>) -> Result<ModelReply, UpstreamError> {
            self.limits.lock().unwrap().push(max_results);
            self.reply("file_search", previous)
        }
        async fn list_vector_stores(&self) -> Result<Vec<VectorStoreInfo>, UpstreamError> {
            Ok(Vec::new())
        }
        fn get_model(&self) -> String {
            "fake".into()
        }
        fn get_base_url(&self) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct MemoryHistory {
        exchanges: Mutex<Vec<(i64, String, String)>>,
    }

    #[async_trait]
    impl HistoryStore for MemoryHistory {
        async fn record(&self, _: i64, _: &str, _: bool) -> Result<i64, sqlx::Error> {
            Ok(0)
        }
        async fn record_exchange(&self, user_id: i64, q: &str, a: &str) -> Result<(), sqlx::Error> {
            self.exchanges.lock().unwrap().push((user_id, q.into(), a.into()));
            Ok(())
        }
        async fn recent(&self, _: i64, _: i64) -> Result<Vec<ChatRecord>, sqlx::Error> {
            Ok(Vec::new())
        }
        async fn answer_for(&self, _: i64, _: i64) -> Result<Option<ChatRecord>, sqlx::Error> {
            Ok(None)
        }
    }

    fn file(content_type: &str) -> Attachment {
        Attachment { filename: "f".into(), content_type: content_type.into(), data: vec![0] }
    }

    fn submission(file: Option<Attachment>, mode: SessionMode) -> Submission {
        Submission { text: "question".into(), file, mode }
    }

    fn agent(client: Arc<FakeClient>, history: Arc<MemoryHistory>) -> ChatAgent {
        ChatAgent::new(client, history, 3)
    }

    #[test]
    fn classification_by_content_type() {
        assert_eq!(CallShape::classify(None), CallShape::WebSearch);
        assert_eq!(CallShape::classify(Some(&file("application/pdf"))), CallShape::Document);
        assert_eq!(CallShape::classify(Some(&file("image/png"))), CallShape::Image);
        assert_eq!(CallShape::classify(Some(&file("image/gif"))), CallShape::Image);
        assert_eq!(CallShape::classify(Some(&file("application/octet-stream"))), CallShape::Document);
        assert_eq!(CallShape::classify(Some(&file("text/plain"))), CallShape::Document);
    }

    #[tokio::test]
    async fn continue_mode_chains_onto_previous_response() {
        let client = Arc::new(FakeClient::default());
        let history = Arc::new(MemoryHistory::default());
        let agent = agent(client.clone(), history.clone());

        agent.respond(1, submission(None, SessionMode::Continue)).await;
        agent.respond(1, submission(Some(file("image/jpeg")), SessionMode::Continue)).await;

        let calls = client.calls();
        assert_eq!(calls[0], Call { shape: "web_search", previous: None });
        assert_eq!(calls[1], Call { shape: "image", previous: Some("resp_1".into()) });
        assert_eq!(history.exchanges.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn new_mode_drops_previous_response() {
        let client = Arc::new(FakeClient::default());
        let agent = agent(client.clone(), Arc::new(MemoryHistory::default()));

        agent.respond(1, submission(None, SessionMode::Continue)).await;
        agent.respond(1, submission(Some(file("application/pdf")), SessionMode::New)).await;

        let calls = client.calls();
        assert_eq!(calls[1], Call { shape: "document", previous: None });
        assert_eq!(agent.tracker().get(1).await.as_deref(), Some("resp_2"));
    }

    #[tokio::test]
    async fn conversations_are_per_user() {
        let client = Arc::new(FakeClient::default());
        let agent = agent(client.clone(), Arc::new(MemoryHistory::default()));

        agent.respond(1, submission(None, SessionMode::Continue)).await;
        agent.respond(2, submission(None, SessionMode::Continue)).await;

        assert_eq!(client.calls()[1].previous, None);
    }

    #[tokio::test]
    async fn upstream_failure_becomes_reply_and_skips_history() {
        let client = Arc::new(FakeClient { fail: true, ..Default::default() });
        let history = Arc::new(MemoryHistory::default());
        let agent = agent(client, history.clone());
        agent.tracker().set(1, "resp_keep").await;

        let reply = agent.respond(1, submission(None, SessionMode::Continue)).await;

        assert_eq!(reply.outcome, ReplyOutcome::UpstreamFailed);
        assert!(reply.text.starts_with("API error occurred<br>\n"));
        assert!(reply.text.contains("boom"));
        assert!(history.exchanges.lock().unwrap().is_empty());
        assert_eq!(agent.tracker().get(1).await.as_deref(), Some("resp_keep"));
    }

    #[tokio::test]
    async fn store_answers_list_citations() {
        let client = Arc::new(FakeClient {
            citations: vec!["guide.pdf".into()],
            ..Default::default()
        });
        let history = Arc::new(MemoryHistory::default());
        let agent = agent(client.clone(), history.clone());

        let query = RagQueryArgs { query: "how?".into(), vector_store_id: "vs_1".into(), limit: None };
        let reply = agent.respond_from_store(1, query, SessionMode::New).await;

        assert_eq!(reply.text, "file_search reply\n***\nAnswer based on: guide.pdf");
        let saved = history.exchanges.lock().unwrap();
        assert_eq!(saved[0], (1, "how?".to_string(), reply.text.clone()));
    }

    #[tokio::test]
    async fn store_result_limit_defaults_and_is_capped() {
        let client = Arc::new(FakeClient::default());
        let agent = agent(client.clone(), Arc::new(MemoryHistory::default()));

        for limit in [None, Some(8), Some(500), Some(0)] {
            let query = RagQueryArgs { query: "q".into(), vector_store_id: "vs_1".into(), limit };
            agent.respond_from_store(1, query, SessionMode::New).await;
        }

        assert_eq!(*client.limits.lock().unwrap(), vec![3, 8, 50, 1]);
    }
}
