//! Conversation state and the ask/summarize request cycle
//!
//! The controller owns the append-only message list and at most one
//! in-flight backend exchange. `loading` is simply "an exchange is
//! outstanding", so it cannot be left set once the exchange is settled.

use tokio::task::JoinHandle;

use crate::gateway::{AskResponse, BackendClient, GatewayResult, SummaryResponse};
use crate::state::ChatMessage;

pub const ASK_ERROR_TEXT: &str = "⚠️ Error fetching response. Please try again.";
pub const NO_ANSWER_TEXT: &str = "No answer found.";
pub const NO_SUMMARY_TEXT: &str = "No summary available.";
pub const SUMMARY_PROMPT: &str = "Summarize the uploaded documents";

enum Reply {
    Answer(AskResponse),
    Summary(SummaryResponse),
}

impl Reply {
    fn into_message(self) -> ChatMessage {
        match self {
            Reply::Answer(response) => {
                let text = response
                    .answer
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| NO_ANSWER_TEXT.to_string());
                ChatMessage::assistant(text, response.sources.unwrap_or_default())
            }
            Reply::Summary(response) => {
                let text = response
                    .summary
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| NO_SUMMARY_TEXT.to_string());
                ChatMessage::assistant(text, Vec::new())
            }
        }
    }
}

pub struct ConversationController {
    client: BackendClient,
    messages: Vec<ChatMessage>,
    task: Option<JoinHandle<GatewayResult<Reply>>>,
    revision: u64,
    last_failed: bool,
}

impl ConversationController {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            messages: Vec::new(),
            task: None,
            revision: 0,
            last_failed: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.task.is_some()
    }

    /// Bumped whenever the message list or the loading flag changes
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the most recently settled exchange ended in the error reply
    pub fn last_exchange_failed(&self) -> bool {
        self.last_failed
    }

    pub fn can_submit(&self, text: &str, upload_in_flight: bool) -> bool {
        !text.trim().is_empty() && !self.is_loading() && !upload_in_flight
    }

    /// Append the question and start the ask exchange.
    ///
    /// Returns false without touching any state if the text is blank or
    /// another exchange (ask or upload) is still running.
    pub fn submit_question(&mut self, text: &str, upload_in_flight: bool) -> bool {
        if !self.can_submit(text, upload_in_flight) {
            return false;
        }

        self.push(ChatMessage::user(text));

        let client = self.client.clone();
        let question = text.to_string();
        self.task = Some(tokio::spawn(async move {
            client.ask(&question).await.map(Reply::Answer)
        }));
        tracing::info!(chars = text.chars().count(), "question submitted");
        true
    }

    /// Ask the backend for a summary of every indexed document.
    pub fn request_summary(&mut self, upload_in_flight: bool) -> bool {
        if !self.can_submit(SUMMARY_PROMPT, upload_in_flight) {
            return false;
        }

        self.push(ChatMessage::user(SUMMARY_PROMPT));

        let client = self.client.clone();
        self.task = Some(tokio::spawn(async move {
            client.summarize().await.map(Reply::Summary)
        }));
        tracing::info!("summary requested");
        true
    }

    /// Finalize the exchange if its task has already finished.
    pub async fn poll(&mut self) -> bool {
        match &self.task {
            Some(task) if task.is_finished() => self.settle().await,
            _ => false,
        }
    }

    /// Wait for the outstanding exchange and append its reply.
    pub async fn settle(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };

        let message = match task.await {
            Ok(Ok(reply)) => {
                self.last_failed = false;
                reply.into_message()
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "ask exchange failed");
                self.last_failed = true;
                ChatMessage::assistant(ASK_ERROR_TEXT, Vec::new())
            }
            Err(err) => {
                tracing::warn!(error = %err, "ask task did not complete");
                self.last_failed = true;
                ChatMessage::assistant(ASK_ERROR_TEXT, Vec::new())
            }
        };

        self.push(message);
        true
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.revision += 1;
    }
}

impl Drop for ConversationController {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ChatRole, Citation};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn controller_for(server: &MockServer) -> ConversationController {
        let client = BackendClient::new(&server.uri(), "/upload-pdf", Duration::from_secs(5)).unwrap();
        ConversationController::new(client)
    }

    #[tokio::test]
    async fn answer_with_citation_is_appended() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "Within 30 days.",
                "sources": [{ "filename": "refund.pdf", "page": 2 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        assert!(convo.submit_question("What is the refund policy?", false));

        // User message is visible before the reply lands
        assert_eq!(convo.messages().len(), 1);
        assert_eq!(convo.messages()[0].role, ChatRole::User);
        assert!(convo.is_loading());

        assert!(convo.settle().await);
        assert!(!convo.is_loading());
        assert_eq!(convo.messages().len(), 2);

        let reply = &convo.messages()[1];
        assert_eq!(reply.role, ChatRole::Assistant);
        assert_eq!(reply.text, "Within 30 days.");
        assert_eq!(reply.sources, vec![Citation::new("refund.pdf", 2)]);
        assert!(!convo.last_exchange_failed());
    }

    #[tokio::test]
    async fn missing_answer_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        convo.submit_question("hello", false);
        convo.settle().await;

        let reply = &convo.messages()[1];
        assert_eq!(reply.text, NO_ANSWER_TEXT);
        assert!(reply.sources.is_empty());
    }

    #[tokio::test]
    async fn server_error_appends_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        convo.submit_question("anything", false);
        convo.settle().await;

        assert!(!convo.is_loading());
        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.messages()[1].text, ASK_ERROR_TEXT);
        assert!(convo.messages()[1].sources.is_empty());
        assert!(convo.last_exchange_failed());
    }

    #[tokio::test]
    async fn network_failure_appends_error_message() {
        let client = BackendClient::new("http://127.0.0.1:9", "/upload-pdf", Duration::from_secs(2)).unwrap();
        let mut convo = ConversationController::new(client);

        convo.submit_question("anyone there?", false);
        convo.settle().await;

        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.messages()[1].text, ASK_ERROR_TEXT);
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        assert!(!convo.submit_question("", false));
        assert!(!convo.submit_question("   ", false));
        assert!(convo.messages().is_empty());
        assert!(!convo.is_loading());
        assert_eq!(convo.revision(), 0);
    }

    #[tokio::test]
    async fn second_question_while_loading_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "answer": "first" }))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        assert!(convo.submit_question("first", false));
        assert!(!convo.submit_question("second", false));
        assert_eq!(convo.messages().len(), 1);

        convo.settle().await;
        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.messages()[1].text, "first");
    }

    #[tokio::test]
    async fn question_is_blocked_during_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        assert!(!convo.submit_question("What changed?", true));
        assert!(convo.messages().is_empty());
    }

    #[tokio::test]
    async fn poll_leaves_unfinished_exchange_alone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "answer": "late" }))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        convo.submit_question("slow one", false);
        assert!(!convo.poll().await);
        assert!(convo.is_loading());

        convo.settle().await;
        assert!(!convo.poll().await);
        assert_eq!(convo.messages()[1].text, "late");
    }

    #[tokio::test]
    async fn every_completed_submission_adds_two_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "ok" })))
            .expect(3)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        for (i, q) in ["one", "two", "three"].iter().enumerate() {
            convo.submit_question(q, false);
            convo.settle().await;
            assert_eq!(convo.messages().len(), (i + 1) * 2);
        }
    }

    #[tokio::test]
    async fn summary_reply_is_appended() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/summarize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "summary": "Two policies." })))
            .expect(1)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        assert!(convo.request_summary(false));
        convo.settle().await;

        assert_eq!(convo.messages()[0].text, SUMMARY_PROMPT);
        assert_eq!(convo.messages()[1].text, "Two policies.");
    }

    #[tokio::test]
    async fn empty_summary_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/summarize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "summary": "" })))
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        convo.request_summary(false);
        convo.settle().await;

        assert_eq!(convo.messages()[1].text, NO_SUMMARY_TEXT);
        assert!(!convo.last_exchange_failed());
    }

    #[tokio::test]
    async fn summary_server_error_appends_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/summarize"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        assert!(convo.request_summary(false));
        convo.settle().await;

        assert!(!convo.is_loading());
        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.messages()[1].text, ASK_ERROR_TEXT);
        assert!(convo.last_exchange_failed());
    }

    #[tokio::test]
    async fn summary_network_failure_appends_error_message() {
        let client = BackendClient::new("http://127.0.0.1:9", "/upload-pdf", Duration::from_secs(2)).unwrap();
        let mut convo = ConversationController::new(client);

        assert!(convo.request_summary(false));
        convo.settle().await;

        assert_eq!(convo.messages()[1].text, ASK_ERROR_TEXT);
        assert!(convo.last_exchange_failed());
    }

    #[tokio::test]
    async fn summary_is_ignored_while_a_question_is_loading() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "answer": "first" }))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/summarize"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        assert!(convo.submit_question("first", false));
        let revision = convo.revision();

        assert!(!convo.request_summary(false));
        assert_eq!(convo.messages().len(), 1);
        assert_eq!(convo.revision(), revision);

        convo.settle().await;
        assert_eq!(convo.messages()[1].text, "first");
    }

    #[tokio::test]
    async fn summary_is_blocked_during_upload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/summarize"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        assert!(!convo.request_summary(true));
        assert!(convo.messages().is_empty());
        assert!(!convo.is_loading());
    }

    #[tokio::test]
    async fn success_after_failure_clears_the_failure_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "ok" })))
            .mount(&server)
            .await;

        let mut convo = controller_for(&server);
        convo.submit_question("one", false);
        convo.settle().await;
        assert!(convo.last_exchange_failed());

        convo.submit_question("two", false);
        convo.settle().await;
        assert!(!convo.last_exchange_failed());
        assert_eq!(convo.messages()[3].text, "ok");
    }
}
