//! The staged PDF and its upload cycle

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::gateway::{BackendClient, GatewayResult, UploadResponse};
use crate::notice::Notice;
use crate::state::Attachment;

pub const INVALID_FILE_TEXT: &str = "Please select a valid PDF file.";
pub const UPLOAD_FAILED_TEXT: &str = "Upload failed. Please try again.";
pub const UPLOADING_TEXT: &str = "Uploading...";

pub struct AttachmentController {
    client: BackendClient,
    notice_lifetime: Duration,
    attachment: Option<Attachment>,
    picker_value: String,
    status: Notice,
    error: Notice,
    task: Option<JoinHandle<GatewayResult<UploadResponse>>>,
}

impl AttachmentController {
    pub fn new(client: BackendClient, notice_lifetime: Duration) -> Self {
        Self {
            client,
            notice_lifetime,
            attachment: None,
            picker_value: String::new(),
            status: Notice::default(),
            error: Notice::default(),
            task: None,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn is_uploading(&self) -> bool {
        self.task.is_some()
    }

    /// What the file picker currently shows; empty when reset
    pub fn picker_value(&self) -> &str {
        &self.picker_value
    }

    pub fn status(&self) -> Option<&str> {
        self.status.text()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.text()
    }

    /// Stage `attachment` and start uploading it.
    ///
    /// Non-PDF files are refused with an inline error and never reach the
    /// backend. Selection is disabled while an upload is running.
    pub fn select_file(&mut self, attachment: Attachment) -> bool {
        if self.is_uploading() {
            tracing::debug!(name = %attachment.name, "file selection ignored during upload");
            return false;
        }

        if !attachment.is_pdf() {
            tracing::info!(name = %attachment.name, mime = %attachment.mime_type, "rejected non-PDF attachment");
            self.report_error(INVALID_FILE_TEXT);
            return false;
        }

        self.error.clear();
        self.status.set(UPLOADING_TEXT);
        self.picker_value = attachment.name.clone();

        let client = self.client.clone();
        let upload = attachment.clone();
        self.task = Some(tokio::spawn(async move { client.upload_document(&upload).await }));
        self.attachment = Some(attachment);
        true
    }

    /// Discard the staged document. Disabled while an upload is running.
    pub fn remove_file(&mut self) -> bool {
        if self.is_uploading() {
            return false;
        }
        self.attachment = None;
        self.picker_value.clear();
        self.status.clear();
        self.error.clear();
        true
    }

    /// Show a transient error, e.g. when the chosen path can't be read.
    pub fn report_error(&mut self, text: impl Into<String>) {
        self.error.flash(text, self.notice_lifetime);
    }

    pub fn expire_notices(&mut self, now: Instant) -> bool {
        let status = self.status.expire(now);
        let error = self.error.expire(now);
        status || error
    }

    /// Finalize the upload if its task has already finished.
    pub async fn poll(&mut self) -> bool {
        match &self.task {
            Some(task) if task.is_finished() => self.settle().await,
            _ => false,
        }
    }

    /// Wait for the outstanding upload and apply its outcome.
    pub async fn settle(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };

        let outcome = match task.await {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };

        match outcome {
            Ok(response) => {
                let name = response
                    .filename
                    .or_else(|| self.attachment.as_ref().map(|a| a.name.clone()))
                    .unwrap_or_default();
                tracing::info!(%name, "document uploaded");
                self.status
                    .flash(format!("✅ {} uploaded successfully", name), self.notice_lifetime);
            }
            Err(err) => {
                tracing::warn!(error = %err, "document upload failed");
                self.attachment = None;
                self.picker_value.clear();
                self.status.clear();
                self.report_error(UPLOAD_FAILED_TEXT);
            }
        }
        true
    }
}

impl Drop for AttachmentController {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LIFETIME: Duration = Duration::from_secs(4);

    fn controller_for(server: &MockServer) -> AttachmentController {
        let client = BackendClient::new(&server.uri(), "/upload-pdf", Duration::from_secs(5)).unwrap();
        AttachmentController::new(client, LIFETIME)
    }

    fn pdf(name: &str) -> Attachment {
        Attachment::new(name, "application/pdf", b"%PDF-1.4".to_vec())
    }

    #[tokio::test]
    async fn successful_upload_keeps_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload-pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "filename": "policy.pdf" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut uploads = controller_for(&server);
        assert!(uploads.select_file(pdf("policy.pdf")));
        assert!(uploads.is_uploading());
        assert_eq!(uploads.status(), Some(UPLOADING_TEXT));

        uploads.settle().await;
        assert!(!uploads.is_uploading());
        let status = uploads.status().unwrap();
        assert!(status.contains("policy.pdf"));
        assert!(status.contains("success"));
        assert_eq!(uploads.attachment().map(|a| a.name.as_str()), Some("policy.pdf"));
        assert_eq!(uploads.picker_value(), "policy.pdf");
    }

    #[tokio::test]
    async fn staged_file_is_not_copied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload-pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "filename": "big.pdf" })))
            .mount(&server)
            .await;

        let big = Attachment::new("big.pdf", "application/pdf", vec![b'%'; 1 << 20]);
        let original = big.bytes.as_ptr();

        let mut uploads = controller_for(&server);
        assert!(uploads.select_file(big));
        uploads.settle().await;

        let staged = uploads.attachment().unwrap();
        assert_eq!(staged.bytes.as_ptr(), original);
        assert_eq!(staged.bytes.len(), 1 << 20);
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut uploads = controller_for(&server);
        let notes = Attachment::new("notes.txt", "text/plain", b"hello".to_vec());
        assert!(!uploads.select_file(notes));

        assert!(uploads.attachment().is_none());
        assert!(!uploads.is_uploading());
        assert_eq!(uploads.error(), Some(INVALID_FILE_TEXT));
        assert!(uploads.status().is_none());
    }

    #[tokio::test]
    async fn failed_upload_rolls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload-pdf"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut uploads = controller_for(&server);
        uploads.select_file(pdf("policy.pdf"));
        uploads.settle().await;

        assert!(uploads.attachment().is_none());
        assert_eq!(uploads.picker_value(), "");
        assert!(uploads.status().is_none());
        assert_eq!(uploads.error(), Some(UPLOAD_FAILED_TEXT));
        assert!(!uploads.is_uploading());
    }

    #[tokio::test]
    async fn network_error_rolls_back() {
        let client = BackendClient::new("http://127.0.0.1:9", "/upload-pdf", Duration::from_secs(2)).unwrap();
        let mut uploads = AttachmentController::new(client, LIFETIME);

        uploads.select_file(pdf("policy.pdf"));
        uploads.settle().await;

        assert!(uploads.attachment().is_none());
        assert_eq!(uploads.picker_value(), "");
        assert_eq!(uploads.error(), Some(UPLOAD_FAILED_TEXT));
    }

    #[tokio::test]
    async fn rejected_body_rolls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload-pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "Upload failed: disk full" })))
            .mount(&server)
            .await;

        let mut uploads = controller_for(&server);
        uploads.select_file(pdf("policy.pdf"));
        uploads.settle().await;

        assert!(uploads.attachment().is_none());
        assert_eq!(uploads.error(), Some(UPLOAD_FAILED_TEXT));
    }

    #[tokio::test]
    async fn selection_and_removal_are_blocked_during_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload-pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "filename": "a.pdf" }))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut uploads = controller_for(&server);
        assert!(uploads.select_file(pdf("a.pdf")));
        assert!(!uploads.select_file(pdf("b.pdf")));
        assert!(!uploads.remove_file());
        assert_eq!(uploads.attachment().map(|a| a.name.as_str()), Some("a.pdf"));

        uploads.settle().await;
        assert!(uploads.remove_file());
        assert!(uploads.attachment().is_none());
        assert!(uploads.status().is_none());
        assert_eq!(uploads.picker_value(), "");
    }

    #[tokio::test]
    async fn notices_clear_after_lifetime() {
        let server = MockServer::start().await;
        let mut uploads = controller_for(&server);

        uploads.report_error("Could not read missing.pdf");
        assert!(uploads.error().is_some());
        assert!(!uploads.expire_notices(Instant::now()));
        assert!(uploads.expire_notices(Instant::now() + LIFETIME));
        assert!(uploads.error().is_none());
    }

    #[tokio::test]
    async fn uploading_status_does_not_expire() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload-pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "filename": "a.pdf" }))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;

        let mut uploads = controller_for(&server);
        uploads.select_file(pdf("a.pdf"));
        uploads.expire_notices(Instant::now() + LIFETIME * 10);
        assert_eq!(uploads.status(), Some(UPLOADING_TEXT));
        uploads.settle().await;
    }
}
