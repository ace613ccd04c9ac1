//! UI-agnostic conversation and attachment types
//!
//! These are shared by the terminal UI and the headless CLI and don't depend
//! on any specific UI framework.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const PDF_MIME: &str = "application/pdf";

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    #[serde(default)]
    pub sources: Vec<Citation>,
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>, sources: Vec<Citation>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
            sources,
        }
    }
}

/// A (document, page) pair returned alongside an answer
///
/// The backend variants disagree on the key for the document name, so both
/// `filename` and `source` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(alias = "source")]
    pub filename: String,
    #[serde(default)]
    pub page: u32,
}

impl Citation {
    pub fn new(filename: impl Into<String>, page: u32) -> Self {
        Self {
            filename: filename.into(),
            page,
        }
    }

    /// Short label for citation chips, e.g. `refund.pdf (p. 2)`
    pub fn label(&self) -> String {
        let name = self
            .filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.filename);
        format!("{} (p. {})", name, self.page)
    }
}

/// The single document staged for upload
///
/// Cloning shares the file contents rather than copying them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Build an attachment from a file on disk, deriving the MIME type from
    /// the extension the way a browser file picker does.
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, mime_for_path(path), bytes))
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME
    }
}

pub fn mime_for_path(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => PDF_MIME,
        _ => "application/octet-stream",
    }
}
