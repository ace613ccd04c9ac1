pub mod app;
pub mod attachment;
pub mod config;
pub mod conversation;
pub mod gateway;
pub mod handler;
pub mod logging;
pub mod notice;
pub mod state;
pub mod transcript;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use attachment::AttachmentController;
pub use config::Config;
pub use conversation::ConversationController;
pub use gateway::{BackendClient, GatewayError};
pub use state::{Attachment, ChatMessage, ChatRole, Citation};
