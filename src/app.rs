use std::time::Instant;

use ratatui::layout::Rect;
use tokio::task::JoinHandle;

use crate::attachment::AttachmentController;
use crate::config::Config;
use crate::conversation::ConversationController;
use crate::gateway::{BackendClient, GatewayResult};
use crate::state::Attachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    PickingFile,
}

/// Single-line text buffer with a character-based cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    pub value: String,
    pub cursor: usize,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl TextInput {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        for c in text.chars().filter(|c| !c.is_control()) {
            self.insert(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.len() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.len());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.len();
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Controllers
    pub conversation: ConversationController,
    pub attachments: AttachmentController,

    // Input buffers
    pub input: TextInput,
    pub picker_input: TextInput,

    // Backend health (None until the first check returns)
    pub backend_online: Option<bool>,
    health_task: Option<JoinHandle<bool>>,
    client: BackendClient,

    // Chat scroll state
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width the transcript was wrapped to
    pub chat_area: Option<Rect>,
    chat_total_lines: u16, // Rows in the last rendered transcript
    follow_tail: bool,     // Keep the newest rows in view
    seen_revision: u64,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(config: &Config) -> GatewayResult<Self> {
        let client = BackendClient::new(&config.base_url, &config.upload_path, config.request_timeout())?;

        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            conversation: ConversationController::new(client.clone()),
            attachments: AttachmentController::new(client.clone(), config.notice_lifetime()),

            input: TextInput::default(),
            picker_input: TextInput::default(),

            backend_online: None,
            health_task: None,
            client,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            chat_total_lines: 0,
            follow_tail: true,
            seen_revision: 0,

            animation_frame: 0,
        })
    }

    /// Kick off a background health check; the result lands on a later tick.
    pub fn check_health(&mut self) {
        if self.health_task.is_some() {
            return;
        }
        let client = self.client.clone();
        self.health_task = Some(tokio::spawn(async move {
            match client.health().await {
                Ok(_) => true,
                Err(err) => {
                    tracing::warn!(error = %err, "backend health check failed");
                    false
                }
            }
        }));
    }

    pub fn backend_url(&self) -> &str {
        self.client.base_url()
    }

    /// An ask or an upload is in flight; input is disabled.
    pub fn is_busy(&self) -> bool {
        self.conversation.is_loading() || self.attachments.is_uploading()
    }

    pub fn submit_input(&mut self) -> bool {
        let uploading = self.attachments.is_uploading();
        if !self.conversation.submit_question(&self.input.value, uploading) {
            return false;
        }
        self.input.clear();
        self.input_mode = InputMode::Normal;
        true
    }

    pub fn request_summary(&mut self) -> bool {
        let uploading = self.attachments.is_uploading();
        self.conversation.request_summary(uploading)
    }

    pub fn open_file_picker(&mut self) {
        if self.attachments.is_uploading() {
            return;
        }
        self.picker_input.clear();
        self.input_mode = InputMode::PickingFile;
    }

    /// Read the file at `path` and hand it to the attachment controller.
    pub async fn attach_path(&mut self, path: &str) -> bool {
        let path = path.trim();
        if path.is_empty() || self.attachments.is_uploading() {
            return false;
        }

        let expanded = expand_home(path);
        match Attachment::from_path(&expanded).await {
            Ok(attachment) => self.attachments.select_file(attachment),
            Err(err) => {
                tracing::warn!(%path, error = %err, "could not read attachment");
                self.attachments.report_error(format!("Could not read {}", path));
                false
            }
        }
    }

    pub fn remove_attachment(&mut self) -> bool {
        self.attachments.remove_file()
    }

    /// Settle finished exchanges, expire notices, and advance the animation.
    pub async fn on_tick(&mut self) {
        self.conversation.poll().await;
        self.attachments.poll().await;
        self.attachments.expire_notices(Instant::now());

        if matches!(&self.health_task, Some(task) if task.is_finished()) {
            if let Some(task) = self.health_task.take() {
                self.backend_online = Some(task.await.unwrap_or(false));
            }
        }

        self.tick_animation();
        self.follow_conversation();
    }

    pub fn tick_animation(&mut self) {
        if self.conversation.is_loading() || self.attachments.is_uploading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Jump to the newest message whenever the conversation changed.
    pub fn follow_conversation(&mut self) {
        let revision = self.conversation.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            self.scroll_chat_to_bottom();
        }
    }

    /// Record the size of the rendered transcript.
    ///
    /// `total_lines` is the row count after wrapping to `width`, so the
    /// scroll limit matches what is drawn. While following the tail the view
    /// snaps to the last row; otherwise the offset is only clamped.
    pub fn set_chat_layout(&mut self, height: u16, width: u16, total_lines: u16) {
        self.chat_height = height;
        self.chat_width = width;
        self.chat_total_lines = total_lines;

        if self.follow_tail {
            self.chat_scroll = self.max_chat_scroll();
        } else {
            self.chat_scroll = self.chat_scroll.min(self.max_chat_scroll());
        }
    }

    fn max_chat_scroll(&self) -> u16 {
        self.chat_total_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        self.follow_tail = true;
        self.chat_scroll = self.max_chat_scroll();
    }

    pub fn scroll_chat_to_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_tail = self.max_chat_scroll() == 0;
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_chat_scroll());
        self.follow_tail = self.chat_scroll >= self.max_chat_scroll();
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_tail = self.chat_scroll >= self.max_chat_scroll();
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    pub fn input_placeholder(&self) -> &'static str {
        if self.attachments.attachment().is_some() {
            "Ask questions about this document..."
        } else {
            "Upload a PDF or ask anything..."
        }
    }
}

fn expand_home(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    std::path::PathBuf::from(path)
}
