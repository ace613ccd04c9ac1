//! Conversation transcript as pre-wrapped terminal lines
//!
//! The chat pane renders these lines without ratatui's own wrapping, so the
//! number of lines returned here is exactly the number of rows drawn. Scroll
//! limits are computed from the same vector.

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use crate::state::{ChatMessage, ChatRole};

/// Parse a line of text and convert **bold** markdown to styled spans
pub fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        match after.find("**") {
            Some(end) if end > 0 => {
                if start > 0 {
                    spans.push(Span::raw(rest[..start].to_string()));
                }
                spans.push(Span::styled(
                    after[..end].to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                rest = &after[end + 2..];
            }
            // No closing **, treat as literal
            _ => break,
        }
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn role_line(role: ChatRole) -> Line<'static> {
    let (label, color) = match role {
        ChatRole::User => ("You:", Color::Cyan),
        ChatRole::Assistant => ("AI:", Color::Yellow),
    };
    Line::from(Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)))
}

/// Unwrapped lines for one message, followed by a blank separator
pub fn message_lines(msg: &ChatMessage, lines: &mut Vec<Line<'static>>) {
    lines.push(role_line(msg.role));
    match msg.role {
        ChatRole::User => {
            for line in msg.text.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        ChatRole::Assistant => {
            for line in msg.text.lines() {
                lines.push(parse_markdown_line(line));
            }
            // One citation chip per line
            let chip = Style::default().fg(Color::Magenta);
            for source in &msg.sources {
                lines.push(Line::from(Span::styled(format!("  [{}]", source.label()), chip)));
            }
        }
    }
    lines.push(Line::default());
}

/// Build the whole transcript wrapped to `width` columns.
pub fn build(messages: &[ChatMessage], loading: bool, animation_frame: u8, width: usize) -> Vec<Line<'static>> {
    let mut logical = Vec::new();
    for msg in messages {
        message_lines(msg, &mut logical);
    }

    if loading {
        logical.push(role_line(ChatRole::Assistant));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((animation_frame as usize % 3) + 1);
        logical.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    logical.into_iter().flat_map(|line| wrap_line(line, width)).collect()
}

fn display_width(s: &str) -> usize {
    Span::raw(s).width()
}

/// Word-wrap a styled line so no row is wider than `width` display columns.
///
/// Words longer than a row are split mid-word. Spaces at the start of a
/// continuation row are dropped.
pub fn wrap_line(line: Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 || line.width() <= width {
        return vec![line];
    }

    let mut wrapped: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0;

    for span in line.spans {
        let style = span.style;
        for piece in span.content.split_inclusive(' ') {
            let word_width = display_width(piece.trim_end());

            if current_width > 0 && current_width + word_width > width {
                wrapped.push(Line::from(std::mem::take(&mut current)));
                current_width = 0;
            }
            if current_width == 0 && !wrapped.is_empty() && piece.trim().is_empty() {
                continue;
            }

            if word_width > width {
                let mut chunk = String::new();
                let mut chunk_width = 0;
                for c in piece.chars() {
                    let mut buf = [0u8; 4];
                    let char_width = display_width(c.encode_utf8(&mut buf));
                    if chunk_width > 0 && chunk_width + char_width > width {
                        wrapped.push(Line::from(Span::styled(std::mem::take(&mut chunk), style)));
                        chunk_width = 0;
                    }
                    chunk.push(c);
                    chunk_width += char_width;
                }
                current.push(Span::styled(chunk, style));
                current_width = chunk_width;
            } else {
                current.push(Span::styled(piece.to_string(), style));
                current_width += display_width(piece);
            }
        }
    }

    if !current.is_empty() {
        wrapped.push(Line::from(current));
    }
    if wrapped.is_empty() {
        wrapped.push(Line::default());
    }
    wrapped
}
