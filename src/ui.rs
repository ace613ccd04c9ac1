use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
};
use crate::app::{App, InputMode, TextInput};
use crate::transcript;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, status, footer
    let [header_area, chat_area, input_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_status(app, frame, status_area);
    render_footer(app, frame, footer_area);

    if app.input_mode == InputMode::PickingFile {
        render_file_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (dot, dot_color) = match app.backend_online {
        Some(true) => ("● online", Color::Green),
        Some(false) => ("● offline", Color::Red),
        None => ("○ checking", Color::Gray),
    };

    let title = Line::from(vec![
        Span::styled(" Policy Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(dot, Style::default().fg(dot_color)),
        Span::styled(format!(" {} ", app.backend_url()), Style::default().fg(Color::Gray)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    let inner_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);

    let border_color = if app.input_mode == InputMode::Normal { Color::Cyan } else { Color::DarkGray };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Conversation ");

    let messages = app.conversation.messages();
    let loading = app.conversation.is_loading();

    // Lines arrive already wrapped; the paragraph must not wrap them again
    let lines: Vec<Line<'static>> = if messages.is_empty() && !loading {
        [
            Line::default(),
            Line::from(Span::styled("Where should we start?", Style::default().bold())),
            Line::from(Span::styled(
                "Press u to upload a PDF, or type a question and press Enter.",
                Style::default().fg(Color::DarkGray),
            )),
        ]
        .into_iter()
        .flat_map(|line| transcript::wrap_line(line, inner_width as usize))
        .map(Line::centered)
        .collect()
    } else {
        transcript::build(messages, loading, app.animation_frame, inner_width as usize)
    };

    let total_lines = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    app.follow_conversation();
    app.set_chat_layout(inner_height, inner_width, total_lines);

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

/// Visible window of `input` that keeps the cursor on screen
fn visible_slice(input: &TextInput, inner_width: usize) -> (String, usize) {
    let scroll_offset = if inner_width == 0 || input.cursor < inner_width {
        0
    } else {
        input.cursor - inner_width + 1
    };

    let visible_text: String = input
        .value
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();
    (visible_text, input.cursor - scroll_offset)
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let busy = app.is_busy();
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if busy {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };

    let mut title = vec![Span::raw(" Ask ")];
    if let Some(attachment) = app.attachments.attachment() {
        title.push(Span::styled(" PDF ", Style::default().bg(Color::Red).fg(Color::White).bold()));
        title.push(Span::raw(format!(" {} ", attachment.name)));
    }

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Line::from(title));

    let inner_width = area.width.saturating_sub(2) as usize;

    if app.input.is_empty() {
        let placeholder = Paragraph::new(app.input_placeholder())
            .style(Style::default().fg(Color::DarkGray))
            .block(input_block);
        frame.render_widget(placeholder, area);
        if editing && !busy {
            frame.set_cursor_position((area.x + 1, area.y + 1));
        }
        return;
    }

    let (visible_text, cursor_x) = visible_slice(&app.input, inner_width);
    let style = if busy { Style::default().fg(Color::DarkGray) } else { Style::default().fg(Color::Cyan) };
    let input = Paragraph::new(visible_text).style(style).block(input_block);
    frame.render_widget(input, area);

    // Show cursor when editing
    if editing && !busy {
        frame.set_cursor_position((area.x + cursor_x as u16 + 1, area.y + 1));
    }
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let line = if let Some(error) = app.attachments.error() {
        Line::from(Span::styled(error.to_string(), Style::default().fg(Color::Red)))
    } else if let Some(status) = app.attachments.status() {
        let style = if app.attachments.is_uploading() {
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC)
        } else {
            Style::default().fg(Color::Gray)
        };
        Line::from(Span::styled(status.to_string(), style))
    } else {
        Line::default()
    };

    frame.render_widget(Paragraph::new(line).centered(), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
        InputMode::PickingFile => Style::default().bg(Color::Magenta).fg(Color::White),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " ASK ",
        InputMode::PickingFile => " ATTACH ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let pairs: &[(&str, &str)] = match app.input_mode {
        InputMode::Normal => &[
            (" i ", " ask "),
            (" u ", " upload "),
            (" x ", " remove "),
            (" S ", " summarize "),
            (" j/k ", " scroll "),
            (" q ", " quit "),
        ],
        InputMode::Editing => &[(" Enter ", " send "), (" PgUp/PgDn ", " scroll "), (" Esc ", " normal ")],
        InputMode::PickingFile => &[(" Enter ", " upload "), (" Esc ", " cancel ")],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    for (key, label) in pairs {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_file_picker(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 70.min(area.width.saturating_sub(4));
    let popup_height = 6;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" Attach PDF ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Path to a PDF file. Enter to upload, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let (visible_text, cursor_x) = visible_slice(&app.picker_input, input_area.width as usize);
    frame.render_widget(Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan)), input_area);
    frame.set_cursor_position((input_area.x + cursor_x as u16, input_area.y));
}
