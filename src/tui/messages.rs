//! Messages pane: the open conversation, newest at the bottom.

use chrono::Local;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::models::Message;

/// Scroll state, counted in rendered lines up from the bottom so that new
/// messages stay in view while `scroll_back` is 0.
#[derive(Default)]
pub struct MessagesState {
    pub scroll_back: usize,
}

impl MessagesState {
    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }

    pub fn scroll_to_latest(&mut self) {
        self.scroll_back = 0;
    }
}

/// What the pane shows above the thread.
pub struct ThreadView<'a> {
    pub me: &'a str,
    pub peer_label: Option<&'a str>,
    pub messages: &'a [Message],
    pub loading: bool,
    pub peer_typing: bool,
}

/// Render the messages pane into the given area.
pub fn render(area: Rect, buf: &mut Buffer, view: &ThreadView<'_>, state: &MessagesState, focused: bool) {
    let (border_style, border_type) = if focused {
        (Style::default().fg(Color::Yellow), BorderType::Double)
    } else {
        (Style::default().fg(Color::DarkGray), BorderType::Plain)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let header_area = Rect::new(inner.x, inner.y, inner.width, 1);
    render_header(header_area, buf, view);

    let body = Rect::new(
        inner.x,
        inner.y + 1,
        inner.width,
        inner.height.saturating_sub(1),
    );
    if body.height == 0 {
        return;
    }

    let placeholder = if view.peer_label.is_none() {
        Some(" Pick a contact on the left and press Enter")
    } else if view.loading && view.messages.is_empty() {
        Some(" Loading conversation...")
    } else if view.messages.is_empty() {
        Some(" No messages yet. Say hello!")
    } else {
        None
    };
    if let Some(text) = placeholder {
        let line = Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)));
        Paragraph::new(line).render(Rect::new(body.x, body.y, body.width, 1), buf);
        return;
    }

    let lines = build_message_lines(view.messages, view.me, body.width as usize);
    let visible = body.height as usize;
    let (start, end) = visible_range(lines.len(), visible, state.scroll_back);

    for (row, line) in lines[start..end].iter().enumerate() {
        let line_area = Rect::new(body.x, body.y + row as u16, body.width, 1);
        Paragraph::new(line.clone()).render(line_area, buf);
    }

    // Scroll indicators.
    let indicator_x = body.x + body.width.saturating_sub(1);
    if start > 0 {
        let cell = &mut buf[(indicator_x, body.y)];
        cell.set_char('^');
        cell.set_style(Style::default().fg(Color::DarkGray));
    }
    if end < lines.len() {
        let cell = &mut buf[(indicator_x, body.y + body.height.saturating_sub(1))];
        cell.set_char('v');
        cell.set_style(Style::default().fg(Color::DarkGray));
    }
}

fn render_header(area: Rect, buf: &mut Buffer, view: &ThreadView<'_>) {
    let mut spans = vec![Span::styled(
        format!(" {} ", view.peer_label.unwrap_or("No conversation")),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    )];
    if view.peer_typing {
        spans.push(Span::styled(
            "is typing...",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::ITALIC),
        ));
    }
    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

/// Window of `total` lines to show, anchored `scroll_back` lines above the
/// bottom. Over-scrolling pins to the top.
fn visible_range(total: usize, height: usize, scroll_back: usize) -> (usize, usize) {
    if total <= height {
        return (0, total);
    }
    let max_back = total - height;
    let back = scroll_back.min(max_back);
    let end = total - back;
    (end - height, end)
}

/// Flatten the thread into display lines: a sender/time line followed by the
/// wrapped body and a blank separator.
fn build_message_lines(messages: &[Message], me: &str, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let body_width = width.saturating_sub(3);

    for msg in messages {
        let mine = msg.is_from(me);
        let (name, name_color) = if mine {
            ("You".to_string(), Color::Cyan)
        } else {
            (msg.sender_id.clone(), Color::Magenta)
        };
        let time = msg.timestamp.with_timezone(&Local).format("%H:%M").to_string();

        lines.push(Line::from(vec![
            Span::styled(
                format!(" {}", name),
                Style::default()
                    .fg(name_color)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {}", time), Style::default().fg(Color::DarkGray)),
        ]));

        for chunk in wrap_text(&msg.content, body_width) {
            lines.push(Line::from(Span::raw(format!("   {}", chunk))));
        }
        lines.push(Line::from(""));
    }

    lines
}

/// Word-wrap by terminal columns. Words longer than the width are split.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![];
    }
    let mut result = Vec::new();
    for line in text.lines() {
        if line.width() <= max_width {
            result.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            let sep = usize::from(!current.is_empty());
            if current.width() + sep + word.width() <= max_width {
                if sep == 1 {
                    current.push(' ');
                }
                current.push_str(word);
                continue;
            }
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            for c in word.chars() {
                if current.width() + c.width().unwrap_or(0) > max_width {
                    result.push(std::mem::take(&mut current));
                }
                current.push(c);
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: &str, to: &str, text: &str) -> Message {
        Message {
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            content: text.to_string(),
            timestamp: chrono::Utc::now(),
            client_id: None,
        }
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("short", 10), vec!["short"]);
        assert_eq!(
            wrap_text("the quick brown fox", 10),
            vec!["the quick", "brown fox"]
        );
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("one\ntwo", 10), vec!["one", "two"]);
        assert_eq!(wrap_text("日本語です", 4), vec!["日本", "語で", "す"]);
    }

    #[test]
    fn test_visible_range_anchors_bottom() {
        assert_eq!(visible_range(5, 10, 0), (0, 5));
        assert_eq!(visible_range(20, 5, 0), (15, 20));
        assert_eq!(visible_range(20, 5, 3), (12, 17));
        assert_eq!(visible_range(20, 5, 100), (0, 5));
    }

    #[test]
    fn test_scroll_state() {
        let mut state = MessagesState::default();
        state.scroll_up(10);
        state.scroll_down(3);
        assert_eq!(state.scroll_back, 7);
        state.scroll_down(50);
        assert_eq!(state.scroll_back, 0);
        state.scroll_up(4);
        state.scroll_to_latest();
        assert_eq!(state.scroll_back, 0);
    }

    #[test]
    fn test_message_lines_label_own_messages() {
        let thread = vec![msg("me", "A", "hi"), msg("A", "me", "hello there")];
        let lines = build_message_lines(&thread, "me", 40);
        // header + body + blank for each message
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0].spans[0].content, " You");
        assert_eq!(lines[3].spans[0].content, " A");
        assert_eq!(lines[4].spans[0].content, "   hello there");
    }
}
