//! Compose box: single-line message input.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthChar;

/// State for the compose box.
#[derive(Default)]
pub struct ComposeState {
    /// Current input text.
    pub input: String,
    /// Cursor position (character offset into `input`).
    pub cursor_pos: usize,
}

impl ComposeState {
    /// Insert a character at the current cursor position.
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    /// Delete the character before the cursor (backspace).
    pub fn backspace(&mut self) {
        if self.cursor_pos > 0 {
            let byte_pos = self.char_to_byte(self.cursor_pos);
            let prev_byte_pos = self.char_to_byte(self.cursor_pos - 1);
            self.input.drain(prev_byte_pos..byte_pos);
            self.cursor_pos -= 1;
        }
    }

    /// Delete the character at the cursor (delete key).
    pub fn delete(&mut self) {
        if self.cursor_pos < self.char_count() {
            let byte_pos = self.char_to_byte(self.cursor_pos);
            let next_byte_pos = self.char_to_byte(self.cursor_pos + 1);
            self.input.drain(byte_pos..next_byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor_pos < self.char_count() {
            self.cursor_pos += 1;
        }
    }

    pub fn move_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_pos = self.char_count();
    }

    /// Clear all input text (Ctrl+U).
    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    /// Take the trimmed text for sending. Whitespace-only input stays put and
    /// yields None.
    pub fn take_message(&mut self) -> Option<String> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }
        self.clear();
        Some(text)
    }

    fn char_count(&self) -> usize {
        self.input.chars().count()
    }

    /// Convert a char-based cursor position to a byte offset.
    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// 1 border + 1 input + 1 hint + 1 border.
pub const COMPOSE_HEIGHT: u16 = 4;

/// Render the compose box. `peer_label` is None when no thread is open.
pub fn render(
    area: Rect,
    frame: &mut Frame,
    state: &ComposeState,
    peer_label: Option<&str>,
    hint: &str,
    focused: bool,
) {
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
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let input_area = Rect::new(inner.x, inner.y, inner.width, 1);
    let width = input_area.width as usize;

    if state.input.is_empty() {
        let placeholder = match peer_label {
            Some(label) => format!(" Message {}...", label),
            None => " Select a conversation to start chatting".to_string(),
        };
        let line = Line::from(Span::styled(
            truncate_to_width(&placeholder, width),
            Style::default().fg(Color::DarkGray),
        ));
        frame.render_widget(Paragraph::new(line), input_area);
        if focused {
            frame.set_cursor_position((input_area.x + 1, input_area.y));
        }
    } else {
        let display = visible_window(&state.input, state.cursor_pos, width.saturating_sub(1));
        let line = Line::from(Span::styled(
            format!(" {}", display.visible),
            Style::default().fg(Color::White),
        ));
        frame.render_widget(Paragraph::new(line), input_area);
        if focused {
            let x = input_area.x + 1 + display.cursor_offset as u16;
            frame.set_cursor_position((x, input_area.y));
        }
    }

    if inner.height >= 2 {
        let hint_area = Rect::new(inner.x, inner.y + 1, inner.width, 1);
        let line = Line::from(Span::styled(
            truncate_to_width(&format!(" {}", hint), width),
            Style::default().fg(Color::DarkGray),
        ));
        frame.render_widget(Paragraph::new(line), hint_area);
    }
}

/// Cut `text` to at most `width` terminal columns.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let mut used = 0;
    text.chars()
        .take_while(|c| {
            used += c.width().unwrap_or(0);
            used <= width
        })
        .collect()
}

/// What part of the input fits on screen, and the cursor column within it.
struct DisplayText {
    visible: String,
    cursor_offset: usize,
}

/// Scroll the input horizontally so the cursor stays visible. Columns are
/// measured in terminal cells, so wide characters count double.
fn visible_window(input: &str, cursor_pos: usize, avail: usize) -> DisplayText {
    if avail == 0 {
        return DisplayText {
            visible: String::new(),
            cursor_offset: 0,
        };
    }

    let chars: Vec<(char, usize)> = input
        .chars()
        .map(|c| (c, c.width().unwrap_or(0)))
        .collect();
    let cursor_col: usize = chars.iter().take(cursor_pos).map(|(_, w)| w).sum();

    // Drop leading characters until the cursor fits.
    let mut start = 0;
    let mut start_col = 0;
    while cursor_col - start_col >= avail && start < chars.len() {
        start_col += chars[start].1;
        start += 1;
    }

    let mut visible = String::new();
    let mut used = 0;
    for &(c, w) in &chars[start..] {
        if used + w > avail {
            break;
        }
        visible.push(c);
        used += w;
    }

    DisplayText {
        visible,
        cursor_offset: cursor_col - start_col,
    }
}
