//! Sidebar widget: contact roster with unread badges and typing markers.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use super::compose::truncate_to_width;
use crate::models::Contact;

/// Selection state. The roster itself lives in the chat synchronizer.
#[derive(Default)]
pub struct SidebarState {
    /// Index into the roster (0-based)
    pub selected: usize,
}

impl SidebarState {
    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self, count: usize) {
        if self.selected + 1 < count {
            self.selected += 1;
        }
    }

    /// Clamp selected index after the roster changed size.
    pub fn clamp(&mut self, count: usize) {
        self.selected = self.selected.min(count.saturating_sub(1));
    }

    /// Keep the same peer selected after the roster is reordered.
    pub fn follow(&mut self, position: Option<usize>) {
        if let Some(pos) = position {
            self.selected = pos;
        }
    }
}

/// What the sidebar shows for one peer besides its name.
pub struct RowInfo<'a> {
    pub contact: &'a Contact,
    pub typing: bool,
    pub open: bool,
}

/// Render the sidebar into the given area.
pub fn render(
    area: Rect,
    buf: &mut Buffer,
    rows: &[RowInfo<'_>],
    state: &SidebarState,
    loading: bool,
    focused: bool,
) {
    let (border_style, border_type) = if focused {
        (Style::default().fg(Color::Yellow), BorderType::Double)
    } else {
        (Style::default().fg(Color::DarkGray), BorderType::Plain)
    };

    let block = Block::default()
        .title(" Chats ")
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    if rows.is_empty() {
        let text = if loading { " Loading..." } else { " No conversations" };
        let line = Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)));
        Paragraph::new(line).render(Rect::new(inner.x, inner.y, inner.width, 1), buf);
        return;
    }

    let height = inner.height as usize;
    let offset = compute_scroll_offset(state.selected, height, rows.len());

    for (row_idx, idx) in (offset..rows.len()).take(height).enumerate() {
        let row_area = Rect::new(inner.x, inner.y + row_idx as u16, inner.width, 1);
        render_row(buf, row_area, &rows[idx], idx == state.selected);
    }
}

/// Simple scroll offset: keep selected item visible.
fn compute_scroll_offset(selected: usize, height: usize, total: usize) -> usize {
    if total <= height || selected < height {
        return 0;
    }
    let max_offset = total.saturating_sub(height);
    selected.saturating_sub(height - 1).min(max_offset)
}

/// Style for a row based on selection and unread state.
fn item_style(selected: bool, has_unread: bool) -> Style {
    if selected {
        Style::default()
            .fg(Color::White)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    } else if has_unread {
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    }
}

/// Right-aligned marker: unread count wins over the typing marker.
fn badge(row: &RowInfo<'_>) -> (String, Style) {
    if row.contact.unread_count > 0 {
        let count = if row.contact.unread_count > 99 {
            "99+".to_string()
        } else {
            row.contact.unread_count.to_string()
        };
        (
            count,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    } else if row.typing {
        ("...".to_string(), Style::default().fg(Color::Green))
    } else {
        (String::new(), Style::default())
    }
}

/// Render a row with left-aligned name and a right-aligned badge.
fn render_row(buf: &mut Buffer, area: Rect, row: &RowInfo<'_>, selected: bool) {
    let width = area.width as usize;
    let cursor = if selected { "\u{25BA}" } else { " " };
    let marker = if row.open { "*" } else { " " };
    let left = format!("{}{} {}", cursor, marker, row.contact.label());

    let (badge, badge_style) = badge(row);
    let badge_w = badge.width();
    let max_left = if badge_w > 0 {
        width.saturating_sub(badge_w + 1)
    } else {
        width
    };

    let left = truncate_to_width(&left, max_left);
    let pad = width.saturating_sub(left.width() + badge_w);

    let style = item_style(selected, row.contact.unread_count > 0);
    let badge_style = if selected {
        badge_style.bg(Color::DarkGray)
    } else {
        badge_style
    };

    let line = Line::from(vec![
        Span::styled(left, style),
        Span::styled(" ".repeat(pad), style),
        Span::styled(badge, badge_style),
    ]);
    Paragraph::new(line).render(area, buf);
}
