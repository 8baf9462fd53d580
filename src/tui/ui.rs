//! Frame layout: header, roster, thread, compose box, status bar.

use std::time::Instant;

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::app::{App, Connection, Pane};
use super::compose;
use super::messages::{self, ThreadView};
use super::sidebar::{self, RowInfo};

const APP_TITLE: &str = " Mentor Chat";
const SIDEBAR_WIDTH: u16 = 24;

/// Indicator symbol, color and label for the real-time link.
fn connection_indicator(connection: &Connection) -> (&'static str, Color, &'static str) {
    match connection {
        Connection::Online => ("*", Color::Green, "online"),
        Connection::Connecting => ("~", Color::Yellow, "connecting"),
        Connection::Offline(_) => ("o", Color::Red, "offline"),
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let now = Instant::now();
    let area = frame.area();

    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);

    let [sidebar_area, content_area] =
        Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Fill(1)])
            .areas(main_area);

    let open = app.sync.open_peer();
    let rows: Vec<RowInfo<'_>> = app
        .sync
        .roster()
        .contacts()
        .iter()
        .map(|contact| RowInfo {
            contact,
            typing: app.sync.is_peer_typing(&contact.id, now),
            open: open == Some(contact.id.as_str()),
        })
        .collect();
    sidebar::render(
        sidebar_area,
        frame.buffer_mut(),
        &rows,
        &app.sidebar,
        app.roster_loading,
        app.active_pane == Pane::Sidebar,
    );

    let [messages_area, compose_area] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
    ])
    .areas(content_area);

    let peer_label = app.open_peer_label();
    let view = ThreadView {
        me: app.sync.me(),
        peer_label,
        messages: app.sync.thread().messages(),
        loading: app.sync.is_thread_loading(),
        peer_typing: open.is_some_and(|peer| app.sync.is_peer_typing(peer, now)),
    };
    messages::render(
        messages_area,
        frame.buffer_mut(),
        &view,
        &app.messages,
        app.active_pane == Pane::Messages,
    );

    compose::render(
        compose_area,
        frame,
        &app.compose,
        peer_label,
        "Enter: send | C-u: clear | Tab: switch pane",
        app.active_pane == Pane::Compose,
    );

    render_status(status_area, frame.buffer_mut(), app);
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = Span::styled(
        APP_TITLE,
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let (symbol, color, label) = connection_indicator(&app.connection);
    let status = format!(" {} {} ", symbol, label);
    let user = format!(" {} ", app.user_name);

    let used = APP_TITLE.width() + status.width() + user.width();
    let padding = Span::raw(" ".repeat((area.width as usize).saturating_sub(used)));

    let header_line = Line::from(vec![
        title,
        padding,
        Span::styled(status, Style::default().fg(color)),
        Span::styled(user, Style::default().fg(Color::Cyan)),
    ]);

    Paragraph::new(header_line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    if let Some(ref notification) = app.notification {
        let style = if notification.is_error {
            Style::default().fg(Color::Red).bg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Green).bg(Color::DarkGray)
        };
        let line = Line::from(Span::styled(format!(" {} ", notification.text), style));
        Paragraph::new(line)
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let sep_style = Style::default().fg(Color::DarkGray);
    let hint_style = Style::default().fg(Color::Gray);

    let mut spans = Vec::new();
    if let Connection::Offline(reason) = &app.connection {
        spans.push(Span::styled(
            format!(" offline: {} ", reason),
            Style::default().fg(Color::Red),
        ));
        spans.push(Span::styled(" | ", sep_style));
    }

    let unread = app.sync.roster().total_unread();
    if unread > 0 {
        spans.push(Span::styled(
            format!(" {} unread ", unread),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::styled(" | ", sep_style));
    }

    spans.push(Span::styled(
        format!(" Tab: {} ", app.active_pane.as_str()),
        Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(" | ", sep_style));
    spans.push(Span::styled("j/k: move  Enter: open  r: refresh", hint_style));
    spans.push(Span::styled(" | ", sep_style));
    spans.push(Span::styled("PgUp/PgDn: scroll  q/Esc: quit", hint_style));

    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn buffer_text(buf: &Buffer) -> String {
        buf.content().iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn test_render_empty_app() {
        let app = App::new("me", "Dana");
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|frame| render(frame, &app)).unwrap();

        let text = buffer_text(terminal.backend().buffer());
        assert!(text.contains("Mentor Chat"));
        assert!(text.contains("connecting"));
        assert!(text.contains("Dana"));
        assert!(text.contains("Loading..."));
    }

    #[test]
    fn test_notification_replaces_hints() {
        let mut app = App::new("me", "Dana");
        app.notify("Reconnected", Instant::now());
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|frame| render(frame, &app)).unwrap();

        let text = buffer_text(terminal.backend().buffer());
        assert!(text.contains("Reconnected"));
        assert!(!text.contains("PgUp/PgDn"));
    }
}
