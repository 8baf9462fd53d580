//! TUI Application state and main event loop

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::{FutureExt, StreamExt};
use ratatui::DefaultTerminal;
use tokio::sync::watch;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use super::backend::{Backend, BackendCommand, BackendResponse};
use super::compose::ComposeState;
use super::messages::MessagesState;
use super::sidebar::SidebarState;
use super::ui;
use crate::api::ApiClient;
use crate::auth::session::{self, Session, SessionStore};
use crate::config::Config;
use crate::error;
use crate::models::TypingNotice;
use crate::realtime::events::ClientEvent;
use crate::realtime::{self, RealtimeConfig, RealtimeEvent, RealtimeHandle};
use crate::sync::typing::{TypingDebouncer, TypingSignal};
use crate::sync::{ChatSync, Effect};

/// Housekeeping interval: typing expiry, notification expiry.
const TICK: Duration = Duration::from_millis(250);

/// How long a notification stays in the status bar.
const NOTIFICATION_TTL: Duration = Duration::from_secs(5);

/// Lines moved per PgUp/PgDn.
const PAGE: usize = 10;

/// Active pane in the TUI
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    #[default]
    Sidebar,
    Messages,
    Compose,
}

impl Pane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pane::Sidebar => "contacts",
            Pane::Messages => "messages",
            Pane::Compose => "compose",
        }
    }

    fn next(self) -> Self {
        match self {
            Pane::Sidebar => Pane::Messages,
            Pane::Messages => Pane::Compose,
            Pane::Compose => Pane::Sidebar,
        }
    }
}

/// Real-time link state shown in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Connecting,
    Online,
    Offline(String),
}

/// Transient status-bar message.
pub struct Notification {
    pub text: String,
    pub is_error: bool,
    expires_at: Instant,
}

/// Application state
pub struct App {
    pub sync: ChatSync,
    pub sidebar: SidebarState,
    pub messages: MessagesState,
    pub compose: ComposeState,
    pub active_pane: Pane,
    pub should_exit: bool,
    pub user_name: String,
    pub connection: Connection,
    pub notification: Option<Notification>,
    pub roster_loading: bool,
    typing: TypingDebouncer,
    /// Peer the current typing burst is addressed to.
    typing_peer: Option<String>,
}

/// Outbound side of the loop: fetches and socket emits.
trait Outbound {
    fn load(&self, cmd: BackendCommand);
    fn emit(&self, event: ClientEvent);
}

struct Io<'a> {
    backend: &'a Backend,
    realtime: &'a RealtimeHandle,
}

impl Outbound for Io<'_> {
    fn load(&self, cmd: BackendCommand) {
        self.backend.send(cmd);
    }

    fn emit(&self, event: ClientEvent) {
        self.realtime.emit(event);
    }
}

impl App {
    pub fn new(me: &str, user_name: &str) -> Self {
        Self {
            sync: ChatSync::new(me),
            sidebar: SidebarState::default(),
            messages: MessagesState::default(),
            compose: ComposeState::default(),
            active_pane: Pane::default(),
            should_exit: false,
            user_name: user_name.to_string(),
            connection: Connection::Connecting,
            notification: None,
            roster_loading: true,
            typing: TypingDebouncer::default(),
            typing_peer: None,
        }
    }

    pub fn notify(&mut self, text: impl Into<String>, now: Instant) {
        self.notification = Some(Notification {
            text: text.into(),
            is_error: false,
            expires_at: now + NOTIFICATION_TTL,
        });
    }

    pub fn notify_error(&mut self, err: &anyhow::Error, now: Instant) {
        tracing::warn!("{:#}", err);
        self.notification = Some(Notification {
            text: error::notice(err),
            is_error: true,
            expires_at: now + NOTIFICATION_TTL,
        });
    }

    /// Peer under the sidebar cursor.
    pub fn selected_peer(&self) -> Option<&str> {
        self.sync
            .roster()
            .contacts()
            .get(self.sidebar.selected)
            .map(|c| c.id.as_str())
    }

    /// Display label of the open peer.
    pub fn open_peer_label(&self) -> Option<&str> {
        let peer = self.sync.open_peer()?;
        Some(self.sync.roster().get(peer).map_or(peer, |c| c.label()))
    }

    fn refresh_roster(&mut self, io: &dyn Outbound) {
        self.roster_loading = true;
        let ticket = self.sync.begin_roster_refresh();
        io.load(BackendCommand::LoadContacts { ticket });
    }

    fn open_selected(&mut self, io: &dyn Outbound) {
        let Some(peer) = self.selected_peer().map(str::to_string) else {
            return;
        };
        self.end_typing_burst(io);
        let ticket = self.sync.select_peer(&peer);
        self.messages.scroll_to_latest();
        io.load(BackendCommand::LoadThread { ticket });
        self.active_pane = Pane::Compose;
    }

    fn apply_effects(&mut self, effects: &[Effect], io: &dyn Outbound) {
        for effect in effects {
            match effect {
                Effect::ScrollToLatest => self.messages.scroll_to_latest(),
                Effect::RefreshRoster => self.refresh_roster(io),
                // Rendering reads typing state directly.
                Effect::TypingChanged => {}
            }
        }
    }

    /// Keep the cursor on the same peer when the roster is reordered.
    fn with_stable_selection(&mut self, f: impl FnOnce(&mut Self)) {
        let selected = self.selected_peer().map(str::to_string);
        f(self);
        let position = selected.and_then(|id| self.sync.roster().position(&id));
        self.sidebar.follow(position);
        self.sidebar.clamp(self.sync.roster().len());
    }

    // -- Outbound typing -----------------------------------------------------

    fn emit_typing(&self, signal: TypingSignal, peer: &str, io: &dyn Outbound) {
        let notice = TypingNotice {
            sender_id: self.sync.me().to_string(),
            receiver_id: peer.to_string(),
        };
        io.emit(match signal {
            TypingSignal::Start => ClientEvent::Typing(notice),
            TypingSignal::Stop => ClientEvent::StopTyping(notice),
        });
    }

    fn on_keystroke(&mut self, now: Instant, io: &dyn Outbound) {
        let Some(peer) = self.sync.open_peer().map(str::to_string) else {
            return;
        };
        if let Some(signal) = self.typing.keystroke(now) {
            self.emit_typing(signal, &peer, io);
        }
        self.typing_peer = Some(peer);
    }

    fn end_typing_burst(&mut self, io: &dyn Outbound) {
        if let (Some(signal), Some(peer)) = (self.typing.reset(), self.typing_peer.take()) {
            self.emit_typing(signal, &peer, io);
        }
    }

    // -- Input ---------------------------------------------------------------

    fn send_compose(&mut self, now: Instant, io: &dyn Outbound) {
        let Some(peer) = self.sync.open_peer().map(str::to_string) else {
            self.notify("Open a conversation first", now);
            return;
        };
        let Some(text) = self.compose.take_message() else {
            return;
        };
        self.end_typing_burst(io);

        let result = self.sync.compose_outgoing(&peer, &text);
        match result {
            Ok((message, effects)) => {
                io.emit(ClientEvent::SendMessage(message));
                self.with_stable_selection(|app| app.apply_effects(&effects, io));
            }
            Err(e) => self.notify_error(&e, now),
        }
    }

    fn handle_key(&mut self, key: KeyEvent, now: Instant, io: &dyn Outbound) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        // Global keys.
        match key.code {
            KeyCode::Char('c') if ctrl => {
                self.should_exit = true;
                return;
            }
            KeyCode::Esc => {
                self.should_exit = true;
                return;
            }
            KeyCode::Tab => {
                self.active_pane = self.active_pane.next();
                return;
            }
            KeyCode::PageUp => {
                self.messages.scroll_up(PAGE);
                return;
            }
            KeyCode::PageDown => {
                self.messages.scroll_down(PAGE);
                return;
            }
            _ => {}
        }

        match self.active_pane {
            Pane::Sidebar => match key.code {
                KeyCode::Char('q') => self.should_exit = true,
                KeyCode::Up | KeyCode::Char('k') => self.sidebar.move_up(),
                KeyCode::Down | KeyCode::Char('j') => {
                    self.sidebar.move_down(self.sync.roster().len())
                }
                KeyCode::Enter => self.open_selected(io),
                KeyCode::Char('r') => self.refresh_roster(io),
                _ => {}
            },
            Pane::Messages => match key.code {
                KeyCode::Char('q') => self.should_exit = true,
                KeyCode::Up | KeyCode::Char('k') => self.messages.scroll_up(1),
                KeyCode::Down | KeyCode::Char('j') => self.messages.scroll_down(1),
                KeyCode::Char('r') => self.refresh_roster(io),
                _ => {}
            },
            Pane::Compose => match key.code {
                KeyCode::Enter => self.send_compose(now, io),
                KeyCode::Char('u') if ctrl => self.compose.clear(),
                KeyCode::Char(c) if !ctrl => {
                    self.compose.insert_char(c);
                    self.on_keystroke(now, io);
                }
                KeyCode::Backspace => {
                    self.compose.backspace();
                    self.on_keystroke(now, io);
                }
                KeyCode::Delete => self.compose.delete(),
                KeyCode::Left => self.compose.move_left(),
                KeyCode::Right => self.compose.move_right(),
                KeyCode::Home => self.compose.move_home(),
                KeyCode::End => self.compose.move_end(),
                _ => {}
            },
        }
    }

    // -- Inbound -------------------------------------------------------------

    fn handle_backend(&mut self, resp: BackendResponse, now: Instant) {
        match resp {
            BackendResponse::Contacts { ticket, result } => match result {
                Ok(contacts) => {
                    self.with_stable_selection(|app| {
                        if app.sync.apply_roster(ticket, contacts) {
                            app.roster_loading = false;
                        }
                    });
                }
                Err(e) => {
                    self.roster_loading = false;
                    self.notify_error(&e, now);
                }
            },
            BackendResponse::Thread { ticket, result } => match result {
                Ok(history) => {
                    if self.sync.apply_history(&ticket, history) {
                        self.messages.scroll_to_latest();
                    }
                }
                Err(e) => {
                    self.sync.abandon_history(&ticket);
                    self.notify_error(&e, now);
                }
            },
            BackendResponse::Profile(result) => {
                // The session watch delivers the new name.
                if let Err(e) = result {
                    self.notify_error(&e, now);
                }
            }
        }
    }

    fn handle_realtime(&mut self, event: RealtimeEvent, now: Instant, io: &dyn Outbound) {
        match event {
            RealtimeEvent::Connected => {
                if self.connection != Connection::Connecting {
                    self.notify("Reconnected", now);
                    // Events sent while offline are not replayed.
                    self.resync(io);
                }
                self.connection = Connection::Online;
            }
            RealtimeEvent::Disconnected(reason) => {
                self.connection = Connection::Offline(reason);
            }
            RealtimeEvent::Server(event) => {
                let mut effects = Vec::new();
                self.with_stable_selection(|app| effects = app.sync.apply_event(&event, now));
                self.apply_effects(&effects, io);
            }
        }
    }

    /// Refetch the roster and the open thread after events may have been lost.
    fn resync(&mut self, io: &dyn Outbound) {
        self.refresh_roster(io);
        if let Some(peer) = self.sync.open_peer().map(str::to_string) {
            let ticket = self.sync.select_peer(&peer);
            io.load(BackendCommand::LoadThread { ticket });
        }
    }

    fn handle_session(&mut self, session: Option<Session>, now: Instant) {
        match session {
            Some(session) => self.user_name = session.display_name().to_string(),
            None => {
                self.notify("Signed out", now);
                self.should_exit = true;
            }
        }
    }

    fn on_tick(&mut self, now: Instant, io: &dyn Outbound) {
        self.sync.expire_typing(now);
        if let Some(TypingSignal::Stop) = self.typing.poll(now) {
            if let Some(peer) = self.typing_peer.take() {
                self.emit_typing(TypingSignal::Stop, &peer, io);
            }
        }
        if self
            .notification
            .as_ref()
            .is_some_and(|n| now >= n.expires_at)
        {
            self.notification = None;
        }
    }
}

/// Run the TUI with panic-safe terminal restore
pub async fn run() -> Result<()> {
    let config = Config::load()?;
    let store = SessionStore::open()?;
    let session_rx = store.subscribe();
    let shared = store.into_shared();

    let (me, user_name) = {
        let store = session::lock(&shared);
        let current = store.require()?;
        (current.user_id.clone(), current.display_name().to_string())
    };

    let client = Arc::new(ApiClient::new(&config, shared));
    // Fail fast on a session that can no longer be refreshed.
    client.bearer().await?;

    // The socket asks the client for a current token on every reconnect.
    let realtime = realtime::spawn(
        RealtimeConfig {
            url: config.socket_url().to_string(),
            user_id: me.clone(),
        },
        client.clone(),
    );
    let backend = Backend::start(client);
    let app = App::new(&me, &user_name);

    let mut terminal = ratatui::init();
    let result = AssertUnwindSafe(run_app(&mut terminal, app, backend, realtime, session_rx))
        .catch_unwind()
        .await;
    ratatui::restore();

    match result {
        Ok(r) => r,
        Err(e) => std::panic::resume_unwind(e),
    }
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    mut app: App,
    mut backend: Backend,
    realtime: RealtimeHandle,
    mut session_rx: watch::Receiver<Option<Session>>,
) -> Result<()> {
    let mut terminal_events = EventStream::new();
    let mut realtime_events = BroadcastStream::new(realtime.subscribe());
    let mut tick = tokio::time::interval(TICK);

    {
        let io = Io {
            backend: &backend,
            realtime: &realtime,
        };
        app.refresh_roster(&io);
    }
    backend.send(BackendCommand::LoadProfile);

    while !app.should_exit {
        terminal.draw(|frame| ui::render(frame, &app))?;

        tokio::select! {
            Some(event) = terminal_events.next() => {
                let io = Io { backend: &backend, realtime: &realtime };
                match event? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        app.handle_key(key, Instant::now(), &io);
                    }
                    // Redrawn on the next pass.
                    _ => {}
                }
            }
            Some(resp) = backend.recv() => {
                app.handle_backend(resp, Instant::now());
            }
            Some(event) = realtime_events.next() => {
                let io = Io { backend: &backend, realtime: &realtime };
                match event {
                    Ok(event) => app.handle_realtime(event, Instant::now(), &io),
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        tracing::warn!("Dropped {} realtime events, resyncing", n);
                        app.resync(&io);
                    }
                }
            }
            Ok(()) = session_rx.changed() => {
                let session = session_rx.borrow_and_update().clone();
                app.handle_session(session, Instant::now());
            }
            _ = tick.tick() => {
                let io = Io { backend: &backend, realtime: &realtime };
                app.on_tick(Instant::now(), &io);
            }
        }
    }

    let io = Io {
        backend: &backend,
        realtime: &realtime,
    };
    app.end_typing_burst(&io);
    Ok(())
}
