use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::{debug, error, info};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::{
    command::{Command, Message, Transition, Update},
    config::AppConfig,
    info::InfoTabs,
    relocate::Relocate,
    rpc::TransmissionError,
    status::{StatusMessage, StatusUpdate},
    table::TorrentTable,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Table,
    Info,
    Relocate,
}

/// Owns every component and routes each message to the one that is active.
///
/// The table lives for the whole session and keeps its state while another
/// view is up; the info and relocate views are built fresh on every entry.
pub struct App {
    view: View,
    table: TorrentTable,
    info: Option<InfoTabs>,
    relocate: Option<Relocate>,
    fatal: Option<TransmissionError>,
    loaded: bool,
    should_quit: bool,
    connection_label: String,
    bookmarks: Vec<String>,
    status: Option<StatusMessage>,
    announce_load: bool,
    // Bumped on every relocate entry; tags the moves that view issues.
    relocate_batch: u64,
}

impl App {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            view: View::Table,
            table: TorrentTable::new(config.columns.clone()),
            info: None,
            relocate: None,
            fatal: None,
            loaded: false,
            should_quit: false,
            connection_label: config.rpc.endpoint(),
            bookmarks: config.bookmarks.clone(),
            status: None,
            announce_load: false,
            relocate_batch: 0,
        }
    }

    #[cfg(test)]
    pub fn view(&self) -> View {
        self.view
    }

    #[cfg(test)]
    pub fn table(&self) -> &TorrentTable {
        &self.table
    }

    #[cfg(test)]
    pub fn info(&self) -> Option<&InfoTabs> {
        self.info.as_ref()
    }

    pub fn fatal_error(&self) -> Option<&TransmissionError> {
        self.fatal.as_ref()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    #[cfg(test)]
    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn set_status(&mut self, update: StatusUpdate) {
        self.status = Some(StatusMessage::from_update(update));
    }

    /// Applies one message and returns the daemon calls it asks for.
    ///
    /// After a fatal error every message is ignored.
    pub fn handle(&mut self, message: Message) -> Vec<Command> {
        if self.fatal.is_some() {
            return Vec::new();
        }
        match message {
            Message::Resize { width, height } => {
                // Layout follows the frame area on the next draw.
                debug!("terminal is {width}x{height}");
                if self.loaded {
                    return Vec::new();
                }
                self.loaded = true;
                self.announce_load = true;
                self.set_status(StatusUpdate::info("Loading torrents…"));
                vec![self.table.load()]
            }
            Message::Tick => {
                self.expire_status();
                Vec::new()
            }
            Message::Fatal(err) => {
                error!("daemon request failed: {err}");
                self.fatal = Some(err);
                Vec::new()
            }
            Message::Torrents(torrents) => {
                let count = torrents.len();
                self.table.apply_torrents(torrents);
                if self.announce_load {
                    self.announce_load = false;
                    self.set_status(StatusUpdate::success(format!("Loaded {count} torrents")));
                }
                Vec::new()
            }
            Message::Detail(torrent) => {
                if let Some(info) = &mut self.info {
                    info.refresh(&torrent);
                }
                if let Some(relocate) = &mut self.relocate {
                    relocate.refresh(&torrent);
                }
                self.table.apply_detail(torrent);
                Vec::new()
            }
            Message::Selected(torrent) => {
                self.table.apply_selection(torrent);
                Vec::new()
            }
            Message::Relocated { batch, id, error } => {
                let update = match (&self.view, &mut self.relocate) {
                    (View::Relocate, Some(relocate)) => relocate.apply_result(batch, id, error),
                    _ => {
                        debug!("ignoring relocate result for torrent {id}; view closed");
                        Update::none()
                    }
                };
                self.apply_update(update)
            }
            Message::Key(key) => self.handle_key(key),
            Message::Paste(text) => {
                if let (View::Relocate, Some(relocate)) = (&self.view, &mut self.relocate) {
                    relocate.paste(&text);
                }
                Vec::new()
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Command> {
        if key.kind != KeyEventKind::Press {
            return Vec::new();
        }
        // Relocate owns ctrl+c (abort) and q (a path character).
        if self.view != View::Relocate && is_quit_key(&key) {
            return self.apply_update(Update::transition(Transition::Quit));
        }
        let update = match self.view {
            View::Table => {
                let update = self.table.handle_key(key);
                if update.commands.contains(&Command::ListTorrents) {
                    self.announce_load = true;
                    self.set_status(StatusUpdate::info("Refreshing…"));
                }
                update
            }
            View::Info => match &mut self.info {
                Some(info) => info.handle_key(key),
                None => Update::transition(Transition::ReturnToTable { reload: false }),
            },
            View::Relocate => match &mut self.relocate {
                Some(relocate) => relocate.handle_key(key),
                None => Update::transition(Transition::ReturnToTable { reload: false }),
            },
        };
        self.apply_update(update)
    }

    fn apply_update(&mut self, update: Update) -> Vec<Command> {
        let Update {
            mut commands,
            transition,
        } = update;
        match transition {
            None => {}
            Some(Transition::Quit) => {
                info!("quit requested");
                self.should_quit = true;
            }
            Some(Transition::OpenInfo) => {
                if let Some(torrent) = self.table.current() {
                    debug!("opening info for torrent {}", torrent.id);
                    commands.push(Command::FetchDetail { id: torrent.id });
                    self.info = Some(InfoTabs::new(torrent));
                    self.view = View::Info;
                }
            }
            Some(Transition::OpenRelocate) => {
                if let Some(torrent) = self.table.current() {
                    self.relocate_batch += 1;
                    debug!(
                        "opening relocate {} for torrent {} with selection {:?}",
                        self.relocate_batch,
                        torrent.id,
                        self.table.selection().ids().collect::<Vec<_>>()
                    );
                    commands.push(Command::FetchDetail { id: torrent.id });
                    self.relocate = Some(Relocate::new(
                        torrent.clone(),
                        self.table.selection(),
                        self.bookmarks.clone(),
                        self.relocate_batch,
                    ));
                    self.view = View::Relocate;
                }
            }
            Some(Transition::ReturnToTable { reload }) => {
                if let Some(outcome) = self.relocate.as_ref().and_then(Relocate::outcome) {
                    self.set_status(outcome);
                }
                self.info = None;
                self.relocate = None;
                self.view = View::Table;
                if reload {
                    commands.push(self.table.load());
                }
            }
        }
        commands
    }

    fn expire_status(&mut self) {
        if self
            .status
            .as_ref()
            .is_some_and(|status| status.is_expired(Instant::now()))
        {
            self.status = None;
        }
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(frame.size());
        self.render_header(frame, chunks[0]);
        match self.view {
            View::Table => self.table.render(frame, chunks[1]),
            View::Info => {
                if let Some(info) = &self.info {
                    info.render(frame, chunks[1]);
                }
            }
            View::Relocate => {
                if let Some(relocate) = &self.relocate {
                    relocate.render(frame, chunks[1]);
                }
            }
        }
        self.render_footer(frame, chunks[2]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let mut lines = vec![Line::from(vec![
            Span::styled(
                "Transmission",
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("  |  "),
            Span::raw(self.connection_label.as_str()),
        ])];
        let current = self
            .table
            .current()
            .map(|torrent| torrent.name.as_str())
            .unwrap_or("N/A");
        lines.push(Line::from(format!(
            "Torrents {}  Selected {}  Cursor {}  | {}",
            self.table.len(),
            self.table.selection().len(),
            self.table.cursor(),
            current
        )));
        if let Some(status) = &self.status {
            lines.push(Line::from(Span::styled(
                status.text.clone(),
                status.level.style(),
            )));
        }
        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::raw(" Session ")),
        );
        frame.render_widget(paragraph, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let hints = match self.view {
            View::Table => {
                "↑/k ↓/j move  enter select  l info  m move  R reload  esc focus  q quit"
            }
            View::Info => "h/← previous tab  l/→ next tab  j/k scroll  tab back  q quit",
            View::Relocate => "enter apply  tab bookmark  esc/ctrl+c cancel",
        };
        let paragraph = Paragraph::new(Line::from(Span::styled(
            hints,
            Style::default().fg(Color::DarkGray),
        )))
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn is_quit_key(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        KeyCode::Char('q') => !key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        command::{execute, testing::FakeDaemon},
        config::AppConfig,
        model::{sample_torrent, Torrent},
    };

    fn key(code: KeyCode) -> Message {
        Message::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn three_torrents() -> Vec<Torrent> {
        vec![
            sample_torrent(11, "alpha"),
            sample_torrent(12, "beta"),
            sample_torrent(13, "gamma"),
        ]
    }

    /// Runs every command synchronously and feeds the results back in.
    struct Harness {
        app: App,
        daemon: Arc<FakeDaemon>,
        issued: Vec<Command>,
    }

    impl Harness {
        fn new(daemon: FakeDaemon) -> Self {
            Self {
                app: App::new(&AppConfig::default()),
                daemon: Arc::new(daemon),
                issued: Vec::new(),
            }
        }

        fn started(torrents: Vec<Torrent>) -> Self {
            let mut harness = Self::new(FakeDaemon::with_torrents(torrents));
            harness.send(Message::Resize {
                width: 120,
                height: 40,
            });
            harness
        }

        fn send(&mut self, message: Message) {
            let mut queue = self.app.handle(message);
            while !queue.is_empty() {
                let command = queue.remove(0);
                self.issued.push(command.clone());
                let result = execute(self.daemon.as_ref(), command);
                queue.extend(self.app.handle(result));
            }
        }
    }

    #[test]
    fn first_resize_loads_table() {
        let harness = Harness::started(three_torrents());
        let app = &harness.app;
        assert_eq!(harness.issued, vec![Command::ListTorrents]);
        assert_eq!(app.view(), View::Table);
        assert_eq!(app.table().len(), 3);
        assert_eq!(app.table().cursor(), 0);
        assert!(app.table().selection().is_empty());
    }

    #[test]
    fn later_resizes_do_not_reload() {
        let mut harness = Harness::started(three_torrents());
        harness.send(Message::Resize {
            width: 80,
            height: 24,
        });
        assert_eq!(harness.issued, vec![Command::ListTorrents]);
    }

    #[test]
    fn enter_toggles_cursor_row_selection() {
        let mut harness = Harness::started(three_torrents());
        harness.send(key(KeyCode::Char('j')));
        assert_eq!(harness.app.table().cursor(), 1);

        harness.send(key(KeyCode::Enter));
        assert_eq!(
            harness.app.table().selection().ids().collect::<Vec<_>>(),
            vec![12]
        );
        harness.send(key(KeyCode::Enter));
        assert!(harness.app.table().selection().is_empty());
    }

    #[test]
    fn info_round_trip_keeps_cursor() {
        let mut harness = Harness::started(three_torrents());
        harness.send(key(KeyCode::Char('l')));
        assert_eq!(harness.app.view(), View::Info);
        assert_eq!(harness.app.info().map(InfoTabs::torrent_id), Some(11));
        assert_eq!(harness.issued.last(), Some(&Command::FetchDetail { id: 11 }));

        harness.send(key(KeyCode::Char('h')));
        assert_eq!(harness.app.view(), View::Table);
        assert_eq!(harness.app.table().cursor(), 0);
        assert!(harness.app.info().is_none());
    }

    #[test]
    fn info_tabs_move_before_returning() {
        let mut harness = Harness::started(three_torrents());
        harness.send(key(KeyCode::Right));
        harness.send(key(KeyCode::Right));
        harness.send(key(KeyCode::Right));
        harness.send(key(KeyCode::Right));
        assert_eq!(harness.app.info().map(InfoTabs::active_tab), Some(2));
        harness.send(key(KeyCode::Left));
        assert_eq!(harness.app.view(), View::Info);
        harness.send(key(KeyCode::Tab));
        assert_eq!(harness.app.view(), View::Table);
    }

    #[test]
    fn relocating_selection_moves_each_and_reloads() {
        let mut harness = Harness::started(three_torrents());
        harness.send(key(KeyCode::Enter));
        harness.send(key(KeyCode::Char('j')));
        harness.send(key(KeyCode::Char('j')));
        harness.send(key(KeyCode::Enter));
        harness.issued.clear();

        harness.send(key(KeyCode::Char('m')));
        assert_eq!(harness.app.view(), View::Relocate);
        for c in "/new/path".chars() {
            harness.send(key(KeyCode::Char(c)));
        }
        harness.send(key(KeyCode::Enter));

        assert_eq!(
            harness.daemon.relocations(),
            vec![
                (11, "/new/path".to_string()),
                (13, "/new/path".to_string()),
            ]
        );
        assert_eq!(harness.issued.last(), Some(&Command::ListTorrents));
        assert_eq!(harness.app.view(), View::Table);
        assert_eq!(harness.app.table().rows()[0][5], "/new/path");
        assert_eq!(harness.app.table().rows()[1][5], "/downloads");
        assert!(harness
            .app
            .status()
            .is_some_and(|status| status.text == "Moved 2 torrent(s) to /new/path"));
    }

    #[test]
    fn relocate_without_selection_moves_cursor_torrent() {
        let mut harness = Harness::started(three_torrents());
        harness.send(key(KeyCode::Char('j')));
        harness.send(key(KeyCode::Char('M')));
        harness.send(key(KeyCode::Enter));
        assert_eq!(harness.daemon.relocations(), vec![(12, String::new())]);
    }

    #[test]
    fn relocate_failures_are_reported_not_fatal() {
        let daemon = FakeDaemon {
            fail_relocate: vec![11],
            ..FakeDaemon::with_torrents(three_torrents())
        };
        let mut harness = Harness::new(daemon);
        harness.send(Message::Resize {
            width: 120,
            height: 40,
        });
        harness.send(key(KeyCode::Char('m')));
        harness.send(key(KeyCode::Char('/')));
        harness.send(key(KeyCode::Enter));
        assert!(harness.app.fatal_error().is_none());
        assert_eq!(harness.app.view(), View::Table);
        let status = harness.app.status().unwrap();
        assert_eq!(status.level, crate::status::StatusLevel::Warning);
    }

    #[test]
    fn relocate_abort_sends_nothing() {
        let mut harness = Harness::started(three_torrents());
        harness.send(key(KeyCode::Char('m')));
        harness.send(key(KeyCode::Char('q')));
        assert!(!harness.app.should_quit());
        harness.send(Message::Key(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
        )));
        assert!(!harness.app.should_quit());
        assert_eq!(harness.app.view(), View::Table);
        assert!(harness.daemon.relocations().is_empty());
    }

    #[test]
    fn startup_failure_is_terminal() {
        let mut harness = Harness::new(FakeDaemon {
            fail_list: true,
            ..FakeDaemon::default()
        });
        harness.send(Message::Resize {
            width: 120,
            height: 40,
        });
        assert!(harness.app.fatal_error().is_some());
        assert_eq!(harness.app.table().len(), 0);

        harness.issued.clear();
        harness.send(key(KeyCode::Char('R')));
        harness.send(Message::Torrents(three_torrents()));
        assert!(harness.issued.is_empty());
        assert_eq!(harness.app.table().len(), 0);
    }

    #[test]
    fn quit_keys_work_from_table_and_info() {
        let mut harness = Harness::started(three_torrents());
        harness.send(key(KeyCode::Char('q')));
        assert!(harness.app.should_quit());

        let mut harness = Harness::started(three_torrents());
        harness.send(key(KeyCode::Char('l')));
        harness.send(Message::Key(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
        )));
        assert!(harness.app.should_quit());
    }

    #[test]
    fn late_relocate_results_are_ignored() {
        let mut harness = Harness::started(three_torrents());
        harness.issued.clear();
        harness.send(Message::Relocated {
            batch: 1,
            id: 11,
            error: None,
        });
        assert!(harness.issued.is_empty());
        assert_eq!(harness.app.view(), View::Table);
    }

    #[test]
    fn out_of_order_details_apply_by_id() {
        let mut harness = Harness::started(three_torrents());
        let mut newer_gamma = sample_torrent(13, "gamma");
        newer_gamma.download_dir = "/late".to_string();
        let mut newer_alpha = sample_torrent(11, "alpha");
        newer_alpha.download_dir = "/early".to_string();
        harness.send(Message::Detail(newer_gamma));
        harness.send(Message::Detail(newer_alpha));
        assert_eq!(harness.app.table().rows()[0][5], "/early");
        assert_eq!(harness.app.table().rows()[2][5], "/late");
    }

    #[test]
    fn empty_daemon_yields_empty_table() {
        let mut harness = Harness::started(Vec::new());
        assert_eq!(harness.app.table().len(), 0);
        harness.send(key(KeyCode::Char('l')));
        harness.send(key(KeyCode::Char('m')));
        harness.send(key(KeyCode::Enter));
        assert_eq!(harness.app.view(), View::Table);
        assert!(harness.app.fatal_error().is_none());
    }

    fn type_keys(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle(key(KeyCode::Char(c)));
        }
    }

    fn confirm_batch(app: &mut App) -> u64 {
        let commands = app.handle(key(KeyCode::Enter));
        match commands.as_slice() {
            [Command::SetLocation { batch, .. }] => *batch,
            other => panic!("expected one move, got {other:?}"),
        }
    }

    #[test]
    fn stale_result_from_abandoned_batch_does_not_end_new_one() {
        let mut harness = Harness::started(three_torrents());
        let app = &mut harness.app;

        app.handle(key(KeyCode::Char('m')));
        type_keys(app, "/a");
        let first = confirm_batch(app);
        app.handle(key(KeyCode::Esc));
        assert_eq!(app.view(), View::Table);

        app.handle(key(KeyCode::Char('m')));
        type_keys(app, "/b");
        let second = confirm_batch(app);
        assert_ne!(first, second);

        let commands = app.handle(Message::Relocated {
            batch: first,
            id: 11,
            error: None,
        });
        assert!(commands.is_empty());
        assert_eq!(app.view(), View::Relocate);

        let commands = app.handle(Message::Relocated {
            batch: second,
            id: 11,
            error: None,
        });
        assert_eq!(commands, vec![Command::ListTorrents]);
        assert_eq!(app.view(), View::Table);
        assert!(app
            .status()
            .is_some_and(|status| status.text == "Moved 1 torrent(s) to /b"));
    }

    #[test]
    fn abandoning_outstanding_moves_warns() {
        let mut harness = Harness::started(three_torrents());
        let app = &mut harness.app;
        app.handle(key(KeyCode::Char('m')));
        type_keys(app, "/");
        confirm_batch(app);

        let commands = app.handle(key(KeyCode::Esc));
        assert_eq!(commands, vec![Command::ListTorrents]);
        let status = app.status().unwrap();
        assert_eq!(status.level, crate::status::StatusLevel::Warning);
        assert_eq!(status.text, "Stopped waiting; 1 move(s) still running");
    }
}
