use std::fmt::Write as _;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Frame,
};

use crate::{
    command::{Transition, Update},
    model::{
        format_bytes, format_eta, format_progress, format_ratio, format_speed, format_timestamp,
        Torrent,
    },
};

pub const TAB_TITLES: [&str; 3] = ["Info", "Peers", "Files"];

pub const NO_PEERS: &str = "No peers connected to this torrent.";

/// Info/Peers/Files tabs for one torrent. Tab text is built once per snapshot.
pub struct InfoTabs {
    torrent_id: i64,
    name: String,
    contents: [String; 3],
    active: usize,
    scroll: u16,
}

impl InfoTabs {
    pub fn new(torrent: &Torrent) -> Self {
        Self {
            torrent_id: torrent.id,
            name: torrent.name.clone(),
            contents: [
                info_text(torrent),
                peers_text(torrent),
                files_text(torrent),
            ],
            active: 0,
            scroll: 0,
        }
    }

    #[cfg(test)]
    pub fn torrent_id(&self) -> i64 {
        self.torrent_id
    }

    #[cfg(test)]
    pub fn active_tab(&self) -> usize {
        self.active
    }

    #[cfg(test)]
    pub fn content(&self, tab: usize) -> &str {
        &self.contents[tab]
    }

    pub fn next_tab(&mut self) {
        if self.active < TAB_TITLES.len() - 1 {
            self.active += 1;
            self.scroll = 0;
        }
    }

    pub fn prev_tab(&mut self) {
        if self.active > 0 {
            self.active -= 1;
            self.scroll = 0;
        }
    }

    /// Rebuilds the tab text from a newer snapshot of the same torrent.
    pub fn refresh(&mut self, torrent: &Torrent) {
        if torrent.id != self.torrent_id {
            return;
        }
        let active = self.active;
        let scroll = self.scroll;
        *self = Self::new(torrent);
        self.active = active;
        self.scroll = scroll;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Update {
        match key.code {
            KeyCode::Left | KeyCode::Char('h') if self.active == 0 => {
                Update::transition(Transition::ReturnToTable { reload: false })
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.prev_tab();
                Update::none()
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.next_tab();
                Update::none()
            }
            KeyCode::Tab => Update::transition(Transition::ReturnToTable { reload: false }),
            KeyCode::Down | KeyCode::Char('j') => {
                self.scroll = self.scroll.saturating_add(1);
                Update::none()
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.scroll = self.scroll.saturating_sub(1);
                Update::none()
            }
            _ => Update::none(),
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);
        let highlight = Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD);
        let tabs = Tabs::new(TAB_TITLES.to_vec())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(Span::raw(format!(" {} ", self.name))),
            )
            .highlight_style(highlight)
            .select(self.active);
        frame.render_widget(tabs, chunks[0]);

        let lines: Vec<Line> = self.contents[self.active].lines().map(Line::from).collect();
        let body = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: false })
            .scroll((self.scroll, 0));
        frame.render_widget(body, chunks[1]);
    }
}

fn info_text(torrent: &Torrent) -> String {
    let error = if torrent.error.is_empty() {
        "none"
    } else {
        torrent.error.as_str()
    };
    let mut text = String::new();
    let _ = writeln!(text, "Name: {}", torrent.name);
    let _ = writeln!(text, "Status: {}", torrent.status.label());
    let _ = writeln!(text, "Progress: {}", format_progress(torrent.percent_done));
    let _ = writeln!(text, "Size: {}", format_bytes(torrent.total_size));
    let _ = writeln!(text, "Location: {}", torrent.download_dir);
    let _ = writeln!(text, "Ratio: {}", format_ratio(torrent.upload_ratio));
    let _ = writeln!(text, "Uploaded: {}", format_bytes(torrent.uploaded_ever));
    let _ = writeln!(text, "Date Added: {}", format_timestamp(torrent.added_date));
    let _ = writeln!(
        text,
        "Last Activity: {}",
        format_timestamp(torrent.activity_date)
    );
    let _ = writeln!(text, "ETA: {}", format_eta(torrent.eta));
    if !torrent.labels.is_empty() {
        let _ = writeln!(text, "Labels: {}", torrent.labels.join(", "));
    }
    let _ = write!(text, "Error: {error}");
    text
}

fn peers_text(torrent: &Torrent) -> String {
    if torrent.peers.is_empty() {
        return NO_PEERS.to_string();
    }
    let mut text = String::new();
    for peer in &torrent.peers {
        let _ = writeln!(text, "{}", peer.client_name);
        let _ = writeln!(text, "  Address: {}", peer.address);
        let _ = writeln!(text, "  Progress: {}", format_progress(peer.progress));
        let _ = writeln!(
            text,
            "  Rate to client: {}",
            format_speed(peer.rate_to_client)
        );
        let _ = writeln!(text, "  Rate to peer: {}", format_speed(peer.rate_to_peer));
        text.push('\n');
    }
    text
}

fn files_text(torrent: &Torrent) -> String {
    let mut text = format!("Files ({}):\n", torrent.files.len());
    for file in &torrent.files {
        let done = if file.length > 0 {
            file.bytes_completed as f64 / file.length as f64
        } else {
            1.0
        };
        let _ = writeln!(
            text,
            "{}  {}  {}",
            format_progress(done),
            format_bytes(file.length),
            file.name
        );
    }
    text
}
