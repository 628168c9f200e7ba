use std::collections::BTreeSet;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{debug, info, warn};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::{
    command::{Command, Transition, Update},
    input::TextInput,
    model::Torrent,
    selection::Selection,
    status::StatusUpdate,
};

enum Phase {
    Editing,
    Applying {
        path: String,
        pending: BTreeSet<i64>,
        failures: Vec<(i64, String)>,
    },
}

/// Prompts for a new download directory and moves the targets there.
pub struct Relocate {
    primary: Torrent,
    targets: Vec<Torrent>,
    input: TextInput,
    bookmarks: Vec<String>,
    bookmark: Option<usize>,
    batch: u64,
    phase: Phase,
}

impl Relocate {
    /// With an empty selection the primary torrent is the only target.
    /// `batch` tags every move this view issues so results from an earlier
    /// view are not mistaken for its own.
    pub fn new(
        primary: Torrent,
        selection: &Selection,
        bookmarks: Vec<String>,
        batch: u64,
    ) -> Self {
        let targets = if selection.is_empty() {
            vec![primary.clone()]
        } else {
            selection.torrents().cloned().collect()
        };
        Self {
            primary,
            targets,
            input: TextInput::default(),
            bookmarks,
            bookmark: None,
            batch,
            phase: Phase::Editing,
        }
    }

    #[cfg(test)]
    pub fn target_ids(&self) -> Vec<i64> {
        self.targets.iter().map(|torrent| torrent.id).collect()
    }

    #[cfg(test)]
    pub fn primary_id(&self) -> i64 {
        self.primary.id
    }

    #[cfg(test)]
    pub fn input(&self) -> &TextInput {
        &self.input
    }

    pub fn is_applying(&self) -> bool {
        matches!(self.phase, Phase::Applying { .. })
    }

    /// Picks up a newer snapshot of the primary torrent or one of the targets.
    pub fn refresh(&mut self, torrent: &Torrent) {
        if torrent.id == self.primary.id {
            self.primary = torrent.clone();
        }
        if let Some(target) = self.targets.iter_mut().find(|t| t.id == torrent.id) {
            *target = torrent.clone();
        }
    }

    pub fn paste(&mut self, text: &str) {
        if !self.is_applying() {
            self.input.insert_str(text);
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Update {
        let ctrl_c = key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
        if self.is_applying() {
            // Moves already dispatched keep running; leaving only stops waiting.
            if key.code == KeyCode::Esc || ctrl_c {
                return Update::transition(Transition::ReturnToTable { reload: true });
            }
            return Update::none();
        }
        if key.code == KeyCode::Esc || ctrl_c {
            return Update::transition(Transition::ReturnToTable { reload: false });
        }
        match key.code {
            KeyCode::Enter => self.confirm(),
            KeyCode::Tab => {
                self.cycle_bookmark();
                Update::none()
            }
            _ => {
                self.input.handle_key(key);
                Update::none()
            }
        }
    }

    /// Issues one set-location per target with the path exactly as typed.
    fn confirm(&mut self) -> Update {
        let path = self.input.value().to_string();
        let commands: Vec<Command> = self
            .targets
            .iter()
            .map(|torrent| Command::SetLocation {
                batch: self.batch,
                id: torrent.id,
                path: path.clone(),
            })
            .collect();
        info!("moving {} torrent(s) to {path:?}", commands.len());
        self.phase = Phase::Applying {
            path,
            pending: self.targets.iter().map(|torrent| torrent.id).collect(),
            failures: Vec::new(),
        };
        Update {
            commands,
            transition: None,
        }
    }

    /// Records one finished move. Once none are outstanding, asks to go back
    /// to a reloaded table.
    pub fn apply_result(&mut self, batch: u64, id: i64, error: Option<String>) -> Update {
        if batch != self.batch {
            debug!("ignoring relocate result for torrent {id} from batch {batch}");
            return Update::none();
        }
        let Phase::Applying {
            pending, failures, ..
        } = &mut self.phase
        else {
            return Update::none();
        };
        if !pending.remove(&id) {
            return Update::none();
        }
        if let Some(error) = error {
            failures.push((id, error));
        }
        if pending.is_empty() {
            Update::transition(Transition::ReturnToTable { reload: true })
        } else {
            Update::none()
        }
    }

    /// Summary for the status line when the view closes after a confirm.
    pub fn outcome(&self) -> Option<StatusUpdate> {
        let Phase::Applying {
            path,
            pending,
            failures,
        } = &self.phase
        else {
            return None;
        };
        if !pending.is_empty() {
            return Some(StatusUpdate::warning(format!(
                "Stopped waiting; {} move(s) still running",
                pending.len()
            )));
        }
        let finished = self.targets.len();
        if failures.is_empty() {
            return Some(StatusUpdate::success(format!(
                "Moved {finished} torrent(s) to {path}"
            )));
        }
        for (id, error) in failures {
            warn!("torrent {id} was not moved: {error}");
        }
        let ids = failures
            .iter()
            .map(|(id, _)| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Some(StatusUpdate::warning(format!(
            "Moved {} of {} torrent(s); failed: {ids} ({})",
            finished - failures.len(),
            self.targets.len(),
            failures[0].1
        )))
    }

    fn cycle_bookmark(&mut self) {
        if self.bookmarks.is_empty() {
            return;
        }
        let next = match self.bookmark {
            Some(index) => (index + 1) % self.bookmarks.len(),
            None => 0,
        };
        self.bookmark = Some(next);
        self.input.set_value(self.bookmarks[next].clone());
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Length(3),
                Constraint::Min(0),
            ])
            .split(area);

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let header = Paragraph::new(vec![
            Line::from(vec![
                Span::raw("Selected torrent: "),
                Span::styled(self.primary.name.clone(), bold),
            ]),
            Line::from(format!("Current location: {}", self.primary.download_dir)),
        ])
        .block(Block::default().borders(Borders::ALL).title(" Relocate "))
        .wrap(Wrap { trim: true });
        frame.render_widget(header, chunks[0]);

        let input_block = Block::default()
            .borders(Borders::ALL)
            .title(" New location ");
        let inner = input_block.inner(chunks[1]);
        let field = if self.input.value().is_empty() && !self.is_applying() {
            Paragraph::new(Span::styled(
                "Enter new path",
                Style::default().fg(Color::DarkGray),
            ))
        } else {
            Paragraph::new(self.input.value())
        };
        frame.render_widget(field.block(input_block), chunks[1]);
        if !self.is_applying() {
            let offset = u16::try_from(self.input.cursor()).unwrap_or(u16::MAX);
            let x = inner
                .x
                .saturating_add(offset)
                .min(inner.right().saturating_sub(1));
            frame.set_cursor(x, inner.y);
        }

        let mut lines = Vec::new();
        match &self.phase {
            Phase::Editing => {
                lines.push(Line::from(format!(
                    "The following torrents will be moved to \"{}\":",
                    self.input.value()
                )));
            }
            Phase::Applying { pending, .. } => {
                lines.push(Line::from(Span::styled(
                    format!(
                        "Moving {} torrent(s), {} outstanding…",
                        self.targets.len(),
                        pending.len()
                    ),
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
        for torrent in &self.targets {
            lines.push(Line::from(format!(
                "  {}  ({})",
                torrent.name, torrent.download_dir
            )));
        }
        if !self.bookmarks.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("Bookmarks [tab]", bold)));
            for (index, bookmark) in self.bookmarks.iter().enumerate() {
                let marker = if self.bookmark == Some(index) { ">" } else { " " };
                lines.push(Line::from(format!("{marker} {bookmark}")));
            }
        }
        let body = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        frame.render_widget(body, chunks[2]);
    }
}
