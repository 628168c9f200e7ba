use std::collections::HashSet;

use crossterm::event::{KeyCode, KeyEvent};
use log::debug;
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::Span,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::{
    columns::{build_row, build_rows, ColumnSpec},
    command::{Command, Transition, Update},
    model::Torrent,
    selection::Selection,
};

/// Torrent list with a cursor and a selection set.
pub struct TorrentTable {
    columns: Vec<ColumnSpec>,
    torrents: Vec<Torrent>,
    rows: Vec<Vec<String>>,
    cursor: usize,
    selection: Selection,
    // Ids whose selection fetch is still in flight.
    pending_selection: HashSet<i64>,
    focused: bool,
    state: TableState,
}

impl TorrentTable {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            torrents: Vec::new(),
            rows: Vec::new(),
            cursor: 0,
            selection: Selection::default(),
            pending_selection: HashSet::new(),
            focused: true,
            state: TableState::default(),
        }
    }

    pub fn load(&self) -> Command {
        Command::ListTorrents
    }

    /// Replaces every row with the listing, keeping the cursor in range.
    pub fn apply_torrents(&mut self, torrents: Vec<Torrent>) {
        self.rows = build_rows(&self.columns, &torrents);
        self.selection.refresh(&torrents);
        self.pending_selection
            .retain(|id| torrents.iter().any(|torrent| torrent.id == *id));
        self.torrents = torrents;
        self.cursor = self.cursor.min(self.torrents.len().saturating_sub(1));
    }

    /// Stores a freshly fetched snapshot over the row with the same id.
    pub fn apply_detail(&mut self, torrent: Torrent) {
        let Some(index) = self.position(torrent.id) else {
            debug!("dropping detail for torrent {} no longer listed", torrent.id);
            return;
        };
        self.rows[index] = build_row(&self.columns, &torrent);
        self.torrents[index] = torrent;
    }

    /// Completes a selection toggle started by `toggle_selection`.
    pub fn apply_selection(&mut self, torrent: Torrent) {
        if !self.pending_selection.remove(&torrent.id) {
            debug!("ignoring stale selection result for torrent {}", torrent.id);
            return;
        }
        self.selection.insert(torrent.clone());
        self.apply_detail(torrent);
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.torrents.is_empty() {
            return;
        }
        self.cursor = self.clamped(delta);
    }

    pub fn move_to(&mut self, index: usize) {
        if self.torrents.is_empty() {
            return;
        }
        self.cursor = index.min(self.torrents.len() - 1);
    }

    /// Fetches the torrent `offset` rows from the cursor without moving it.
    pub fn request_detail(&self, offset: isize) -> Option<Command> {
        let torrent = self.torrents.get(self.clamped(offset))?;
        Some(Command::FetchDetail { id: torrent.id })
    }

    /// Deselects the cursor row at once; selecting it waits for a fresh fetch.
    pub fn toggle_selection(&mut self) -> Option<Command> {
        let id = self.current()?.id;
        if self.selection.remove(id).is_some() {
            return None;
        }
        if self.pending_selection.remove(&id) {
            return None;
        }
        self.pending_selection.insert(id);
        Some(Command::FetchSelection { id })
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Update {
        if key.code == KeyCode::Esc {
            self.focused = !self.focused;
            return Update::none();
        }
        if !self.focused {
            return Update::none();
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.step(-1),
            KeyCode::Down | KeyCode::Char('j') => self.step(1),
            KeyCode::Home | KeyCode::Char('g') => {
                self.move_to(0);
                self.request_detail(0).into()
            }
            KeyCode::End | KeyCode::Char('G') => {
                self.move_to(usize::MAX);
                self.request_detail(0).into()
            }
            KeyCode::Enter => self.toggle_selection().into(),
            KeyCode::Right | KeyCode::Char('l') if self.current().is_some() => {
                Update::transition(Transition::OpenInfo)
            }
            KeyCode::Char('m') | KeyCode::Char('M') if self.current().is_some() => {
                Update::transition(Transition::OpenRelocate)
            }
            KeyCode::Char('R') => Update::command(self.load()),
            _ => Update::none(),
        }
    }

    fn step(&mut self, delta: isize) -> Update {
        let peek = self.request_detail(delta);
        self.move_cursor(delta);
        peek.into()
    }

    pub fn current(&self) -> Option<&Torrent> {
        self.torrents.get(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.torrents.len()
    }

    #[cfg(test)]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    #[cfg(test)]
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    fn clamped(&self, offset: isize) -> usize {
        let max_index = self.torrents.len().saturating_sub(1) as isize;
        (self.cursor as isize + offset).clamp(0, max_index) as usize
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.torrents.iter().position(|torrent| torrent.id == id)
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect) {
        let title = if self.selection.is_empty() {
            " Torrents ".to_string()
        } else {
            format!(" Torrents ({} selected) ", self.selection.len())
        };
        let border_style = if self.focused {
            Style::default()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::raw(title));

        if self.rows.is_empty() {
            frame.render_widget(Paragraph::new("No torrents loaded").block(block), area);
            return;
        }

        let header = Row::new(
            self.columns
                .iter()
                .map(|spec| Cell::from(spec.column.title())),
        )
        .style(Style::default().add_modifier(Modifier::BOLD))
        .bottom_margin(1);
        let selected_style = Style::default().fg(Color::Green);
        let rows = self
            .torrents
            .iter()
            .zip(&self.rows)
            .map(|(torrent, cells)| {
                let row = Row::new(cells.iter().map(|cell| Cell::from(cell.as_str())));
                if self.selection.contains(torrent.id) {
                    row.style(selected_style)
                } else {
                    row
                }
            });
        let widths = self
            .columns
            .iter()
            .map(|spec| Constraint::Length(spec.width));
        let highlight = if self.focused {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .highlight_style(highlight)
            .highlight_symbol("> ");
        self.state.select(Some(self.cursor));
        frame.render_stateful_widget(table, area, &mut self.state);
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        columns::{default_columns, Column},
        model::sample_torrent,
    };

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn loaded(count: i64) -> TorrentTable {
        let mut table = TorrentTable::new(default_columns());
        table.apply_torrents(
            (1..=count)
                .map(|id| sample_torrent(id, &format!("torrent-{id}")))
                .collect(),
        );
        table
    }

    #[test]
    fn empty_listing_builds_empty_table() {
        let mut table = loaded(0);
        assert_eq!(table.len(), 0);
        assert_eq!(table.cursor(), 0);
        assert!(table.current().is_none());
        table.move_cursor(1);
        assert_eq!(table.cursor(), 0);
        assert_eq!(table.request_detail(0), None);
        assert_eq!(table.toggle_selection(), None);
        assert_eq!(table.handle_key(key(KeyCode::Char('l'))), Update::none());
    }

    #[test]
    fn cursor_stays_within_rows() {
        let mut table = loaded(3);
        table.move_cursor(-1);
        assert_eq!(table.cursor(), 0);
        for _ in 0..10 {
            table.move_cursor(1);
        }
        assert_eq!(table.cursor(), 2);
        table.move_cursor(-5);
        assert_eq!(table.cursor(), 0);
    }

    #[test]
    fn detail_requests_clamp_without_moving() {
        let mut table = loaded(3);
        assert_eq!(table.request_detail(-1), Some(Command::FetchDetail { id: 1 }));
        assert_eq!(table.request_detail(1), Some(Command::FetchDetail { id: 2 }));
        table.move_cursor(2);
        assert_eq!(table.request_detail(1), Some(Command::FetchDetail { id: 3 }));
        assert_eq!(table.cursor(), 2);
    }

    #[test]
    fn moving_down_peeks_neighbour() {
        let mut table = loaded(3);
        let update = table.handle_key(key(KeyCode::Char('j')));
        assert_eq!(update.commands, vec![Command::FetchDetail { id: 2 }]);
        assert_eq!(table.cursor(), 1);
    }

    #[test]
    fn reload_replaces_rows_and_clamps_cursor() {
        let mut table = loaded(5);
        table.move_cursor(4);
        table.apply_torrents(vec![sample_torrent(9, "only")]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.cursor(), 0);
        assert_eq!(table.rows()[0][0], "9");
    }

    #[test]
    fn selection_waits_for_fetch_and_toggles_off() {
        let mut table = loaded(3);
        table.move_cursor(1);
        assert_eq!(
            table.toggle_selection(),
            Some(Command::FetchSelection { id: 2 })
        );
        assert!(table.selection().is_empty());

        table.apply_selection(sample_torrent(2, "torrent-2"));
        assert_eq!(table.selection().ids().collect::<Vec<_>>(), vec![2]);

        assert_eq!(table.toggle_selection(), None);
        assert!(table.selection().is_empty());
    }

    #[test]
    fn toggling_twice_restores_prior_selection() {
        let mut table = loaded(3);
        table.toggle_selection();
        table.apply_selection(sample_torrent(1, "torrent-1"));
        let before = table.selection().clone();

        table.move_cursor(1);
        table.toggle_selection();
        table.apply_selection(sample_torrent(2, "torrent-2"));
        assert!(table.selection().contains(2));
        table.toggle_selection();
        assert_eq!(table.selection(), &before);

        table.move_cursor(-1);
        table.toggle_selection();
        assert!(table.selection().is_empty());
        table.toggle_selection();
        table.apply_selection(sample_torrent(1, "torrent-1"));
        assert_eq!(table.selection(), &before);
    }

    #[test]
    fn double_toggle_before_result_cancels() {
        let mut table = loaded(2);
        assert!(table.toggle_selection().is_some());
        assert_eq!(table.toggle_selection(), None);
        table.apply_selection(sample_torrent(1, "torrent-1"));
        assert!(table.selection().is_empty());
    }

    #[test]
    fn detail_updates_matching_row_only() {
        let mut table = TorrentTable::new(vec![
            ColumnSpec::new(Column::Id),
            ColumnSpec::new(Column::Location),
        ]);
        table.apply_torrents(vec![sample_torrent(1, "a"), sample_torrent(2, "b")]);
        let mut moved = sample_torrent(2, "b");
        moved.download_dir = "/moved".to_string();
        table.apply_detail(moved);
        table.apply_detail(sample_torrent(77, "ghost"));
        assert_eq!(table.rows()[1], vec!["2".to_string(), "/moved".to_string()]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn blurred_table_ignores_navigation() {
        let mut table = loaded(3);
        table.handle_key(key(KeyCode::Esc));
        assert!(!table.is_focused());
        assert_eq!(table.handle_key(key(KeyCode::Char('j'))), Update::none());
        assert_eq!(table.cursor(), 0);
        table.handle_key(key(KeyCode::Esc));
        assert!(table.is_focused());
    }

    #[test]
    fn info_and_relocate_keys_request_transitions() {
        let mut table = loaded(1);
        assert_eq!(
            table.handle_key(key(KeyCode::Char('l'))).transition,
            Some(Transition::OpenInfo)
        );
        assert_eq!(
            table.handle_key(key(KeyCode::Char('M'))).transition,
            Some(Transition::OpenRelocate)
        );
    }
}
