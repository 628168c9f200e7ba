use std::collections::BTreeMap;

use crate::model::Torrent;

/// Torrents marked for a batch operation, keyed by daemon id.
///
/// Holds the snapshot fetched when each torrent was selected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    entries: BTreeMap<i64, Torrent>,
}

impl Selection {
    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn insert(&mut self, torrent: Torrent) {
        self.entries.insert(torrent.id, torrent);
    }

    pub fn remove(&mut self, id: i64) -> Option<Torrent> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.keys().copied()
    }

    pub fn torrents(&self) -> impl Iterator<Item = &Torrent> {
        self.entries.values()
    }

    /// Swaps held snapshots for newer ones from a full listing and forgets
    /// torrents the daemon no longer knows about.
    pub fn refresh(&mut self, torrents: &[Torrent]) {
        self.entries = torrents
            .iter()
            .filter(|torrent| self.entries.contains_key(&torrent.id))
            .map(|torrent| (torrent.id, torrent.clone()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::sample_torrent;

    #[test]
    fn insert_replaces_snapshot_for_same_id() {
        let mut selection = Selection::default();
        selection.insert(sample_torrent(1, "a"));
        let mut newer = sample_torrent(1, "a");
        newer.download_dir = "/newer".to_string();
        selection.insert(newer.clone());

        assert_eq!(selection.len(), 1);
        assert_eq!(selection.remove(1), Some(newer));
        assert!(selection.is_empty());
    }

    #[test]
    fn refresh_replaces_snapshots_and_drops_missing() {
        let mut selection = Selection::default();
        selection.insert(sample_torrent(1, "a"));
        selection.insert(sample_torrent(2, "b"));

        let mut moved = sample_torrent(1, "a");
        moved.download_dir = "/elsewhere".to_string();
        selection.refresh(&[moved.clone(), sample_torrent(3, "c")]);

        assert_eq!(selection.ids().collect::<Vec<_>>(), vec![1]);
        assert_eq!(selection.torrents().next(), Some(&moved));
    }
}
