use std::time::Duration;

use time::{macros::format_description, OffsetDateTime};

/// Point-in-time copy of one torrent as returned by the daemon.
///
/// Holders never mutate a snapshot; observing a change on the daemon takes a
/// fresh fetch, which replaces the held value wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct Torrent {
    pub id: i64,
    pub name: String,
    pub status: TorrentStatus,
    pub total_size: i64,
    pub download_dir: String,
    pub upload_ratio: f64,
    pub error: String,
    pub eta: Option<i64>,
    pub added_date: i64,
    pub activity_date: i64,
    pub percent_done: f64,
    pub rate_download: i64,
    pub rate_upload: i64,
    pub uploaded_ever: i64,
    pub labels: Vec<String>,
    pub trackers: Vec<String>,
    pub peers: Vec<Peer>,
    pub files: Vec<TorrentFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub address: String,
    pub client_name: String,
    pub progress: f64,
    pub rate_to_client: i64,
    pub rate_to_peer: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TorrentFile {
    pub name: String,
    pub length: i64,
    pub bytes_completed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentStatus {
    Stopped,
    CheckingFiles,
    FilesChecked,
    QueuedForDownload,
    Downloading,
    WaitingForSeeds,
    Seeding,
    NoPeersFound,
    Unknown,
}

impl TorrentStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => TorrentStatus::Stopped,
            1 => TorrentStatus::CheckingFiles,
            2 => TorrentStatus::FilesChecked,
            3 => TorrentStatus::QueuedForDownload,
            4 => TorrentStatus::Downloading,
            5 => TorrentStatus::WaitingForSeeds,
            6 => TorrentStatus::Seeding,
            7 => TorrentStatus::NoPeersFound,
            _ => TorrentStatus::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TorrentStatus::Stopped => "Stopped",
            TorrentStatus::CheckingFiles => "Checking Files",
            TorrentStatus::FilesChecked => "Files Checked",
            TorrentStatus::QueuedForDownload => "Queued for Download",
            TorrentStatus::Downloading => "Downloading",
            TorrentStatus::WaitingForSeeds => "Waiting for Seeds",
            TorrentStatus::Seeding => "Seeding",
            TorrentStatus::NoPeersFound => "No Peers Found",
            TorrentStatus::Unknown => "Unknown",
        }
    }
}

pub fn format_speed(value: i64) -> String {
    const UNITS: [&str; 5] = ["B/s", "KiB/s", "MiB/s", "GiB/s", "TiB/s"];
    let mut magnitude = value.max(0) as f64;
    let mut unit = 0;
    while magnitude >= 1024.0 && unit < UNITS.len() - 1 {
        magnitude /= 1024.0;
        unit += 1;
    }
    format!("{:>4.1}{}", magnitude, UNITS[unit])
}

pub fn format_progress(value: f64) -> String {
    format!("{:5.1}%", value * 100.0)
}

pub fn format_eta(seconds: Option<i64>) -> String {
    match seconds {
        None => "∞".to_string(),
        Some(raw) if raw < 0 => "∞".to_string(),
        Some(raw) => {
            let duration = Duration::from_secs(raw as u64);
            let days = duration.as_secs() / 86_400;
            let hours = (duration.as_secs() % 86_400) / 3_600;
            let minutes = (duration.as_secs() % 3_600) / 60;
            let seconds = duration.as_secs() % 60;
            if days > 0 {
                format!("{}d{}h", days, hours)
            } else if hours > 0 {
                format!("{}h{}m", hours, minutes)
            } else if minutes > 0 {
                format!("{}m", minutes)
            } else {
                format!("{}s", seconds)
            }
        }
    }
}

pub fn format_bytes(value: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut magnitude = value.max(0) as f64;
    let mut unit = 0;
    while magnitude >= 1024.0 && unit < UNITS.len() - 1 {
        magnitude /= 1024.0;
        unit += 1;
    }
    format!("{:>4.1} {}", magnitude, UNITS[unit])
}

/// Transmission reports -1 for "no ratio yet" and -2 for an infinite ratio.
pub fn format_ratio(value: f64) -> String {
    if value == -2.0 {
        "∞".to_string()
    } else if value < 0.0 {
        "None".to_string()
    } else {
        format!("{:.2}", value)
    }
}

/// Renders a unix timestamp in UTC; zero means the daemon never recorded one.
pub fn format_timestamp(seconds: i64) -> String {
    if seconds <= 0 {
        return "never".to_string();
    }
    let Ok(moment) = OffsetDateTime::from_unix_timestamp(seconds) else {
        return "invalid date".to_string();
    };
    moment
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute] UTC"
        ))
        .unwrap_or_else(|_| seconds.to_string())
}

#[cfg(test)]
pub(crate) fn sample_torrent(id: i64, name: &str) -> Torrent {
    Torrent {
        id,
        name: name.to_string(),
        status: TorrentStatus::Seeding,
        total_size: 1024 * 1024,
        download_dir: "/downloads".to_string(),
        upload_ratio: 1.5,
        error: String::new(),
        eta: None,
        added_date: 1_700_000_000,
        activity_date: 1_700_000_600,
        percent_done: 1.0,
        rate_download: 0,
        rate_upload: 2048,
        uploaded_ever: 4096,
        labels: Vec::new(),
        trackers: Vec::new(),
        peers: Vec::new(),
        files: Vec::new(),
    }
}
