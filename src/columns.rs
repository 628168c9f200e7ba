use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::model::{format_bytes, format_ratio, format_speed, format_timestamp, Torrent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Name,
    Status,
    Size,
    Ratio,
    Location,
    ActivityDate,
    DownloadRate,
    UploadRate,
    Error,
    Labels,
    Trackers,
    UploadedEver,
}

/// How a column is titled, how wide it starts and which snapshot field feeds it.
pub struct ColumnDescriptor {
    pub column: Column,
    pub title: &'static str,
    pub width: u16,
    pub cell: fn(&Torrent) -> String,
}

const DESCRIPTORS: [ColumnDescriptor; 13] = [
    ColumnDescriptor {
        column: Column::Id,
        title: "ID",
        width: 4,
        cell: |t| t.id.to_string(),
    },
    ColumnDescriptor {
        column: Column::Name,
        title: "Name",
        width: 45,
        cell: |t| t.name.clone(),
    },
    ColumnDescriptor {
        column: Column::Status,
        title: "Status",
        width: 20,
        cell: |t| t.status.label().to_string(),
    },
    ColumnDescriptor {
        column: Column::Size,
        title: "Size",
        width: 10,
        cell: |t| format_bytes(t.total_size),
    },
    ColumnDescriptor {
        column: Column::Ratio,
        title: "Ratio",
        width: 6,
        cell: |t| format_ratio(t.upload_ratio),
    },
    ColumnDescriptor {
        column: Column::Location,
        title: "Location",
        width: 35,
        cell: |t| t.download_dir.clone(),
    },
    ColumnDescriptor {
        column: Column::ActivityDate,
        title: "Activity Date",
        width: 20,
        cell: |t| format_timestamp(t.activity_date),
    },
    ColumnDescriptor {
        column: Column::DownloadRate,
        title: "Download Rate",
        width: 13,
        cell: |t| format_speed(t.rate_download),
    },
    ColumnDescriptor {
        column: Column::UploadRate,
        title: "Upload Rate",
        width: 13,
        cell: |t| format_speed(t.rate_upload),
    },
    ColumnDescriptor {
        column: Column::Error,
        title: "Error",
        width: 30,
        cell: |t| t.error.clone(),
    },
    ColumnDescriptor {
        column: Column::Labels,
        title: "Labels",
        width: 20,
        cell: |t| t.labels.join(", "),
    },
    ColumnDescriptor {
        column: Column::Trackers,
        title: "Trackers",
        width: 30,
        cell: |t| t.trackers.join(", "),
    },
    ColumnDescriptor {
        column: Column::UploadedEver,
        title: "Uploaded Ever",
        width: 13,
        cell: |t| format_bytes(t.uploaded_ever),
    },
];

impl Column {
    #[cfg(test)]
    pub const ALL: [Column; 13] = [
        Column::Id,
        Column::Name,
        Column::Status,
        Column::Size,
        Column::Ratio,
        Column::Location,
        Column::ActivityDate,
        Column::DownloadRate,
        Column::UploadRate,
        Column::Error,
        Column::Labels,
        Column::Trackers,
        Column::UploadedEver,
    ];

    pub fn descriptor(self) -> &'static ColumnDescriptor {
        // DESCRIPTORS is declared in the same order as the enum.
        &DESCRIPTORS[self as usize]
    }

    pub fn title(self) -> &'static str {
        self.descriptor().title
    }

    pub fn default_width(self) -> u16 {
        self.descriptor().width
    }

    pub fn cell(self, torrent: &Torrent) -> String {
        (self.descriptor().cell)(torrent)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown column '{0}'")]
pub struct UnknownColumn(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColumnListError {
    #[error(transparent)]
    Unknown(#[from] UnknownColumn),
    #[error("invalid width '{width}' for column '{column}'")]
    InvalidWidth { column: String, width: String },
}

impl FromStr for Column {
    type Err = UnknownColumn;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(value);
        DESCRIPTORS
            .iter()
            .find(|descriptor| normalize(descriptor.title) == wanted)
            .map(|descriptor| descriptor.column)
            .ok_or_else(|| UnknownColumn(value.trim().to_string()))
    }
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// One visible column and its display width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub column: Column,
    pub width: u16,
}

impl ColumnSpec {
    pub fn new(column: Column) -> Self {
        Self {
            column,
            width: column.default_width(),
        }
    }

    pub fn with_width(column: Column, width: u16) -> Self {
        Self { column, width }
    }
}

pub fn default_columns() -> Vec<ColumnSpec> {
    [
        Column::Id,
        Column::Name,
        Column::Status,
        Column::Size,
        Column::Ratio,
        Column::Location,
    ]
    .into_iter()
    .map(ColumnSpec::new)
    .collect()
}

/// Parses `ID,Name:45,Status` style lists used by the CLI and environment.
/// Widths must be positive integers.
pub fn parse_column_list(value: &str) -> Result<Vec<ColumnSpec>, ColumnListError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((name, width)) => {
                let column = name.parse::<Column>()?;
                let width = width
                    .trim()
                    .parse::<u16>()
                    .ok()
                    .filter(|width| *width > 0)
                    .ok_or_else(|| ColumnListError::InvalidWidth {
                        column: name.trim().to_string(),
                        width: width.trim().to_string(),
                    })?;
                Ok(ColumnSpec::with_width(column, width))
            }
            None => Ok(ColumnSpec::new(entry.parse()?)),
        })
        .collect()
}

/// Projects every snapshot through the configured columns, preserving input order.
pub fn build_rows(columns: &[ColumnSpec], torrents: &[Torrent]) -> Vec<Vec<String>> {
    torrents
        .iter()
        .map(|torrent| build_row(columns, torrent))
        .collect()
}

pub fn build_row(columns: &[ColumnSpec], torrent: &Torrent) -> Vec<String> {
    columns.iter().map(|spec| spec.column.cell(torrent)).collect()
}
