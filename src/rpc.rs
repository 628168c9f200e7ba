use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

use anyhow::Result;
use log::debug;
use reqwest::{blocking::Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_with::{serde_as, DefaultOnNull};
use thiserror::Error;

use crate::{
    config::RpcConfig,
    model::{Peer, Torrent, TorrentFile, TorrentStatus},
};

/// Highest RPC protocol revision this client speaks.
pub const CLIENT_RPC_VERSION: i64 = 17;

#[derive(Debug, Error)]
pub enum TransmissionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed")]
    Authentication,
    #[error("session negotiation failed")]
    Session,
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("torrent {0} not found")]
    NotFound(i64),
    #[error("daemon requires rpc version {minimum}, client supports {}", CLIENT_RPC_VERSION)]
    IncompatibleVersion { minimum: i64 },
}

pub type RpcResult<T> = std::result::Result<T, TransmissionError>;

/// The daemon operations the dashboard depends on.
///
/// Shared across worker threads for the whole session; the daemon itself
/// serialises concurrent calls.
pub trait Daemon: Send + Sync {
    fn list_torrents(&self) -> RpcResult<Vec<Torrent>>;
    fn get_torrent(&self, id: i64) -> RpcResult<Torrent>;
    fn set_location(&self, id: i64, location: &str) -> RpcResult<()>;
}

const TORRENT_FIELDS: &[&str] = &[
    "id",
    "name",
    "status",
    "totalSize",
    "total_size",
    "downloadDir",
    "download_dir",
    "uploadRatio",
    "upload_ratio",
    "errorString",
    "error_string",
    "eta",
    "addedDate",
    "added_date",
    "activityDate",
    "activity_date",
    "percentDone",
    "percent_done",
    "rateDownload",
    "rate_download",
    "rateUpload",
    "rate_upload",
    "uploadedEver",
    "uploaded_ever",
    "labels",
    "trackers",
    "peers",
    "files",
];

pub struct TransmissionClient {
    http: Client,
    endpoint: String,
    auth: Option<(String, Option<String>)>,
    session_id: Mutex<Option<String>>,
    counter: AtomicU64,
    move_data: bool,
}

impl TransmissionClient {
    pub fn new(config: RpcConfig, move_data: bool) -> Result<Self> {
        let endpoint = config.endpoint();
        let RpcConfig {
            username,
            password,
            timeout,
            verify_ssl,
            user_agent,
            ..
        } = config;
        let mut builder = Client::builder().timeout(timeout).user_agent(user_agent);
        if !verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;
        let auth = username.map(|user| (user, password));
        Ok(Self {
            http,
            endpoint,
            auth,
            session_id: Mutex::new(None),
            counter: AtomicU64::new(1),
            move_data,
        })
    }

    /// Fails when the daemon refuses clients speaking `CLIENT_RPC_VERSION`.
    pub fn check_version(&self) -> RpcResult<i64> {
        let value = self.call_raw("session-get", None)?;
        let info: SessionInfo = serde_json::from_value(value)?;
        debug!(
            "daemon rpc version {} (minimum {})",
            info.rpc_version, info.rpc_version_minimum
        );
        if info.rpc_version_minimum > CLIENT_RPC_VERSION {
            return Err(TransmissionError::IncompatibleVersion {
                minimum: info.rpc_version_minimum,
            });
        }
        Ok(info.rpc_version)
    }

    fn torrent_get(&self, ids: Option<&[i64]>) -> RpcResult<Vec<Torrent>> {
        let mut args = json!({ "fields": TORRENT_FIELDS });
        if let Some(ids) = ids {
            args["ids"] = json!(ids);
        }
        let value = self.call_raw("torrent-get", Some(args))?;
        let response: TorrentGetResponse = serde_json::from_value(value)?;
        Ok(response.torrents.into_iter().map(Torrent::from).collect())
    }

    fn call_raw(&self, method: &str, arguments: Option<Value>) -> RpcResult<Value> {
        let payload = RpcRequest {
            method,
            arguments,
            tag: self.counter.fetch_add(1, Ordering::Relaxed),
        };
        loop {
            let mut request = self
                .http
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .json(&payload);
            if let Some((user, pass)) = &self.auth {
                request = request.basic_auth(user, pass.as_ref());
            }
            let session_header = match self.session_id.lock() {
                Ok(guard) => (*guard).clone(),
                Err(_) => None,
            };
            if let Some(session) = session_header {
                request = request.header("X-Transmission-Session-Id", session);
            }
            let response = request.send()?;
            match response.status() {
                StatusCode::CONFLICT => {
                    if let Some(id) = response.headers().get("X-Transmission-Session-Id") {
                        let value = id
                            .to_str()
                            .map_err(|_| TransmissionError::Session)?
                            .to_string();
                        if let Ok(mut guard) = self.session_id.lock() {
                            *guard = Some(value);
                        }
                        continue;
                    }
                    return Err(TransmissionError::Session);
                }
                StatusCode::UNAUTHORIZED => return Err(TransmissionError::Authentication),
                status if !status.is_success() => {
                    return Err(TransmissionError::HttpStatus(status));
                }
                _ => {
                    let body: RpcResponse = response.json()?;
                    if body.result != "success" {
                        return Err(TransmissionError::Rpc(body.result));
                    }
                    return Ok(body.arguments.unwrap_or(Value::Null));
                }
            }
        }
    }
}

impl Daemon for TransmissionClient {
    fn list_torrents(&self) -> RpcResult<Vec<Torrent>> {
        self.torrent_get(None)
    }

    fn get_torrent(&self, id: i64) -> RpcResult<Torrent> {
        self.torrent_get(Some(std::slice::from_ref(&id)))?
            .into_iter()
            .find(|torrent| torrent.id == id)
            .ok_or(TransmissionError::NotFound(id))
    }

    fn set_location(&self, id: i64, location: &str) -> RpcResult<()> {
        let args = json!({
            "ids": [id],
            "location": location,
            "move": self.move_data,
        });
        self.call_raw("torrent-set-location", Some(args))?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<Value>,
    tag: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    arguments: Option<Value>,
    result: String,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    #[serde(default, rename = "rpc-version", alias = "rpc_version")]
    rpc_version: i64,
    #[serde(
        default,
        rename = "rpc-version-minimum",
        alias = "rpc_version_minimum"
    )]
    rpc_version_minimum: i64,
}

#[derive(Debug, Deserialize)]
struct TorrentGetResponse {
    #[serde(default)]
    torrents: Vec<TorrentWire>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct TorrentWire {
    id: i64,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: i64,
    #[serde(default, alias = "totalSize")]
    total_size: i64,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default, alias = "downloadDir")]
    download_dir: String,
    #[serde(default, alias = "uploadRatio")]
    upload_ratio: f64,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default, alias = "errorString")]
    error_string: String,
    #[serde(default = "unknown_eta")]
    eta: i64,
    #[serde(default, alias = "addedDate")]
    added_date: i64,
    #[serde(default, alias = "activityDate")]
    activity_date: i64,
    #[serde(default, alias = "percentDone")]
    percent_done: f64,
    #[serde(default, alias = "rateDownload")]
    rate_download: i64,
    #[serde(default, alias = "rateUpload")]
    rate_upload: i64,
    #[serde(default, alias = "uploadedEver")]
    uploaded_ever: i64,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    labels: Vec<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    trackers: Vec<TrackerWire>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    peers: Vec<PeerWire>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    files: Vec<FileWire>,
}

fn unknown_eta() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
struct TrackerWire {
    #[serde(default)]
    announce: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct PeerWire {
    #[serde(default)]
    address: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default, alias = "clientName")]
    client_name: String,
    #[serde(default)]
    progress: f64,
    #[serde(default, alias = "rateToClient")]
    rate_to_client: i64,
    #[serde(default, alias = "rateToPeer")]
    rate_to_peer: i64,
}

#[derive(Debug, Deserialize)]
struct FileWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    length: i64,
    #[serde(default, alias = "bytesCompleted")]
    bytes_completed: i64,
}

impl From<TorrentWire> for Torrent {
    fn from(wire: TorrentWire) -> Self {
        Torrent {
            id: wire.id,
            name: wire.name,
            status: TorrentStatus::from_code(wire.status),
            total_size: wire.total_size,
            download_dir: wire.download_dir,
            upload_ratio: wire.upload_ratio,
            error: wire.error_string,
            eta: (wire.eta >= 0).then_some(wire.eta),
            added_date: wire.added_date,
            activity_date: wire.activity_date,
            percent_done: wire.percent_done,
            rate_download: wire.rate_download,
            rate_upload: wire.rate_upload,
            uploaded_ever: wire.uploaded_ever,
            labels: wire.labels,
            trackers: wire
                .trackers
                .into_iter()
                .map(|tracker| tracker_host(&tracker.announce))
                .collect(),
            peers: wire
                .peers
                .into_iter()
                .map(|peer| Peer {
                    address: peer.address,
                    client_name: peer.client_name,
                    progress: peer.progress,
                    rate_to_client: peer.rate_to_client,
                    rate_to_peer: peer.rate_to_peer,
                })
                .collect(),
            files: wire
                .files
                .into_iter()
                .map(|file| TorrentFile {
                    name: file.name,
                    length: file.length,
                    bytes_completed: file.bytes_completed,
                })
                .collect(),
        }
    }
}

fn tracker_host(announce: &str) -> String {
    Url::parse(announce)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| announce.to_string())
}
