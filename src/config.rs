use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use dirs::config_dir;
use log::LevelFilter;
use serde::Deserialize;

use crate::columns::{default_columns, parse_column_list, Column, ColumnSpec};

const APP_DIR: &str = "transmission-dashboard";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub columns: Vec<ColumnSpec>,
    pub bookmarks: Vec<String>,
    pub move_data: bool,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            columns: default_columns(),
            bookmarks: Vec::new(),
            move_data: true,
            log_level: LevelFilter::Info,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub verify_ssl: bool,
    pub user_agent: String,
    pub url: Option<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 9091,
            path: "/transmission/rpc".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(10),
            verify_ssl: true,
            user_agent: APP_DIR.to_string(),
            url: None,
        }
    }
}

impl RpcConfig {
    pub fn endpoint(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let mut path = self.path.clone();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, path)
    }
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Terminal dashboard for a Transmission daemon", long_about = None)]
pub struct Cli {
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub path: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub timeout: Option<f64>,
    #[arg(long, action = ArgAction::SetTrue)]
    pub tls: bool,
    #[arg(long = "no-tls", action = ArgAction::SetTrue)]
    pub no_tls: bool,
    #[arg(long)]
    pub insecure: bool,
    /// Visible table columns, e.g. `ID,Name:60,Status,Location`.
    #[arg(long)]
    pub columns: Option<String>,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    rpc: Option<FileRpcConfig>,
    ui: Option<FileUiConfig>,
    relocate: Option<FileRelocateConfig>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileRpcConfig {
    url: Option<String>,
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<f64>,
    tls: Option<bool>,
    verify_ssl: Option<bool>,
    user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileUiConfig {
    columns: Option<Vec<FileColumn>>,
}

/// `"Name"` or `{ name = "Name", width = 45 }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileColumn {
    Name(String),
    Detailed { name: String, width: Option<u16> },
}

#[derive(Debug, Default, Deserialize)]
struct FileRelocateConfig {
    bookmarks: Option<Vec<String>>,
    move_data: Option<bool>,
}

pub fn build_config(cli: &Cli) -> Result<AppConfig> {
    let file_config = load_file_config(cli.config.as_deref())?;
    let rpc_file = file_config.as_ref().and_then(|cfg| cfg.rpc.as_ref());
    let defaults = RpcConfig::default();

    let url = cli
        .url
        .clone()
        .or_else(|| env::var("TRANSMISSION_URL").ok())
        .or_else(|| rpc_file.and_then(|cfg| cfg.url.clone()));

    let host = cli
        .host
        .clone()
        .or_else(|| env_any(&["TRANSMISSION_HOST", "TRANSMISSIONIP"]))
        .or_else(|| rpc_file.and_then(|cfg| cfg.host.clone()))
        .unwrap_or(defaults.host);

    let port = cli
        .port
        .or_else(|| env_var_parse("TRANSMISSION_PORT"))
        .or_else(|| env_var_parse("TRANSMISSIONPORT"))
        .or_else(|| rpc_file.and_then(|cfg| cfg.port))
        .unwrap_or(defaults.port);

    let path = cli
        .path
        .clone()
        .or_else(|| env::var("TRANSMISSION_RPC_PATH").ok())
        .or_else(|| rpc_file.and_then(|cfg| cfg.path.clone()))
        .unwrap_or(defaults.path);

    let username = cli
        .username
        .clone()
        .or_else(|| env_any(&["TRANSMISSION_USERNAME", "TRANSMISSIONUSERNAME"]))
        .or_else(|| rpc_file.and_then(|cfg| cfg.username.clone()));

    let password = cli
        .password
        .clone()
        .or_else(|| env_any(&["TRANSMISSION_PASSWORD", "TRANSMISSIONPASSWORD"]))
        .or_else(|| rpc_file.and_then(|cfg| cfg.password.clone()));

    let timeout_secs = cli
        .timeout
        .or_else(|| env_float("TRANSMISSION_TIMEOUT"))
        .or_else(|| rpc_file.and_then(|cfg| cfg.timeout))
        .unwrap_or(defaults.timeout.as_secs_f64());

    if timeout_secs <= 0.0 {
        anyhow::bail!("timeout must be positive");
    }

    let tls_flag = if cli.tls {
        Some(true)
    } else if cli.no_tls {
        Some(false)
    } else {
        None
    };

    let tls_env = env_bool("TRANSMISSION_TLS");
    let use_tls = tls_flag
        .or(tls_env)
        .or_else(|| rpc_file.and_then(|cfg| cfg.tls))
        .unwrap_or(false);

    let verify_env = env_bool("TRANSMISSION_VERIFY_SSL");
    let mut verify_ssl = rpc_file
        .and_then(|cfg| cfg.verify_ssl)
        .unwrap_or(defaults.verify_ssl);
    if let Some(value) = verify_env {
        verify_ssl = value;
    }
    if cli.insecure {
        verify_ssl = false;
    }

    let scheme = rpc_file
        .and_then(|cfg| cfg.scheme.clone())
        .unwrap_or_else(|| if use_tls { "https" } else { "http" }.to_string());

    let user_agent = env::var("TRANSMISSION_USER_AGENT")
        .ok()
        .or_else(|| rpc_file.and_then(|cfg| cfg.user_agent.clone()))
        .unwrap_or(defaults.user_agent);

    let columns = match cli
        .columns
        .clone()
        .or_else(|| env::var("TRANSMISSION_COLUMNS").ok())
    {
        Some(list) => parse_column_list(&list).context("invalid column list")?,
        None => file_columns(file_config.as_ref())?,
    };

    let relocate_file = file_config.as_ref().and_then(|cfg| cfg.relocate.as_ref());
    let bookmarks = relocate_file
        .and_then(|cfg| cfg.bookmarks.clone())
        .unwrap_or_default();
    let move_data = relocate_file.and_then(|cfg| cfg.move_data).unwrap_or(true);

    let log_level_str = cli
        .log_level
        .clone()
        .or_else(|| env::var("TRANSMISSION_LOG_LEVEL").ok())
        .or_else(|| file_config.as_ref().and_then(|cfg| cfg.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let log_level = LevelFilter::from_str(&log_level_str).unwrap_or(LevelFilter::Info);

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| env::var_os("TRANSMISSION_LOG_FILE").map(PathBuf::from))
        .or_else(|| file_config.as_ref().and_then(|cfg| cfg.log_file.clone()));

    Ok(AppConfig {
        rpc: RpcConfig {
            scheme,
            host,
            port,
            path,
            username,
            password,
            timeout: Duration::from_secs_f64(timeout_secs),
            verify_ssl,
            user_agent,
            url,
        },
        columns,
        bookmarks,
        move_data,
        log_level,
        log_file,
    })
}

fn file_columns(file_config: Option<&FileConfig>) -> Result<Vec<ColumnSpec>> {
    let Some(entries) = file_config
        .and_then(|cfg| cfg.ui.as_ref())
        .and_then(|ui| ui.columns.as_ref())
    else {
        return Ok(default_columns());
    };
    entries
        .iter()
        .map(|entry| {
            let (name, width) = match entry {
                FileColumn::Name(name) => (name, None),
                FileColumn::Detailed { name, width } => (name, *width),
            };
            let column: Column = name.parse().context("invalid ui.columns entry")?;
            Ok(match width {
                Some(0) => anyhow::bail!("invalid width '0' for column '{name}'"),
                Some(width) => ColumnSpec::with_width(column, width),
                None => ColumnSpec::new(column),
            })
        })
        .collect()
}

fn load_file_config(path: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = path {
        return read_file_config(path);
    }

    if let Ok(env_path) = env::var("TRANSMISSION_DASHBOARD_CONFIG") {
        return read_file_config(Path::new(&env_path));
    }

    if let Some(dir) = config_dir() {
        return read_file_config(&dir.join(APP_DIR).join("config.toml"));
    }

    Ok(None)
}

fn read_file_config(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let parsed: FileConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(Some(parsed))
}

fn env_any(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env::var(name).ok())
}

fn env_var_parse<T>(name: &str) -> Option<T>
where
    T: FromStr,
{
    env::var(name).ok().and_then(|value| value.parse().ok())
}

fn env_float(name: &str) -> Option<f64> {
    env_var_parse(name)
}

fn env_bool(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .and_then(|value| match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}
