use std::path::{Path, PathBuf};

use tokio::time::Duration;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const DEFAULT_COOKIES_FILE: &str = "cookies/cookies.txt";
const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";
const DEFAULT_STALE_DOWNLOAD_SECONDS: u64 = 2 * 60 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub download_dir: PathBuf,
    /// Only set when the cookie file existed at startup.
    pub cookies_file: Option<PathBuf>,
    pub yt_dlp_bin: PathBuf,
    pub extractor_timeout: Option<Duration>,
    pub stale_download_age: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let cookies_path = std::env::var("COOKIES_FILE")
            .ok()
            .and_then(|value| non_empty(&value).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COOKIES_FILE));

        Self {
            bind_addr: resolve_bind_addr(),
            download_dir: read_path_env("DOWNLOAD_DIR")
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            cookies_file: existing_file(cookies_path),
            yt_dlp_bin: read_path_env("YT_DLP_BIN")
                .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP_BIN)),
            extractor_timeout: read_u64_env("YT_DLP_TIMEOUT_SECONDS")
                .filter(|seconds| *seconds > 0)
                .map(Duration::from_secs),
            stale_download_age: match read_u64_env("STALE_DOWNLOAD_SECONDS") {
                Some(0) => None,
                Some(seconds) => Some(Duration::from_secs(seconds)),
                None => Some(Duration::from_secs(DEFAULT_STALE_DOWNLOAD_SECONDS)),
            },
        }
    }

    pub fn with_download_dir(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            download_dir: download_dir.into(),
            cookies_file: None,
            yt_dlp_bin: PathBuf::from(DEFAULT_YT_DLP_BIN),
            extractor_timeout: None,
            stale_download_age: None,
        }
    }

    pub fn active_cookies(&self) -> Option<&Path> {
        self.cookies_file
            .as_deref()
            .filter(|path| path.is_file())
    }
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = std::env::var("APP_ADDR")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    format!("0.0.0.0:{port}")
}

fn existing_file(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

fn read_path_env(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .and_then(|value| non_empty(&value).map(PathBuf::from))
}

fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
