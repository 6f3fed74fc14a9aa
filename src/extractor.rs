use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Output,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    process::Command,
    time::{Duration, timeout},
};
use tracing::debug;

use crate::{config::AppConfig, error::ExtractorError};

#[derive(Debug, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: String,
    pub video_ext: Option<String>,
    pub audio_ext: Option<String>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

impl RawFormat {
    pub fn has_video(&self) -> bool {
        self.video_ext.as_deref() != Some("none")
    }

    pub fn has_audio(&self) -> bool {
        self.audio_ext.as_deref() != Some("none")
    }

    /// Exact size when known, otherwise the approximation.
    pub fn byte_size(&self) -> Option<f64> {
        self.filesize
            .filter(|size| *size > 0.0)
            .or(self.filesize_approx.filter(|size| *size > 0.0))
    }
}

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    /// Output path with a `%(ext)s` placeholder for the container.
    pub output_template: String,
    pub format_expression: String,
    pub extract_mp3: bool,
    pub cookies: Option<PathBuf>,
}

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    async fn fetch_info(
        &self,
        url: &str,
        cookies: Option<&Path>,
    ) -> Result<VideoInfo, ExtractorError>;

    /// Returns the final path reported by the extractor, if it reported one.
    async fn download(&self, job: &DownloadJob) -> Result<Option<PathBuf>, ExtractorError>;
}

pub const MP3_QUALITY: &str = "192K";
pub const MERGE_CONTAINER: &str = "mp4";

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.yt_dlp_bin.clone(), config.extractor_timeout)
    }

    async fn run(&self, args: Vec<String>) -> Result<Output, ExtractorError> {
        let program = self.binary.to_string_lossy().into_owned();
        debug!("running {program} {:?}", args);

        let command_future = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();
        let result = match self.timeout {
            Some(limit) => timeout(limit, command_future)
                .await
                .map_err(|_| ExtractorError::TimedOut(limit.as_secs()))?,
            None => command_future.await,
        };

        let output = result.map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                ExtractorError::NotInstalled(program.clone())
            } else {
                ExtractorError::Spawn {
                    program: program.clone(),
                    source: error,
                }
            }
        })?;

        if !output.status.success() {
            return Err(ExtractorError::Failed(run_error_message(
                &output.stderr,
                &output.status.to_string(),
            )));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    async fn fetch_info(
        &self,
        url: &str,
        cookies: Option<&Path>,
    ) -> Result<VideoInfo, ExtractorError> {
        let output = self.run(info_args(url, cookies)).await?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn download(&self, job: &DownloadJob) -> Result<Option<PathBuf>, ExtractorError> {
        let output = self.run(download_args(job)).await?;
        Ok(extract_printed_path(&output.stdout).map(PathBuf::from))
    }
}

fn info_args(url: &str, cookies: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "-J".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
    ];
    push_cookies(&mut args, cookies);
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

fn download_args(job: &DownloadJob) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "-o".to_string(),
        job.output_template.clone(),
        "-f".to_string(),
        job.format_expression.clone(),
        "--merge-output-format".to_string(),
        MERGE_CONTAINER.to_string(),
    ];
    push_cookies(&mut args, job.cookies.as_deref());

    if job.extract_mp3 {
        args.extend(
            ["-x", "--audio-format", "mp3", "--audio-quality", MP3_QUALITY]
                .into_iter()
                .map(ToString::to_string),
        );
    }

    args.push("--".to_string());
    args.push(job.url.clone());
    args
}

fn push_cookies(args: &mut Vec<String>, cookies: Option<&Path>) {
    if let Some(path) = cookies {
        args.push("--cookies".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
}

fn run_error_message(stderr: &[u8], status: &str) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("yt-dlp failed ({status})"))
}

fn extract_printed_path(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
}
