use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use axum::{
    body::Body,
    http::{
        HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    error::{DownloadError, ExtractorError},
    extractor::{DownloadJob, MediaExtractor},
    links::{normalize_video_url, parse_http_url},
    temp::TempDownload,
};

const MERGE_SUFFIX: &str = "+bestaudio";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    pub expression: String,
    pub extract_mp3: bool,
}

pub fn resolve_format(format_id: &str) -> FormatSelection {
    let expression = match format_id {
        "best" => "bestvideo+bestaudio/best".to_string(),
        "mp3" => "bestaudio/best".to_string(),
        id if id.contains(MERGE_SUFFIX) => id.to_string(),
        id => format!("bestvideo[format_id={id}]+bestaudio/best"),
    };

    FormatSelection {
        expression,
        extract_mp3: format_id == "mp3",
    }
}

/// A finished download, open for streaming.
#[derive(Debug)]
pub struct PreparedDownload {
    pub filename: String,
    pub content_length: u64,
    file: tokio::fs::File,
    guard: TempDownload,
}

impl IntoResponse for PreparedDownload {
    fn into_response(self) -> Response {
        let Self {
            filename,
            content_length,
            file,
            guard,
        } = self;

        let stream = ReaderStream::new(file).map(move |chunk| {
            let _owner = &guard;
            chunk
        });

        let mut response = Body::from_stream(stream).into_response();
        let headers = response.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(content_type_for_filename(&filename)),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
        if let Ok(value) = HeaderValue::from_str(&build_content_disposition(&filename)) {
            headers.insert(CONTENT_DISPOSITION, value);
        }
        response
    }
}

pub async fn download(
    extractor: &dyn MediaExtractor,
    config: &AppConfig,
    url: &str,
    format_id: &str,
) -> Result<PreparedDownload, DownloadError> {
    let result = run_download(extractor, config, url, format_id).await;
    match &result {
        Ok(prepared) => info!(
            "download ready: {} ({} bytes, format {format_id})",
            prepared.filename, prepared.content_length
        ),
        Err(error) => warn!("download failed for {url:?} (format {format_id}): {error}"),
    }
    result
}

async fn run_download(
    extractor: &dyn MediaExtractor,
    config: &AppConfig,
    url: &str,
    format_id: &str,
) -> Result<PreparedDownload, DownloadError> {
    let url = normalize_video_url(url);
    if parse_http_url(&url).is_none() {
        return Err(DownloadError::InvalidUrl(url));
    }

    let guard = TempDownload::create(&config.download_dir).await?;
    let selection = resolve_format(format_id);
    let job = DownloadJob {
        url,
        output_template: guard.output_template(),
        format_expression: selection.expression,
        extract_mp3: selection.extract_mp3,
        cookies: config.active_cookies().map(Path::to_path_buf),
    };

    let reported = extractor.download(&job).await?;
    let path = locate_output(&guard, reported, selection.extract_mp3).await?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("{}.bin", guard.id()));
    let file = tokio::fs::File::open(&path).await?;
    let content_length = file.metadata().await?.len();

    Ok(PreparedDownload {
        filename,
        content_length,
        file,
        guard,
    })
}

/// Prefers the reported path, then scans the job dir for `<uuid>.*`.
/// An mp3 request only ever resolves to a `.mp3` file.
async fn locate_output(
    guard: &TempDownload,
    reported: Option<PathBuf>,
    force_mp3: bool,
) -> Result<PathBuf, DownloadError> {
    if let Some(mut path) = reported {
        if force_mp3 {
            path.set_extension("mp3");
        }
        if let Some(found) = owned_file(guard, &path).await? {
            return Ok(found);
        }
        warn!("extractor reported {:?} but no such file exists", path);
    }

    let mut entries = tokio::fs::read_dir(guard.dir()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(found) = owned_file(guard, &path).await? else {
            continue;
        };
        if !force_mp3 || found.extension().is_some_and(|ext| ext == "mp3") {
            return Ok(found);
        }
        debug!("ignoring {:?}: mp3 requested", found);
    }

    Err(DownloadError::Extractor(ExtractorError::MissingOutput))
}

async fn owned_file(guard: &TempDownload, path: &Path) -> Result<Option<PathBuf>, DownloadError> {
    let named_for_guard = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| guard.owns(name) && !name.ends_with(".part"));
    if !named_for_guard {
        return Ok(None);
    }

    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(Some(path.to_path_buf())),
        Ok(_) => Ok(None),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "opus" | "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

fn build_content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitize_ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_' | ' ') {
                character
            } else {
                '_'
            }
        })
        .collect();

    let compact = sanitized.trim();
    if compact.is_empty() {
        "download.bin".to_string()
    } else {
        compact.to_string()
    }
}
