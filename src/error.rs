use std::io;

use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("{0} is not installed. Install it and restart the server.")]
    NotInstalled(String),

    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Failed(String),

    #[error("the extractor did not finish within {0}s")]
    TimedOut(u64),

    #[error("could not parse extractor metadata: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("the downloaded file could not be found")]
    MissingOutput,
}

#[derive(Debug, Error)]
pub enum FormatsError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Extractor(#[from] ExtractorError),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Extractor(#[from] ExtractorError),

    #[error("could not read the downloaded file: {0}")]
    Io(#[from] io::Error),
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        Html(failure_page(&self.to_string())).into_response()
    }
}

fn failure_page(message: &str) -> String {
    format!(
        r#"<div style="text-align: center; padding: 50px;">
    <h3 style="color: red;">Download failed: {}</h3>
    <p>Try selecting a different format or check the URL</p>
    <a href="/" style="display: inline-block; margin-top: 20px; padding: 10px 20px; background: #4CAF50; color: white; text-decoration: none; border-radius: 5px;">Go Back</a>
</div>"#,
        escape_html(message)
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(character),
        }
    }
    escaped
}
