use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::State,
    response::Html,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::{
    config::AppConfig,
    download::{self, PreparedDownload},
    error::DownloadError,
    extractor::MediaExtractor,
    formats::{self, FormatDescriptor},
};

const INDEX_HTML: &str = include_str!("../templates/index.html");

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub extractor: Arc<dyn MediaExtractor>,
}

impl AppState {
    pub fn new(config: AppConfig, extractor: Arc<dyn MediaExtractor>) -> Self {
        Self {
            config: Arc::new(config),
            extractor,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FormatsRequest {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadForm {
    url: String,
    format: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/get_formats", post(get_formats))
        .route("/download", post(download_file))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn get_formats(
    State(state): State<AppState>,
    Json(payload): Json<FormatsRequest>,
) -> Json<Vec<FormatDescriptor>> {
    let Some(url) = payload.url.filter(|url| !url.trim().is_empty()) else {
        return Json(Vec::new());
    };

    let formats = formats::list_formats(
        state.extractor.as_ref(),
        state.config.active_cookies(),
        url.trim(),
    )
    .await;
    Json(formats)
}

async fn download_file(
    State(state): State<AppState>,
    Form(form): Form<DownloadForm>,
) -> Result<PreparedDownload, DownloadError> {
    download::download(
        state.extractor.as_ref(),
        &state.config,
        form.url.trim(),
        form.format.trim(),
    )
    .await
}
