use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use vidgrab::{AppConfig, AppState, YtDlp, create_router, temp::sweep_stale_downloads};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "vidgrab=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        tracing::error!("server error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| format!("could not create download dir {:?}", config.download_dir))?;
    if let Some(max_age) = config.stale_download_age {
        sweep_stale_downloads(&config.download_dir, max_age).await;
    }

    match &config.cookies_file {
        Some(path) => info!("using cookies from {:?}", path),
        None => warn!("no cookie file found, requests will be unauthenticated"),
    }

    let extractor = Arc::new(YtDlp::from_config(&config));
    let addr = config.bind_addr.clone();
    info!("downloads go to {:?}", config.download_dir);

    let app = create_router(AppState::new(config, extractor));
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;

    info!("listening on http://{addr}");
    axum::serve(listener, app)
        .await
        .context("HTTP server error")
}
