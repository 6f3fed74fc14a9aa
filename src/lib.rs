pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod formats;
pub mod links;
pub mod routes;
pub mod temp;

pub use config::AppConfig;
pub use extractor::{MediaExtractor, YtDlp};
pub use routes::{AppState, create_router};
