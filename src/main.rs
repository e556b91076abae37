mod gemini;
mod history;
mod models;
mod prompt;
mod routes;
mod session;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use routes::{
    clear_image, create_session, delete_history_entry, download_page, edit_page, generate,
    get_session, list_history, load_history_entry, save_to_history, update_form, update_view,
    upload_image, AppState, MAX_IMAGE_BYTES,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::gemini::GeminiClient;
use crate::history::{HistoryStore, JsonFilePersistence};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| gemini::DEMO_KEY.into());
    if api_key == gemini::DEMO_KEY {
        tracing::warn!("GEMINI_API_KEY not set, running in demo mode");
    }

    let history_path =
        std::env::var("HISTORY_PATH").unwrap_or_else(|_| "pagegen_history.json".into());
    tracing::info!(%history_path, "opening history store");

    let state = AppState {
        sessions: Arc::default(),
        history: Arc::new(HistoryStore::open(Box::new(JsonFilePersistence::new(
            history_path,
        )))),
        gemini: Arc::new(GeminiClient::new(api_key)),
    };

    let app = Router::new()
        .route("/api/session", post(create_session))
        .route("/api/session/:id", get(get_session))
        .route("/api/session/:id/form", put(update_form))
        .route("/api/session/:id/view", put(update_view))
        .route("/api/session/:id/image", post(upload_image).delete(clear_image))
        .route("/api/session/:id/generate", post(generate))
        .route("/api/session/:id/page/:stage", put(edit_page))
        .route("/api/session/:id/page/:stage/download", get(download_page))
        .route("/api/session/:id/save", post(save_to_history))
        .route("/api/session/:id/load/:entry_id", post(load_history_entry))
        .route("/api/history", get(list_history))
        .route("/api/history/:id", delete(delete_history_entry))
        // Uploads may run right up to the cap; leave room so the cap check
        // produces the user-facing message instead of a bare 413.
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting server");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
