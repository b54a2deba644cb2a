//! HTTP surface: the chat page, the blocking `/chat` route, and the SSE
//! `/chat-stream` transport.

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::chat_stream::ChatBackend;
use crate::core::config::Config;

pub mod handlers;
pub mod page;

#[derive(Clone)]
pub struct AppState {
    pub backend: ChatBackend,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        AppState {
            backend: ChatBackend::from_config(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/chat", get(handlers::chat))
        .route("/chat-stream", get(handlers::chat_stream))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
