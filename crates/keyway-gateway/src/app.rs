use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{health_handler, resolve_handler, shorten_handler};
use crate::state::AppState;

pub struct App {}

impl App {
    /// `/resolve/{key}` resolves every key; the root form `/{key}` relies on
    /// keys never spelling a fixed route (see `RESERVED_KEYS`).
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/shorten", post(shorten_handler))
            .route("/resolve/{key}", get(resolve_handler))
            .route("/{key}", get(resolve_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
