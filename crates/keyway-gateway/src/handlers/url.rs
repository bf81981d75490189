use crate::error::{AppError, Result};
use crate::model::{ShortenRequest, ShortenResponse};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use keyway_core::{ExpirationPolicy, ShortenParams};
use std::time::Duration;
use tracing::debug;

pub async fn shorten_handler(
    State(state): State<AppState>,
    Json(request): Json<ShortenRequest>,
) -> Result<(StatusCode, Json<ShortenResponse>)> {
    let mut params = ShortenParams::new(request.url);
    if let Some(alias) = request.custom_alias {
        params = params.with_alias(alias);
    }
    if let Some(seconds) = request.ttl_seconds {
        params = params.with_expiration(ExpirationPolicy::AfterDuration(Duration::from_secs(
            seconds,
        )));
    }

    let key = state.shortener().shorten(params).await?;

    Ok((
        StatusCode::CREATED,
        Json(ShortenResponse {
            short_url: key.to_url(state.base_url()),
            key: key.to_string(),
        }),
    ))
}

/// Redirects to the target of `key` with a `302 Found`.
pub async fn resolve_handler(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<Response> {
    match state.shortener().resolve(&key).await? {
        Some(target_url) => {
            debug!(key = %key, "redirecting");
            Ok((StatusCode::FOUND, [(header::LOCATION, target_url)]).into_response())
        }
        None => Err(AppError::NotFound(key)),
    }
}
