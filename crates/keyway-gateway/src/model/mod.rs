mod url;

pub use url::{ErrorResponse, ShortenRequest, ShortenResponse};

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
