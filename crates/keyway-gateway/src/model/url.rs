use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ShortenRequest {
    pub url: String,
    #[serde(default)]
    pub custom_alias: Option<String>,
    /// Lifetime of the mapping; omitted means it never expires.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenResponse {
    pub key: String,
    pub short_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable, machine-readable error code.
    pub error: String,
    pub message: String,
}
