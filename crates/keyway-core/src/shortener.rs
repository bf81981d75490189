use crate::shortcode::ShortKey;
use async_trait::async_trait;
use jiff::Timestamp;
use std::time::Duration;

type Result<T> = std::result::Result<T, crate::error::ShortenerError>;

/// Expiration policy for a shortened URL.
#[derive(Debug, Clone)]
pub enum ExpirationPolicy {
    /// The shortened URL never expires.
    Never,
    /// The shortened URL expires after a certain duration from now.
    AfterDuration(Duration),
    /// The shortened URL expires at a specific timestamp.
    AtTimestamp(Timestamp),
}

/// Parameters for creating a shortened URL.
#[derive(Debug, Clone)]
pub struct ShortenParams {
    /// The URL to be shortened.
    pub url: String,
    /// Optional caller-chosen key, validated by the shortener.
    pub custom_alias: Option<String>,
    /// The expiration policy for the shortened URL.
    pub expiration: ExpirationPolicy,
}

impl ShortenParams {
    /// A generated-key request that never expires.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            custom_alias: None,
            expiration: ExpirationPolicy::Never,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.custom_alias = Some(alias.into());
        self
    }

    pub fn with_expiration(mut self, expiration: ExpirationPolicy) -> Self {
        self.expiration = expiration;
        self
    }
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Creates a shortened URL and returns its key.
    async fn shorten(&self, params: ShortenParams) -> Result<ShortKey>;

    /// Resolves a key to its target URL.
    /// Returns `None` if the key does not exist or has expired.
    async fn resolve(&self, key: &str) -> Result<Option<String>>;
}
