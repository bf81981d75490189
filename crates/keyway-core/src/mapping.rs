use crate::shortcode::ShortKey;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A stored key to URL mapping.
///
/// Mappings are never mutated after the conditional write that created
/// them; pointing a key somewhere else requires a new key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlMapping {
    /// The key, unique across every shard.
    pub key: ShortKey,
    /// The URL the key redirects to.
    pub target_url: String,
    /// When the mapping was created.
    pub created_at: Timestamp,
    /// When the mapping expires, if ever.
    pub expires_at: Option<Timestamp>,
    /// `true` if the caller chose the key.
    pub owner_alias: bool,
}

impl UrlMapping {
    pub fn new(
        key: ShortKey,
        target_url: impl Into<String>,
        created_at: Timestamp,
        expires_at: Option<Timestamp>,
        owner_alias: bool,
    ) -> Self {
        Self {
            key,
            target_url: target_url.into(),
            created_at,
            expires_at,
            owner_alias,
        }
    }

    /// Whether the mapping has expired as of `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Time left before expiry, `None` for mappings that never expire.
    ///
    /// Already expired mappings report a zero duration.
    pub fn remaining_ttl(&self, now: Timestamp) -> Option<Duration> {
        self.expires_at.map(|expires_at| {
            let left = expires_at.duration_since(now);
            Duration::try_from(left).unwrap_or(Duration::ZERO)
        })
    }
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The write won; the mapping is now stored.
    Created,
    /// The key was already live. Carries the mapping that owns it.
    AlreadyExists(UrlMapping),
}

impl PutOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, PutOutcome::Created)
    }
}
