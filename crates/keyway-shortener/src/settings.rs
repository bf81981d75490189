use std::time::Duration;
use typed_builder::TypedBuilder;

/// Tunables for a [`ShortenerService`](crate::ShortenerService).
#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceSettings {
    /// How long a single conditional write may take before its outcome is
    /// checked with a verification read.
    #[builder(default = Duration::from_secs(2))]
    pub write_timeout: Duration,
    /// Cache lifetime of resolved lookups.
    #[builder(default = Duration::from_secs(3600))]
    pub cache_ttl: Duration,
    /// Cache lifetime of entries written right after creation. Falls back
    /// to `cache_ttl`.
    #[builder(default, setter(strip_option))]
    pub fresh_cache_ttl: Option<Duration>,
    /// Generated keys that may collide with existing aliases before a
    /// request gives up.
    #[builder(default = 8)]
    pub max_alias_skips: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}
