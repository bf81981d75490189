//! Node-local lookup caching for resolved keys.

pub mod moka;

pub use self::moka::{CacheSettings, MokaLookupCache};
pub use keyway_core::{CacheError, LookupCache, NoCache};
