//! Core types and traits for the Keyway URL shortener.
//!
//! This crate holds the pieces every other crate agrees on: the short key
//! model and its base-62 encoding, the stored mapping record, and the
//! traits at each seam of the system (identifier allocation, mapping
//! storage, lookup caching and the shortener itself).

pub mod allocator;
pub mod base62;
pub mod cache;
pub mod error;
pub mod mapping;
pub mod shortcode;
pub mod shortener;
pub mod store;

pub use allocator::{BlockAuthority, IdBlock, IdentifierAllocator};
pub use base62::{KeyEncoder, ShortCodeBase62};
pub use cache::{LookupCache, NoCache};
pub use error::{AllocatorError, CacheError, CoreError, ShortenerError, StorageError};
pub use mapping::{PutOutcome, UrlMapping};
pub use shortcode::{ShortKey, RESERVED_KEYS};
pub use shortener::{ExpirationPolicy, ShortenParams, Shortener};
pub use store::MappingStore;
