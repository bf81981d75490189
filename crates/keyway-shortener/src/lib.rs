//! URL shortener service implementation.
//!
//! [`ShortenerService`] ties an identifier allocator, the mapping store and
//! a lookup cache together behind the [`Shortener`] trait. Core types are
//! re-exported from `keyway_core`.

pub mod generator;
pub mod service;
pub mod settings;

pub use generator::KeyGenerator;
pub use keyway_core::{ExpirationPolicy, ShortKey, ShortenParams, Shortener, ShortenerError};
pub use service::ShortenerService;
pub use settings::ServiceSettings;
