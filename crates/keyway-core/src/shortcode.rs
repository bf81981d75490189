use crate::base62::{KeyEncoder, ShortCodeBase62};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::hash::{Hash, Hasher};

/// The key under which a shortened URL is stored and resolved.
///
/// Generated keys and aliases share one keyspace, so two keys are equal
/// whenever their spellings are equal, regardless of variant.
#[derive(Clone, Debug)]
pub enum ShortKey {
    /// A key encoded from an allocated identifier.
    Generated(ShortCodeBase62),
    /// A caller-chosen alias.
    Custom(String),
}

const MIN_ALIAS_LENGTH: usize = 3;
const MAX_ALIAS_LENGTH: usize = 32;

/// Keys that collide with fixed routes of the HTTP front end.
pub const RESERVED_KEYS: &[&str] = &["health", "resolve", "shorten"];

impl ShortKey {
    /// Creates a generated key from an allocated identifier.
    pub fn generated(code: impl Into<ShortCodeBase62>) -> Self {
        Self::Generated(code.into())
    }

    /// Creates an alias after validating the input.
    ///
    /// Valid aliases are 3-32 characters, contain only `[a-zA-Z0-9_-]` and
    /// are not one of [`RESERVED_KEYS`].
    pub fn alias(alias: impl Into<String>) -> Result<Self> {
        let alias = alias.into();
        Self::validate_alias(&alias)?;
        if RESERVED_KEYS.contains(&alias.as_str()) {
            return Err(CoreError::InvalidAlias(format!("'{alias}' is reserved")));
        }
        Ok(Self::Custom(alias))
    }

    /// Parses a key that arrived from outside, e.g. a resolve request.
    ///
    /// A key is well-formed when it decodes as base62 or is a valid alias.
    /// The variant only reflects the key's shape, not how it was created.
    pub fn parse(key: &str) -> Result<Self> {
        if let Ok(code) = ShortCodeBase62::parse(key) {
            return Ok(Self::Generated(code));
        }

        Self::validate_alias(key).map_err(|_| {
            CoreError::MalformedKey(format!(
                "'{}' is neither a base62 key nor a valid alias",
                key.escape_default()
            ))
        })?;
        Ok(Self::Custom(key.to_string()))
    }

    /// Whether the key is one of [`RESERVED_KEYS`].
    pub fn is_reserved(&self) -> bool {
        RESERVED_KEYS.contains(&self.as_str())
    }

    /// Creates a key without validation.
    ///
    /// Use this only for keys read back from trusted storage.
    pub fn new_unchecked(key: impl Into<String>) -> Self {
        Self::Custom(key.into())
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            ShortKey::Generated(code) => code.as_str(),
            ShortKey::Custom(s) => s.as_str(),
        }
    }

    /// Returns the identifier for keys that decode as base62.
    pub fn identifier(&self) -> Option<u64> {
        KeyEncoder::decode(self.as_str()).ok()
    }

    fn validate_alias(alias: &str) -> Result<()> {
        if alias.len() < MIN_ALIAS_LENGTH || alias.len() > MAX_ALIAS_LENGTH {
            return Err(CoreError::InvalidAlias(format!(
                "length must be between {} and {}, got {}",
                MIN_ALIAS_LENGTH,
                MAX_ALIAS_LENGTH,
                alias.len()
            )));
        }

        if !alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidAlias(format!(
                "must contain only alphanumeric characters, hyphens, or underscores: '{}'",
                alias.escape_default()
            )));
        }

        Ok(())
    }
}

impl PartialEq for ShortKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ShortKey {}

impl Hash for ShortKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Display for ShortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ShortKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ShortKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ShortKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}
