use crate::error::{CoreError, Result};
use smol_str::SmolStr;
use std::fmt::Display;

/// Symbols in digit order: `0-9`, `A-Z`, `a-z`.
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Longest encoding of a `u64` (62^10 < u64::MAX < 62^11).
pub const MAX_ENCODED_LEN: usize = 11;

const BASE: u64 = ALPHABET.len() as u64;

/// Bijective base-62 codec between identifiers and short keys.
///
/// There is no hashing involved: a key is unique exactly when the
/// identifier it was encoded from is unique. Only canonical strings
/// decode, so every identifier has a single spelling.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyEncoder;

impl KeyEncoder {
    /// Encodes `id` into at most [`MAX_ENCODED_LEN`] alphabet symbols.
    pub fn encode(id: u64) -> ShortCodeBase62 {
        if id == 0 {
            return ShortCodeBase62(SmolStr::new_inline("0"));
        }

        let mut buf = [0u8; MAX_ENCODED_LEN];
        let mut pos = MAX_ENCODED_LEN;
        let mut rest = id;
        while rest > 0 {
            pos -= 1;
            buf[pos] = ALPHABET[(rest % BASE) as usize];
            rest /= BASE;
        }

        let encoded: String = buf[pos..].iter().map(|&b| b as char).collect();
        ShortCodeBase62(SmolStr::new(encoded))
    }

    /// Decodes a key back into the identifier it was encoded from.
    ///
    /// Fails with [`CoreError::MalformedKey`] when the key is empty, too
    /// long, has a leading zero, contains a symbol outside the alphabet or
    /// does not fit into 64 bits.
    pub fn decode(key: &str) -> Result<u64> {
        let bytes = key.as_bytes();
        if bytes.is_empty() {
            return Err(CoreError::MalformedKey("key is empty".to_string()));
        }
        if bytes.len() > MAX_ENCODED_LEN {
            return Err(CoreError::MalformedKey(format!(
                "key is longer than {} symbols: '{}'",
                MAX_ENCODED_LEN, key
            )));
        }
        if bytes.len() > 1 && bytes[0] == b'0' {
            return Err(CoreError::MalformedKey(format!(
                "key is not canonical (leading zero): '{}'",
                key
            )));
        }

        bytes.iter().try_fold(0u64, |acc, &b| {
            let digit = digit_of(b).ok_or_else(|| {
                CoreError::MalformedKey(format!(
                    "symbol '{}' is outside the base62 alphabet: '{}'",
                    b.escape_ascii(),
                    key
                ))
            })?;
            acc.checked_mul(BASE)
                .and_then(|v| v.checked_add(u64::from(digit)))
                .ok_or_else(|| {
                    CoreError::MalformedKey(format!("key exceeds the identifier range: '{}'", key))
                })
        })
    }
}

fn digit_of(symbol: u8) -> Option<u8> {
    match symbol {
        b'0'..=b'9' => Some(symbol - b'0'),
        b'A'..=b'Z' => Some(symbol - b'A' + 10),
        b'a'..=b'z' => Some(symbol - b'a' + 36),
        _ => None,
    }
}

/// A short code encoded as base62 string.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShortCodeBase62(SmolStr);

impl ShortCodeBase62 {
    /// Parses an already encoded key, rejecting anything that does not decode.
    pub fn parse(key: &str) -> Result<Self> {
        KeyEncoder::decode(key)?;
        Ok(Self(SmolStr::new(key)))
    }

    /// Returns the identifier this code was encoded from.
    pub fn id(&self) -> u64 {
        // Construction guarantees a canonical encoding.
        KeyEncoder::decode(&self.0).unwrap_or_default()
    }

    /// Returns the short code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for ShortCodeBase62 {
    fn from(id: u64) -> Self {
        KeyEncoder::encode(id)
    }
}

impl std::fmt::Debug for ShortCodeBase62 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ShortCodeBase62").field(&self.0).finish()
    }
}

impl Display for ShortCodeBase62 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
