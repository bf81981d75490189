use crate::shard::Shard;
use async_trait::async_trait;
use jiff::Timestamp;
use keyway_core::store::Result;
use keyway_core::{PutOutcome, UrlMapping};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory shard backed by an ordered index.
///
/// The check and the insert of a conditional write happen under one write
/// lock, which is what makes `insert_if_absent` atomic per key.
#[derive(Debug, Default)]
pub struct MemoryShard {
    index: RwLock<BTreeMap<String, UrlMapping>>,
}

impl MemoryShard {
    /// Creates a new in-memory shard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored mappings, expired ones included.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

#[async_trait]
impl Shard for MemoryShard {
    async fn insert_if_absent(&self, mapping: UrlMapping, now: Timestamp) -> Result<PutOutcome> {
        let mut index = self.index.write();

        if let Some(existing) = index.get(mapping.key.as_str()) {
            if !existing.is_expired_at(now) {
                return Ok(PutOutcome::AlreadyExists(existing.clone()));
            }
            // An expired mapping no longer owns its key; overwrite it below.
        }

        index.insert(mapping.key.as_str().to_owned(), mapping);
        Ok(PutOutcome::Created)
    }

    async fn get(&self, key: &str, now: Timestamp) -> Result<Option<UrlMapping>> {
        let index = self.index.read();
        Ok(index
            .get(key)
            .filter(|mapping| !mapping.is_expired_at(now))
            .cloned())
    }

    async fn find_by_url(&self, target_url: &str, now: Timestamp) -> Result<Vec<UrlMapping>> {
        let index = self.index.read();
        Ok(index
            .values()
            .filter(|mapping| mapping.target_url == target_url && !mapping.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<usize> {
        let mut index = self.index.write();
        let before = index.len();
        index.retain(|_, mapping| !mapping.is_expired_at(now));
        Ok(before - index.len())
    }

    async fn scan(&self) -> Result<Vec<UrlMapping>> {
        Ok(self.index.read().values().cloned().collect())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.index.write().remove(key).is_some())
    }
}
