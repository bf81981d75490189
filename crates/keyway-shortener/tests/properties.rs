use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use keyway_cache::MokaLookupCache;
use keyway_core::store::Result as StoreResult;
use keyway_core::{
    ExpirationPolicy, IdentifierAllocator, KeyEncoder, MappingStore, NoCache, PutOutcome,
    ShortKey, ShortenParams, Shortener, ShortenerError, UrlMapping,
};
use keyway_idalloc::{BlockAllocator, Flake, FlakeSettings, InMemoryBlockAuthority};
use keyway_shortener::{ServiceSettings, ShortenerService};
use keyway_storage::{MemoryShard, ShardedStore};

type Store = Arc<ShardedStore<MemoryShard>>;

fn shared_store() -> Store {
    Arc::new(
        ShardedStore::with_uniform_routing((0..4).map(|_| MemoryShard::new()).collect()).unwrap(),
    )
}

/// A node: its own cache and allocator in front of the shared store.
fn node<A: IdentifierAllocator>(store: &Store, allocator: A) -> Arc<dyn Shortener> {
    Arc::new(ShortenerService::new(
        Arc::clone(store),
        MokaLookupCache::default(),
        allocator,
        ServiceSettings::default(),
    ))
}

fn block_nodes(store: &Store, count: u16) -> Vec<Arc<dyn Shortener>> {
    let authority = Arc::new(InMemoryBlockAuthority::new());
    (0..count)
        .map(|node_id| {
            node(
                store,
                BlockAllocator::with_block_size(Arc::clone(&authority), node_id, 16),
            )
        })
        .collect()
}

async fn shorten_concurrently(nodes: &[Arc<dyn Shortener>], per_task: usize) -> Vec<ShortKey> {
    let mut handles = Vec::new();
    for (i, node) in nodes.iter().cycle().take(16).enumerate() {
        let node = Arc::clone(node);
        handles.push(tokio::spawn(async move {
            let mut keys = Vec::new();
            for j in 0..per_task {
                let url = format!("https://example.com/{i}/{j}");
                keys.push(node.shorten(ShortenParams::new(url)).await.unwrap());
            }
            keys
        }));
    }

    let mut keys = Vec::new();
    for handle in handles {
        keys.extend(handle.await.unwrap());
    }
    keys
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn generated_keys_are_unique_across_nodes() {
    let store = shared_store();
    let nodes = block_nodes(&store, 4);

    let keys = shorten_concurrently(&nodes, 100).await;

    let unique: HashSet<_> = keys.iter().collect();
    assert_eq!(unique.len(), keys.len());
    assert_eq!(keys.len(), 1_600);
    for key in &keys {
        assert!(KeyEncoder::decode(key.as_str()).is_ok(), "{key}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn flake_allocated_keys_are_unique_across_nodes() {
    let store = shared_store();
    let epoch = Timestamp::now() - jiff::SignedDuration::from_hours(24);
    let nodes: Vec<_> = (0..2)
        .map(|node_id| {
            let settings = FlakeSettings::builder()
                .node_id(node_id)
                .start_epoch(epoch)
                .build();
            node(&store, Flake::new(settings).unwrap())
        })
        .collect();

    let keys = shorten_concurrently(&nodes, 50).await;

    let unique: HashSet<_> = keys.iter().collect();
    assert_eq!(unique.len(), 800);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_alias_writers_have_one_winner() {
    let store = shared_store();
    let nodes = block_nodes(&store, 4);

    let mut handles = Vec::new();
    for (i, node) in nodes.iter().cycle().take(12).enumerate() {
        let node = Arc::clone(node);
        handles.push(tokio::spawn(async move {
            let url = format!("https://writer{i}.example");
            let result = node
                .shorten(ShortenParams::new(url.clone()).with_alias("launch"))
                .await;
            (url, result)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (url, result) = handle.await.unwrap();
        match result {
            Ok(key) => {
                assert_eq!(key.as_str(), "launch");
                winners.push(url);
            }
            Err(ShortenerError::AliasTaken(key)) => assert_eq!(key, "launch"),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(winners.len(), 1);
    for node in &nodes {
        let resolved = node.resolve("launch").await.unwrap();
        assert_eq!(resolved.as_ref(), Some(&winners[0]));
    }
}

#[tokio::test]
async fn created_keys_resolve_on_every_node() {
    let store = shared_store();
    let nodes = block_nodes(&store, 3);

    for (i, creator) in nodes.iter().enumerate() {
        let url = format!("https://node{i}.example");
        let key = creator.shorten(ShortenParams::new(url.clone())).await.unwrap();

        for reader in &nodes {
            let resolved = reader.resolve(key.as_str()).await.unwrap();
            assert_eq!(resolved.as_deref(), Some(url.as_str()));
        }
    }
}

#[tokio::test]
async fn second_promo_alias_is_rejected() {
    let store = shared_store();
    let nodes = block_nodes(&store, 2);

    nodes[0]
        .shorten(ShortenParams::new("https://first.example").with_alias("promo"))
        .await
        .unwrap();
    let err = nodes[1]
        .shorten(ShortenParams::new("https://second.example").with_alias("promo"))
        .await
        .unwrap_err();

    assert!(matches!(err, ShortenerError::AliasTaken(_)));
    assert!(err.is_client_error());
    for node in &nodes {
        let resolved = node.resolve("promo").await.unwrap();
        assert_eq!(resolved.as_deref(), Some("https://first.example"));
    }
}

/// Counts every store access.
#[derive(Default)]
struct CountingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl MappingStore for CountingStore {
    async fn put_if_absent(&self, _mapping: UrlMapping) -> StoreResult<PutOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PutOutcome::Created)
    }

    async fn get(&self, _key: &ShortKey) -> StoreResult<Option<UrlMapping>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    async fn find_by_url(&self, _target_url: &str) -> StoreResult<Vec<ShortKey>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn purge_expired(&self, _now: Timestamp) -> StoreResult<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

#[tokio::test]
async fn malformed_key_never_reaches_storage() {
    let store = Arc::new(CountingStore::default());
    let service = ShortenerService::new(
        Arc::clone(&store),
        NoCache,
        BlockAllocator::new(InMemoryBlockAuthority::new(), 0),
        ServiceSettings::default(),
    );

    for key in ["!!!invalid!!!", "", "a b", "../etc", "0_"] {
        let result = service.resolve(key).await;
        assert!(
            matches!(result, Err(ShortenerError::MalformedKey(_))),
            "{key:?}"
        );
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);

    // A single symbol is a well-formed key and does reach the store.
    assert_eq!(service.resolve("x").await.unwrap(), None);
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_mapping_is_not_found() {
    let store = shared_store();
    let nodes = block_nodes(&store, 1);

    let key = nodes[0]
        .shorten(
            ShortenParams::new("https://example.com")
                .with_expiration(ExpirationPolicy::AfterDuration(Duration::from_secs(1))),
        )
        .await
        .unwrap();
    assert!(nodes[0].resolve(key.as_str()).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(nodes[0].resolve(key.as_str()).await.unwrap(), None);
}

#[tokio::test]
async fn alias_is_reusable_after_expiry() {
    let store = shared_store();
    let nodes = block_nodes(&store, 1);

    nodes[0]
        .shorten(
            ShortenParams::new("https://old.example")
                .with_alias("sale")
                .with_expiration(ExpirationPolicy::AfterDuration(Duration::from_millis(200))),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    nodes[0]
        .shorten(ShortenParams::new("https://new.example").with_alias("sale"))
        .await
        .unwrap();
    let resolved = nodes[0].resolve("sale").await.unwrap();
    assert_eq!(resolved.as_deref(), Some("https://new.example"));
}
