//! Read-through content cache.
//!
//! Every public read follows the same pattern: try the store; on a hit,
//! deserialize and return; on a miss or store failure, call the origin and
//! best-effort write the result back. A failed write-back is logged and
//! reported in the returned [`Loaded`], never propagated — the caller already
//! has a valid answer.
//!
//! Concurrent identical misses are coalesced per process behind a per-key
//! async mutex: the second caller re-checks the cache after the first one
//! finishes, so a stampede on a popular key costs one origin fetch here.
//! Cross-process stampedes remain possible and harmless (both writers store
//! the same logically-equivalent value).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::origin::{OriginError, OriginLoader, SeoBundle};
use crate::domain::content::ContentItem;
use crate::domain::types::Category;

use super::config::CacheConfig;
use super::keys;
use super::store::{CacheStore, StoreError};

/// Where the returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Origin,
}

/// What happened to the cache after an origin fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    /// The fresh value was stored.
    Stored,
    /// The store rejected the write; the value is still valid.
    Failed,
    /// Nothing to store (cache hit, absent item, or store disabled).
    Skipped,
}

/// A value plus the path it took through the cache, so callers and tests can
/// tell "hit", "origin", and "origin but cache write failed" apart.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub value: T,
    pub source: LoadSource,
    pub write_back: WriteBack,
}

impl<T> Loaded<T> {
    fn hit(value: T) -> Self {
        Self {
            value,
            source: LoadSource::Cache,
            write_back: WriteBack::Skipped,
        }
    }

    fn origin(value: T, write_back: WriteBack) -> Self {
        Self {
            value,
            source: LoadSource::Origin,
            write_back,
        }
    }
}

/// Outcome of a warmer-driven refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cached entry was younger than the threshold; left alone.
    Fresh,
    /// A fresh value was fetched from the origin and written back.
    Warmed,
    /// The origin no longer has the item.
    Missing,
}

/// Cache values travel with their write time so the warmer can judge
/// staleness without a second key.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    written_at: OffsetDateTime,
    value: T,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    written_at: OffsetDateTime,
    value: &'a T,
}

pub struct ContentCacheService {
    store: Option<Arc<dyn CacheStore>>,
    origin: Arc<dyn OriginLoader>,
    config: CacheConfig,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl ContentCacheService {
    pub fn new(
        store: Option<Arc<dyn CacheStore>>,
        origin: Arc<dyn OriginLoader>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            origin,
            config,
            in_flight: DashMap::new(),
        }
    }

    // ========================================================================
    // Read path
    // ========================================================================

    pub async fn get_content_by_category(
        &self,
        category: Category,
    ) -> Result<Loaded<Vec<ContentItem>>, OriginError> {
        let key = keys::category_list(category);
        if let Some(envelope) = self.cache_get::<Vec<ContentItem>>(&key).await {
            return Ok(Loaded::hit(envelope.value));
        }

        let _flight = self.flight_lock(&key).await;
        if let Some(envelope) = self.cache_get::<Vec<ContentItem>>(&key).await {
            return Ok(Loaded::hit(envelope.value));
        }

        let items = self
            .origin_call(self.origin.load_category_metadata(category))
            .await?;
        let write_back = self.cache_put(&key, &items, self.config.list_ttl).await;
        Ok(Loaded::origin(items, write_back))
    }

    pub async fn get_content_item_by_slug(
        &self,
        category: Category,
        slug: &str,
    ) -> Result<Loaded<Option<ContentItem>>, OriginError> {
        let key = keys::item(category, slug);
        if let Some(envelope) = self.cache_get::<ContentItem>(&key).await {
            return Ok(Loaded::hit(Some(envelope.value)));
        }

        let _flight = self.flight_lock(&key).await;
        if let Some(envelope) = self.cache_get::<ContentItem>(&key).await {
            return Ok(Loaded::hit(Some(envelope.value)));
        }

        let item = self
            .origin_call(self.origin.load_full_content(category, slug))
            .await?;
        let write_back = match &item {
            Some(item) => self.cache_put(&key, item, self.config.item_ttl).await,
            // Absent items are not negatively cached.
            None => WriteBack::Skipped,
        };
        Ok(Loaded::origin(item, write_back))
    }

    pub async fn get_seo_content(&self) -> Result<Loaded<SeoBundle>, OriginError> {
        let key = keys::SEO_BUNDLE;
        if let Some(envelope) = self.cache_get::<SeoBundle>(key).await {
            return Ok(Loaded::hit(envelope.value));
        }

        let _flight = self.flight_lock(key).await;
        if let Some(envelope) = self.cache_get::<SeoBundle>(key).await {
            return Ok(Loaded::hit(envelope.value));
        }

        let bundle = self.origin_call(self.origin.load_seo_bundle()).await?;
        let write_back = self.cache_put(key, &bundle, self.config.seo_ttl).await;
        Ok(Loaded::origin(bundle, write_back))
    }

    // ========================================================================
    // Explicit population hooks
    // ========================================================================

    pub async fn set_content_by_category(
        &self,
        category: Category,
        items: &[ContentItem],
    ) -> Result<(), StoreError> {
        self.put_or_err(&keys::category_list(category), &items, self.config.list_ttl)
            .await
    }

    pub async fn set_content_item_by_slug(&self, item: &ContentItem) -> Result<(), StoreError> {
        self.put_or_err(
            &keys::item(item.category, &item.slug),
            item,
            self.config.item_ttl,
        )
        .await
    }

    pub async fn set_seo_content(&self, bundle: &SeoBundle) -> Result<(), StoreError> {
        self.put_or_err(keys::SEO_BUNDLE, bundle, self.config.seo_ttl)
            .await
    }

    // ========================================================================
    // Warmer support
    // ========================================================================

    /// Refresh one item if its cached entry is older than `max_age` (or
    /// absent). Forces an origin fetch and a cache write on staleness.
    pub async fn refresh_item(
        &self,
        category: Category,
        slug: &str,
        max_age: Duration,
    ) -> Result<RefreshOutcome, OriginError> {
        let key = keys::item(category, slug);
        if let Some(envelope) = self.cache_get::<ContentItem>(&key).await
            && envelope_age(&envelope) < max_age
        {
            return Ok(RefreshOutcome::Fresh);
        }

        match self
            .origin_call(self.origin.load_full_content(category, slug))
            .await?
        {
            Some(item) => {
                self.cache_put(&key, &item, self.config.item_ttl).await;
                Ok(RefreshOutcome::Warmed)
            }
            None => Ok(RefreshOutcome::Missing),
        }
    }

    /// Category-listing counterpart of [`Self::refresh_item`].
    pub async fn refresh_category(
        &self,
        category: Category,
        max_age: Duration,
    ) -> Result<RefreshOutcome, OriginError> {
        let key = keys::category_list(category);
        if let Some(envelope) = self.cache_get::<Vec<ContentItem>>(&key).await
            && envelope_age(&envelope) < max_age
        {
            return Ok(RefreshOutcome::Fresh);
        }

        let items = self
            .origin_call(self.origin.load_category_metadata(category))
            .await?;
        self.cache_put(&key, &items, self.config.list_ttl).await;
        Ok(RefreshOutcome::Warmed)
    }

    // ========================================================================
    // Store plumbing
    // ========================================================================

    /// Best-effort cached read. Misses, store failures, timeouts, and decode
    /// failures all read as `None`; the store is never a correctness
    /// dependency.
    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<Envelope<T>> {
        let store = self.store.as_ref()?;
        let bytes = match tokio::time::timeout(self.config.store_timeout, store.get(key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                counter!("scorta_cache_miss_total").increment(1);
                return None;
            }
            Ok(Err(err)) => {
                counter!("scorta_cache_miss_total").increment(1);
                warn!(
                    target: "scorta::cache",
                    key,
                    error = %err,
                    "cache read failed, falling back to origin"
                );
                return None;
            }
            Err(_) => {
                counter!("scorta_cache_miss_total").increment(1);
                warn!(target: "scorta::cache", key, "cache read timed out");
                return None;
            }
        };

        match serde_json::from_slice::<Envelope<T>>(&bytes) {
            Ok(envelope) => {
                counter!("scorta_cache_hit_total").increment(1);
                Some(envelope)
            }
            Err(err) => {
                counter!("scorta_cache_miss_total").increment(1);
                warn!(
                    target: "scorta::cache",
                    key,
                    error = %err,
                    "cache entry failed to decode, treating as miss"
                );
                None
            }
        }
    }

    /// Best-effort write-back; the outcome is reported, never propagated.
    async fn cache_put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> WriteBack {
        if self.store.is_none() {
            return WriteBack::Skipped;
        }
        match self.put_or_err(key, value, ttl).await {
            Ok(()) => WriteBack::Stored,
            Err(err) => {
                counter!("scorta_cache_write_failed_total").increment(1);
                warn!(
                    target: "scorta::cache",
                    key,
                    error = %err,
                    "cache write-back failed, serving origin value uncached"
                );
                WriteBack::Failed
            }
        }
    }

    async fn put_or_err<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        let envelope = EnvelopeRef {
            written_at: OffsetDateTime::now_utc(),
            value,
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|err| StoreError::unavailable(format!("serialize `{key}`: {err}")))?;
        tokio::time::timeout(
            self.config.store_timeout,
            store.set(key, Bytes::from(bytes), ttl),
        )
        .await
        .map_err(|_| StoreError::unavailable(format!("write `{key}` timed out")))?
    }

    async fn origin_call<T>(
        &self,
        fut: impl Future<Output = Result<T, OriginError>>,
    ) -> Result<T, OriginError> {
        tokio::time::timeout(self.config.origin_timeout, fut)
            .await
            .map_err(|_| OriginError::unavailable("origin call timed out"))?
    }

    /// Per-key guard serializing concurrent misses within this process.
    async fn flight_lock(&self, key: &str) -> FlightGuard<'_> {
        let lock = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        debug!(target: "scorta::cache", key, "awaiting in-flight load");
        FlightGuard {
            key: key.to_string(),
            table: &self.in_flight,
            permit: Some(lock.lock_owned().await),
        }
    }
}

struct FlightGuard<'a> {
    key: String,
    table: &'a DashMap<String, Arc<Mutex<()>>>,
    permit: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.permit.take();
        // Forget the per-key lock once nobody else is waiting on it.
        self.table
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn envelope_age<T>(envelope: &Envelope<T>) -> Duration {
    let age = OffsetDateTime::now_utc() - envelope.written_at;
    // Clock skew can make freshly-written entries appear future-dated.
    age.try_into().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::macros::date;

    use crate::cache::store::MemoryStore;

    use super::*;

    fn sample(category: Category, slug: &str) -> ContentItem {
        ContentItem {
            category,
            slug: slug.to_string(),
            title: slug.to_uppercase(),
            description: String::new(),
            tags: Vec::new(),
            author: "tester".to_string(),
            date_added: date!(2025 - 05 - 01),
            full_content: Some(format!("body of {slug}")),
        }
    }

    /// Origin serving a fixed set of items and counting calls.
    struct StaticOrigin {
        items: Vec<ContentItem>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StaticOrigin {
        fn new(items: Vec<ContentItem>) -> Self {
            Self {
                items,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                items: Vec::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn check(&self) -> Result<(), OriginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(OriginError::unavailable("origin down"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl OriginLoader for StaticOrigin {
        async fn load_category_metadata(
            &self,
            category: Category,
        ) -> Result<Vec<ContentItem>, OriginError> {
            self.check()?;
            Ok(self
                .items
                .iter()
                .filter(|item| item.category == category)
                .map(ContentItem::metadata)
                .collect())
        }

        async fn load_full_content(
            &self,
            category: Category,
            slug: &str,
        ) -> Result<Option<ContentItem>, OriginError> {
            self.check()?;
            Ok(self
                .items
                .iter()
                .find(|item| item.category == category && item.slug == slug)
                .cloned())
        }

        async fn load_seo_bundle(&self) -> Result<SeoBundle, OriginError> {
            self.check()?;
            let mut bundle: SeoBundle = HashMap::new();
            for item in &self.items {
                bundle
                    .entry(item.category)
                    .or_default()
                    .push(item.metadata());
            }
            Ok(bundle)
        }
    }

    /// Store whose every operation fails, simulating an unreachable remote.
    struct DownStore;

    #[async_trait]
    impl CacheStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn set_if_absent(
            &self,
            _key: &str,
            _value: Bytes,
            _ttl: Duration,
        ) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn increment(&self, _key: &str, _amount: i64) -> Result<i64, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn scan_keys(&self, _pattern: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
    }

    fn service_with(
        store: Option<Arc<dyn CacheStore>>,
        origin: Arc<StaticOrigin>,
    ) -> ContentCacheService {
        ContentCacheService::new(store, origin, CacheConfig::default())
    }

    #[tokio::test]
    async fn miss_then_hit_fetches_origin_once() {
        let origin = Arc::new(StaticOrigin::new(vec![sample(Category::Rules, "x")]));
        let service = service_with(Some(Arc::new(MemoryStore::new())), origin.clone());

        let first = service
            .get_content_item_by_slug(Category::Rules, "x")
            .await
            .expect("load");
        assert_eq!(first.source, LoadSource::Origin);
        assert_eq!(first.write_back, WriteBack::Stored);
        let item = first.value.expect("item present");
        assert_eq!(item.title, "X");

        let second = service
            .get_content_item_by_slug(Category::Rules, "x")
            .await
            .expect("load");
        assert_eq!(second.source, LoadSource::Cache);
        assert_eq!(second.value.expect("item present"), item);
        assert_eq!(origin.calls(), 1);
    }

    #[tokio::test]
    async fn unreachable_store_degrades_to_origin() {
        let origin = Arc::new(StaticOrigin::new(vec![sample(Category::Agents, "a")]));
        let service = service_with(Some(Arc::new(DownStore)), origin.clone());

        let loaded = service
            .get_content_item_by_slug(Category::Agents, "a")
            .await
            .expect("no error escapes when the store is down");
        assert_eq!(loaded.source, LoadSource::Origin);
        assert_eq!(loaded.write_back, WriteBack::Failed);
        assert_eq!(loaded.value.expect("item").slug, "a");
    }

    #[tokio::test]
    async fn absent_item_is_not_negatively_cached() {
        let origin = Arc::new(StaticOrigin::new(Vec::new()));
        let service = service_with(Some(Arc::new(MemoryStore::new())), origin.clone());

        let loaded = service
            .get_content_item_by_slug(Category::Mcp, "ghost")
            .await
            .expect("load");
        assert!(loaded.value.is_none());
        assert_eq!(loaded.write_back, WriteBack::Skipped);

        // A second read goes back to the origin.
        service
            .get_content_item_by_slug(Category::Mcp, "ghost")
            .await
            .expect("load");
        assert_eq!(origin.calls(), 2);
    }

    #[tokio::test]
    async fn origin_failure_propagates_when_cache_empty() {
        let origin = Arc::new(StaticOrigin::failing());
        let service = service_with(Some(Arc::new(MemoryStore::new())), origin);

        let err = service
            .get_content_by_category(Category::Hooks)
            .await
            .expect_err("both layers failed");
        assert!(matches!(err, OriginError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn read_after_explicit_set_returns_equal_value() {
        let origin = Arc::new(StaticOrigin::new(Vec::new()));
        let service = service_with(Some(Arc::new(MemoryStore::new())), origin);

        let item = sample(Category::Commands, "deploy");
        service
            .set_content_item_by_slug(&item)
            .await
            .expect("population hook");

        let loaded = service
            .get_content_item_by_slug(Category::Commands, "deploy")
            .await
            .expect("load");
        assert_eq!(loaded.source, LoadSource::Cache);
        assert_eq!(loaded.value.expect("item"), item);
    }

    #[tokio::test]
    async fn listing_read_after_population_hook_is_a_hit() {
        let origin = Arc::new(StaticOrigin::new(Vec::new()));
        let service = service_with(Some(Arc::new(MemoryStore::new())), origin.clone());

        let items = vec![
            sample(Category::Agents, "a").metadata(),
            sample(Category::Agents, "b").metadata(),
        ];
        service
            .set_content_by_category(Category::Agents, &items)
            .await
            .expect("population hook");

        let loaded = service
            .get_content_by_category(Category::Agents)
            .await
            .expect("load");
        assert_eq!(loaded.source, LoadSource::Cache);
        assert_eq!(loaded.value, items);
        assert_eq!(origin.calls(), 0);
    }

    #[tokio::test]
    async fn seo_read_after_population_hook_is_a_hit() {
        let origin = Arc::new(StaticOrigin::new(Vec::new()));
        let service = service_with(Some(Arc::new(MemoryStore::new())), origin.clone());

        let mut bundle = SeoBundle::new();
        for category in Category::ALL {
            bundle.insert(category, vec![sample(category, "x").metadata()]);
        }
        service.set_seo_content(&bundle).await.expect("population hook");

        let loaded = service.get_seo_content().await.expect("load");
        assert_eq!(loaded.source, LoadSource::Cache);
        assert_eq!(loaded.value, bundle);
        assert_eq!(origin.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_to_one_origin_call() {
        let origin = Arc::new(StaticOrigin::new(vec![sample(Category::Rules, "hot")]));
        let service = Arc::new(service_with(
            Some(Arc::new(MemoryStore::new())),
            origin.clone(),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .get_content_item_by_slug(Category::Rules, "hot")
                    .await
                    .expect("load")
            }));
        }
        for handle in handles {
            let loaded = handle.await.expect("join");
            assert_eq!(loaded.value.expect("item").slug, "hot");
        }
        assert_eq!(origin.calls(), 1);
    }

    #[tokio::test]
    async fn refresh_item_respects_freshness_threshold() {
        let origin = Arc::new(StaticOrigin::new(vec![sample(Category::Agents, "a")]));
        let service = service_with(Some(Arc::new(MemoryStore::new())), origin.clone());

        // First refresh warms the absent entry.
        let outcome = service
            .refresh_item(Category::Agents, "a", Duration::from_secs(60))
            .await
            .expect("refresh");
        assert_eq!(outcome, RefreshOutcome::Warmed);

        // A fresh entry is left alone.
        let outcome = service
            .refresh_item(Category::Agents, "a", Duration::from_secs(60))
            .await
            .expect("refresh");
        assert_eq!(outcome, RefreshOutcome::Fresh);

        // A zero threshold forces the fetch.
        let outcome = service
            .refresh_item(Category::Agents, "a", Duration::ZERO)
            .await
            .expect("refresh");
        assert_eq!(outcome, RefreshOutcome::Warmed);
        assert_eq!(origin.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_item_reports_missing() {
        let origin = Arc::new(StaticOrigin::new(Vec::new()));
        let service = service_with(Some(Arc::new(MemoryStore::new())), origin);

        let outcome = service
            .refresh_item(Category::Agents, "gone", Duration::from_secs(60))
            .await
            .expect("refresh");
        assert_eq!(outcome, RefreshOutcome::Missing);
    }

    #[tokio::test]
    async fn disabled_store_always_fetches_origin() {
        let origin = Arc::new(StaticOrigin::new(vec![sample(Category::Mcp, "m")]));
        let service = service_with(None, origin.clone());

        for _ in 0..3 {
            let loaded = service
                .get_content_item_by_slug(Category::Mcp, "m")
                .await
                .expect("load");
            assert_eq!(loaded.source, LoadSource::Origin);
            assert_eq!(loaded.write_back, WriteBack::Skipped);
        }
        assert_eq!(origin.calls(), 3);
    }

    #[tokio::test]
    async fn seo_bundle_roundtrips() {
        let origin = Arc::new(StaticOrigin::new(vec![
            sample(Category::Agents, "a"),
            sample(Category::Mcp, "m"),
        ]));
        let service = service_with(Some(Arc::new(MemoryStore::new())), origin.clone());

        let first = service.get_seo_content().await.expect("load");
        assert_eq!(first.source, LoadSource::Origin);
        assert_eq!(first.value.len(), 2);

        let second = service.get_seo_content().await.expect("load");
        assert_eq!(second.source, LoadSource::Cache);
        assert_eq!(origin.calls(), 1);
    }
}
