//! End-to-end warming: views drive the ranking, a warm run primes the cache,
//! and subsequent reads are served without touching the origin.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use time::macros::date;
use tokio::sync::watch;

use scorta::application::origin::{OriginError, OriginLoader, SeoBundle};
use scorta::cache::{
    CacheConfig, CacheStore, CacheWarmer, ContentCacheService, LoadSource, MemoryStore,
    PopularityTracker, TriggerOutcome, WarmingStatus,
};
use scorta::domain::content::ContentItem;
use scorta::domain::types::Category;

fn item(category: Category, slug: &str) -> ContentItem {
    ContentItem {
        category,
        slug: slug.to_string(),
        title: format!("Title {slug}"),
        description: String::new(),
        tags: Vec::new(),
        author: "tester".to_string(),
        date_added: date!(2025 - 06 - 15),
        full_content: Some(format!("body of {slug}")),
    }
}

struct CountingOrigin {
    items: Vec<ContentItem>,
    fail_for: Vec<Category>,
    calls: AtomicUsize,
}

impl CountingOrigin {
    fn new(items: Vec<ContentItem>) -> Self {
        Self {
            items,
            fail_for: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_for(mut self, category: Category) -> Self {
        self.fail_for.push(category);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self, category: Category) -> Result<(), OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_for.contains(&category) {
            Err(OriginError::unavailable("backend down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OriginLoader for CountingOrigin {
    async fn load_category_metadata(
        &self,
        category: Category,
    ) -> Result<Vec<ContentItem>, OriginError> {
        self.gate(category)?;
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
        self.gate(category)?;
        Ok(self
            .items
            .iter()
            .find(|item| item.category == category && item.slug == slug)
            .cloned())
    }

    async fn load_seo_bundle(&self) -> Result<SeoBundle, OriginError> {
        let mut bundle: SeoBundle = HashMap::new();
        for category in Category::ALL {
            bundle.insert(category, self.load_category_metadata(category).await?);
        }
        Ok(bundle)
    }
}

struct Stack {
    content: Arc<ContentCacheService>,
    popularity: Arc<PopularityTracker>,
    warmer: CacheWarmer,
    origin: Arc<CountingOrigin>,
    _shutdown: watch::Sender<bool>,
}

fn stack(origin: CountingOrigin) -> Stack {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let origin = Arc::new(origin);
    let config = CacheConfig::default();
    let content = Arc::new(ContentCacheService::new(
        Some(store.clone()),
        origin.clone(),
        config.clone(),
    ));
    let popularity = Arc::new(PopularityTracker::new(Some(store.clone())));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let warmer = CacheWarmer::new(
        Some(store),
        content.clone(),
        popularity.clone(),
        config,
        shutdown_rx,
    );
    Stack {
        content,
        popularity,
        warmer,
        origin,
        _shutdown: shutdown_tx,
    }
}

#[tokio::test]
async fn popular_items_are_served_from_cache_after_a_warm_run() {
    let stack = stack(CountingOrigin::new(vec![
        item(Category::Agents, "reviewer"),
        item(Category::Agents, "planner"),
    ]));

    // Traffic makes `reviewer` the hot item.
    for _ in 0..4 {
        stack
            .popularity
            .record_view(Category::Agents, "reviewer")
            .await
            .expect("record");
    }
    stack
        .popularity
        .record_view(Category::Agents, "planner")
        .await
        .expect("record");

    let outcome = stack.warmer.trigger().await;
    assert!(outcome.success(), "{}", outcome.message());

    // Everything the warmer touched now reads as a hit, no origin call.
    let before = stack.origin.calls();
    for slug in ["reviewer", "planner"] {
        let loaded = stack
            .content
            .get_content_item_by_slug(Category::Agents, slug)
            .await
            .expect("load");
        assert_eq!(loaded.source, LoadSource::Cache, "{slug} should be warm");
    }
    let listing = stack
        .content
        .get_content_by_category(Category::Agents)
        .await
        .expect("load");
    assert_eq!(listing.source, LoadSource::Cache);
    assert_eq!(listing.value.len(), 2);
    assert_eq!(stack.origin.calls(), before);
}

#[tokio::test]
async fn partial_failure_still_warms_the_healthy_categories() {
    let stack = stack(
        CountingOrigin::new(vec![
            item(Category::Agents, "reviewer"),
            item(Category::Rules, "style"),
        ])
        .failing_for(Category::Rules),
    );

    let outcome = stack.warmer.trigger().await;
    assert!(outcome.success());

    let run = stack.warmer.status().await;
    assert_eq!(run.status, WarmingStatus::Idle);
    assert_eq!(run.failed_categories, vec!["rules".to_string()]);
    assert_eq!(run.categories_processed, 4);
    assert!(run.last_error.is_some());

    // The healthy category is primed.
    let loaded = stack
        .content
        .get_content_item_by_slug(Category::Agents, "reviewer")
        .await
        .expect("load");
    assert_eq!(loaded.source, LoadSource::Cache);
}

#[tokio::test]
async fn a_second_run_close_behind_refreshes_nothing() {
    let stack = stack(CountingOrigin::new(vec![item(Category::Mcp, "server")]));

    let outcome = stack.warmer.trigger().await;
    assert!(outcome.success());
    let after_first = stack.origin.calls();

    // Everything is fresher than the staleness threshold, so the second run
    // completes without origin traffic.
    let outcome = stack.warmer.trigger().await;
    assert_eq!(
        outcome,
        TriggerOutcome::Completed {
            message: "warmed 0 items across 5 categories (0 failed)".to_string()
        }
    );
    assert_eq!(stack.origin.calls(), after_first);
}
