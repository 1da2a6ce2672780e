//! View counters and popularity rankings.
//!
//! Counters live in the store under `views:total:…` and `views:daily:…` and
//! are only ever moved through the store's atomic increment, never a
//! read-modify-write. When the store is disabled every operation is a no-op
//! returning zero or empty; view tracking is an enhancement, not a required
//! dependency.

use std::collections::BTreeSet;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::domain::types::Category;

use super::keys;
use super::store::{CacheStore, StoreError};

/// One row of a `get_popular` ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopularEntry {
    pub slug: String,
    pub views: u64,
}

pub struct PopularityTracker {
    store: Option<Arc<dyn CacheStore>>,
}

impl PopularityTracker {
    pub fn new(store: Option<Arc<dyn CacheStore>>) -> Self {
        Self { store }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Record one view against the total and the per-day counter.
    pub async fn record_view(&self, category: Category, slug: &str) -> Result<(), StoreError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };

        let today = OffsetDateTime::now_utc().date();
        store.increment(&keys::views_total(category, slug), 1).await?;
        store
            .increment(&keys::views_daily(category, slug, today), 1)
            .await?;
        counter!("scorta_views_recorded_total").increment(1);
        debug!(target: "scorta::views", %category, slug, "view recorded");
        Ok(())
    }

    pub async fn get_view_count(&self, category: Category, slug: &str) -> Result<u64, StoreError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(0);
        };
        let key = keys::views_total(category, slug);
        match store.get(&key).await? {
            Some(bytes) => parse_count(&key, &bytes),
            None => Ok(0),
        }
    }

    /// Top `limit` slugs of a category by total views, descending, ties
    /// broken by slug lexical order so the ranking is deterministic.
    pub async fn get_popular(
        &self,
        category: Category,
        limit: usize,
    ) -> Result<Vec<PopularEntry>, StoreError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(Vec::new());
        };

        let pattern = keys::views_total_pattern(category);
        // A remote SCAN may report the same key more than once across cursor
        // iterations; collapse before ranking.
        let scanned: BTreeSet<String> = store.scan_keys(&pattern).await?.into_iter().collect();
        let mut entries = Vec::new();
        for key in scanned {
            let Some(slug) = keys::slug_from_views_total(category, &key) else {
                continue;
            };
            let views = match store.get(&key).await? {
                Some(bytes) => parse_count(&key, &bytes)?,
                None => continue,
            };
            entries.push(PopularEntry {
                slug: slug.to_string(),
                views,
            });
        }

        entries.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.slug.cmp(&b.slug)));
        entries.truncate(limit);
        Ok(entries)
    }
}

fn parse_count(key: &str, bytes: &[u8]) -> Result<u64, StoreError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .map(|value| value.max(0) as u64)
        .ok_or_else(|| StoreError::NotAnInteger {
            key: key.to_string(),
        })
}
