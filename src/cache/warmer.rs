//! Popularity-driven cache warming.
//!
//! A warm run walks the fixed category list, refreshing each category's
//! listing and its top-N items through the same read path ordinary traffic
//! uses. Runs are single-flight system-wide: the `warming:lock` key is
//! acquired with an atomic set-if-absent and carries a TTL as a safety net
//! against a crashed run. One category's failure never aborts the run; it is
//! recorded in the persisted [`WarmingRun`] and the loop moves on.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::application::origin::OriginError;
use crate::domain::types::Category;

use super::config::CacheConfig;
use super::keys;
use super::popularity::PopularityTracker;
use super::service::{ContentCacheService, RefreshOutcome};
use super::store::{CacheStore, StoreError};

/// Status records outlive the lock so operators can inspect finished runs.
const STATUS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmingStatus {
    Idle,
    Running,
}

/// Live counters for the current or most recent warm run, persisted at
/// `warming:status` so they survive process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmingRun {
    pub status: WarmingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<OffsetDateTime>,
    pub items_warmed: u32,
    pub categories_processed: u32,
    pub failed_categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WarmingRun {
    pub fn idle() -> Self {
        Self {
            status: WarmingStatus::Idle,
            started_at: None,
            items_warmed: 0,
            categories_processed: 0,
            failed_categories: Vec::new(),
            last_error: None,
        }
    }

    fn started(now: OffsetDateTime) -> Self {
        Self {
            status: WarmingStatus::Running,
            started_at: Some(now),
            ..Self::idle()
        }
    }
}

/// Result of a trigger attempt. Only `Completed` means a run executed;
/// the other variants are expected rejections, not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Completed { message: String },
    AlreadyRunning,
    StoreDisabled,
    StoreUnavailable,
    Failed,
}

impl TriggerOutcome {
    pub fn success(&self) -> bool {
        matches!(self, TriggerOutcome::Completed { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            TriggerOutcome::Completed { message } => message,
            TriggerOutcome::AlreadyRunning => "already running",
            TriggerOutcome::StoreDisabled => "cache store disabled, nothing to warm",
            TriggerOutcome::StoreUnavailable => "cache store unavailable",
            TriggerOutcome::Failed => "warm run aborted unexpectedly",
        }
    }
}

#[derive(Debug, Error)]
enum WarmError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Origin(#[from] OriginError),
}

pub struct CacheWarmer {
    store: Option<Arc<dyn CacheStore>>,
    content: Arc<ContentCacheService>,
    popularity: Arc<PopularityTracker>,
    config: CacheConfig,
    shutdown: watch::Receiver<bool>,
}

impl CacheWarmer {
    pub fn new(
        store: Option<Arc<dyn CacheStore>>,
        content: Arc<ContentCacheService>,
        popularity: Arc<PopularityTracker>,
        config: CacheConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            content,
            popularity,
            config,
            shutdown,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Attempt to start a warm run and drive it to completion.
    ///
    /// At most one run executes system-wide; a second trigger while one is
    /// running reports `success: false` instead of queueing. The run itself
    /// executes on its own task: a caller that drops this future (a client
    /// disconnecting mid-request) cannot strand the lock or leave a
    /// `running` status behind, because the detached run always reaches its
    /// release path.
    pub async fn trigger(&self) -> TriggerOutcome {
        let Some(store) = self.store.clone() else {
            return TriggerOutcome::StoreDisabled;
        };

        let acquired = match store
            .set_if_absent(keys::WARMING_LOCK, Bytes::from("1"), self.config.lock_ttl)
            .await
        {
            Ok(acquired) => acquired,
            Err(err) => {
                warn!(target: "scorta::warmer", error = %err, "could not reach store to acquire lock");
                return TriggerOutcome::StoreUnavailable;
            }
        };
        if !acquired {
            return TriggerOutcome::AlreadyRunning;
        }

        let runner = WarmRunner {
            store,
            content: self.content.clone(),
            popularity: self.popularity.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        };
        match tokio::spawn(runner.run()).await {
            Ok(outcome) => outcome,
            // Only a panic inside the run lands here; the lock TTL reaps it.
            Err(err) => {
                warn!(target: "scorta::warmer", error = %err, "warm run task died");
                TriggerOutcome::Failed
            }
        }
    }

    /// Current run snapshot; safe to call anytime, including mid-run.
    pub async fn status(&self) -> WarmingRun {
        let Some(store) = self.store.as_ref() else {
            return WarmingRun::idle();
        };
        match store.get(keys::WARMING_STATUS).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!(target: "scorta::warmer", error = %err, "undecodable warming status");
                WarmingRun::idle()
            }),
            Ok(None) => WarmingRun::idle(),
            Err(err) => {
                warn!(target: "scorta::warmer", error = %err, "status read failed");
                WarmingRun::idle()
            }
        }
    }
}

/// One warm run's worth of owned state, detached from the triggering caller.
struct WarmRunner {
    store: Arc<dyn CacheStore>,
    content: Arc<ContentCacheService>,
    popularity: Arc<PopularityTracker>,
    config: CacheConfig,
    shutdown: watch::Receiver<bool>,
}

impl WarmRunner {
    async fn run(self) -> TriggerOutcome {
        let started = tokio::time::Instant::now();
        let mut run = WarmingRun::started(OffsetDateTime::now_utc());
        self.persist_status(&run).await;
        info!(target: "scorta::warmer", "warm run started");

        for category in Category::ALL {
            if *self.shutdown.borrow() {
                run.last_error = Some("run cancelled by shutdown".to_string());
                warn!(target: "scorta::warmer", "warm run cancelled between categories");
                break;
            }

            match self.warm_category(category).await {
                Ok(warmed) => {
                    run.items_warmed += warmed;
                    run.categories_processed += 1;
                    info!(
                        target: "scorta::warmer",
                        %category,
                        warmed,
                        "category warmed"
                    );
                }
                Err(err) => {
                    run.failed_categories.push(category.to_string());
                    run.last_error = Some(err.to_string());
                    warn!(
                        target: "scorta::warmer",
                        %category,
                        error = %err,
                        "category failed, continuing with the rest"
                    );
                }
            }
            self.persist_status(&run).await;
        }

        // Always leave `idle` behind and release the lock, whatever happened
        // above; the lock TTL only covers a crash.
        run.status = WarmingStatus::Idle;
        self.persist_status(&run).await;
        if let Err(err) = self.store.delete(keys::WARMING_LOCK).await {
            warn!(
                target: "scorta::warmer",
                error = %err,
                "failed to release warming lock, TTL will reap it"
            );
        }

        histogram!("scorta_warm_run_ms").record(started.elapsed().as_millis() as f64);
        counter!("scorta_warmed_items_total").increment(u64::from(run.items_warmed));

        let message = format!(
            "warmed {} items across {} categories ({} failed)",
            run.items_warmed,
            run.categories_processed,
            run.failed_categories.len()
        );
        info!(target: "scorta::warmer", summary = %message, "warm run finished");
        TriggerOutcome::Completed { message }
    }

    /// Warm one category: its listing, then its most-viewed items. Returns
    /// the number of entries actually refreshed.
    async fn warm_category(&self, category: Category) -> Result<u32, WarmError> {
        let mut warmed = 0;

        if self
            .content
            .refresh_category(category, self.config.warm_refresh)
            .await?
            == RefreshOutcome::Warmed
        {
            warmed += 1;
        }

        let ranked = self
            .popularity
            .get_popular(category, self.config.warm_top_n)
            .await?;

        // Cold start: with no view data yet, warm the head of the listing
        // instead so a fresh deployment still gets a primed cache.
        let slugs: Vec<String> = if ranked.is_empty() {
            let listing = self.content.get_content_by_category(category).await?;
            listing
                .value
                .into_iter()
                .take(self.config.warm_top_n)
                .map(|item| item.slug)
                .collect()
        } else {
            ranked.into_iter().map(|entry| entry.slug).collect()
        };

        for slug in slugs {
            match self
                .content
                .refresh_item(category, &slug, self.config.warm_refresh)
                .await?
            {
                RefreshOutcome::Warmed => warmed += 1,
                RefreshOutcome::Fresh => {}
                RefreshOutcome::Missing => {
                    // Counter outlived the item; nothing to warm.
                    warn!(
                        target: "scorta::warmer",
                        %category,
                        slug,
                        "ranked item no longer exists at origin"
                    );
                }
            }
        }

        Ok(warmed)
    }

    async fn persist_status(&self, run: &WarmingRun) {
        let bytes = match serde_json::to_vec(run) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target: "scorta::warmer", error = %err, "status serialization failed");
                return;
            }
        };
        if let Err(err) = self
            .store
            .set(keys::WARMING_STATUS, Bytes::from(bytes), STATUS_TTL)
            .await
        {
            warn!(target: "scorta::warmer", error = %err, "status write failed");
        }
    }
}
