//! Cache behavior knobs.
//!
//! TTLs and the warm staleness threshold are operational tuning parameters,
//! not invariants; they come from `scorta.toml` with the defaults below.
//! Listings and the SEO bundle change less often than item detail views, so
//! they carry the longer TTL.

use std::time::Duration;

const DEFAULT_ITEM_TTL_SECONDS: u64 = 60 * 60;
const DEFAULT_LIST_TTL_SECONDS: u64 = 4 * 60 * 60;
const DEFAULT_SEO_TTL_SECONDS: u64 = 4 * 60 * 60;
const DEFAULT_ORIGIN_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 2;
const DEFAULT_WARM_TOP_N: usize = 20;
const DEFAULT_WARM_REFRESH_SECONDS: u64 = 30 * 60;
const DEFAULT_LOCK_TTL_SECONDS: u64 = 10 * 60;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for `content:{category}:{slug}` entries.
    pub item_ttl: Duration,
    /// TTL for `content:{category}:list` entries.
    pub list_ttl: Duration,
    /// TTL for the `content:seo` bundle.
    pub seo_ttl: Duration,
    /// Ceiling applied to every origin call.
    pub origin_timeout: Duration,
    /// Ceiling applied to every store call; a timeout reads as a miss.
    pub store_timeout: Duration,
    /// How many top-ranked slugs the warmer refreshes per category.
    pub warm_top_n: usize,
    /// Entries younger than this are left alone by the warmer.
    pub warm_refresh: Duration,
    /// Safety-net TTL on `warming:lock` so a crashed run cannot wedge the
    /// system in `running`.
    pub lock_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            item_ttl: Duration::from_secs(DEFAULT_ITEM_TTL_SECONDS),
            list_ttl: Duration::from_secs(DEFAULT_LIST_TTL_SECONDS),
            seo_ttl: Duration::from_secs(DEFAULT_SEO_TTL_SECONDS),
            origin_timeout: Duration::from_secs(DEFAULT_ORIGIN_TIMEOUT_SECONDS),
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECONDS),
            warm_top_n: DEFAULT_WARM_TOP_N,
            warm_refresh: Duration::from_secs(DEFAULT_WARM_REFRESH_SECONDS),
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECONDS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            item_ttl: settings.item_ttl,
            list_ttl: settings.list_ttl,
            seo_ttl: settings.seo_ttl,
            origin_timeout: settings.origin_timeout,
            store_timeout: settings.store_timeout,
            warm_top_n: settings.warm_top_n,
            warm_refresh: settings.warm_refresh,
            lock_ttl: settings.lock_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listings_outlive_items_by_default() {
        let config = CacheConfig::default();
        assert!(config.list_ttl > config.item_ttl);
        assert!(config.seo_ttl > config.item_ttl);
    }
}
