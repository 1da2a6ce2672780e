//! Scorta cache subsystem.
//!
//! Read-through content caching over a pluggable key-value store, plus the
//! popularity counters and the warmer that primes the cache from them.
//!
//! The store is optional everywhere: built with `store: None`, every service
//! degrades to origin-only reads and counter no-ops instead of failing.

pub mod config;
pub mod keys;
mod popularity;
mod service;
mod store;
mod warmer;

pub use config::CacheConfig;
pub use popularity::{PopularEntry, PopularityTracker};
pub use service::{ContentCacheService, LoadSource, Loaded, RefreshOutcome, WriteBack};
pub use store::{CacheStore, MemoryStore, StoreError};
pub use warmer::{CacheWarmer, TriggerOutcome, WarmingRun, WarmingStatus};
