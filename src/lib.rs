//! Scorta: content delivery cache service.
//!
//! Sits between request handlers and two slow origins (a Postgres catalog or
//! a version-controlled content directory) and provides:
//!
//! - a read-through content cache keyed by `(category, slug)`, category
//!   listing, and SEO bundle
//! - per-item view counters and popularity rankings
//! - a single-flight cache warmer driven by those rankings
//!
//! The remote key-value store is an optimization, never a correctness
//! dependency: every read path degrades to the origin when the store is
//! unreachable or disabled.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
