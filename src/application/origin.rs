//! Origin loader contract.
//!
//! The origin is the authoritative slow data source behind the cache. Two
//! implementations exist, selected by configuration: the Postgres catalog
//! (`infra::db`) and the version-controlled content directory
//! (`infra::content_store`). Loaders never cache.
//!
//! Absence is not an error: `load_full_content` returns `Ok(None)` for an
//! item that genuinely does not exist. Everything else (timeout, connection
//! failure, malformed payload) is retryable [`OriginError::Unavailable`].
//! Individual records failing schema validation are dropped and logged by
//! the loaders via [`crate::domain::content::retain_valid`].

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::content::ContentItem;
use crate::domain::types::Category;

/// Category → metadata listing, as served to SEO consumers.
pub type SeoBundle = HashMap<Category, Vec<ContentItem>>;

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin unavailable: {message}")]
    Unavailable { message: String },
}

impl OriginError {
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }
}

#[async_trait]
pub trait OriginLoader: Send + Sync {
    /// Metadata for every item in a category, without the large bodies.
    async fn load_category_metadata(
        &self,
        category: Category,
    ) -> Result<Vec<ContentItem>, OriginError>;

    /// One item including its full body, or `None` when absent.
    async fn load_full_content(
        &self,
        category: Category,
        slug: &str,
    ) -> Result<Option<ContentItem>, OriginError>;

    /// Metadata listings for all categories at once.
    async fn load_seo_bundle(&self) -> Result<SeoBundle, OriginError>;
}
