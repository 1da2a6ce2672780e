//! Canonical content records and their validation rules.
//!
//! Every record that crosses the origin boundary is validated here before it
//! is cached or served; a record that fails validation is dropped and logged,
//! never propagated.

use serde::{Deserialize, Serialize};
use time::Date;
use tracing::warn;

use super::error::DomainError;
use super::types::Category;

/// A category-tagged catalog record.
///
/// `(category, slug)` is globally unique. `full_content` is the large body
/// fetched separately from metadata; listing and SEO reads carry metadata
/// only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub category: Category,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author: String,
    pub date_added: Date,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
}

impl ContentItem {
    /// Check the record against the schema invariants.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !is_valid_slug(&self.slug) {
            return Err(DomainError::validation(format!(
                "slug `{}` is not url-safe",
                self.slug
            )));
        }
        if self.title.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "item `{}/{}` has an empty title",
                self.category, self.slug
            )));
        }
        Ok(())
    }

    /// Copy of the record without the large body, for listings and bundles.
    pub fn metadata(&self) -> ContentItem {
        ContentItem {
            full_content: None,
            ..self.clone()
        }
    }
}

/// Slugs are lowercase alphanumeric plus hyphens, non-empty, and do not
/// start or end with a hyphen.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
}

/// Drop records that fail schema validation, logging each one.
///
/// Partial results are preferred over total failure: one malformed record
/// must never take down a whole listing.
pub fn retain_valid(items: Vec<ContentItem>, source: &str) -> Vec<ContentItem> {
    items
        .into_iter()
        .filter(|item| match item.validate() {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    target: "scorta::domain",
                    source,
                    category = %item.category,
                    slug = %item.slug,
                    error = %err,
                    "dropping record that failed validation"
                );
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    fn sample(slug: &str) -> ContentItem {
        ContentItem {
            category: Category::Rules,
            slug: slug.to_string(),
            title: "Sample".to_string(),
            description: "A sample record".to_string(),
            tags: vec!["testing".to_string()],
            author: "scorta".to_string(),
            date_added: date!(2025 - 06 - 01),
            full_content: Some("body".to_string()),
        }
    }

    #[test]
    fn valid_slugs_pass() {
        for slug in ["a", "code-review", "mcp-server-2", "x1"] {
            assert!(is_valid_slug(slug), "{slug} should be valid");
        }
    }

    #[test]
    fn invalid_slugs_fail() {
        for slug in ["", "Upper", "has_underscore", "-leading", "trailing-", "sp ace"] {
            assert!(!is_valid_slug(slug), "{slug} should be invalid");
        }
    }

    #[test]
    fn retain_valid_drops_bad_records() {
        let items = vec![sample("good"), sample("BAD SLUG"), sample("also-good")];
        let kept = retain_valid(items, "test");
        let slugs: Vec<_> = kept.iter().map(|item| item.slug.as_str()).collect();
        assert_eq!(slugs, ["good", "also-good"]);
    }

    #[test]
    fn retain_valid_accepts_borrowed_source_labels() {
        let source = format!("origin-{}", 7);
        let kept = retain_valid(vec![sample("ok")], &source);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn metadata_strips_full_content() {
        let item = sample("full");
        let meta = item.metadata();
        assert!(meta.full_content.is_none());
        assert_eq!(meta.slug, item.slug);
    }

    #[test]
    fn item_serializes_with_camel_case_fields() {
        let json = serde_json::to_value(sample("wire")).expect("serialize");
        assert!(json.get("dateAdded").is_some());
        assert!(json.get("fullContent").is_some());
    }
}
