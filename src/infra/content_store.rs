//! Content-directory origin loader.
//!
//! Reads the version-controlled content tree at `{root}/{category}/{slug}.json`,
//! one JSON document per item. A missing file is an absent item, not an
//! error; a malformed or misnamed file is dropped and logged so one bad
//! commit cannot take a category offline.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use crate::application::origin::{OriginError, OriginLoader, SeoBundle};
use crate::domain::content::{ContentItem, retain_valid};
use crate::domain::types::Category;

#[derive(Clone)]
pub struct ContentDirOrigin {
    root: PathBuf,
}

impl ContentDirOrigin {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.as_str())
    }

    fn item_path(&self, category: Category, slug: &str) -> PathBuf {
        self.category_dir(category).join(format!("{slug}.json"))
    }

    fn parse(category: Category, bytes: &[u8], path: &std::path::Path) -> Option<ContentItem> {
        let item: ContentItem = match serde_json::from_slice(bytes) {
            Ok(item) => item,
            Err(err) => {
                warn!(
                    target: "scorta::origin",
                    path = %path.display(),
                    error = %err,
                    "dropping undecodable content file"
                );
                return None;
            }
        };
        if item.category != category {
            warn!(
                target: "scorta::origin",
                path = %path.display(),
                declared = %item.category,
                expected = %category,
                "dropping file whose category does not match its directory"
            );
            return None;
        }
        Some(item)
    }
}

#[async_trait]
impl OriginLoader for ContentDirOrigin {
    async fn load_category_metadata(
        &self,
        category: Category,
    ) -> Result<Vec<ContentItem>, OriginError> {
        let dir = self.category_dir(category);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // An absent category directory is an empty category.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(OriginError::unavailable(err)),
        };

        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(OriginError::unavailable)?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(
                        target: "scorta::origin",
                        path = %path.display(),
                        error = %err,
                        "dropping unreadable content file"
                    );
                    continue;
                }
            };
            if let Some(item) = Self::parse(category, &bytes, &path) {
                items.push(item.metadata());
            }
        }

        items.sort_by(|a, b| b.date_added.cmp(&a.date_added).then_with(|| a.slug.cmp(&b.slug)));
        Ok(retain_valid(items, "content-dir"))
    }

    async fn load_full_content(
        &self,
        category: Category,
        slug: &str,
    ) -> Result<Option<ContentItem>, OriginError> {
        let path = self.item_path(category, slug);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(OriginError::unavailable(err)),
        };
        match Self::parse(category, &bytes, &path) {
            Some(item) if item.validate().is_ok() => Ok(Some(item)),
            Some(item) => {
                warn!(
                    target: "scorta::origin",
                    path = %path.display(),
                    slug = item.slug,
                    "dropping invalid content file"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn load_seo_bundle(&self) -> Result<SeoBundle, OriginError> {
        let mut bundle = SeoBundle::new();
        for category in Category::ALL {
            bundle.insert(category, self.load_category_metadata(category).await?);
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write_item(dir: &TempDir, category: Category, slug: &str, date: &str) {
        let cat_dir = dir.path().join(category.as_str());
        std::fs::create_dir_all(&cat_dir).expect("mkdir");
        let body = format!(
            r#"{{
                "category": "{category}",
                "slug": "{slug}",
                "title": "Title of {slug}",
                "author": "tester",
                "dateAdded": "{date}",
                "fullContent": "body of {slug}"
            }}"#
        );
        std::fs::write(cat_dir.join(format!("{slug}.json")), body).expect("write");
    }

    #[tokio::test]
    async fn lists_category_newest_first() {
        let dir = TempDir::new().expect("tempdir");
        write_item(&dir, Category::Agents, "older", "2025-01-10");
        write_item(&dir, Category::Agents, "newer", "2025-03-05");
        let origin = ContentDirOrigin::new(dir.path());

        let items = origin
            .load_category_metadata(Category::Agents)
            .await
            .expect("list");
        let slugs: Vec<_> = items.iter().map(|item| item.slug.as_str()).collect();
        assert_eq!(slugs, ["newer", "older"]);
        // Listings carry metadata only.
        assert!(items.iter().all(|item| item.full_content.is_none()));
    }

    #[tokio::test]
    async fn missing_item_is_none_not_error() {
        let dir = TempDir::new().expect("tempdir");
        let origin = ContentDirOrigin::new(dir.path());
        let item = origin
            .load_full_content(Category::Rules, "nope")
            .await
            .expect("load");
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn full_load_includes_the_body() {
        let dir = TempDir::new().expect("tempdir");
        write_item(&dir, Category::Mcp, "server", "2025-02-02");
        let origin = ContentDirOrigin::new(dir.path());

        let item = origin
            .load_full_content(Category::Mcp, "server")
            .await
            .expect("load")
            .expect("present");
        assert_eq!(item.full_content.as_deref(), Some("body of server"));
    }

    #[tokio::test]
    async fn malformed_file_is_dropped_from_listing() {
        let dir = TempDir::new().expect("tempdir");
        write_item(&dir, Category::Hooks, "good", "2025-04-01");
        let cat_dir = dir.path().join("hooks");
        std::fs::write(cat_dir.join("broken.json"), "{not json").expect("write");
        let origin = ContentDirOrigin::new(dir.path());

        let items = origin
            .load_category_metadata(Category::Hooks)
            .await
            .expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].slug, "good");
    }

    #[tokio::test]
    async fn mismatched_category_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        // Declares `agents` but sits in the `rules` directory.
        let cat_dir = dir.path().join("rules");
        std::fs::create_dir_all(&cat_dir).expect("mkdir");
        std::fs::write(
            cat_dir.join("imposter.json"),
            r#"{"category":"agents","slug":"imposter","title":"T","author":"a","dateAdded":"2025-01-01"}"#,
        )
        .expect("write");
        let origin = ContentDirOrigin::new(dir.path());

        let item = origin
            .load_full_content(Category::Rules, "imposter")
            .await
            .expect("load");
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn seo_bundle_covers_every_category() {
        let dir = TempDir::new().expect("tempdir");
        write_item(&dir, Category::Agents, "a", "2025-01-01");
        write_item(&dir, Category::Commands, "c", "2025-01-02");
        let origin = ContentDirOrigin::new(dir.path());

        let bundle = origin.load_seo_bundle().await.expect("bundle");
        assert_eq!(bundle.len(), Category::ALL.len());
        assert_eq!(bundle[&Category::Agents].len(), 1);
        assert_eq!(bundle[&Category::Commands].len(), 1);
        assert!(bundle[&Category::Hooks].is_empty());
    }
}
