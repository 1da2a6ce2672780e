//! Postgres-backed origin loader.
//!
//! Reads the `content_items` catalog table. Rows that fail domain validation
//! are dropped and logged rather than failing the whole listing; a corrupt
//! row must never take a category offline.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Row, postgres::PgRow};
use tracing::warn;

use crate::application::origin::{OriginError, OriginLoader, SeoBundle};
use crate::domain::content::{ContentItem, retain_valid};
use crate::domain::types::Category;

const METADATA_COLUMNS: &str =
    "category, slug, title, description, tags, author, date_added";

#[derive(Clone)]
pub struct PostgresOrigin {
    pool: PgPool,
}

impl PostgresOrigin {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    fn collect_rows(rows: Vec<PgRow>, source: &str) -> Vec<ContentItem> {
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            match row_to_item(&row, false) {
                Ok(item) => items.push(item),
                Err(reason) => {
                    warn!(target: "scorta::origin", source, reason, "dropping unreadable row");
                }
            }
        }
        retain_valid(items, source)
    }
}

fn row_to_item(row: &PgRow, with_body: bool) -> Result<ContentItem, String> {
    let category: String = row.try_get("category").map_err(|err| err.to_string())?;
    let category: Category = category
        .parse()
        .map_err(|err: crate::domain::error::DomainError| err.to_string())?;
    let full_content = if with_body {
        row.try_get::<Option<String>, _>("full_content")
            .map_err(|err| err.to_string())?
    } else {
        None
    };
    Ok(ContentItem {
        category,
        slug: row.try_get("slug").map_err(|err| err.to_string())?,
        title: row.try_get("title").map_err(|err| err.to_string())?,
        description: row
            .try_get::<Option<String>, _>("description")
            .map_err(|err| err.to_string())?
            .unwrap_or_default(),
        tags: row
            .try_get::<Option<Vec<String>>, _>("tags")
            .map_err(|err| err.to_string())?
            .unwrap_or_default(),
        author: row
            .try_get::<Option<String>, _>("author")
            .map_err(|err| err.to_string())?
            .unwrap_or_default(),
        date_added: row.try_get("date_added").map_err(|err| err.to_string())?,
        full_content,
    })
}

#[async_trait]
impl OriginLoader for PostgresOrigin {
    async fn load_category_metadata(
        &self,
        category: Category,
    ) -> Result<Vec<ContentItem>, OriginError> {
        let sql = format!(
            "SELECT {METADATA_COLUMNS} FROM content_items \
             WHERE category = $1 ORDER BY date_added DESC, slug ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(category.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(OriginError::unavailable)?;
        Ok(Self::collect_rows(rows, "postgres"))
    }

    async fn load_full_content(
        &self,
        category: Category,
        slug: &str,
    ) -> Result<Option<ContentItem>, OriginError> {
        let sql = format!(
            "SELECT {METADATA_COLUMNS}, full_content FROM content_items \
             WHERE category = $1 AND slug = $2"
        );
        let row = sqlx::query(&sql)
            .bind(category.as_str())
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(OriginError::unavailable)?;
        let Some(row) = row else {
            return Ok(None);
        };
        match row_to_item(&row, true) {
            Ok(item) if item.validate().is_ok() => Ok(Some(item)),
            Ok(item) => {
                warn!(
                    target: "scorta::origin",
                    %category,
                    slug = item.slug,
                    "dropping invalid row"
                );
                Ok(None)
            }
            Err(reason) => {
                warn!(target: "scorta::origin", %category, slug, reason, "dropping unreadable row");
                Ok(None)
            }
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
