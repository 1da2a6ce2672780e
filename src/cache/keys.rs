//! Cache key naming.
//!
//! This module is the only producer of physical key strings. The layout is a
//! compatibility contract shared with other consumers of the same store and
//! must remain stable:
//!
//! ```text
//! content:{category}:{slug}
//! content:{category}:list
//! content:seo
//! views:total:{category}:{slug}
//! views:daily:{category}:{slug}:{YYYY-MM-DD}
//! warming:lock
//! warming:status
//! ```

use time::Date;
use time::format_description::FormatItem;
use time::macros::format_description;

use crate::domain::types::Category;

pub const SEO_BUNDLE: &str = "content:seo";
pub const WARMING_LOCK: &str = "warming:lock";
pub const WARMING_STATUS: &str = "warming:status";

const DAY_FORMAT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day]");

pub fn item(category: Category, slug: &str) -> String {
    format!("content:{category}:{slug}")
}

pub fn category_list(category: Category) -> String {
    format!("content:{category}:list")
}

pub fn views_total(category: Category, slug: &str) -> String {
    format!("views:total:{category}:{slug}")
}

pub fn views_daily(category: Category, slug: &str, day: Date) -> String {
    format!("views:daily:{category}:{slug}:{}", format_day(day))
}

/// Scan pattern matching every total-views counter within a category.
pub fn views_total_pattern(category: Category) -> String {
    format!("views:total:{category}:*")
}

/// Recover the slug from a `views:total:{category}:{slug}` key.
pub fn slug_from_views_total<'a>(category: Category, key: &'a str) -> Option<&'a str> {
    let prefix = format!("views:total:{category}:");
    let slug = key.strip_prefix(prefix.as_str())?;
    if slug.is_empty() { None } else { Some(slug) }
}

pub fn format_day(day: Date) -> String {
    // The format description contains no invalid components.
    day.format(DAY_FORMAT)
        .unwrap_or_else(|_| day.to_string())
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(item(Category::Agents, "code-review"), "content:agents:code-review");
        assert_eq!(category_list(Category::Mcp), "content:mcp:list");
        assert_eq!(SEO_BUNDLE, "content:seo");
        assert_eq!(views_total(Category::Rules, "x"), "views:total:rules:x");
        assert_eq!(
            views_daily(Category::Hooks, "pre-commit", date!(2025 - 06 - 09)),
            "views:daily:hooks:pre-commit:2025-06-09"
        );
        assert_eq!(WARMING_LOCK, "warming:lock");
        assert_eq!(WARMING_STATUS, "warming:status");
    }

    #[test]
    fn slug_recovery_from_counter_keys() {
        let key = views_total(Category::Commands, "deploy");
        assert_eq!(slug_from_views_total(Category::Commands, &key), Some("deploy"));
        assert_eq!(slug_from_views_total(Category::Agents, &key), None);
        assert_eq!(slug_from_views_total(Category::Commands, "views:total:commands:"), None);
    }

    #[test]
    fn day_format_pads_components() {
        assert_eq!(format_day(date!(2025 - 01 - 05)), "2025-01-05");
    }
}
