//! Shared domain enumerations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// The closed set of content categories served by the directory.
///
/// The string form of each variant is part of the cache key contract and of
/// every public URL, so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Agents,
    Mcp,
    Rules,
    Commands,
    Hooks,
}

impl Category {
    /// All categories in warming order.
    pub const ALL: [Category; 5] = [
        Category::Agents,
        Category::Mcp,
        Category::Rules,
        Category::Commands,
        Category::Hooks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Agents => "agents",
            Category::Mcp => "mcp",
            Category::Rules => "rules",
            Category::Commands => "commands",
            Category::Hooks => "hooks",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "agents" => Ok(Category::Agents),
            "mcp" => Ok(Category::Mcp),
            "rules" => Ok(Category::Rules),
            "commands" => Ok(Category::Commands),
            "hooks" => Ok(Category::Hooks),
            other => Err(DomainError::unknown_category(other)),
        }
    }
}
