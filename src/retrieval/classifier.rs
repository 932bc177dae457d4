use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse topic of a query. Informational; it does not affect ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    #[serde(rename = "di")]
    DependencyInjection,
    Ui,
    Logic,
    Data,
    General,
}

/// Checked in order; the first category with a keyword in the query wins
const KEYWORDS: &[(QueryCategory, &[&str])] = &[
    (
        QueryCategory::DependencyInjection,
        &["dagger", "hilt", "koin", "inject", "component", "module", "provide"],
    ),
    (
        QueryCategory::Ui,
        &["layout", "view", "compose", "xml", "button", "text", "image"],
    ),
    (
        QueryCategory::Logic,
        &["function", "method", "class", "logic", "algorithm", "calculate"],
    ),
    (
        QueryCategory::Data,
        &["database", "room", "api", "network", "retrofit", "data source"],
    ),
];

impl QueryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::DependencyInjection => "di",
            QueryCategory::Ui => "ui",
            QueryCategory::Logic => "logic",
            QueryCategory::Data => "data",
            QueryCategory::General => "general",
        }
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive substring lookup over the category keyword lists
pub fn classify_query(query: &str) -> QueryCategory {
    let query = query.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| query.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(QueryCategory::General)
}
