use std::collections::HashSet;
use std::sync::Arc;

use ai_client::TextModel;
use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::infra::jsonish::{parse_jsonish, Jsonish};

/// Upper bound on queries handed to the search stage.
pub const MAX_QUERIES: usize = 20;

/// Always-present queries, in this order.
pub fn base_queries(brand: &str) -> Vec<String> {
    vec![
        format!("{brand} Facebook"),
        format!("{brand} posts"),
        format!("{brand} mentions"),
    ]
}

/// Used whenever query expansion fails.
pub fn fallback_queries(brand: &str) -> Vec<String> {
    let mut queries = base_queries(brand);
    queries.push(format!("{brand} groups"));
    queries.push(format!("{brand} events"));
    queries
}

/// Expands a brand name into search queries with the help of a text model.
pub struct QueryGenerator {
    model: Arc<dyn TextModel>,
}

impl QueryGenerator {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Base queries followed by model suggestions, at most `MAX_QUERIES` in
    /// total. Never fails.
    pub async fn generate(&self, brand: &str) -> Vec<String> {
        match self.expand(brand).await {
            Ok(queries) => {
                info!(brand, count = queries.len(), "Generated search queries");
                queries
            }
            Err(e) => {
                warn!(brand, error = %e, "Query expansion failed, using fallback queries");
                fallback_queries(brand)
            }
        }
    }

    async fn expand(&self, brand: &str) -> Result<Vec<String>> {
        let reply = self.model.complete(&expansion_prompt(brand)).await?;
        let suggested = suggested_queries(&reply)?;

        let mut seen = HashSet::new();
        let queries: Vec<String> = base_queries(brand)
            .into_iter()
            .chain(suggested)
            .filter(|q| seen.insert(q.to_lowercase()))
            .take(MAX_QUERIES)
            .collect();
        Ok(queries)
    }
}

fn expansion_prompt(brand: &str) -> String {
    format!(
        "Generate up to {n} diverse web search queries that would surface Facebook pages, \
         groups, events and posts where people discuss the brand \"{brand}\". \
         Include product names, common misspellings, local-language phrasing and \
         typical complaint or praise wording.\n\
         Return only JSON: {{\"queries\": [\"...\", \"...\"]}}",
        n = MAX_QUERIES - 3,
    )
}

/// Non-empty query strings from a `{"queries": [...]}` object or a bare list.
fn suggested_queries(reply: &str) -> Result<Vec<String>> {
    let items = match parse_jsonish(reply)? {
        Jsonish::Object(mut obj) => match obj.remove("queries") {
            Some(Value::Array(items)) => items,
            _ => return Err(anyhow!("expansion reply has no 'queries' list")),
        },
        Jsonish::List(items) => items,
    };
    let queries: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .take(MAX_QUERIES - 3)
        .collect();
    if queries.is_empty() {
        return Err(anyhow!("expansion reply contained no queries"));
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_has_five_queries() {
        assert_eq!(
            fallback_queries("Acme"),
            vec!["Acme Facebook", "Acme posts", "Acme mentions", "Acme groups", "Acme events"]
        );
    }

    #[test]
    fn suggestions_from_object_or_list() {
        assert_eq!(
            suggested_queries(r#"{"queries": ["Acme pizza", " ", "Acme Kraków"]}"#).unwrap(),
            vec!["Acme pizza", "Acme Kraków"]
        );
        assert_eq!(suggested_queries(r#"["Acme deals"]"#).unwrap(), vec!["Acme deals"]);
        assert!(suggested_queries(r#"{"other": []}"#).is_err());
        assert!(suggested_queries(r#"{"queries": []}"#).is_err());
    }

    #[test]
    fn suggestions_capped() {
        let many: Vec<String> = (0..40).map(|i| format!("\"q{i}\"")).collect();
        let reply = format!("{{\"queries\": [{}]}}", many.join(","));
        assert_eq!(suggested_queries(&reply).unwrap().len(), MAX_QUERIES - 3);
    }
}
