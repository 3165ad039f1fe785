use std::sync::Arc;

use ai_client::{truncate_to_char_boundary, TextModel};
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use brandpulse_common::{Aspect, BrandPulseError, Taxonomy};

use super::filters::is_substantive;
use crate::infra::jsonish::parse_jsonish;

/// Texts sent to the model when deriving a taxonomy.
pub const MAX_SAMPLE_TEXTS: usize = 200;
pub const MAX_TEXT_BYTES: usize = 1000;

/// Derives a job's aspect taxonomy from a sample of collected post texts.
pub struct TaxonomyGenerator {
    model: Arc<dyn TextModel>,
}

impl TaxonomyGenerator {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    pub async fn generate(&self, texts: &[&str], brand: &str) -> Result<Taxonomy> {
        let usable: Vec<&str> = texts.iter().copied().filter(|t| is_substantive(t)).collect();
        if usable.is_empty() {
            return Err(BrandPulseError::Precondition("no comments to analyze".to_string()).into());
        }

        let sample = sample_evenly(&usable, MAX_SAMPLE_TEXTS);
        info!(brand, available = usable.len(), sampled = sample.len(), "Generating taxonomy");

        let reply = self
            .model
            .complete(&taxonomy_prompt(brand, &sample))
            .await
            .context("taxonomy model call failed")?;

        let aspects = aspects_from_reply(&reply)?;
        info!(brand, aspects = aspects.len(), "Taxonomy generated");
        Ok(Taxonomy::new(aspects))
    }
}

/// Up to `max` items spread evenly across `items`, keeping their order.
fn sample_evenly<'a>(items: &[&'a str], max: usize) -> Vec<&'a str> {
    if items.len() <= max {
        return items.to_vec();
    }
    (0..max).map(|i| items[i * items.len() / max]).collect()
}

fn taxonomy_prompt(brand: &str, texts: &[&str]) -> String {
    let numbered: String = texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{}. {}\n", i + 1, truncate_to_char_boundary(text, MAX_TEXT_BYTES)))
        .collect();
    format!(
        "Below are social media comments about the brand \"{brand}\".\n\
         Propose a list of discussion aspects (categories) that together cover what people talk about. \
         Aspects should be mutually exclusive and collectively exhaustive. \
         Give each aspect a one-sentence definition.\n\n\
         Comments:\n{numbered}\n\
         Return only a JSON array: [{{\"aspect\": \"...\", \"definition\": \"...\"}}]"
    )
}

fn aspects_from_reply(reply: &str) -> Result<Vec<Aspect>> {
    let items = parse_jsonish(reply)
        .map_err(|e| BrandPulseError::Parse(e.to_string()))?
        .into_list();

    let total = items.len();
    let aspects: Vec<Aspect> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(_) => serde_json::from_value::<Aspect>(item).ok(),
            _ => None,
        })
        .map(|a| Aspect {
            aspect: a.aspect.trim().to_string(),
            definition: a.definition.trim().to_string(),
        })
        .filter(|a| !a.aspect.is_empty())
        .collect();

    if aspects.len() < total {
        warn!(total, kept = aspects.len(), "Dropped malformed taxonomy entries");
    }
    if aspects.is_empty() {
        return Err(BrandPulseError::Parse("taxonomy reply contained no aspects".to_string()).into());
    }
    Ok(aspects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_spreads_and_caps() {
        let items: Vec<String> = (0..1000).map(|i| format!("text {i}")).collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        let sample = sample_evenly(&refs, MAX_SAMPLE_TEXTS);
        assert_eq!(sample.len(), 200);
        assert_eq!(sample[0], "text 0");
        assert_eq!(sample[1], "text 5");
        assert_eq!(sample_evenly(&refs[..3], 200).len(), 3);
    }

    #[test]
    fn aspects_accept_aliases_and_skip_junk() {
        let reply = r#"```json
[{"aspekt": " Cena ", "definicja": "Koszt"}, {"name": "Service", "description": "Staff"}, "junk", {"definition": "nameless"}]
```"#;
        let aspects = aspects_from_reply(reply).unwrap();
        assert_eq!(aspects.len(), 2);
        assert_eq!(aspects[0].aspect, "Cena");
        assert_eq!(aspects[1].definition, "Staff");
    }

    #[test]
    fn empty_aspect_list_is_an_error() {
        assert!(aspects_from_reply("[]").is_err());
        assert!(aspects_from_reply("nothing useful").is_err());
    }

    #[test]
    fn prompt_truncates_long_texts() {
        let long = "x".repeat(5000);
        let prompt = taxonomy_prompt("Acme", &[long.as_str()]);
        assert!(prompt.len() < 2000);
    }
}
