use std::sync::Arc;

use ai_client::{truncate_to_char_boundary, TextModel};
use serde_json::{Map, Value};
use tracing::{info, warn};

use brandpulse_common::{Classification, ClassificationMap, Post, Sentiment, Taxonomy};

use super::filters::is_substantive;
use super::SkipReason;
use crate::infra::jsonish::parse_jsonish;
use crate::traits::ProgressSink;

/// Results go to durable storage every this-many posts.
pub const CHECKPOINT_EVERY: usize = 5;

/// Classification progress ramps linearly across this span.
pub const PROGRESS_START: f64 = 0.5;
pub const PROGRESS_SPAN: f64 = 0.4;

/// Label used when the model gives no category.
pub const UNKNOWN_CATEGORY: &str = "unknown";

const CATEGORY_KEYS: &[&str] = &["category", "kategoria", "aspect", "aspekt"];
const SENTIMENT_KEYS: &[&str] = &["sentiment", "sentyment"];
const MAX_POST_BYTES: usize = 3000;

/// Labels posts with a taxonomy category and a sentiment, one model call per post.
pub struct ClassificationStage {
    model: Arc<dyn TextModel>,
}

impl ClassificationStage {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Classify every post in index order. Posts that are too short, or whose
    /// model call or reply fails, get no entry; the rest of the run carries on.
    pub async fn classify_all(
        &self,
        posts: &[Post],
        taxonomy: &Taxonomy,
        progress: &dyn ProgressSink,
    ) -> ClassificationMap {
        let total = posts.len();
        let mut results = ClassificationMap::new();
        let mut skipped = 0usize;

        for (idx, post) in posts.iter().enumerate() {
            match self.classify_one(post, taxonomy).await {
                Ok(classification) => {
                    results.insert(idx, classification);
                }
                Err(reason) => {
                    skipped += 1;
                    match reason {
                        SkipReason::TooShort => {}
                        _ => warn!(index = idx, url = post.url.as_str(), %reason, "Post not classified"),
                    }
                }
            }

            let done = idx + 1;
            let fraction = PROGRESS_START + done as f64 / total as f64 * PROGRESS_SPAN;
            progress
                .report(&format!("Classifying posts ({done}/{total})"), fraction)
                .await;
            progress
                .checkpoint_classifications(&results, done % CHECKPOINT_EVERY == 0)
                .await;
        }

        info!(total, classified = results.len(), skipped, "Classification finished");
        results
    }

    async fn classify_one(&self, post: &Post, taxonomy: &Taxonomy) -> Result<Classification, SkipReason> {
        if !is_substantive(&post.text) {
            return Err(SkipReason::TooShort);
        }
        let reply = self
            .model
            .complete(&classification_prompt(&post.text, taxonomy))
            .await
            .map_err(|e| SkipReason::OracleFailed(e.to_string()))?;
        let (category, sentiment) = parse_label(&reply, taxonomy)?;
        Ok(Classification {
            category,
            sentiment,
            url: Some(post.url.clone()),
        })
    }
}

fn classification_prompt(text: &str, taxonomy: &Taxonomy) -> String {
    let aspects: String = taxonomy
        .aspects
        .iter()
        .map(|a| format!("- {}: {}\n", a.aspect, a.definition))
        .collect();
    format!(
        "Assign the social media comment below to exactly one aspect from this list \
         and judge its sentiment towards the brand.\n\n\
         Aspects:\n{aspects}\n\
         Comment:\n\"\"\"\n{comment}\n\"\"\"\n\n\
         Return only JSON: {{\"category\": \"<aspect name>\", \"sentiment\": \"positive|negative|neutral\"}}",
        comment = truncate_to_char_boundary(text, MAX_POST_BYTES),
    )
}

/// Read `{category, sentiment}` from a reply. Category names that match a
/// taxonomy aspect case-insensitively are replaced by the canonical name.
pub fn parse_label(reply: &str, taxonomy: &Taxonomy) -> Result<(String, Sentiment), SkipReason> {
    let obj = parse_jsonish(reply)
        .map_err(|e| SkipReason::Unparseable(e.to_string()))?
        .into_object()
        .ok_or_else(|| SkipReason::Unparseable("reply is not an object".to_string()))?;

    let category = first_string(&obj, CATEGORY_KEYS)
        .map(|raw| match taxonomy.find(raw) {
            Some(aspect) => aspect.aspect.clone(),
            None => raw.trim().to_string(),
        })
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
    let sentiment = Sentiment::coerce(first_string(&obj, SENTIMENT_KEYS));

    Ok((category, sentiment))
}

fn first_string<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| obj.get(*key).and_then(Value::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandpulse_common::Aspect;

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(vec![
            Aspect { aspect: "Price".into(), definition: "Cost".into() },
            Aspect { aspect: "Service".into(), definition: "Staff".into() },
        ])
    }

    #[test]
    fn label_with_canonical_category() {
        let (category, sentiment) =
            parse_label(r#"{"category": "price", "sentiment": "NEGATIVE"}"#, &taxonomy()).unwrap();
        assert_eq!(category, "Price");
        assert_eq!(sentiment, Sentiment::Negative);
    }

    #[test]
    fn label_from_single_element_array_with_alias() {
        let (category, sentiment) =
            parse_label(r#"[{"kategoria": "Service", "sentiment": "positive"}]"#, &taxonomy()).unwrap();
        assert_eq!(category, "Service");
        assert_eq!(sentiment, Sentiment::Positive);
    }

    #[test]
    fn unknown_values_get_defaults() {
        let (category, sentiment) = parse_label(r#"{"sentiment": "ecstatic"}"#, &taxonomy()).unwrap();
        assert_eq!(category, UNKNOWN_CATEGORY);
        assert_eq!(sentiment, Sentiment::Neutral);

        let (category, _) = parse_label(r#"{"category": "Parking"}"#, &taxonomy()).unwrap();
        assert_eq!(category, "Parking");
    }

    #[test]
    fn unreadable_reply_is_a_skip() {
        assert!(matches!(
            parse_label("I cannot help with that", &taxonomy()),
            Err(SkipReason::Unparseable(_))
        ));
    }
}
