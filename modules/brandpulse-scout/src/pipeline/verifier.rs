use std::sync::Arc;

use ai_client::{truncate_to_char_boundary, TextModel};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

use brandpulse_common::DateRange;

use crate::infra::jsonish::{parse_jsonish, Jsonish};

const MAX_POST_BYTES: usize = 2000;

/// Outcome of one relevance check.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub valid: bool,
    pub reason: String,
}

/// Asks the labeling model whether a post is really about the brand.
///
/// Fail-open: if the model call itself errors, the post is accepted. Only a
/// reply that arrives and cannot be read as a verdict rejects the post.
pub struct RelevanceVerifier {
    model: Arc<dyn TextModel>,
}

impl RelevanceVerifier {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    pub async fn verify(
        &self,
        text: &str,
        date: Option<NaiveDate>,
        brand: &str,
        range: &DateRange,
    ) -> Verdict {
        let prompt = verification_prompt(text, date, brand, range);
        match self.model.complete(&prompt).await {
            Ok(reply) => {
                let verdict = parse_verdict(&reply);
                debug!(brand, valid = verdict.valid, reason = verdict.reason.as_str(), "Relevance verdict");
                verdict
            }
            Err(e) => {
                warn!(brand, model = self.model.model_name(), error = %e, "Relevance check failed, keeping post");
                Verdict {
                    valid: true,
                    reason: format!("verification unavailable: {e}"),
                }
            }
        }
    }
}

fn verification_prompt(text: &str, date: Option<NaiveDate>, brand: &str, range: &DateRange) -> String {
    let date = date.map_or_else(|| "unknown".to_string(), |d| d.to_string());
    format!(
        "You check whether a social media post is genuinely about the brand \"{brand}\".\n\
         The post should discuss the brand itself (its products, services, staff or reputation), \
         not merely share a similar word or name.\n\
         Expected time window: {window}. Post date: {date}.\n\n\
         Post:\n\"\"\"\n{post}\n\"\"\"\n\n\
         Answer with a single JSON object and nothing else:\n\
         {{\"valid\": true or false, \"reason\": \"one short sentence\"}}",
        window = range.describe(),
        post = truncate_to_char_boundary(text, MAX_POST_BYTES),
    )
}

/// Anything other than an object with a truthy `valid` field rejects.
fn parse_verdict(reply: &str) -> Verdict {
    let obj = match parse_jsonish(reply) {
        Ok(Jsonish::Object(obj)) => obj,
        Ok(Jsonish::List(_)) => {
            return Verdict {
                valid: false,
                reason: "verifier replied with a list, expected an object".to_string(),
            }
        }
        Err(e) => {
            return Verdict {
                valid: false,
                reason: format!("unreadable verifier reply: {e}"),
            }
        }
    };

    let valid = match obj.get("valid") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        _ => false,
    };
    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("no reason given")
        .to_string();
    Verdict { valid, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_from_fenced_object() {
        let v = parse_verdict("```json\n{\"valid\": true, \"reason\": \"mentions Acme pizza\"}\n```");
        assert!(v.valid);
        assert_eq!(v.reason, "mentions Acme pizza");
    }

    #[test]
    fn verdict_accepts_string_booleans() {
        assert!(parse_verdict(r#"{"valid": "yes"}"#).valid);
        assert!(!parse_verdict(r#"{"valid": "no"}"#).valid);
    }

    #[test]
    fn verdict_with_list_valued_keys_is_kept() {
        let v = parse_verdict(
            r#"Verdict: {"valid": true, "reason": "reviews the menu", "items": ["burger", "fries"]}"#,
        );
        assert!(v.valid);
        assert_eq!(v.reason, "reviews the menu");
    }

    #[test]
    fn non_object_replies_reject() {
        assert!(!parse_verdict("[true]").valid);
        assert!(!parse_verdict("I think so").valid);
        assert!(!parse_verdict(r#"{"reason": "missing flag"}"#).valid);
    }

    #[test]
    fn prompt_carries_context() {
        let range = DateRange::parse("2025-01-01", "2025-01-31").unwrap();
        let prompt = verification_prompt("Pizza was cold", NaiveDate::from_ymd_opt(2025, 1, 5), "Acme", &range);
        assert!(prompt.contains("\"Acme\""));
        assert!(prompt.contains("2025-01-01 to 2025-01-31"));
        assert!(prompt.contains("2025-01-05"));
        assert!(prompt.contains("Pizza was cold"));
    }
}
