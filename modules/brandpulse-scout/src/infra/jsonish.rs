// Defensive parsing for model replies that are supposed to be JSON.
//
// Models wrap answers in markdown fences, lead with prose, sprinkle bullet
// lines between array elements, or nest the list under a key. Each layer
// below is tried in order; only when all of them fail is the reply rejected.

use std::sync::LazyLock;

use ai_client::strip_code_blocks;
use regex::Regex;
use serde_json::{Map, Value};

/// Keys under which models like to nest the list we asked for.
const WRAPPER_KEYS: &[&str] = &["categories", "aspects", "aspekty", "items", "results", "data"];

static RE_OBJECT_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*\{[^}]+\}(?:\s*,\s*\{[^}]+\})*\s*\]").expect("valid regex")
});

static RE_ASPECT_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""(?:aspect|aspekt)"\s*:\s*"((?:[^"\\]|\\.)*)"\s*,\s*"(?:definition|definicja)"\s*:\s*"((?:[^"\\]|\\.)*)""#,
    )
    .expect("valid regex")
});

/// The two shapes a structured reply can take.
#[derive(Debug, Clone, PartialEq)]
pub enum Jsonish {
    List(Vec<Value>),
    Object(Map<String, Value>),
}

impl Jsonish {
    /// The reply as a list. An object nesting an array under one of the
    /// wrapper keys yields that array; any other object becomes a
    /// one-element list.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Jsonish::List(items) => items,
            Jsonish::Object(mut obj) => {
                let key = WRAPPER_KEYS
                    .iter()
                    .find(|key| obj.get(**key).is_some_and(Value::is_array));
                match key.and_then(|key| obj.remove(*key)) {
                    Some(Value::Array(items)) => items,
                    _ => vec![Value::Object(obj)],
                }
            }
        }
    }

    /// The reply as one object. A list yields its first element if that is
    /// an object.
    pub fn into_object(self) -> Option<Map<String, Value>> {
        match self {
            Jsonish::Object(obj) => Some(obj),
            Jsonish::List(items) => items.into_iter().next().and_then(|v| match v {
                Value::Object(obj) => Some(obj),
                _ => None,
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("model reply was empty")]
    Empty,
    #[error("no JSON list or object found in model reply: {0}")]
    Exhausted(String),
}

/// Recover a JSON list or object from a free-text model reply.
pub fn parse_jsonish(raw: &str) -> Result<Jsonish, ParseError> {
    let body = strip_code_blocks(raw);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(found) = parse_structured(body) {
        return Ok(found);
    }

    let filtered = strip_markdown_lines(body);
    if let Some(found) = parse_structured(&filtered) {
        return Ok(found);
    }

    for candidate in [body, filtered.as_str()] {
        if let Some(items) = regex_array(candidate) {
            return Ok(Jsonish::List(items));
        }
    }
    for candidate in [body, filtered.as_str()] {
        if let Some(items) = regex_pairs(candidate) {
            return Ok(Jsonish::List(items));
        }
    }

    let preview: String = body.chars().take(120).collect();
    Err(ParseError::Exhausted(preview))
}

/// Strict parse of the whole text, then of each top-level balanced `[..]` or
/// `{..}` span in order until one parses. An unbalanced span ends the search.
fn parse_structured(text: &str) -> Option<Jsonish> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return from_value(value);
    }
    let mut rest = text;
    loop {
        let (pos, open) = rest.char_indices().find(|(_, c)| matches!(c, '[' | '{'))?;
        let span = balanced_span(&rest[pos..], open)?;
        if let Some(found) = serde_json::from_str::<Value>(span).ok().and_then(from_value) {
            return Some(found);
        }
        rest = &rest[pos + span.len()..];
    }
}

fn from_value(value: Value) -> Option<Jsonish> {
    match value {
        Value::Array(items) => Some(Jsonish::List(items)),
        Value::Object(obj) => Some(Jsonish::Object(obj)),
        _ => None,
    }
}

/// The substring from `text[0] == open` to its matching closer, skipping
/// brackets inside string literals.
fn balanced_span(text: &str, open: char) -> Option<&str> {
    let close = if open == '[' { ']' } else { '}' };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_markdown_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let line = line.trim_start();
            !(line.starts_with('*') || line.starts_with('#') || line.starts_with("- "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn regex_array(text: &str) -> Option<Vec<Value>> {
    RE_OBJECT_ARRAY
        .find_iter(text)
        .find_map(|m| serde_json::from_str::<Vec<Value>>(m.as_str()).ok())
        .filter(|items| !items.is_empty())
}

fn regex_pairs(text: &str) -> Option<Vec<Value>> {
    let items: Vec<Value> = RE_ASPECT_PAIR
        .captures_iter(text)
        .map(|caps| {
            serde_json::json!({
                "aspect": unescape(&caps[1]),
                "definition": unescape(&caps[2]),
            })
        })
        .collect();
    (!items.is_empty()).then_some(items)
}

fn unescape(fragment: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{fragment}\"")).unwrap_or_else(|_| fragment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CLEAN: &str = r#"[{"aspect": "Price", "definition": "Cost of products"}, {"aspect": "Service", "definition": "Staff behaviour [in store]"}]"#;

    fn expected() -> Vec<Value> {
        serde_json::from_str(CLEAN).unwrap()
    }

    #[test]
    fn clean_array() {
        assert_eq!(parse_jsonish(CLEAN).unwrap(), Jsonish::List(expected()));
    }

    #[test]
    fn fenced_array() {
        let raw = format!("```json\n{CLEAN}\n```");
        assert_eq!(parse_jsonish(&raw).unwrap(), Jsonish::List(expected()));
    }

    #[test]
    fn array_surrounded_by_prose() {
        let raw = format!("Here are the aspects I found:\n{CLEAN}\nLet me know if you need more.");
        assert_eq!(parse_jsonish(&raw).unwrap(), Jsonish::List(expected()));
    }

    #[test]
    fn wrapped_under_categories_key() {
        let raw = format!(r#"{{"categories": {CLEAN}}}"#);
        assert_eq!(parse_jsonish(&raw).unwrap().into_list(), expected());
    }

    #[test]
    fn polish_wrapper_key() {
        let raw = r#"{"aspekty": [{"aspekt": "Cena", "definicja": "Koszt"}]}"#;
        assert_eq!(
            parse_jsonish(raw).unwrap().into_list(),
            vec![json!({"aspekt": "Cena", "definicja": "Koszt"})]
        );
    }

    #[test]
    fn markdown_lines_between_elements() {
        let raw = "[\n**Aspects:**\n{\"aspect\": \"Price\", \"definition\": \"Cost of products\"},\n* note\n{\"aspect\": \"Service\", \"definition\": \"Staff behaviour [in store]\"}\n]";
        assert_eq!(parse_jsonish(raw).unwrap(), Jsonish::List(expected()));
    }

    #[test]
    fn object_reply_stays_object() {
        let raw = "Sure! {\"category\": \"Price\", \"sentiment\": \"Negative\", \"tags\": [\"x\"]} done";
        let obj = parse_jsonish(raw).unwrap().into_object().unwrap();
        assert_eq!(obj["category"], "Price");
    }

    #[test]
    fn object_with_wrapper_key_is_not_unwrapped() {
        let raw = r#"{"valid": true, "reason": "mentions the shop", "items": ["a", "b"]}"#;
        let found = parse_jsonish(raw).unwrap();
        assert!(matches!(found, Jsonish::Object(_)));
        assert_eq!(found.into_object().unwrap()["valid"], true);
    }

    #[test]
    fn unwrapped_object_without_wrapper_is_one_element_list() {
        let raw = r#"{"aspect": "Price", "definition": "Cost", "note": "x"}"#;
        let items = parse_jsonish(raw).unwrap().into_list();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["aspect"], "Price");
    }

    #[test]
    fn prose_braces_before_array_are_skipped() {
        let raw = format!("Note {{see below}} for context:\n{CLEAN}");
        assert_eq!(parse_jsonish(&raw).unwrap(), Jsonish::List(expected()));
    }

    #[test]
    fn single_element_array_as_object() {
        let obj = parse_jsonish(r#"[{"category": "A", "sentiment": "positive"}]"#)
            .unwrap()
            .into_object()
            .unwrap();
        assert_eq!(obj["sentiment"], "positive");
    }

    #[test]
    fn regex_array_fallback_skips_broken_prefix() {
        let raw = r#"Broken: [{"aspect": "A", "definition": "a"} oops. Real: [{"aspect": "B", "definition": "b"}]"#;
        assert_eq!(
            parse_jsonish(raw).unwrap(),
            Jsonish::List(vec![json!({"aspect": "B", "definition": "b"})])
        );
    }

    #[test]
    fn pair_regex_is_last_resort() {
        let raw = r#"1. "aspect": "Price", "definition": "Cost" 2. "aspekt": "Obsługa", "definicja": "Personel""#;
        assert_eq!(
            parse_jsonish(raw).unwrap(),
            Jsonish::List(vec![
                json!({"aspect": "Price", "definition": "Cost"}),
                json!({"aspect": "Obsługa", "definition": "Personel"}),
            ])
        );
    }

    #[test]
    fn exhausted_and_empty_are_errors() {
        assert!(matches!(parse_jsonish("   "), Err(ParseError::Empty)));
        assert!(matches!(parse_jsonish("no structure here"), Err(ParseError::Exhausted(_))));
        assert!(parse_jsonish("42").is_err());
    }

    #[test]
    fn balanced_span_ignores_brackets_in_strings() {
        let text = r#"[{"a": "]"}] trailing"#;
        assert_eq!(balanced_span(text, '['), Some(r#"[{"a": "]"}]"#));
    }
}
