/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Extract the body of the first fenced code block, if the response has one.
///
/// Text before the opening fence and after the closing fence is dropped. A
/// fence with no closing marker is left alone. Responses without any fence
/// come back trimmed.
pub fn strip_code_blocks(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[open + 3..];
    // Skip the language tag ("json", "JSON", ...) up to the end of the line.
    let body_start = after_fence
        .find('\n')
        .filter(|&nl| after_fence[..nl].chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|nl| nl + 1)
        .unwrap_or(0);
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_char_boundary() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn test_truncate_within_bounds() {
        let text = "Hello";
        assert_eq!(truncate_to_char_boundary(text, 100), "Hello");
    }

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }

    #[test]
    fn test_strip_code_blocks_with_surrounding_prose() {
        let reply = "Here you go:\n```json\n[{\"a\": 1}]\n```\nHope this helps.";
        assert_eq!(strip_code_blocks(reply), "[{\"a\": 1}]");
    }

    #[test]
    fn test_unclosed_fence_is_left_alone() {
        assert_eq!(strip_code_blocks("```json\n{\"a\": 1}"), "```json\n{\"a\": 1}");
    }
}
