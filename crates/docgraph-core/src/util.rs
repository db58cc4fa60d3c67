/// Truncates `text` to at most `max_chars` Unicode scalar values, appending
/// a visible marker when truncation actually happened. Shared by every
/// component that enforces a stable per-item character budget
/// (`CycleContextBuilder`, `ContextResolver`).
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(max_chars).collect();
        truncated.push_str("\n# ... (truncated)");
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_short_text_untouched() {
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn truncates_and_marks_long_text() {
        let result = truncate_chars(&"a".repeat(20), 5);
        assert!(result.starts_with("aaaaa"));
        assert!(result.contains("truncated"));
    }
}
