use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```json|```").unwrap());

/// Strips fenced-code-block markers and parses the remaining text as JSON
/// into `T`. Per §9's "structured output parsing" design note: accept
/// either a fenced block or raw JSON, strip known fences, parse.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let cleaned = FENCE.replace_all(text, "").trim().to_string();
    serde_json::from_str(&cleaned).map_err(|e| format!("{e}\nRaw text:\n{text}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        a: u32,
    }

    #[test]
    fn parses_raw_json() {
        let parsed: Sample = parse_structured(r#"{"a": 1}"#).unwrap();
        assert_eq!(parsed, Sample { a: 1 });
    }

    #[test]
    fn strips_fenced_code_block() {
        let text = "```json\n{\"a\": 2}\n```";
        let parsed: Sample = parse_structured(text).unwrap();
        assert_eq!(parsed, Sample { a: 2 });
    }

    #[test]
    fn reports_error_with_raw_text_on_failure() {
        let result: Result<Sample, String> = parse_structured("not json");
        let err = result.unwrap_err();
        assert!(err.contains("not json"));
    }
}
