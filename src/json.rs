//! Pulling JSON objects out of free-form model output.

use serde::de::DeserializeOwned;

/// Returns every top-level balanced `{...}` span in `text`, in order.
///
/// Braces inside JSON string literals are ignored. An unterminated span at
/// the end of the input is dropped.
pub fn object_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    spans
}

/// Parses `text` as one `T`, or failing that the first balanced object span
/// that both deserializes and passes `accept`.
pub fn extract_with<T, F>(text: &str, accept: F) -> Option<T>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    if let Ok(value) = serde_json::from_str::<T>(text.trim()) {
        if accept(&value) {
            return Some(value);
        }
    }

    object_spans(text)
        .into_iter()
        .filter_map(|span| serde_json::from_str::<T>(span).ok())
        .find(|value| accept(value))
}

pub fn extract<T: DeserializeOwned>(text: &str) -> Option<T> {
    extract_with(text, |_| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn whole_response_is_json() {
        assert_eq!(extract::<Value>(r#"{"a":1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn object_embedded_in_prose() {
        assert_eq!(
            extract::<Value>(r#"Sure! {"a":1} thanks"#),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn no_json_fails() {
        assert_eq!(extract::<Value>("no json here"), None);
    }

    #[test]
    fn nested_objects_form_one_span() {
        let text = r#"first {"a":{"b":2}} then {"c":3}"#;
        assert_eq!(object_spans(text), vec![r#"{"a":{"b":2}}"#, r#"{"c":3}"#]);
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = r#"```json
{"selector": "a:contains('}')", "n": 1}
```"#;
        let spans = object_spans(text);
        assert_eq!(spans.len(), 1);
        let value: Value = serde_json::from_str(spans[0]).unwrap();
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn first_accepted_candidate_wins() {
        let text = r#"{"kind":"draft"} and then {"kind":"final","n":2}"#;
        let value: Value =
            extract_with(text, |v: &Value| v["kind"] == "final").unwrap();
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn unbalanced_tail_is_dropped() {
        assert!(object_spans(r#"{"a": 1"#).is_empty());
    }
}
