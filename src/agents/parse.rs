//! Helpers for pulling structured data out of model responses.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```").expect("valid fence regex")
});

static WHOLE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```\s*\z")
        .expect("valid fence regex")
});

static SECTION_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<section\s+id\s*=\s*["']([A-Za-z_-]+)["']\s*>(.*?)</section\s*>"#)
        .expect("valid section regex")
});

/// Parse a JSON value from a model response.
///
/// Accepts bare JSON, JSON inside a code fence, or JSON surrounded by prose.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    for cap in CODE_FENCE.captures_iter(trimmed) {
        if let Ok(value) = serde_json::from_str(cap[1].trim()) {
            return Some(value);
        }
    }

    let candidate = json_span(trimmed)?;
    serde_json::from_str(candidate).ok()
}

/// Outermost `{...}` or `[...]` span of `text`.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Remove a code fence wrapping the entire response.
pub fn strip_code_fence(text: &str) -> String {
    match WHOLE_FENCE.captures(text) {
        Some(cap) => cap[1].trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Extract `<section id="...">...</section>` blocks keyed by lowercase id.
///
/// Later blocks with the same id replace earlier ones.
pub fn extract_sections(text: &str) -> BTreeMap<String, String> {
    SECTION_TAG
        .captures_iter(text)
        .map(|cap| (cap[1].to_lowercase(), strip_code_fence(&cap[2])))
        .filter(|(_, body)| !body.is_empty())
        .collect()
}
