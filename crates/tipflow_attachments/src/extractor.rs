//! G. AttachmentExtractor. Ported from
//! `original_source/processors/attachment_extractor.py:AttachmentExtractor`.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

const MEDIA_URL_PATTERN: &str = "/media/file";
const MAX_STUB_LENGTH: usize = 30;

const STRIP_PREFIXES: &[&str] = &[
    "contactBetweenThe",
    "isThe",
    "hasThe",
    "haveThe",
    "areThe",
    "is",
    "has",
    "have",
    "are",
];

const REMOVE_WORDS: &[&str] = &["fully", "engaged", "and", "the", "been", "into", "place"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub url: String,
    pub field_name: String,
    pub stub: String,
    pub sequence_in_field: u32,
    pub attachment_tip: String,
}

pub struct AttachmentExtractor {
    stub_overrides: HashMap<String, String>,
}

impl AttachmentExtractor {
    pub fn new(stub_overrides: HashMap<String, String>) -> Self {
        Self { stub_overrides }
    }

    /// Walk the top-level keys of `payload` in document order, skipping any
    /// starting with `$`, collecting media URLs enumerated globally from 1.
    pub fn extract(&self, payload: &Value) -> Vec<AttachmentInfo> {
        let mut attachments = Vec::new();
        let Value::Object(map) = payload else {
            return attachments;
        };

        for (field_name, value) in map {
            if field_name.starts_with('$') {
                continue;
            }
            let urls = extract_urls_from_value(value);
            if urls.is_empty() {
                continue;
            }
            let stub = self.stub_for_field(field_name);
            for (i, url) in urls.iter().enumerate() {
                let sequence_in_field = (i + 1) as u32;
                let attachment_tip = extract_tip_from_url(url);
                attachments.push(AttachmentInfo {
                    url: url.clone(),
                    field_name: field_name.clone(),
                    stub: stub.clone(),
                    sequence_in_field,
                    attachment_tip,
                });
            }
        }

        attachments
    }

    pub fn count(&self, payload: &Value) -> usize {
        let Value::Object(map) = payload else { return 0 };
        map.iter()
            .filter(|(k, _)| !k.starts_with('$'))
            .map(|(_, v)| extract_urls_from_value(v).len())
            .sum()
    }

    fn stub_for_field(&self, field_name: &str) -> String {
        if let Some(stub) = self.stub_overrides.get(field_name) {
            return stub.clone();
        }
        generate_stub(field_name)
    }
}

fn extract_urls_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if s.contains(MEDIA_URL_PATTERN) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .filter(|s| s.contains(MEDIA_URL_PATTERN))
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn extract_tip_from_url(url: &str) -> String {
    if let Some(idx) = url.find("tip=") {
        return url[idx + "tip=".len()..].to_string();
    }
    format!("unknown_{}", stable_hash(url) % 10000)
}

fn stable_hash(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn generate_stub(field_name: &str) -> String {
    let mut stub = apply_strip_patterns(field_name);

    for prefix in STRIP_PREFIXES {
        if let Some(rest) = stub.strip_prefix(prefix) {
            if !rest.is_empty() {
                let mut chars = rest.chars();
                let first = chars.next().unwrap().to_lowercase().to_string();
                stub = first + chars.as_str();
                break;
            }
        }
    }

    stub = camel_to_kebab(&stub);

    let parts: Vec<&str> = stub
        .split('-')
        .filter(|p| !REMOVE_WORDS.contains(&p.to_lowercase().as_str()))
        .collect();
    stub = parts.join("-");

    stub = collapse_dashes(&stub).trim_matches('-').to_string();

    truncate_preserving_trailer(&stub)
}

fn apply_strip_patterns(field_name: &str) -> String {
    if let Some(digit) = trailing_digit(field_name, "PT") {
        return format!("{}-t{}", &field_name[..field_name.len() - 3], digit);
    }
    if let Some(stripped) = field_name.strip_suffix("PT") {
        return format!("{stripped}-t2");
    }
    if let Some(_digit) = trailing_digit(field_name, "YT") {
        return field_name[..field_name.len() - 3].to_string();
    }
    if let Some(rest) = field_name.strip_prefix("attachments") {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            return format!("obs{rest}");
        }
        if rest.is_empty() {
            return "attachments".to_string();
        }
    }
    field_name.to_string()
}

/// Matches `"...PT1"` style suffixes: returns the trailing digit if
/// `field_name` ends with `prefix` followed by exactly one ASCII digit.
fn trailing_digit(field_name: &str, prefix: &str) -> Option<char> {
    let chars: Vec<char> = field_name.chars().collect();
    if chars.len() < prefix.len() + 1 {
        return None;
    }
    let digit = *chars.last()?;
    if !digit.is_ascii_digit() {
        return None;
    }
    let before_digit: String = chars[..chars.len() - 1].iter().collect();
    if before_digit.ends_with(prefix) {
        Some(digit)
    } else {
        None
    }
}

fn camel_to_kebab(text: &str) -> String {
    fn pattern_lower_upper() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap())
    }
    fn pattern_upper_run() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap())
    }

    let step1 = pattern_lower_upper().replace_all(text, "$1-$2");
    let step2 = pattern_upper_run().replace_all(&step1, "$1-$2");
    step2.to_lowercase()
}

fn collapse_dashes(s: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"-+").unwrap());
    re.replace_all(s, "-").into_owned()
}

fn truncate_preserving_trailer(stub: &str) -> String {
    if stub.len() <= MAX_STUB_LENGTH {
        return if stub.is_empty() { "attachment".to_string() } else { stub.to_string() };
    }

    static TRAILER_RE: OnceLock<Regex> = OnceLock::new();
    let trailer_re = TRAILER_RE.get_or_init(|| Regex::new(r"-t\d$").unwrap());

    let (body, trailer) = match trailer_re.find(stub) {
        Some(m) => (&stub[..m.start()], &stub[m.start()..]),
        None => (stub, ""),
    };

    let max_len = MAX_STUB_LENGTH.saturating_sub(trailer.len());
    let truncated = if body.len() > max_len {
        let slice = &body[..max_len.min(body.len())];
        match slice.rfind('-') {
            Some(last_dash) if last_dash > max_len / 2 => &slice[..last_dash],
            _ => slice.trim_end_matches('-'),
        }
    } else {
        body
    };

    let result = format!("{truncated}{trailer}");
    if result.is_empty() { "attachment".to_string() } else { result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_simple_attachments_array() {
        let extractor = AttachmentExtractor::new(HashMap::new());
        let payload = json!({
            "attachments": ["https://x/media/file?tip=abc", "https://x/media/file?tip=def"],
        });
        let found = extractor.extract(&payload);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].attachment_tip, "abc");
        assert_eq!(found[0].sequence_in_field, 1);
        assert_eq!(found[1].sequence_in_field, 2);
        assert_eq!(found[0].stub, "attachments");
    }

    #[test]
    fn skips_meta_fields() {
        let extractor = AttachmentExtractor::new(HashMap::new());
        let payload = json!({"$meta": "https://x/media/file?tip=abc"});
        assert!(extractor.extract(&payload).is_empty());
    }

    #[test]
    fn explicit_override_wins_over_autogeneration() {
        let mut overrides = HashMap::new();
        overrides.insert("signature".to_string(), "sig".to_string());
        let extractor = AttachmentExtractor::new(overrides);
        let payload = json!({"signature": "https://x/media/file?tip=abc"});
        let found = extractor.extract(&payload);
        assert_eq!(found[0].stub, "sig");
    }

    #[test]
    fn numbered_observation_field_maps_to_obs() {
        assert_eq!(generate_stub("attachments1"), "obs1");
        assert_eq!(generate_stub("attachments"), "attachments");
    }

    #[test]
    fn trailer_suffix_is_normalised_and_preserved_on_truncation() {
        assert_eq!(
            generate_stub("contactBetweenTheSkidPlateTurntablePT1"),
            "skid-plate-turntable-t1"
        );
    }

    #[test]
    fn is_prefix_handles_boolean_style_field() {
        assert_eq!(generate_stub("isTheKingPinFullyEngagedPT1"), "king-pin-t1");
    }

    #[test]
    fn missing_tip_query_param_falls_back_to_stable_hash() {
        let extractor = AttachmentExtractor::new(HashMap::new());
        let payload = json!({"photo": "https://x/media/file?id=1"});
        let found = extractor.extract(&payload);
        assert!(found[0].attachment_tip.starts_with("unknown_"));
    }
}
