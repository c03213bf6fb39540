//! Template substitution engine. Ported from
//! `original_source/processors/report_generator.py:ReportGenerator._process_template`.
//!
//! `<if:NAME>...</if:NAME>` nesting is resolved with a depth-tracking scan
//! rather than Python's backreferenced regex (unsupported by `regex`'s
//! non-backtracking engine), finding the same innermost-first blocks.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const MAX_CONDITIONAL_DEPTH: u32 = 10;

fn placeholder_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(\w+)>").unwrap())
}

pub fn render(template: &str, context: &HashMap<String, Value>, unknown_placeholder: &str) -> String {
    let with_conditionals = render_conditionals(template, context, unknown_placeholder, 0);
    let substituted = replace_placeholders(&with_conditionals, context, unknown_placeholder);
    collapse_blank_lines(&substituted)
}

fn render_conditionals(template: &str, context: &HashMap<String, Value>, unknown_placeholder: &str, depth: u32) -> String {
    if depth >= MAX_CONDITIONAL_DEPTH {
        return template.to_string();
    }

    let mut out = String::new();
    let mut rest = template;
    loop {
        match rest.find("<if:") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_marker = &rest[start + "<if:".len()..];
                let Some(gt) = after_marker.find('>') else {
                    out.push_str("<if:");
                    rest = after_marker;
                    continue;
                };
                let name = &after_marker[..gt];
                if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    out.push_str("<if:");
                    rest = after_marker;
                    continue;
                }
                let after_open = &after_marker[gt + 1..];
                match extract_balanced_block(after_open, name) {
                    Some((content, remainder)) => {
                        if should_include(name, context, unknown_placeholder) {
                            out.push_str(&render_conditionals(content, context, unknown_placeholder, depth + 1));
                        }
                        rest = remainder;
                    }
                    None => {
                        out.push_str("<if:");
                        rest = after_marker;
                    }
                }
            }
        }
    }
    out
}

/// Finds the content between a just-consumed `<if:NAME>` and its matching
/// `</if:NAME>`, tracking same-name nesting depth so the returned content is
/// the complete (possibly further-nested) body, not the first close tag hit.
fn extract_balanced_block<'a>(s: &'a str, name: &str) -> Option<(&'a str, &'a str)> {
    let open_tag = format!("<if:{name}>");
    let close_tag = format!("</if:{name}>");
    let mut depth: i32 = 1;
    let mut idx = 0usize;

    loop {
        let next_open = s[idx..].find(&open_tag).map(|p| p + idx);
        let next_close = s[idx..].find(&close_tag).map(|p| p + idx);
        match (next_open, next_close) {
            (_, None) => return None,
            (Some(o), Some(c)) if o < c => {
                depth += 1;
                idx = o + open_tag.len();
            }
            (_, Some(c)) => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[..c], &s[c + close_tag.len()..]));
                }
                idx = c + close_tag.len();
            }
        }
    }
}

fn should_include(name: &str, context: &HashMap<String, Value>, unknown_placeholder: &str) -> bool {
    match context.get(name) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty() && s != unknown_placeholder,
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    }
}

fn replace_placeholders(template: &str, context: &HashMap<String, Value>, unknown_placeholder: &str) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &regex::Captures| {
            let field_name = &caps[1];
            match context.get(field_name) {
                None | Some(Value::Null) => unknown_placeholder.to_string(),
                Some(Value::Bool(b)) => if *b { "Yes" } else { "No" }.to_string(),
                Some(Value::Array(_)) | Some(Value::Object(_)) => {
                    serde_json::to_string_pretty(&context[field_name]).unwrap_or_default()
                }
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
            }
        })
        .into_owned()
}

fn collapse_blank_lines(report: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap());
    re.replace_all(report, "\n\n").into_owned()
}
