//! Response parsing: coerce free-form model output into report fields.
//!
//! Models are asked for strict JSON, but they do not always comply: answers
//! come wrapped in ```json fences, cut off at `max_tokens`, or written as
//! Markdown with headings. Every parser here is best effort and always
//! returns a well-formed value, flagging `degraded` when it had to guess.
//!
//! ## Cleanup order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! sees the raw text; invisible characters go last because they can hide
//! inside fence markers too.

use crate::output::{RuleCheck, RuleStatus, SectionKey, Sections};
use crate::prompts::RULES;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// A parsed value plus whether the parser had to fall back.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> Parsed<T> {
    fn clean(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    fn degraded(value: T) -> Self {
        Self {
            value,
            degraded: true,
        }
    }
}

// ── Cleanup ──────────────────────────────────────────────────────────────

/// Normalise a raw model response before structural parsing.
pub fn clean_response(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
            )
        })
        .collect()
}

/// Parse `text` as JSON, or failing that the outermost `{…}` / `[…]` span in it.
fn extract_json(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Some(v);
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) else {
            continue;
        };
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Some(v);
            }
        }
    }
    None
}

/// Render a JSON value as report text. Strings are taken as-is, arrays
/// become one line per item, anything else is compact JSON.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

// ── Summary ──────────────────────────────────────────────────────────────

/// The summary is displayed as written.
pub fn parse_summary(raw: &str) -> String {
    raw.to_string()
}

// ── Sections ─────────────────────────────────────────────────────────────

/// Split a sections response into the seven fixed keys.
///
/// JSON objects are read key by key. Anything else is split on section
/// markers (headings, bold lines, `Label:` lines). Text that lands under no
/// known section goes to `fallback`, or is dropped when `fallback` is `None`.
pub fn parse_sections(raw: &str, fallback: Option<SectionKey>) -> Parsed<Sections> {
    let cleaned = clean_response(raw);
    if cleaned.is_empty() {
        return Parsed::degraded(Sections::default());
    }

    if let Some(Value::Object(map)) = extract_json(&cleaned) {
        let inner = if map.len() == 1 {
            map.get("sections").and_then(Value::as_object).cloned()
        } else {
            None
        };
        let map = inner.unwrap_or(map);
        return sections_from_json(&map, fallback);
    }

    debug!("Sections response is not JSON, splitting on markers");
    sections_from_markers(&cleaned, fallback)
}

fn sections_from_json(
    map: &serde_json::Map<String, Value>,
    fallback: Option<SectionKey>,
) -> Parsed<Sections> {
    let mut sections = Sections::default();
    let mut seen: Vec<SectionKey> = Vec::new();
    let mut unmatched: Vec<String> = Vec::new();

    for (label, value) in map {
        let text = value_to_text(value);
        match SectionKey::from_label(label) {
            Some(key) => {
                let slot = sections.get_mut(key);
                if slot.is_empty() {
                    *slot = text;
                } else {
                    sections.append(key, &text);
                }
                if !seen.contains(&key) {
                    seen.push(key);
                }
            }
            None if !text.trim().is_empty() => unmatched.push(format!("{label}: {text}")),
            None => {}
        }
    }

    place_unmatched(&mut sections, &unmatched.join("\n"), fallback);

    if seen.len() == SectionKey::ALL.len() && unmatched.is_empty() {
        Parsed::clean(sections)
    } else {
        warn!(
            "Sections JSON had {}/{} known keys",
            seen.len(),
            SectionKey::ALL.len()
        );
        Parsed::degraded(sections)
    }
}

enum Marker<'a> {
    /// Starts a known section; carries any text after the label.
    Known(SectionKey, &'a str),
    /// A heading that names no known section; ends the current one.
    Unknown,
    /// A `Label: text` line naming a known section. Only a marker while the
    /// response has no headings; after one it is ordinary content.
    Label(SectionKey, &'a str),
}

static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").unwrap());

static RE_BOLD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*]\s+)?\*\*(.+?):?\*\*\s*:?\s*$").unwrap());

static RE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:[-*]\s+)?(?:\d+[.)]\s+)?(?:\*\*)?["']?([A-Za-z][A-Za-z _&/-]{1,60}?)["']?(?:\*\*)?\s*:(?:\*\*)?\s*(.*)$"#,
    )
    .unwrap()
});

fn section_marker(line: &str) -> Option<Marker<'_>> {
    if let Some(caps) = RE_HEADING
        .captures(line)
        .or_else(|| RE_BOLD_LINE.captures(line))
    {
        let label = caps.get(1).map_or("", |m| m.as_str());
        return Some(match SectionKey::from_label(label) {
            Some(key) => Marker::Known(key, ""),
            None => Marker::Unknown,
        });
    }
    let caps = RE_LABEL.captures(line)?;
    let key = SectionKey::from_label(caps.get(1)?.as_str())?;
    let rest = caps.get(2).map_or("", |m| m.as_str());
    Some(Marker::Label(key, unquote_json_fragment(rest)))
}

/// Strip the quoting of a `"key": "value",` line from truncated JSON.
fn unquote_json_fragment(rest: &str) -> &str {
    let rest = rest.trim().trim_end_matches(',').trim_end();
    let rest = rest.strip_prefix('"').unwrap_or(rest);
    rest.strip_suffix('"').unwrap_or(rest)
}

fn sections_from_markers(text: &str, fallback: Option<SectionKey>) -> Parsed<Sections> {
    let mut buckets: Vec<(SectionKey, Vec<&str>)> =
        SectionKey::ALL.iter().map(|k| (*k, Vec::new())).collect();
    let mut unmatched: Vec<&str> = Vec::new();
    let mut current: Option<SectionKey> = None;
    let mut matched_any = false;
    let mut saw_heading = false;

    for line in text.lines() {
        let marker = match section_marker(line) {
            Some(Marker::Label(..)) if saw_heading => None,
            Some(Marker::Label(key, rest)) => Some(Marker::Known(key, rest)),
            Some(heading) => {
                saw_heading = true;
                Some(heading)
            }
            None => None,
        };
        match marker {
            Some(Marker::Known(key, rest) | Marker::Label(key, rest)) => {
                current = Some(key);
                matched_any = true;
                if !rest.trim().is_empty() {
                    bucket_for(&mut buckets, key).push(rest);
                }
            }
            Some(Marker::Unknown) => {
                current = None;
                unmatched.push(line);
            }
            None => match current {
                Some(key) => bucket_for(&mut buckets, key).push(line),
                None => unmatched.push(line),
            },
        }
    }

    let mut sections = Sections::default();
    for (key, lines) in &buckets {
        sections.append(*key, &lines.join("\n"));
    }
    place_unmatched(&mut sections, &unmatched.join("\n"), fallback);

    if !matched_any {
        warn!("No section markers found in model response");
    }
    Parsed::degraded(sections)
}

fn bucket_for<'b, 'a>(
    buckets: &'b mut [(SectionKey, Vec<&'a str>)],
    key: SectionKey,
) -> &'b mut Vec<&'a str> {
    let idx = SectionKey::ALL
        .iter()
        .position(|k| *k == key)
        .unwrap_or_default();
    &mut buckets[idx].1
}

fn place_unmatched(sections: &mut Sections, text: &str, fallback: Option<SectionKey>) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match fallback {
        Some(key) => {
            debug!("Placing {} unmatched chars under {}", text.len(), key);
            sections.append(key, text);
        }
        None => debug!("Discarding {} unmatched chars", text.len()),
    }
}

// ── Rule checks ──────────────────────────────────────────────────────────

/// Coerce a rule-check response into exactly six entries in fixed order.
pub fn parse_rule_checks(raw: &str) -> Parsed<Vec<RuleCheck>> {
    let cleaned = clean_response(raw);
    let Some(value) = extract_json(&cleaned) else {
        warn!("Rule-check response is not JSON");
        return Parsed::degraded(RuleCheck::all_unclear(
            "Could not parse model response as JSON",
        ));
    };
    let Some(entries) = rule_entries(&value) else {
        warn!("Rule-check JSON has no list of rules");
        return Parsed::degraded(RuleCheck::all_unclear(
            "Unexpected response structure: no list of rule results",
        ));
    };
    align_rule_checks(&entries)
}

/// Find the list of rule objects wherever the model put it.
fn rule_entries(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(map) => {
            for key in ["rules", "rule_checks", "checks", "results"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    return Some(items.iter().collect());
                }
            }
            if let Some(items) = map.values().find_map(Value::as_array) {
                return Some(items.iter().collect());
            }
            if map.contains_key("status") {
                return Some(vec![value]);
            }
            None
        }
        _ => None,
    }
}

fn align_rule_checks(entries: &[&Value]) -> Parsed<Vec<RuleCheck>> {
    let mut slots: [Option<usize>; RULES.len()] = [None; RULES.len()];
    let mut claimed = vec![false; entries.len()];

    // Entries that name their rule go to that rule; duplicates are dropped.
    for (i, entry) in entries.iter().enumerate() {
        let Some(slot) = entry.get("rule").and_then(Value::as_str).and_then(match_rule) else {
            continue;
        };
        claimed[i] = true;
        if slots[slot].is_none() {
            slots[slot] = Some(i);
        }
    }

    // Everything else fills the remaining slots in order.
    let mut free = (0..entries.len()).filter(|i| !claimed[*i]);
    for slot in slots.iter_mut().filter(|s| s.is_none()) {
        *slot = free.next();
    }

    let mut padded = 0;
    let checks: Vec<RuleCheck> = RULES
        .iter()
        .zip(slots)
        .map(|(rule, slot)| match slot {
            Some(i) => rule_check_from_entry(rule, entries[i]),
            None => {
                padded += 1;
                RuleCheck {
                    rule: (*rule).to_string(),
                    status: RuleStatus::Unclear,
                    evidence: "No result returned by the model for this rule".to_string(),
                    confidence: 0,
                }
            }
        })
        .collect();

    if padded > 0 {
        warn!("Rule-check response covered {}/{} rules", RULES.len() - padded, RULES.len());
        Parsed::degraded(checks)
    } else {
        Parsed::clean(checks)
    }
}

fn normalise_rule_text(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

static RE_RULE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:rule\s*)?#?(\d+)\s*[.):\-]?\s*(.*)$").unwrap());

/// Index of the fixed rule `text` refers to, by wording or by number.
fn match_rule(text: &str) -> Option<usize> {
    let (number, rest) = match RE_RULE_NUMBER.captures(text) {
        Some(caps) => (
            caps[1].parse::<usize>().ok(),
            caps.get(2).map_or("", |m| m.as_str()),
        ),
        None => (None, text),
    };

    let wanted = normalise_rule_text(rest);
    if !wanted.is_empty() {
        let rules: Vec<String> = RULES.iter().map(|r| normalise_rule_text(r)).collect();
        if let Some(i) = rules.iter().position(|r| *r == wanted || wanted.contains(r.as_str())) {
            return Some(i);
        }
        // A fragment counts only when it picks out a single rule.
        if wanted.len() >= 12 {
            let mut hits = rules.iter().enumerate().filter(|(_, r)| r.contains(&wanted));
            if let (Some((i, _)), None) = (hits.next(), hits.next()) {
                return Some(i);
            }
        }
    }

    number.filter(|n| (1..=RULES.len()).contains(n)).map(|n| n - 1)
}

fn rule_check_from_entry(rule: &str, entry: &Value) -> RuleCheck {
    let status = match entry.get("status") {
        Some(Value::String(s)) => RuleStatus::from_model(s),
        Some(Value::Bool(true)) => RuleStatus::Pass,
        Some(Value::Bool(false)) => RuleStatus::Fail,
        _ => RuleStatus::Unclear,
    };
    let evidence = entry.get("evidence").map(value_to_text).unwrap_or_default();
    RuleCheck {
        rule: rule.to_string(),
        status,
        evidence,
        confidence: entry.get("confidence").map_or(0, parse_confidence),
    }
}

/// Confidence as 0–100. Accepts integers, floats, `"85"`, `"85%"`; a
/// fraction strictly between 0 and 1 is read as a probability.
fn parse_confidence(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(mut x) = raw.filter(|x| x.is_finite()) else {
        return 0;
    };
    if x > 0.0 && x < 1.0 {
        x *= 100.0;
    }
    x.round().clamp(0.0, 100.0) as u8
}
