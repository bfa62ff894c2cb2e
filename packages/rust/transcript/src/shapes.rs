//! Matchers for the transcript payload shapes seen in the wild.
//!
//! Each matcher inspects one shape and returns `None` when the payload is not
//! that shape (or yields nothing), letting the next matcher try.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::render;

/// Keys that may hold the whole transcript as a single string.
const TEXT_KEYS: &[&str] = &["content", "text", "transcript", "body"];

/// Lists of `{speaker|speaker_label, text}` entries, scanned in this order.
const LINE_LISTS: &[&str] = &["paragraphs", "segments"];

/// `{"content": "..."}` and friends.
pub(crate) fn direct_text(value: &Value, _depth: usize) -> Option<String> {
    let obj = value.as_object()?;
    TEXT_KEYS
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// A `transcript` list of turns, optionally named through `speakers`.
pub(crate) fn speaker_turns(value: &Value, _depth: usize) -> Option<String> {
    let obj = value.as_object()?;
    let turns = obj.get("transcript")?.as_array()?;
    let speakers = speaker_names(obj);

    let lines: Vec<String> = turns
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|turn| {
            let text = ["transcript", "text"]
                .iter()
                .filter_map(|key| turn.get(*key).and_then(Value::as_str))
                .find(|t| !t.is_empty())?
                .trim();
            if text.is_empty() {
                return None;
            }
            let name = turn
                .get("speaker_id")
                .and_then(id_key)
                .and_then(|id| speakers.get(&id));
            Some(prefixed(name.map(String::as_str), text))
        })
        .collect();

    join_lines(lines)
}

/// `paragraphs` then `segments`, concatenated.
pub(crate) fn labelled_lines(value: &Value, _depth: usize) -> Option<String> {
    let obj = value.as_object()?;

    let lines: Vec<String> = LINE_LISTS
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_object)
        .filter_map(|entry| {
            let text = entry.get("text").and_then(Value::as_str)?.trim();
            if text.is_empty() {
                return None;
            }
            let speaker = ["speaker", "speaker_label"]
                .iter()
                .filter_map(|key| entry.get(*key).and_then(Value::as_str))
                .find(|s| !s.is_empty())
                .map(str::trim);
            Some(prefixed(speaker, text))
        })
        .collect();

    join_lines(lines)
}

/// `{"results": [...]}`: render each element.
pub(crate) fn results(value: &Value, depth: usize) -> Option<String> {
    let items = value.as_object()?.get("results")?.as_array()?;
    render_all(items, depth)
}

/// `{"data": ...}` envelope.
pub(crate) fn data_wrapper(value: &Value, depth: usize) -> Option<String> {
    let inner = value.as_object()?.get("data")?;
    Some(render(inner, depth + 1))
}

pub(crate) fn list(value: &Value, depth: usize) -> Option<String> {
    render_all(value.as_array()?, depth)
}

pub(crate) fn string(value: &Value, _depth: usize) -> Option<String> {
    value.as_str().map(|s| s.trim().to_string())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Speaker id → display name. Unnamed speakers become `Speaker <id>`.
fn speaker_names(obj: &Map<String, Value>) -> HashMap<String, String> {
    let Some(speakers) = obj.get("speakers").and_then(Value::as_array) else {
        return HashMap::new();
    };

    speakers
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|speaker| {
            let id = speaker.get("id").and_then(id_key)?;
            let name = ["name", "speaker"]
                .iter()
                .filter_map(|key| speaker.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .find(|n| !n.is_empty())
                .map_or_else(|| format!("Speaker {id}"), str::to_string);
            Some((id, name))
        })
        .collect()
}

/// Speaker ids compare by their text form, so `1` and `"1"` match.
fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn prefixed(speaker: Option<&str>, text: &str) -> String {
    match speaker {
        Some(name) if !name.is_empty() => format!("{name}: {text}"),
        _ => text.to_string(),
    }
}

fn render_all(items: &[Value], depth: usize) -> Option<String> {
    let parts: Vec<String> = items
        .iter()
        .map(|item| render(item, depth + 1))
        .filter(|part| !part.is_empty())
        .collect();
    join_lines(parts)
}

fn join_lines(lines: Vec<String>) -> Option<String> {
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
