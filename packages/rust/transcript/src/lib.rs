//! Transcript payload normalization.
//!
//! Transcript endpoints answer with several incompatible JSON shapes. This
//! crate reduces any of them to newline-joined plain text by running an ordered
//! chain of shape matchers: the first matcher that produces non-empty text
//! wins. Unknown shapes yield an empty string; nothing here panics or errors.

mod shapes;

use serde_json::Value;
use tracing::debug;

/// Nesting depth beyond which payloads are treated as empty.
pub const MAX_DEPTH: usize = 32;

type Matcher = fn(&Value, usize) -> Option<String>;

/// Shape matchers, most specific first.
const MATCHERS: &[Matcher] = &[
    shapes::direct_text,
    shapes::speaker_turns,
    shapes::labelled_lines,
    shapes::results,
    shapes::data_wrapper,
    shapes::list,
    shapes::string,
];

/// Reduce a transcript payload to plain text.
///
/// Speaker-attributed shapes render as `"<speaker>: <text>"` lines. The
/// result is always trimmed; an empty or unrecognized payload gives `""`.
pub fn to_plain_text(payload: &Value) -> String {
    render(payload, 0)
}

pub(crate) fn render(value: &Value, depth: usize) -> String {
    if depth > MAX_DEPTH {
        debug!(depth, "transcript nesting too deep, ignoring");
        return String::new();
    }

    MATCHERS
        .iter()
        .filter_map(|matcher| matcher(value, depth))
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}
