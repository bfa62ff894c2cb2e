//! Meeting records resolved from loosely typed JSON.
//!
//! The upstream API is inconsistent about field names, so every logical field
//! is read through an ordered list of synonyms. The first synonym holding a
//! usable value wins.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use callsync_shared::{normalize_email, scalar_string};

pub const ID_KEYS: &[&str] = &["uuid", "id", "meetingId"];
pub const ORGANIZER_KEYS: &[&str] = &["organizer_email", "organizerEmail"];
pub const ATTENDEE_KEYS: &[&str] = &["attendees", "participants"];
pub const START_KEYS: &[&str] = &["start_at", "startTime", "start_time", "start"];
pub const SUBJECT_KEYS: &[&str] = &["subject", "title"];
pub const URL_KEYS: &[&str] = &["url", "app_url"];

/// Flags that, when truthy, mark a meeting as a completed call.
pub const COMPLETED_FLAGS: &[&str] = &[
    "transcript_ready",
    "transcription_uuid",
    "audio_ready",
    "video_ready",
];

/// `processing_status` values that mark a completed call.
pub const COMPLETED_STATUSES: &[&str] = &["transcription_available", "completed"];

/// A meeting with its logical fields resolved. `raw` is kept untouched for
/// delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingRecord {
    pub id: Option<String>,
    /// Normalized organizer email.
    pub organizer: Option<String>,
    /// Normalized attendee emails, sorted and distinct.
    pub attendees: Vec<String>,
    /// Start timestamp as sent.
    pub start_raw: Option<String>,
    /// Parsed start, `None` when absent or unparseable.
    pub start: Option<DateTime<Utc>>,
    pub subject: Option<String>,
    pub url: Option<String>,
    pub transcription_uuid: Option<String>,
    /// Whether any completed-call signal is present.
    pub completed: bool,
    pub raw: Value,
}

impl MeetingRecord {
    /// Resolve a meeting from a raw JSON item. Non-objects are rejected.
    pub fn from_value(raw: Value) -> Option<Self> {
        let obj = raw.as_object()?;

        let start_raw = first_string(&raw, START_KEYS);
        let start = start_raw.as_deref().and_then(parse_start);

        let completed = COMPLETED_FLAGS
            .iter()
            .any(|key| obj.get(*key).is_some_and(is_truthy))
            || obj
                .get("processing_status")
                .and_then(Value::as_str)
                .is_some_and(|status| COMPLETED_STATUSES.contains(&status));

        Some(Self {
            id: first_string(&raw, ID_KEYS),
            organizer: first_string(&raw, ORGANIZER_KEYS).and_then(|e| normalize_email(&e)),
            attendees: attendee_emails(&raw),
            start_raw,
            start,
            subject: first_string(&raw, SUBJECT_KEYS),
            url: first_string(&raw, URL_KEYS),
            transcription_uuid: raw.get("transcription_uuid").and_then(scalar_string),
            completed,
            raw,
        })
    }

    /// Whether `email` (already normalized) is among the attendees.
    pub fn has_attendee(&self, email: &str) -> bool {
        self.attendees
            .binary_search_by(|a| a.as_str().cmp(email))
            .is_ok()
    }

    /// Whether `email` organized the meeting or attended it.
    pub fn involves(&self, email: &str) -> bool {
        self.organizer.as_deref() == Some(email) || self.has_attendee(email)
    }
}

/// Parse a start timestamp. Accepts RFC 3339, naive date-times (taken as
/// UTC), and bare dates (midnight UTC).
pub fn parse_start(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M:%S%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// JSON truthiness: `null`, `false`, zero, and empty strings or collections
/// are falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn first_string(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| raw.get(*key).and_then(scalar_string))
}

/// Attendee emails from the first synonym that yields any.
fn attendee_emails(raw: &Value) -> Vec<String> {
    for key in ATTENDEE_KEYS {
        let Some(list) = raw.get(*key).and_then(Value::as_array) else {
            continue;
        };
        let mut emails: Vec<String> = list
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => o.get("email").and_then(Value::as_str),
                _ => None,
            })
            .filter_map(normalize_email)
            .collect();
        if !emails.is_empty() {
            emails.sort();
            emails.dedup();
            return emails;
        }
    }
    Vec::new()
}
