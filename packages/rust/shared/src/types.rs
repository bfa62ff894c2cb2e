//! Core domain types shared across the callsync pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Trim and lowercase an email-like identity; blank input yields `None`.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Strings and numbers as trimmed text; everything else is absent.
pub fn scalar_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// DeliveryRecord
// ---------------------------------------------------------------------------

/// The JSON body posted to the destination webhook for one transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Leaf identity (or the reference email in single-meeting mode).
    pub email: Option<String>,
    /// Organizer identity the meeting was matched through.
    pub organizer_email: Option<String>,
    /// Meeting identifier as reported upstream.
    pub meeting_id: String,
    pub meeting_subject: Option<String>,
    pub meeting_url: Option<String>,
    /// Raw start timestamp string, unparsed.
    pub start_at: Option<String>,
    pub attendees_emails: Vec<String>,
    /// Normalized plain-text transcript.
    pub transcript_text: String,
    /// Character count of `transcript_text`.
    pub transcript_length: usize,
    /// The meeting record exactly as the conversation API returned it.
    pub meeting_data: serde_json::Value,
    /// Tag identifying the producing pipeline.
    pub source: String,
    pub processed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Counters and error log accumulated over one run.
///
/// Counters only move forward; there is no way to reset them mid-run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    run_id: RunId,
    contacts_processed: usize,
    emails_found: usize,
    meetings_found: usize,
    transcripts_posted: usize,
    errors: Vec<String>,
}

impl RunSummary {
    /// Start an empty summary for the given run.
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            ..Self::default()
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// List members seen.
    pub fn contacts_processed(&self) -> usize {
        self.contacts_processed
    }

    /// Leaf identities that resolved to an organizer.
    pub fn emails_found(&self) -> usize {
        self.emails_found
    }

    /// Eligible meetings across all leaves.
    pub fn meetings_found(&self) -> usize {
        self.meetings_found
    }

    /// Transcripts accepted by the destination.
    pub fn transcripts_posted(&self) -> usize {
        self.transcripts_posted
    }

    /// Error descriptions in the order they occurred.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn add_contacts_processed(&mut self, n: usize) {
        self.contacts_processed += n;
    }

    pub fn add_emails_found(&mut self, n: usize) {
        self.emails_found += n;
    }

    pub fn add_meetings_found(&mut self, n: usize) {
        self.meetings_found += n;
    }

    pub fn record_posted(&mut self) {
        self.transcripts_posted += 1;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}
