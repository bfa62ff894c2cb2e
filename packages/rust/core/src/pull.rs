//! Single-meeting mode: one known meeting id straight to a webhook or a file.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use callsync_conversations::ConversationClient;
use callsync_http::ApiClient;
use callsync_shared::{CallsyncError, HttpConfig, Result, RunId, RunSummary, normalize_email};
use callsync_transcript::to_plain_text;

use crate::deliver::{Dispatcher, Recipients, build_record};

/// What to pull and where to send it.
#[derive(Debug, Clone)]
pub struct PullTarget {
    pub meeting_id: String,
    pub webhook_url: Option<Url>,
    /// Stamped as the record's `email`.
    pub reference_email: Option<String>,
    /// File that receives the plain transcript.
    pub output: Option<PathBuf>,
}

/// Connection settings for the conversation API.
#[derive(Debug, Clone)]
pub struct PullConfig {
    pub base_url: String,
    pub api_key: String,
    pub http: HttpConfig,
    pub source_tag: String,
}

/// Result of a pull. `summary` counts the delivery, if one was attempted.
#[derive(Debug, Serialize)]
pub struct PullOutcome {
    pub meeting_id: String,
    pub transcript_length: usize,
    pub output: Option<PathBuf>,
    pub summary: RunSummary,
}

impl PullOutcome {
    /// Every requested destination received the transcript.
    pub fn is_complete(&self) -> bool {
        self.summary.errors().is_empty()
    }
}

/// Fetch one meeting's transcript and hand it to the requested destinations.
///
/// Fails when no destination is given, the meeting cannot be read, it does
/// not look like a completed call, or no transcript text is available. A
/// rejected delivery is reported in the outcome instead.
pub async fn pull_meeting(config: &PullConfig, target: &PullTarget) -> Result<PullOutcome> {
    let http = ApiClient::new(&config.http)?;
    pull_with(http, config, target).await
}

#[instrument(skip_all, fields(meeting_id = %target.meeting_id))]
pub(crate) async fn pull_with(
    http: ApiClient,
    config: &PullConfig,
    target: &PullTarget,
) -> Result<PullOutcome> {
    if target.webhook_url.is_none() && target.output.is_none() {
        return Err(CallsyncError::validation(
            "nothing to do: give a webhook URL, an output file, or both",
        ));
    }

    let conversations = ConversationClient::new(http.clone(), &config.base_url, &config.api_key);

    let meeting = conversations.fetch_meeting(&target.meeting_id).await?;
    if !meeting.completed {
        return Err(CallsyncError::validation(format!(
            "meeting {} has no completed recording or transcript",
            target.meeting_id
        )));
    }

    let payload = conversations
        .fetch_transcript(&target.meeting_id, meeting.transcription_uuid.as_deref())
        .await
        .ok_or_else(|| CallsyncError::NotFound(format!("transcript for meeting {}", target.meeting_id)))?;
    let text = to_plain_text(&payload);
    if text.is_empty() {
        return Err(CallsyncError::NotFound(format!(
            "transcript text for meeting {}",
            target.meeting_id
        )));
    }
    info!(chars = text.chars().count(), "transcript extracted");

    let mut summary = RunSummary::new(RunId::new());
    let reference = target.reference_email.as_deref().and_then(normalize_email);
    let record = build_record(
        &meeting,
        &target.meeting_id,
        Recipients {
            leaf: reference.as_deref(),
            organizer: meeting.organizer.as_deref(),
        },
        text,
        &config.source_tag,
    );

    if let Some(url) = &target.webhook_url {
        Dispatcher::new(http, url.clone())
            .deliver(&record, &mut summary)
            .await;
    }

    if let Some(path) = &target.output {
        match std::fs::write(path, &record.transcript_text) {
            Ok(()) => info!(path = %path.display(), "transcript written"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not write transcript");
                summary.record_error(CallsyncError::io(path, e).to_string());
            }
        }
    }

    Ok(PullOutcome {
        meeting_id: target.meeting_id.clone(),
        transcript_length: record.transcript_length,
        output: target.output.clone(),
        summary,
    })
}
