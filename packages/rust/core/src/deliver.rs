//! Posting delivery records to the destination webhook.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};
use url::Url;

use callsync_conversations::MeetingRecord;
use callsync_http::{ApiClient, ApiRequest};
use callsync_shared::{CallsyncError, DeliveryRecord, Result, RunSummary};

/// Statuses the destination uses to accept a record.
pub const SUCCESS_STATUSES: [u16; 4] = [200, 201, 202, 204];

/// Who a delivered transcript is about.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recipients<'a> {
    pub leaf: Option<&'a str>,
    pub organizer: Option<&'a str>,
}

/// Assemble the record for one meeting and its normalized transcript.
pub fn build_record(
    meeting: &MeetingRecord,
    meeting_id: &str,
    recipients: Recipients<'_>,
    transcript: String,
    source: &str,
) -> DeliveryRecord {
    DeliveryRecord {
        email: recipients.leaf.map(str::to_string),
        organizer_email: recipients.organizer.map(str::to_string),
        meeting_id: meeting_id.to_string(),
        meeting_subject: meeting.subject.clone(),
        meeting_url: meeting.url.clone(),
        start_at: meeting.start_raw.clone(),
        attendees_emails: meeting.attendees.clone(),
        transcript_length: transcript.chars().count(),
        transcript_text: transcript,
        meeting_data: meeting.raw.clone(),
        source: source.to_string(),
        processed_at: Utc::now(),
    }
}

/// Sends delivery records to one webhook.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    http: ApiClient,
    url: Url,
    delay: Duration,
}

impl Dispatcher {
    pub fn new(http: ApiClient, url: Url) -> Self {
        Self {
            http,
            url,
            delay: Duration::ZERO,
        }
    }

    /// Pause applied after every delivery attempt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// POST `record`. Success bumps `transcripts_posted`; anything else is
    /// recorded as an error in `summary`. Never fails.
    #[instrument(skip_all, fields(meeting_id = %record.meeting_id))]
    pub async fn deliver(&self, record: &DeliveryRecord, summary: &mut RunSummary) -> bool {
        let delivered = match self.post(record).await {
            Ok(()) => {
                info!(chars = record.transcript_length, "transcript delivered");
                summary.record_posted();
                true
            }
            Err(outcome) => {
                warn!(%outcome, "delivery rejected");
                summary.record_error(format!(
                    "Webhook failed for meeting {}: {outcome}",
                    record.meeting_id
                ));
                false
            }
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        delivered
    }

    /// `Err` carries the status code, or `no-response`.
    async fn post(&self, record: &DeliveryRecord) -> std::result::Result<(), String> {
        let body = to_body(record).map_err(|e| e.to_string())?;
        let request = ApiRequest::post(self.url.as_str()).json(body);

        match self.http.send(&request).await {
            None => Err("no-response".to_string()),
            Some(response) if SUCCESS_STATUSES.contains(&response.status().as_u16()) => Ok(()),
            Some(response) => Err(response.status().as_u16().to_string()),
        }
    }
}

fn to_body(record: &DeliveryRecord) -> Result<serde_json::Value> {
    serde_json::to_value(record)
        .map_err(|e| CallsyncError::parse(format!("delivery record not serializable: {e}")))
}
