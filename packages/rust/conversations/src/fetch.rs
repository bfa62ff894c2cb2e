//! Conversation API access: meeting listings and transcript payloads.

use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use callsync_http::{ApiClient, ApiRequest, StatusCode};
use callsync_shared::{CallsyncError, Result};

use crate::meeting::{MeetingRecord, is_truthy};

/// Query date format for `from_date` / `to_date`.
const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Spelling of the organizer filter on the meetings endpoint.
///
/// Servers disagree on which one they honour, so each is tried in order until
/// one returns meetings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamConvention {
    SnakeCase,
    CamelCase,
}

impl ParamConvention {
    pub const ALL: [Self; 2] = [Self::SnakeCase, Self::CamelCase];

    pub fn organizer_param(self) -> &'static str {
        match self {
            Self::SnakeCase => "organizer_email",
            Self::CamelCase => "organizerEmail",
        }
    }
}

/// Where a transcript payload may be found, in the order tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSource {
    /// `GET /v1/meetings/{id}/transcript?format=json`
    MeetingTranscript,
    /// `GET /v1/transcriptions/{uuid}`, only when the uuid is known.
    Transcription,
    /// `GET /v1/meetings/{id}/transcriptions`, first entry.
    MeetingTranscriptions,
}

impl TranscriptSource {
    pub const ALL: [Self; 3] = [
        Self::MeetingTranscript,
        Self::Transcription,
        Self::MeetingTranscriptions,
    ];

    fn request(
        self,
        base_url: &str,
        meeting_id: &str,
        transcription_uuid: Option<&str>,
    ) -> Option<ApiRequest> {
        match self {
            Self::MeetingTranscript => Some(
                ApiRequest::get(format!("{base_url}/v1/meetings/{meeting_id}/transcript"))
                    .query("format", "json"),
            ),
            Self::Transcription => transcription_uuid
                .filter(|uuid| !uuid.trim().is_empty())
                .map(|uuid| ApiRequest::get(format!("{base_url}/v1/transcriptions/{uuid}"))),
            Self::MeetingTranscriptions => Some(ApiRequest::get(format!(
                "{base_url}/v1/meetings/{meeting_id}/transcriptions"
            ))),
        }
    }

    /// Pull the payload out of a 200 body. Only the list endpoint can come
    /// back without one.
    fn extract(self, body: Value) -> Option<Value> {
        match self {
            Self::MeetingTranscript | Self::Transcription => Some(body),
            Self::MeetingTranscriptions => {
                let mut items = match body {
                    Value::Object(mut obj) => obj.remove("results")?,
                    other => other,
                };
                let items = items.as_array_mut().filter(|a| !a.is_empty())?;
                Some(items.swap_remove(0))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationClient
// ---------------------------------------------------------------------------

/// Client for the conversation-intelligence API.
#[derive(Debug, Clone)]
pub struct ConversationClient {
    http: ApiClient,
    base_url: String,
    api_key: String,
    page_limit: u32,
    max_pages: u32,
    delay: Duration,
}

impl ConversationClient {
    pub fn new(http: ApiClient, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            page_limit: 100,
            max_pages: 5,
            delay: Duration::ZERO,
        }
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    /// Upper bound on pages read per convention.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Meetings for `organizer` between `from` and `to`.
    ///
    /// Conventions are tried in order and the first one that yields any
    /// meetings wins; results are never merged across conventions. Fails
    /// only when no convention got a usable first page, carrying the last
    /// failure seen.
    #[instrument(skip(self, from, to))]
    pub async fn fetch_meetings(
        &self,
        organizer: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MeetingRecord>> {
        let mut failure = None;
        let mut answered = false;

        for (tried, convention) in ParamConvention::ALL.into_iter().enumerate() {
            match self.fetch_with(convention, organizer, from, to).await {
                Ok(items) if !items.is_empty() => {
                    let meetings: Vec<MeetingRecord> =
                        items.into_iter().filter_map(MeetingRecord::from_value).collect();
                    info!(count = meetings.len(), tried = tried + 1, "fetched meetings");
                    return Ok(meetings);
                }
                Ok(_) => answered = true,
                Err(e) => failure = Some(e),
            }
        }

        match failure {
            Some(e) if !answered => Err(e),
            _ => {
                info!(count = 0, "fetched meetings");
                Ok(Vec::new())
            }
        }
    }

    /// Page through the meetings endpoint with one parameter convention.
    ///
    /// A failed first page is an error. A later failure keeps what earlier
    /// pages collected.
    async fn fetch_with(
        &self,
        convention: ParamConvention,
        organizer: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Value>> {
        let mut items: Vec<Value> = Vec::new();
        let mut next: Option<String> = None;

        for page in 0..self.max_pages.max(1) {
            // A server-provided `next` URL already carries its own query.
            let request = match &next {
                Some(url) => ApiRequest::get(self.absolute(url)),
                None => ApiRequest::get(format!("{}/v1/meetings", self.base_url))
                    .query(convention.organizer_param(), organizer)
                    .query("from_date", from.format(DATE_FORMAT))
                    .query("to_date", to.format(DATE_FORMAT))
                    .query("limit", self.page_limit),
            };

            let body = match self.fetch_page(convention, request).await {
                Ok(body) => body,
                Err(e) if page == 0 => return Err(e),
                Err(e) => {
                    warn!(?convention, page, error = %e, "stopping with pages read so far");
                    break;
                }
            };
            let Some(chunk) = page_items(&body) else {
                if page == 0 {
                    return Err(CallsyncError::parse("meetings page: items are not a list"));
                }
                break;
            };
            items.extend(chunk);

            next = body
                .get("next")
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(str::to_string);
            if next.is_none() {
                break;
            }
            self.pace().await;
        }

        Ok(items)
    }

    /// One meetings page as JSON, or why it could not be read.
    async fn fetch_page(&self, convention: ParamConvention, request: ApiRequest) -> Result<Value> {
        let response = self
            .http
            .send(&self.authed(request))
            .await
            .ok_or_else(|| CallsyncError::Network("meetings: no-response".to_string()))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            debug!(?convention, status = status.as_u16(), "convention rejected");
            return Err(CallsyncError::upstream("meetings", status.as_u16()));
        }
        if !response.is_success() {
            warn!(?convention, status = status.as_u16(), "meeting page failed");
            return Err(CallsyncError::upstream("meetings", status.as_u16()));
        }
        response.json_value()
    }

    /// Transcript payload from the first source that answers 200.
    ///
    /// That answer is final even when it carries no text; the caller skips
    /// it after normalizing.
    #[instrument(skip(self))]
    pub async fn fetch_transcript(
        &self,
        meeting_id: &str,
        transcription_uuid: Option<&str>,
    ) -> Option<Value> {
        for source in TranscriptSource::ALL {
            let Some(request) = source.request(&self.base_url, meeting_id, transcription_uuid)
            else {
                continue;
            };
            let Some(response) = self.http.send(&self.authed(request)).await else {
                continue;
            };
            if response.status() != StatusCode::OK {
                debug!(?source, status = response.status().as_u16(), "no transcript here");
                continue;
            }
            match response.json_value() {
                Ok(body) => {
                    debug!(?source, "transcript source answered");
                    return source.extract(body);
                }
                Err(e) => warn!(?source, error = %e, "transcript body unreadable"),
            }
        }
        None
    }

    /// Metadata for a single meeting.
    #[instrument(skip(self))]
    pub async fn fetch_meeting(&self, meeting_id: &str) -> Result<MeetingRecord> {
        let url = format!("{}/v1/meetings/{meeting_id}", self.base_url);
        let response = self
            .http
            .send(&self.authed(ApiRequest::get(url)))
            .await
            .ok_or_else(|| CallsyncError::Network(format!("meeting {meeting_id} unavailable")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CallsyncError::NotFound(format!("meeting {meeting_id}"))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CallsyncError::upstream(
                format!("meeting {meeting_id} (check the API key and its permissions)"),
                response.status().as_u16(),
            )),
            status if !status.is_success() => Err(CallsyncError::upstream(
                format!("meeting {meeting_id}"),
                status.as_u16(),
            )),
            _ => {
                let body = response.json_value()?;
                MeetingRecord::from_value(body).ok_or_else(|| {
                    CallsyncError::parse(format!("meeting {meeting_id}: expected a JSON object"))
                })
            }
        }
    }

    fn authed(&self, request: ApiRequest) -> ApiRequest {
        request.bearer(self.api_key.as_str())
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    async fn pace(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Meeting items on a page: `results`, else `meetings`. `None` when the
/// chosen field is not a list.
fn page_items(body: &Value) -> Option<Vec<Value>> {
    let chosen = ["results", "meetings"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find(|value| is_truthy(value));

    match chosen {
        None => Some(Vec::new()),
        Some(Value::Array(items)) => Some(items.clone()),
        Some(_) => None,
    }
}
