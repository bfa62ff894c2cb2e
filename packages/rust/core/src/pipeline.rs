//! End-to-end run: CRM list → owners → meetings → transcripts → webhook.

use std::time::Instant;

use chrono::{DateTime, Days, Utc};
use tracing::{debug, info, instrument, warn};

use callsync_conversations::{ConversationClient, MeetingRecord, earliest, eligible_meetings};
use callsync_crm::CrmClient;
use callsync_http::ApiClient;
use callsync_shared::{Result, RunConfig, RunId, RunSummary};
use callsync_transcript::to_plain_text;

use crate::correlate::{correlate, distinct_owner_ids};
use crate::deliver::{Dispatcher, Recipients, build_record};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before an organizer's meetings are fetched.
    fn organizer(&self, email: &str, current: usize, total: usize);
    /// Called after each delivery attempt.
    fn delivered(&self, meeting_id: &str, accepted: bool);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn organizer(&self, _email: &str, _current: usize, _total: usize) {}
    fn delivered(&self, _meeting_id: &str, _accepted: bool) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// One configured run, with its clients built from a single [`ApiClient`].
#[derive(Debug)]
pub struct Pipeline {
    config: RunConfig,
    crm: CrmClient,
    conversations: ConversationClient,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(config: RunConfig) -> Result<Self> {
        let http = ApiClient::new(&config.http)?;
        Ok(Self::with_client(config, http))
    }

    /// Build the pipeline around an existing client.
    pub fn with_client(config: RunConfig, http: ApiClient) -> Self {
        let crm = CrmClient::new(http.clone(), &config.crm_base_url, &config.crm_token)
            .with_page_size(config.crm_page_size)
            .with_batch_size(config.batch_size)
            .with_delay(config.delay);
        let conversations = ConversationClient::new(
            http.clone(),
            &config.conversations_base_url,
            &config.conversations_api_key,
        )
        .with_page_limit(config.page_limit)
        .with_max_pages(config.max_pages)
        .with_delay(config.delay);
        let dispatcher = Dispatcher::new(http, config.webhook_url.clone()).with_delay(config.delay);

        Self {
            config,
            crm,
            conversations,
            dispatcher,
        }
    }

    /// Run to completion. Failures are recorded in the returned summary;
    /// none escape.
    pub async fn run(&self, progress: &dyn ProgressReporter) -> RunSummary {
        self.run_at(Utc::now(), progress).await
    }

    /// [`Pipeline::run`] with an explicit notion of "now".
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run_at(&self, now: DateTime<Utc>, progress: &dyn ProgressReporter) -> RunSummary {
        let started = Instant::now();
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));
        let mut summary = RunSummary::new(run_id);

        info!(list_id = %self.config.list_id, "starting run");
        self.run_stages(now, progress, &mut summary).await;

        info!(
            contacts = summary.contacts_processed(),
            emails = summary.emails_found(),
            meetings = summary.meetings_found(),
            posted = summary.transcripts_posted(),
            errors = summary.errors().len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "run finished"
        );
        progress.done(&summary);
        summary
    }

    async fn run_stages(
        &self,
        now: DateTime<Utc>,
        progress: &dyn ProgressReporter,
        summary: &mut RunSummary,
    ) {
        // --- Phase 1: List membership ---
        progress.phase("Reading list members");
        let ids = match self.crm.list_member_ids(&self.config.list_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "list resolution failed");
                summary.record_error(format!("List resolution failed: {e}"));
                return;
            }
        };
        summary.add_contacts_processed(ids.len());
        if ids.is_empty() {
            return;
        }

        // --- Phase 2: Contacts and owners ---
        progress.phase("Reading contacts");
        let batch = self.crm.batch_read_contacts(&ids).await;
        for failure in batch.failures {
            summary.record_error(failure);
        }

        progress.phase("Resolving owners");
        let owner_ids = distinct_owner_ids(&batch.contacts);
        let owners = self.crm.resolve_owner_emails(&owner_ids).await;

        let correlation = correlate(&batch.contacts, &owners, &self.config.only_emails);
        if !correlation.conflicts().is_empty() {
            warn!(
                conflicts = correlation.conflicts().len(),
                "leaves mapped to more than one organizer, last mapping kept"
            );
        }
        summary.add_emails_found(correlation.leaf_count());
        if correlation.is_empty() {
            return;
        }

        // --- Phase 3: Meetings per organizer ---
        let cutoff = now
            .checked_sub_days(Days::new(u64::from(self.config.lookback_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let from = cutoff.date_naive();
        let to = now.date_naive();

        progress.phase("Matching meetings");
        let total = correlation.organizer_count();
        for (index, (organizer, leaves)) in correlation.groups().enumerate() {
            progress.organizer(organizer, index + 1, total);

            let meetings = match self.conversations.fetch_meetings(organizer, from, to).await {
                Ok(meetings) => meetings,
                Err(e) => {
                    warn!(organizer, error = %e, "meeting fetch failed");
                    summary.record_error(format!(
                        "Meeting fetch failed for organizer {organizer}: {e}"
                    ));
                    continue;
                }
            };
            if meetings.is_empty() {
                debug!(organizer, "no meetings");
                continue;
            }

            for leaf in leaves {
                self.process_leaf(&meetings, organizer, leaf, cutoff, progress, summary)
                    .await;
            }
        }
    }

    /// Select, fetch, normalize, and deliver the transcript for one leaf.
    #[instrument(skip(self, meetings, cutoff, progress, summary))]
    async fn process_leaf(
        &self,
        meetings: &[MeetingRecord],
        organizer: &str,
        leaf: &str,
        cutoff: DateTime<Utc>,
        progress: &dyn ProgressReporter,
        summary: &mut RunSummary,
    ) {
        let eligible = eligible_meetings(meetings, organizer, leaf, cutoff);
        let Some(best) = earliest(&eligible) else {
            debug!("no eligible meeting");
            return;
        };
        let Some(meeting_id) = best.id.as_deref() else {
            warn!("selected meeting has no id, skipping");
            return;
        };

        let Some(payload) = self
            .conversations
            .fetch_transcript(meeting_id, best.transcription_uuid.as_deref())
            .await
        else {
            debug!(meeting_id, "no transcript available");
            return;
        };
        let text = to_plain_text(&payload);
        if text.is_empty() {
            debug!(meeting_id, "transcript normalized to nothing");
            return;
        }

        let record = build_record(
            best,
            meeting_id,
            Recipients {
                leaf: Some(leaf),
                organizer: Some(organizer),
            },
            text,
            &self.config.source_tag,
        );
        let accepted = self.dispatcher.deliver(&record, summary).await;
        progress.delivered(meeting_id, accepted);
        summary.add_meetings_found(eligible.len());
    }
}
