//! CRM access: list membership, contact batch reads, and owner lookups.
//!
//! Every call goes through the shared [`ApiClient`], so transient failures
//! are already retried by the time a response (or `None`) reaches this crate.

mod records;

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use callsync_http::{ApiClient, ApiRequest, StatusCode};
use callsync_shared::{CallsyncError, MAX_BATCH_SIZE, Result, normalize_email, scalar_string};

pub use records::{BatchRead, CONTACT_PROPERTIES, ContactRecord, OwnerDirectory};

use records::{BatchReadPage, MembershipPage};

/// Default page size for list membership paging.
const DEFAULT_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// CrmClient
// ---------------------------------------------------------------------------

/// Client for the CRM endpoints the pipeline consumes.
#[derive(Debug, Clone)]
pub struct CrmClient {
    http: ApiClient,
    base_url: String,
    token: String,
    page_size: u32,
    batch_size: usize,
    delay: Duration,
}

impl CrmClient {
    /// Create a client against `base_url` (no trailing slash) using `token`.
    pub fn new(http: ApiClient, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: MAX_BATCH_SIZE,
            delay: Duration::ZERO,
        }
    }

    /// Page size for membership paging.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Records per batch read, clamped to what the CRM accepts.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Pause applied after each page, chunk, and owner lookup.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Collect the record ids of every member of `list_id`.
    ///
    /// Fails with [`CallsyncError::NotFound`] if the list is missing or
    /// unreachable. A page that is unavailable or
    /// 404s ends paging with the ids gathered so far.
    #[instrument(skip(self))]
    pub async fn list_member_ids(&self, list_id: &str) -> Result<Vec<String>> {
        let list_url = format!("{}/crm/v3/lists/{list_id}", self.base_url);
        let response = self
            .http
            .send(&self.authed(ApiRequest::get(list_url)))
            .await
            .ok_or_else(|| CallsyncError::NotFound(format!("CRM list {list_id} (unavailable)")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CallsyncError::NotFound(format!("CRM list {list_id}")));
        }
        if !response.is_success() {
            return Err(CallsyncError::upstream(
                format!("CRM list {list_id}"),
                response.status().as_u16(),
            ));
        }

        let url = format!("{}/crm/v3/lists/{list_id}/memberships", self.base_url);
        let mut ids: Vec<String> = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut request = self
                .authed(ApiRequest::get(url.as_str()))
                .query("limit", self.page_size);
            if let Some(cursor) = &after {
                request = request.query("after", cursor);
            }

            let Some(response) = self.http.send(&request).await else {
                warn!(collected = ids.len(), "membership page unavailable, stopping");
                break;
            };
            if response.status() == StatusCode::NOT_FOUND {
                warn!(collected = ids.len(), "membership page not found, stopping");
                break;
            }
            if !response.is_success() {
                return Err(CallsyncError::upstream(
                    "list memberships",
                    response.status().as_u16(),
                ));
            }

            let page: MembershipPage = response.json()?;
            ids.extend(page.record_ids());

            after = page.next_after();
            if after.is_none() {
                break;
            }
            self.pace().await;
        }

        info!(count = ids.len(), "collected list member ids");
        Ok(ids)
    }

    /// Read contacts for `ids` in chunks of the configured batch size.
    ///
    /// A chunk that fails is reported in [`BatchRead::failures`]; the
    /// remaining chunks are still read.
    #[instrument(skip_all, fields(ids = ids.len()))]
    pub async fn batch_read_contacts(&self, ids: &[String]) -> BatchRead {
        let mut out = BatchRead::default();
        if ids.is_empty() {
            return out;
        }

        let url = format!("{}/crm/v3/objects/contacts/batch/read", self.base_url);

        for (index, chunk) in ids.chunks(self.batch_size).enumerate() {
            let payload = json!({
                "properties": CONTACT_PROPERTIES,
                "inputs": chunk.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>(),
            });
            let request = self.authed(ApiRequest::post(url.as_str())).json(payload);

            match self.http.send(&request).await {
                None => {
                    warn!(chunk = index, "batch read unavailable");
                    out.failures
                        .push(format!("Batch read chunk {index} failed: no-response"));
                }
                Some(response) if !response.is_success() => {
                    let status = response.status().as_u16();
                    warn!(chunk = index, status, "batch read rejected");
                    out.failures
                        .push(format!("Batch read chunk {index} failed: {status}"));
                }
                Some(response) => match response.json::<BatchReadPage>() {
                    Ok(page) => out
                        .contacts
                        .extend(page.results.iter().filter_map(ContactRecord::from_value)),
                    Err(e) => {
                        warn!(chunk = index, error = %e, "batch read body unreadable");
                        out.failures
                            .push(format!("Batch read chunk {index} failed: {e}"));
                    }
                },
            }

            self.pace().await;
        }

        info!(
            contacts = out.contacts.len(),
            failed_chunks = out.failures.len(),
            "batch-read contacts"
        );
        out
    }

    /// Resolve each distinct owner id to its email.
    ///
    /// Ids are deduplicated first, so each owner is looked up at most once.
    /// Owners that 404, are unavailable, or have no email are left out.
    #[instrument(skip_all, fields(owner_refs = owner_ids.len()))]
    pub async fn resolve_owner_emails(&self, owner_ids: &[String]) -> OwnerDirectory {
        let unique: BTreeSet<&str> = owner_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect();

        let mut directory = OwnerDirectory::new();

        for owner_id in &unique {
            let url = format!("{}/crm/v3/owners/{owner_id}", self.base_url);
            match self.http.send(&self.authed(ApiRequest::get(url))).await {
                None => warn!(owner_id, "owner lookup unavailable"),
                Some(response) if response.status() == StatusCode::NOT_FOUND => {
                    debug!(owner_id, "owner not found");
                }
                Some(response) if !response.is_success() => {
                    warn!(owner_id, status = response.status().as_u16(), "owner lookup rejected");
                }
                Some(response) => match response.json_value() {
                    Ok(data) => {
                        let email = data
                            .get("email")
                            .and_then(serde_json::Value::as_str)
                            .and_then(normalize_email);
                        if let Some(email) = email {
                            let key = data
                                .get("id")
                                .and_then(scalar_string)
                                .unwrap_or_else(|| owner_id.to_string());
                            directory.insert(key, email);
                        } else {
                            debug!(owner_id, "owner has no email");
                        }
                    }
                    Err(e) => warn!(owner_id, error = %e, "owner body unreadable"),
                },
            }
            self.pace().await;
        }

        info!(
            resolved = directory.len(),
            requested = unique.len(),
            "resolved owner emails"
        );
        directory
    }

    fn authed(&self, request: ApiRequest) -> ApiRequest {
        request.bearer(self.token.as_str())
    }

    async fn pace(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callsync_http::RetryPolicy;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> CrmClient {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
        };
        let http = ApiClient::with_policy(policy, Duration::from_secs(5)).unwrap();
        CrmClient::new(http, server.uri(), "crm-token")
    }

    async fn mount_list(server: &MockServer, list_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/crm/v3/lists/{list_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"listId": list_id})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn list_members_follow_cursor() {
        let server = MockServer::start().await;
        mount_list(&server, "9").await;

        Mock::given(method("GET"))
            .and(path("/crm/v3/lists/9/memberships"))
            .and(query_param("after", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"recordId": "3"}]
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/crm/v3/lists/9/memberships"))
            .and(header("authorization", "Bearer crm-token"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"recordId": "1"}, {"recordId": 2}],
                "paging": {"next": {"after": "page-2"}}
            })))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        let ids = client(&server).list_member_ids("9").await.unwrap();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn missing_list_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/crm/v3/lists/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).list_member_ids("404").await.unwrap_err();
        assert!(matches!(err, CallsyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn forbidden_memberships_is_upstream_error() {
        let server = MockServer::start().await;
        mount_list(&server, "7").await;

        Mock::given(method("GET"))
            .and(path("/crm/v3/lists/7/memberships"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server).list_member_ids("7").await.unwrap_err();
        assert!(matches!(err, CallsyncError::Upstream { status: 403, .. }));
    }

    #[tokio::test]
    async fn batch_read_chunks_and_reports_failures() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts/batch/read"))
            .and(body_partial_json(json!({"inputs": [{"id": "1"}, {"id": "2"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"id": "1", "properties": {"email": "A@x.com", "hubspot_owner_id": "77"}},
                    {"id": "2", "properties": {"email": "b@x.com"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts/batch/read"))
            .and(body_partial_json(json!({"inputs": [{"id": "3"}]})))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let ids: Vec<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
        let read = client(&server)
            .with_batch_size(2)
            .batch_read_contacts(&ids)
            .await;

        assert_eq!(read.contacts.len(), 2);
        assert_eq!(read.contacts[0].email.as_deref(), Some("a@x.com"));
        assert_eq!(read.contacts[0].owner_id.as_deref(), Some("77"));
        assert_eq!(read.failures, ["Batch read chunk 1 failed: 400"]);
    }

    #[tokio::test]
    async fn owners_are_looked_up_once_each() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/crm/v3/owners/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "77", "email": " Rep@Vendor.com "
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/crm/v3/owners/78"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/crm/v3/owners/79"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 79})))
            .expect(1)
            .mount(&server)
            .await;

        let refs: Vec<String> = ["77", "78", "77", " 77 ", "79", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let owners = client(&server).resolve_owner_emails(&refs).await;

        assert_eq!(owners.len(), 1);
        assert_eq!(owners.email_for("77"), Some("rep@vendor.com"));
        assert_eq!(owners.email_for("78"), None);
        assert_eq!(owners.email_for("79"), None);
    }
}
