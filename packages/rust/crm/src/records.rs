//! CRM payload shapes and the records extracted from them.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use callsync_shared::{normalize_email, scalar_string};

/// Contact properties requested from the batch-read endpoint.
pub const CONTACT_PROPERTIES: [&str; 4] = ["email", "hubspot_owner_id", "firstname", "lastname"];

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One page of `GET /crm/v3/lists/{id}/memberships`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct MembershipPage {
    #[serde(default)]
    pub results: Vec<Membership>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Membership {
    #[serde(rename = "recordId", default)]
    pub record_id: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Paging {
    #[serde(default)]
    pub next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NextPage {
    #[serde(default)]
    pub after: Option<String>,
}

impl MembershipPage {
    /// Record ids on this page, skipping blanks.
    pub fn record_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.results.iter().filter_map(|m| scalar_string(&m.record_id))
    }

    /// Cursor for the following page, if any.
    pub fn next_after(&self) -> Option<String> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .and_then(|n| n.after.clone())
            .filter(|a| !a.is_empty())
    }
}

/// Response of `POST /crm/v3/objects/contacts/batch/read`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct BatchReadPage {
    #[serde(default)]
    pub results: Vec<Value>,
}

// ---------------------------------------------------------------------------
// ContactRecord
// ---------------------------------------------------------------------------

/// A contact as returned by a batch read, with identities normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    /// CRM record id.
    pub id: String,
    /// Lowercased email, if the contact has one.
    pub email: Option<String>,
    /// Raw internal owner reference.
    pub owner_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ContactRecord {
    /// Build a record from a raw batch-read result object.
    ///
    /// Returns `None` for anything that is not an object with an id.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id").and_then(scalar_string)?;
        let empty = Map::new();
        let props = obj
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        Some(Self {
            id,
            email: prop(props, "email").and_then(|e| normalize_email(&e)),
            owner_id: prop(props, "hubspot_owner_id"),
            first_name: prop(props, "firstname"),
            last_name: prop(props, "lastname"),
        })
    }
}

/// Read a property as a trimmed, non-empty string.
fn prop(props: &Map<String, Value>, key: &str) -> Option<String> {
    props.get(key).and_then(scalar_string)
}

// ---------------------------------------------------------------------------
// BatchRead / OwnerDirectory
// ---------------------------------------------------------------------------

/// Outcome of reading contacts in chunks.
#[derive(Debug, Clone, Default)]
pub struct BatchRead {
    /// Contacts from every chunk that succeeded, in request order.
    pub contacts: Vec<ContactRecord>,
    /// One description per chunk that could not be read.
    pub failures: Vec<String>,
}

/// Owner id → owner email, for the owners that resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerDirectory {
    emails: BTreeMap<String, String>,
}

impl OwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, owner_id: impl Into<String>, email: impl Into<String>) {
        self.emails.insert(owner_id.into(), email.into());
    }

    /// Email for an owner reference, tolerant of surrounding whitespace.
    pub fn email_for(&self, owner_id: &str) -> Option<&str> {
        self.emails.get(owner_id.trim()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

impl FromIterator<(String, String)> for OwnerDirectory {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            emails: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contact_from_batch_result() {
        let raw = json!({
            "id": "101",
            "properties": {
                "email": " Lead@Customer.COM ",
                "hubspot_owner_id": "77",
                "firstname": "Ada",
                "lastname": null
            }
        });
        let contact = ContactRecord::from_value(&raw).expect("contact");
        assert_eq!(contact.id, "101");
        assert_eq!(contact.email.as_deref(), Some("lead@customer.com"));
        assert_eq!(contact.owner_id.as_deref(), Some("77"));
        assert_eq!(contact.first_name.as_deref(), Some("Ada"));
        assert_eq!(contact.last_name, None);
    }

    #[test]
    fn contact_with_numeric_ids_and_no_properties() {
        let raw = json!({"id": 5});
        let contact = ContactRecord::from_value(&raw).expect("contact");
        assert_eq!(contact.id, "5");
        assert_eq!(contact.email, None);
        assert_eq!(contact.owner_id, None);

        assert!(ContactRecord::from_value(&json!({"properties": {}})).is_none());
        assert!(ContactRecord::from_value(&json!("101")).is_none());
    }

    #[test]
    fn membership_page_cursor() {
        let page: MembershipPage = serde_json::from_value(json!({
            "results": [{"recordId": "1"}, {"recordId": 2}, {"recordId": ""}, {}],
            "paging": {"next": {"after": "abc"}}
        }))
        .unwrap();
        let ids: Vec<String> = page.record_ids().collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(page.next_after().as_deref(), Some("abc"));

        let last: MembershipPage = serde_json::from_value(json!({"results": []})).unwrap();
        assert_eq!(last.next_after(), None);
    }

    #[test]
    fn owner_directory_lookup_trims() {
        let dir: OwnerDirectory = [("77".to_string(), "rep@vendor.com".to_string())]
            .into_iter()
            .collect();
        assert_eq!(dir.email_for(" 77 "), Some("rep@vendor.com"));
        assert_eq!(dir.email_for("78"), None);
        assert_eq!(dir.len(), 1);
    }
}
