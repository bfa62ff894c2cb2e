//! Owner-mediated identity correlation: leaf email → organizer email.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::warn;

use callsync_crm::{ContactRecord, OwnerDirectory};

/// A leaf that was mapped to more than one organizer. The later mapping won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub leaf: String,
    pub replaced: String,
    pub kept: String,
}

/// Leaves grouped under the organizer that owns them.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    organizer_by_leaf: BTreeMap<String, String>,
    leaves_by_organizer: BTreeMap<String, Vec<String>>,
    conflicts: Vec<Conflict>,
}

impl Correlation {
    pub fn organizer_for(&self, leaf: &str) -> Option<&str> {
        self.organizer_by_leaf.get(leaf).map(String::as_str)
    }

    /// Number of leaves that resolved to an organizer.
    pub fn leaf_count(&self) -> usize {
        self.organizer_by_leaf.len()
    }

    pub fn organizer_count(&self) -> usize {
        self.leaves_by_organizer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organizer_by_leaf.is_empty()
    }

    /// `(organizer, leaves)` in organizer order; leaves are sorted.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.leaves_by_organizer
            .iter()
            .map(|(organizer, leaves)| (organizer.as_str(), leaves.as_slice()))
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }
}

/// Sorted, distinct owner references across `contacts`.
pub fn distinct_owner_ids(contacts: &[ContactRecord]) -> Vec<String> {
    contacts
        .iter()
        .filter_map(|c| c.owner_id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Map each contact with an email to its owner's email.
///
/// Contacts without an email, or whose owner did not resolve, are dropped.
/// When one leaf appears under several owners the last one wins and the
/// replacement is reported in [`Correlation::conflicts`]. A non-empty
/// `allow_list` (normalized emails) restricts the leaves kept.
pub fn correlate(
    contacts: &[ContactRecord],
    owners: &OwnerDirectory,
    allow_list: &BTreeSet<String>,
) -> Correlation {
    let mut correlation = Correlation::default();

    for contact in contacts {
        let Some(leaf) = contact.email.as_deref() else {
            continue;
        };
        let Some(organizer) = contact.owner_id.as_deref().and_then(|id| owners.email_for(id))
        else {
            continue;
        };

        let previous = correlation
            .organizer_by_leaf
            .insert(leaf.to_string(), organizer.to_string());
        if let Some(previous) = previous.filter(|p| p != organizer) {
            warn!(leaf, replaced = %previous, kept = organizer, "leaf mapped to another organizer");
            correlation.conflicts.push(Conflict {
                leaf: leaf.to_string(),
                replaced: previous,
                kept: organizer.to_string(),
            });
        }
    }

    if !allow_list.is_empty() {
        correlation
            .organizer_by_leaf
            .retain(|leaf, _| allow_list.contains(leaf));
    }

    for (leaf, organizer) in &correlation.organizer_by_leaf {
        correlation
            .leaves_by_organizer
            .entry(organizer.clone())
            .or_default()
            .push(leaf.clone());
    }

    correlation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: &str, email: Option<&str>, owner: Option<&str>) -> ContactRecord {
        ContactRecord {
            id: id.to_string(),
            email: email.map(str::to_string),
            owner_id: owner.map(str::to_string),
            first_name: None,
            last_name: None,
        }
    }

    fn owners() -> OwnerDirectory {
        [
            ("77".to_string(), "rep@vendor.com".to_string()),
            ("88".to_string(), "other@vendor.com".to_string()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn owner_ids_are_sorted_and_distinct() {
        let contacts = vec![
            contact("1", Some("a@x.com"), Some("88")),
            contact("2", Some("b@x.com"), Some(" 77")),
            contact("3", None, Some("77")),
            contact("4", Some("c@x.com"), None),
            contact("5", Some("d@x.com"), Some("")),
        ];
        assert_eq!(distinct_owner_ids(&contacts), ["77", "88"]);
    }

    #[test]
    fn groups_leaves_by_organizer() {
        let contacts = vec![
            contact("1", Some("b@x.com"), Some("77")),
            contact("2", Some("a@x.com"), Some("77")),
            contact("3", Some("c@x.com"), Some("88")),
            contact("4", None, Some("77")),
            contact("5", Some("orphan@x.com"), Some("99")),
            contact("6", Some("nobody@x.com"), None),
        ];
        let correlation = correlate(&contacts, &owners(), &BTreeSet::new());

        assert_eq!(correlation.leaf_count(), 3);
        assert_eq!(correlation.organizer_count(), 2);
        assert_eq!(correlation.organizer_for("a@x.com"), Some("rep@vendor.com"));
        assert_eq!(correlation.organizer_for("orphan@x.com"), None);

        let groups: Vec<_> = correlation.groups().collect();
        assert_eq!(groups[0].0, "other@vendor.com");
        assert_eq!(groups[0].1, ["c@x.com"]);
        assert_eq!(groups[1].0, "rep@vendor.com");
        assert_eq!(groups[1].1, ["a@x.com", "b@x.com"]);
        assert!(correlation.conflicts().is_empty());
    }

    #[test]
    fn last_write_wins_and_is_reported() {
        let contacts = vec![
            contact("1", Some("a@x.com"), Some("77")),
            contact("2", Some("a@x.com"), Some("77")),
            contact("3", Some("a@x.com"), Some("88")),
        ];
        let correlation = correlate(&contacts, &owners(), &BTreeSet::new());

        assert_eq!(correlation.organizer_for("a@x.com"), Some("other@vendor.com"));
        assert_eq!(
            correlation.conflicts(),
            [Conflict {
                leaf: "a@x.com".into(),
                replaced: "rep@vendor.com".into(),
                kept: "other@vendor.com".into(),
            }]
        );
    }

    #[test]
    fn allow_list_restricts_leaves() {
        let contacts = vec![
            contact("1", Some("a@x.com"), Some("77")),
            contact("2", Some("b@x.com"), Some("88")),
        ];
        let allow: BTreeSet<String> = ["b@x.com".to_string()].into_iter().collect();
        let correlation = correlate(&contacts, &owners(), &allow);

        assert_eq!(correlation.leaf_count(), 1);
        let groups: Vec<_> = correlation.groups().collect();
        assert_eq!(groups, [("other@vendor.com", &["b@x.com".to_string()][..])]);
    }
}
