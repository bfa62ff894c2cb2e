//! Narrowing an organizer's meetings to the one that best represents a leaf.

use chrono::{DateTime, Utc};

use crate::meeting::MeetingRecord;

/// Meetings that qualify for `(organizer, leaf)`, in fetch order.
///
/// A meeting qualifies when the organizer ran or attended it, the leaf
/// attended it, it looks like a completed call, and it did not start before
/// `cutoff`. Meetings with no usable start are kept.
pub fn eligible_meetings<'a>(
    meetings: &'a [MeetingRecord],
    organizer: &str,
    leaf: &str,
    cutoff: DateTime<Utc>,
) -> Vec<&'a MeetingRecord> {
    meetings
        .iter()
        .filter(|m| m.involves(organizer))
        .filter(|m| m.has_attendee(leaf))
        .filter(|m| m.completed)
        .filter(|m| m.start.is_none_or(|start| start >= cutoff))
        .collect()
}

/// The earliest-starting candidate. Unparseable starts sort last; ties keep
/// the earlier position.
pub fn earliest<'a>(candidates: &[&'a MeetingRecord]) -> Option<&'a MeetingRecord> {
    candidates
        .iter()
        .copied()
        .min_by_key(|m| (m.start.is_none(), m.start))
}

/// Pick the best meeting for `(organizer, leaf)`, if any qualifies.
pub fn select_best_meeting<'a>(
    meetings: &'a [MeetingRecord],
    organizer: &str,
    leaf: &str,
    cutoff: DateTime<Utc>,
) -> Option<&'a MeetingRecord> {
    earliest(&eligible_meetings(meetings, organizer, leaf, cutoff))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const REP: &str = "rep@vendor.com";
    const LEAD: &str = "lead@customer.com";

    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn call(id: &str, start: Option<&str>) -> MeetingRecord {
        let mut raw = json!({
            "uuid": id,
            "organizer_email": REP,
            "attendees": [{"email": LEAD}],
            "transcript_ready": true
        });
        if let Some(start) = start {
            raw["start_at"] = json!(start);
        }
        MeetingRecord::from_value(raw).unwrap()
    }

    #[test]
    fn picks_earliest_start() {
        let meetings = vec![
            call("late", Some("2025-06-01T09:00:00Z")),
            call("early", Some("2025-02-01T09:00:00Z")),
            call("mid", Some("2025-04-01T09:00:00Z")),
        ];
        let best = select_best_meeting(&meetings, REP, LEAD, cutoff()).unwrap();
        assert_eq!(best.id.as_deref(), Some("early"));
    }

    #[test]
    fn unparseable_start_sorts_last() {
        let meetings = vec![
            call("unknown", Some("sometime")),
            call("absent", None),
            call("dated", Some("2025-09-01T09:00:00Z")),
        ];
        let best = select_best_meeting(&meetings, REP, LEAD, cutoff()).unwrap();
        assert_eq!(best.id.as_deref(), Some("dated"));

        let undated = vec![call("first", None), call("second", Some("garbage"))];
        let best = select_best_meeting(&undated, REP, LEAD, cutoff()).unwrap();
        assert_eq!(best.id.as_deref(), Some("first"));
    }

    #[test]
    fn ties_keep_fetch_order() {
        let meetings = vec![
            call("a", Some("2025-02-01T09:00:00Z")),
            call("b", Some("2025-02-01T09:00:00Z")),
        ];
        let best = select_best_meeting(&meetings, REP, LEAD, cutoff()).unwrap();
        assert_eq!(best.id.as_deref(), Some("a"));
    }

    #[test]
    fn organizer_absent_is_excluded() {
        let raw = json!({
            "uuid": "other",
            "organizer_email": "someone@vendor.com",
            "attendees": [{"email": LEAD}],
            "transcript_ready": true,
            "start_at": "2025-02-01T09:00:00Z"
        });
        let meetings = vec![MeetingRecord::from_value(raw).unwrap()];
        assert!(select_best_meeting(&meetings, REP, LEAD, cutoff()).is_none());
    }

    #[test]
    fn organizer_as_attendee_qualifies() {
        let raw = json!({
            "uuid": "joined",
            "organizer_email": "someone@vendor.com",
            "attendees": [{"email": LEAD}, {"email": REP}],
            "audio_ready": true
        });
        let meetings = vec![MeetingRecord::from_value(raw).unwrap()];
        assert_eq!(eligible_meetings(&meetings, REP, LEAD, cutoff()).len(), 1);
    }

    #[test]
    fn filters_leaf_completion_and_cutoff() {
        let mut not_done = call("not-done", Some("2025-02-01T09:00:00Z"));
        not_done.completed = false;

        let meetings = vec![
            call("too-old", Some("2024-06-01T09:00:00Z")),
            not_done,
            MeetingRecord::from_value(json!({
                "uuid": "no-leaf",
                "organizer_email": REP,
                "attendees": [{"email": "other@customer.com"}],
                "transcript_ready": true
            }))
            .unwrap(),
        ];
        assert!(eligible_meetings(&meetings, REP, LEAD, cutoff()).is_empty());
    }
}
