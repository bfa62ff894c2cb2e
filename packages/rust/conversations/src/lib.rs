//! Conversation-intelligence access and meeting selection.
//!
//! This crate provides:
//! - [`meeting`]: [`MeetingRecord`] resolved from loosely typed meeting JSON
//! - [`fetch`]: [`ConversationClient`] for meeting listings and transcripts
//! - [`select`]: picking the canonical meeting for an (organizer, leaf) pair

pub mod fetch;
pub mod meeting;
pub mod select;

pub use fetch::{ConversationClient, ParamConvention, TranscriptSource};
pub use meeting::{MeetingRecord, parse_start};
pub use select::{earliest, eligible_meetings, select_best_meeting};
