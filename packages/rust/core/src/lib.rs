//! Run orchestration for callsync.
//!
//! This crate ties the CRM, conversation, and transcript crates together:
//! - [`correlate`]: leaf → organizer mapping through CRM owners
//! - [`deliver`]: webhook delivery of assembled records
//! - [`pipeline`]: the full list-driven run ([`Pipeline`])
//! - [`pull`]: single-meeting mode

pub mod correlate;
pub mod deliver;
pub mod pipeline;
pub mod pull;

pub use correlate::{Conflict, Correlation, correlate, distinct_owner_ids};
pub use deliver::{Dispatcher, Recipients, SUCCESS_STATUSES, build_record};
pub use pipeline::{Pipeline, ProgressReporter, SilentProgress};
pub use pull::{PullConfig, PullOutcome, PullTarget, pull_meeting};
