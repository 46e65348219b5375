//! Segment workers: composes interface and destination endpoints for one tunnel id, fanning
//! frames between them and managing destination dial retry/backoff.

mod destination;
mod error;
mod worker;

pub use destination::{DestinationEndpoint, RetryPolicy, RunOutcome, MAX_RESCHEDULE_BACKOFF_SECS, MAX_SENDER_RETRIES};
pub use error::SegmentError;
pub use worker::{SegmentSpec, SegmentWorker};
