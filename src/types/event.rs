//! The structured record emitted per line in event mode.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The state change an event describes.
///
/// Only [`Action::Output`] and the three terminal actions affect the
/// report. The remaining named variants are recognized so they can be
/// skipped cleanly; anything unrecognized folds into [`Action::Other`] and
/// is ignored rather than rejected.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The test has started running
    Run,
    /// The test has been paused
    Pause,
    /// The test has continued running
    Cont,
    /// The test binary is about to run
    Start,
    /// Benchmark framing output
    Bench,
    /// The test printed output
    Output,
    /// The test passed
    Pass,
    /// The test failed
    Fail,
    /// The test was skipped
    Skip,
    /// Any action this crate does not track
    #[serde(other)]
    Other,
}

/// One event-mode record: a single state change for one test, keyed by the
/// (package, test) pair. Field names follow the runner's JSON keys; extra
/// fields in a record are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TestEvent {
    /// When the event happened (RFC3339).
    #[serde(rename = "Time", default)]
    pub time: Option<DateTime<Utc>>,
    /// The state change this record describes.
    #[serde(rename = "Action")]
    pub action: Action,
    /// The package under test; empty when the stream does not frame one.
    #[serde(rename = "Package", default)]
    pub package: String,
    /// The test the event belongs to; empty for package-level events.
    #[serde(rename = "Test", default)]
    pub test: String,
    /// Elapsed seconds, meaningful on terminal actions.
    #[serde(rename = "Elapsed", default)]
    pub elapsed: f64,
    /// An output fragment, meaningful on the `output` action.
    #[serde(rename = "Output", default)]
    pub output: String,
}
