pub mod db;

pub use db::SqliteHistoryStore;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::aggregate::AggregatedPayload;
use crate::config::TestType;
use crate::error::StatusError;

// ============================================================================
// Data model
// ============================================================================

/// One build's aggregated scores for a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub branch: String,
    /// Unix epoch seconds.
    pub build_start_time: i64,
    pub scores: AggregatedPayload,
}

/// Change of one test type's score against the previous build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    FirstBuild,
    /// The previous (or latest) record has no score for the test type.
    MissingFromPrevious,
    Change(Decimal),
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delta::FirstBuild => f.write_str("N/A - first build"),
            Delta::MissingFromPrevious => f.write_str("N/A - not in previous build"),
            Delta::Change(value) => write!(f, "{}", value),
        }
    }
}

/// Append-only per-branch score storage.
///
/// `append` followed by `query_by_partition` is not atomic across processes:
/// two runs on the same branch may interleave. Stores shared between
/// concurrent runs should offer a conditional append.
pub trait HistoryStore: Send + Sync {
    fn append(&self, record: &HistoryRecord) -> Result<(), StatusError>;

    /// All records for `branch`, oldest first.
    fn query_by_partition(&self, branch: &str) -> Result<Vec<HistoryRecord>, StatusError>;

    /// Append `record` and return its branch's history. Stores that can do
    /// both in one transaction override this.
    fn append_and_query(&self, record: &HistoryRecord) -> Result<Vec<HistoryRecord>, StatusError> {
        self.append(record)?;
        self.query_by_partition(&record.branch)
    }
}

/// Append this build's scores and return the branch's full history,
/// including the record just written.
pub fn record_and_fetch(
    store: &dyn HistoryStore,
    branch: &str,
    build_start_time: i64,
    payload: &AggregatedPayload,
) -> Result<Vec<HistoryRecord>, StatusError> {
    info!(
        "Recording build {} for branch '{}' ({} scores)",
        build_start_time,
        branch,
        payload.len()
    );
    store.append_and_query(&HistoryRecord {
        branch: branch.to_string(),
        build_start_time,
        scores: payload.clone(),
    })
}

/// Difference between the last two records for `test_type`.
pub fn delta(test_type: &TestType, history: &[HistoryRecord]) -> Delta {
    let [.., previous, latest] = history else {
        return Delta::FirstBuild;
    };
    match (latest.scores.get(test_type), previous.scores.get(test_type)) {
        (Some(latest), Some(previous)) => Delta::Change((latest - previous).normalize()),
        _ => Delta::MissingFromPrevious,
    }
}
