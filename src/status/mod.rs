pub mod github;

pub use github::GithubStatusClient;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::aggregate::AggregatedPayload;
use crate::config::{TestCategory, TestTypeDefinition};
use crate::error::StatusError;
use crate::history::{delta, HistoryRecord};

// ============================================================================
// Data model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Success,
    Failure,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitState::Success => f.write_str("success"),
            CommitState::Failure => f.write_str("failure"),
        }
    }
}

/// Body of one commit-status POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub state: CommitState,
    pub target_url: String,
    pub description: String,
    pub context: String,
}

/// Destination for built status payloads.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn post(&self, payload: &StatusPayload) -> Result<(), StatusError>;
}

/// Prints payloads as JSON lines instead of posting them.
pub struct DryRunSink;

#[async_trait]
impl StatusSink for DryRunSink {
    async fn post(&self, payload: &StatusPayload) -> Result<(), StatusError> {
        let json = serde_json::to_string(payload)
            .map_err(|e| StatusError::Transport(format!("failed to encode payload: {}", e)))?;
        info!("Dry run, not posting status for {}", payload.context);
        println!("{}", json);
        Ok(())
    }
}

// ============================================================================
// Payload building
// ============================================================================

/// Render `score` with no decimal places, rounding halves to even.
fn whole_number(score: Decimal) -> Decimal {
    score.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
}

pub fn describe(definition: &TestTypeDefinition, score: Decimal, history: &[HistoryRecord]) -> String {
    format!(
        "{}: {}{}, Change from previous: {}",
        definition.message,
        whole_number(score),
        if definition.is_percent { "%" } else { "" },
        delta(&definition.test_type, history)
    )
}

/// One status per aggregated test type, in payload order. Only dynamic test
/// types carry `overall_dynamic_state`; static indicators always succeed.
pub fn build_payloads(
    overall_dynamic_state: CommitState,
    target_url: &str,
    definitions: &[TestTypeDefinition],
    payload: &AggregatedPayload,
    history: &[HistoryRecord],
) -> Result<Vec<StatusPayload>, StatusError> {
    payload
        .iter()
        .map(|(test_type, score)| -> Result<StatusPayload, StatusError> {
            let definition = definitions
                .iter()
                .find(|d| &d.test_type == test_type)
                .ok_or_else(|| {
                    StatusError::Config(format!("no definition for test type '{}'", test_type))
                })?;
            let state = match definition.category {
                TestCategory::Dynamic => overall_dynamic_state,
                TestCategory::Static => CommitState::Success,
            };
            Ok(StatusPayload {
                state,
                target_url: target_url.to_string(),
                description: describe(definition, score, history),
                context: test_type.to_string(),
            })
        })
        .collect()
}
