use chrono::Utc;
use std::fmt;
use tracing::{info, warn};

use crate::aggregate::{aggregate, AggregatedPayload};
use crate::config::{AppConfig, TestCategory};
use crate::error::StatusError;
use crate::history::{self, HistoryRecord, HistoryStore};
use crate::report::{self, ParseOptions};
use crate::status::{build_payloads, CommitState, StatusPayload, StatusSink};

/// Pipeline stages, in the only order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    LoadDefinitions,
    ParseAll,
    Aggregate,
    UpdateHistory,
    BuildPayloads,
    DispatchAll,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::LoadDefinitions => "load definitions",
            RunStage::ParseAll => "parse reports",
            RunStage::Aggregate => "aggregate",
            RunStage::UpdateHistory => "update history",
            RunStage::BuildPayloads => "build payloads",
            RunStage::DispatchAll => "dispatch",
            RunStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A run that stopped early. Statuses listed in `dispatched` were already
/// posted; none of the others were.
#[derive(Debug, thiserror::Error)]
#[error("Run failed during {stage}: {source}")]
pub struct RunFailed {
    pub stage: RunStage,
    pub dispatched: Vec<String>,
    #[source]
    pub source: StatusError,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub parse: ParseOptions,
    /// Append this build to history; when false history is only read.
    pub record_history: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            record_history: true,
        }
    }
}

pub struct RunRequest<'a> {
    pub app: &'a AppConfig,
    pub branch: &'a str,
    pub target_url: &'a str,
    /// Defaults to now.
    pub build_start_time: Option<i64>,
    pub options: RunOptions,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub branch: String,
    pub build_start_time: i64,
    pub overall_dynamic_state: CommitState,
    pub payloads: Vec<StatusPayload>,
}

/// Tracks the current stage so a failure can report where it happened.
struct Pipeline {
    stage: RunStage,
    dispatched: Vec<String>,
}

impl Pipeline {
    fn enter(&mut self, stage: RunStage) {
        info!("Stage: {}", stage);
        self.stage = stage;
    }

    fn fail(&mut self, source: StatusError) -> RunFailed {
        RunFailed {
            stage: self.stage,
            dispatched: std::mem::take(&mut self.dispatched),
            source,
        }
    }
}

/// Parse every report, record the scores and post one status per test type.
pub async fn run(
    request: RunRequest<'_>,
    store: &dyn HistoryStore,
    sink: &dyn StatusSink,
) -> Result<RunSummary, RunFailed> {
    let mut pipeline = Pipeline {
        stage: RunStage::LoadDefinitions,
        dispatched: Vec::new(),
    };

    pipeline.enter(RunStage::LoadDefinitions);
    let definitions = request.app.definitions().map_err(|e| pipeline.fail(e))?;
    if !definitions
        .iter()
        .any(|d| d.category == TestCategory::Dynamic)
    {
        warn!("No dynamic test types configured; overall dynamic state stays failure");
    }

    pipeline.enter(RunStage::ParseAll);
    let mut results = Vec::with_capacity(definitions.len());
    for definition in &definitions {
        let result = report::parse(definition, request.options.parse).map_err(|e| pipeline.fail(e))?;
        results.push(result);
    }

    pipeline.enter(RunStage::Aggregate);
    let mut dynamic_seen = false;
    let mut dynamic_failed = false;
    let mut payload = AggregatedPayload::for_definitions(&definitions);
    for (definition, result) in definitions.iter().zip(&results) {
        if let Some(passed) = result.passed() {
            dynamic_seen = true;
            dynamic_failed |= !passed;
        }
        aggregate(result, definition, &mut payload).map_err(|e| pipeline.fail(e))?;
    }
    // Failure until a dynamic result proves otherwise.
    let overall_dynamic_state = if dynamic_seen && !dynamic_failed {
        CommitState::Success
    } else {
        CommitState::Failure
    };

    pipeline.enter(RunStage::UpdateHistory);
    let build_start_time = request
        .build_start_time
        .unwrap_or_else(|| Utc::now().timestamp());
    let fetched = if request.options.record_history {
        history::record_and_fetch(store, request.branch, build_start_time, &payload)
    } else {
        // Compare against stored history without persisting this build.
        store.query_by_partition(request.branch).map(|mut records| {
            records.push(HistoryRecord {
                branch: request.branch.to_string(),
                build_start_time,
                scores: payload.clone(),
            });
            records
        })
    };
    let records = fetched.map_err(|e| pipeline.fail(e))?;

    pipeline.enter(RunStage::BuildPayloads);
    let payloads = build_payloads(
        overall_dynamic_state,
        request.target_url,
        &definitions,
        &payload,
        &records,
    )
    .map_err(|e| pipeline.fail(e))?;

    pipeline.enter(RunStage::DispatchAll);
    for status in &payloads {
        if let Err(e) = sink.post(status).await {
            return Err(pipeline.fail(e));
        }
        pipeline.dispatched.push(status.context.clone());
    }

    pipeline.enter(RunStage::Done);
    info!(
        "Dispatched {} statuses for branch '{}'",
        payloads.len(),
        request.branch
    );
    Ok(RunSummary {
        branch: request.branch.to_string(),
        build_start_time,
        overall_dynamic_state,
        payloads,
    })
}
