use crate::error::{PipelineError, Result};
use crate::process::ProcessOutputs;
use crate::step::StepId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The three result tables of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitsOfAnalysis {
    /// Buildings with block and RSU ids
    pub building_table: String,
    /// Blocks with RSU ids
    pub block_table: String,
    pub rsu_table: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Never invoked (run aborted earlier)
    NotRun,
}

/// Per-step entry of a run report
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: StepId,
    pub process: &'static str,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "ProcessOutputs::is_empty")]
    pub outputs: ProcessOutputs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    pub fn not_run(step: StepId, process: &'static str) -> Self {
        Self {
            step,
            process,
            status: StepStatus::NotRun,
            duration_ms: 0,
            outputs: ProcessOutputs::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(UnitsOfAnalysis),
    Failed {
        /// Step the failure is attributed to; `None` for plan or setup errors
        step: Option<StepId>,
        message: String,
    },
}

/// Outcome and step ledger of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed(_))
    }

    pub fn units(&self) -> Option<&UnitsOfAnalysis> {
        match &self.outcome {
            RunOutcome::Completed(units) => Some(units),
            RunOutcome::Failed { .. } => None,
        }
    }

    pub fn failed_step(&self) -> Option<StepId> {
        match &self.outcome {
            RunOutcome::Failed { step, .. } => *step,
            RunOutcome::Completed(_) => None,
        }
    }

    /// Human-readable failure message
    pub fn failure_message(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Failed { message, .. } => Some(message),
            RunOutcome::Completed(_) => None,
        }
    }

    pub fn step(&self, id: StepId) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == id)
    }

    /// Steps that got past planning, whether they succeeded or failed
    pub fn attempted_steps(&self) -> impl Iterator<Item = StepId> + '_ {
        self.steps
            .iter()
            .filter(|r| r.status != StepStatus::NotRun)
            .map(|r| r.step)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(PipelineError::serialization)
    }
}
