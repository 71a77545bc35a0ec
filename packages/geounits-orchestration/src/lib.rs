/*
 * GeoUnits Orchestration - Units-of-Analysis Pipeline
 *
 * Builds the three spatial units of analysis (building, block, RSU) from
 * pluggable geoprocessing collaborators.
 *
 * Architecture:
 * - Step plan with parallel phases (prepare ∥ blocks → RSU → relations)
 * - Parameter Binder (step outputs → next step inputs)
 * - Fail-fast execution (first failing step aborts the run)
 * - Run report with per-step ledger
 * - Observability (tracing spans per run and per step)
 */

// Public modules
pub mod binder;
pub mod config;
pub mod dag;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod report;
pub mod specs;
pub mod step;
pub mod telemetry;

// Re-exports
pub use binder::{BindingContext, BindingSource, ParameterBinder};
pub use config::{
    ConfigError, ExecutionMode, OrchestratorSettings, PipelineConfig, UnitsInput,
};
pub use dag::{PipelinePlan, StepNode};
pub use error::{BindingError, PipelineError, Result};
pub use orchestrator::PipelineOrchestrator;
pub use process::{
    BoundArguments, ParamType, ParamValue, Process, ProcessContext, ProcessOutcome,
    ProcessOutputs, ProcessRegistry, ProcessSpec,
};
pub use report::{RunOutcome, RunReport, StepRecord, StepStatus, UnitsOfAnalysis};
pub use step::StepId;
