use crate::binder::{BindingContext, BindingSource, ParameterBinder};
use crate::config::{ExecutionMode, OrchestratorSettings, UnitsInput};
use crate::dag::{PipelinePlan, StepNode};
use crate::error::{BindingError, PipelineError, Result};
use crate::process::{
    BoundArguments, ParamType, ParamValue, Process, ProcessContext, ProcessOutcome,
    ProcessOutputs, ProcessRegistry,
};
use crate::report::{RunOutcome, RunReport, StepRecord, StepStatus, UnitsOfAnalysis};
use crate::specs::params;
use crate::step::StepId;
use chrono::Utc;
use futures::FutureExt;
use geounits_storage::Datastore;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Steps whose output tables form the result bundle
const BUNDLE_STEPS: [StepId; 3] = [
    StepId::RelateBuildingRsu,
    StepId::RelateBlockRsu,
    StepId::CreateRsu,
];

/// Text of a caught panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Per-run status of every planned step
struct StepLedger {
    records: Vec<StepRecord>,
}

impl StepLedger {
    fn new(plan: &PipelinePlan) -> Self {
        Self {
            records: plan
                .steps()
                .iter()
                .map(|node| StepRecord::not_run(node.id, node.process.name))
                .collect(),
        }
    }

    fn entry(&mut self, step: StepId) -> Option<&mut StepRecord> {
        self.records.iter_mut().find(|r| r.step == step)
    }

    fn succeeded(&mut self, step: StepId, outputs: &ProcessOutputs, elapsed: Duration) {
        if let Some(record) = self.entry(step) {
            record.status = StepStatus::Succeeded;
            record.duration_ms = elapsed.as_millis() as u64;
            record.outputs = outputs.clone();
        }
    }

    fn failed(&mut self, step: StepId, err: &PipelineError, elapsed: Duration) {
        if let Some(record) = self.entry(step) {
            record.status = StepStatus::Failed;
            record.duration_ms = elapsed.as_millis() as u64;
            record.error = Some(err.to_string());
        }
    }
}

/// Units-of-analysis pipeline orchestrator
///
/// Runs the six steps of the plan against one datastore, binding each step's
/// inputs from the external inputs and the outputs of earlier steps. The
/// first failing step aborts the run; nothing is retried and no partial
/// result is returned.
///
/// A panicking process fails its step in both execution modes. This relies
/// on unwinding, so a build with `panic = "abort"` terminates instead.
pub struct PipelineOrchestrator {
    plan: Arc<PipelinePlan>,
    registry: ProcessRegistry,
    datastore: Arc<dyn Datastore>,
    settings: OrchestratorSettings,
}

impl PipelineOrchestrator {
    /// Create an orchestrator with the default pipeline
    pub fn new(registry: ProcessRegistry, datastore: Arc<dyn Datastore>) -> Result<Self> {
        Self::with_plan(PipelinePlan::units_of_analysis()?, registry, datastore)
    }

    /// Create with a custom plan
    ///
    /// Every step's process must be registered with exactly the schema the
    /// step was planned against, and the plan must contain the steps the
    /// result bundle is read from.
    pub fn with_plan(
        plan: PipelinePlan,
        registry: ProcessRegistry,
        datastore: Arc<dyn Datastore>,
    ) -> Result<Self> {
        for node in plan.steps() {
            let process = registry.get(node.process.name)?;
            if process.spec() != &node.process {
                return Err(PipelineError::invalid_plan(format!(
                    "Process {} is registered with a different schema than step {} expects",
                    node.process.name, node.id
                )));
            }
        }

        for id in BUNDLE_STEPS {
            let has_table = plan
                .step(id)
                .and_then(|node| node.process.find_output(params::OUTPUT_TABLE))
                .is_some_and(|out| out.ty == ParamType::Table);
            if !has_table {
                return Err(PipelineError::invalid_plan(format!(
                    "Plan has no step {} producing an output table",
                    id
                )));
            }
        }

        Ok(Self {
            plan: Arc::new(plan),
            registry,
            datastore,
            settings: OrchestratorSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run the pipeline (main entry point)
    pub async fn run(&self, input: &UnitsInput) -> Result<UnitsOfAnalysis> {
        let run_id = Uuid::new_v4();
        let mut ledger = StepLedger::new(&self.plan);
        self.execute_run(run_id, input, &mut ledger).await
    }

    /// Run the pipeline and report every step
    pub async fn run_with_report(&self, input: &UnitsInput) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_time = Instant::now();
        let mut ledger = StepLedger::new(&self.plan);

        let result = self.execute_run(run_id, input, &mut ledger).await;

        let outcome = match result {
            Ok(units) => RunOutcome::Completed(units),
            Err(e) => RunOutcome::Failed {
                step: e.step(),
                message: e.to_string(),
            },
        };

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            duration_ms: start_time.elapsed().as_millis() as u64,
            steps: ledger.records,
            outcome,
        }
    }

    async fn execute_run(
        &self,
        run_id: Uuid,
        input: &UnitsInput,
        ledger: &mut StepLedger,
    ) -> Result<UnitsOfAnalysis> {
        let span = info_span!("pipeline_run", run_id = %run_id, prefix = %input.prefix);

        async move {
            let start_time = Instant::now();
            info!(
                "Starting run {} on {} datastore ({:?} mode)",
                run_id,
                self.datastore.backend(),
                self.settings.execution_mode
            );
            info!("Execution plan:\n{}", self.plan.execution_plan());

            let result = self.run_steps(run_id, input, ledger).await;

            match &result {
                Ok(units) => info!(
                    "Run {} completed in {}ms - buildings: {}, blocks: {}, RSUs: {}",
                    run_id,
                    start_time.elapsed().as_millis(),
                    units.building_table,
                    units.block_table,
                    units.rsu_table
                ),
                Err(e) => error!("Run {} failed: {}", run_id, e),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn run_steps(
        &self,
        run_id: Uuid,
        input: &UnitsInput,
        ledger: &mut StepLedger,
    ) -> Result<UnitsOfAnalysis> {
        input.validate()?;
        let mut ctx = BindingContext::new(input.external_inputs());

        if self.settings.verify_input_tables {
            if let Err(e) = self.verify_input_tables(&ctx).await {
                if let Some(step) = e.step() {
                    ledger.failed(step, &e, Duration::ZERO);
                }
                return Err(e);
            }
        }

        match self.settings.execution_mode {
            ExecutionMode::Sequential => self.run_sequential(run_id, &mut ctx, ledger).await?,
            ExecutionMode::Concurrent => self.run_concurrent(run_id, &mut ctx, ledger).await?,
        }

        let units = Self::assemble(&ctx)?;

        if self.settings.drop_intermediate_tables {
            self.drop_intermediate_tables(&ctx, &units).await;
        }

        Ok(units)
    }

    /// Check every external table input against the datastore
    ///
    /// A missing table is attributed to the first step that consumes it.
    async fn verify_input_tables(&self, ctx: &BindingContext) -> Result<()> {
        let mut checked = HashSet::new();

        for node in self.plan.steps() {
            for (input, source) in &node.bindings {
                let BindingSource::External(key) = source else {
                    continue;
                };
                let is_table = node
                    .process
                    .find_input(input)
                    .is_some_and(|decl| decl.ty == ParamType::Table);
                // Absent or mistyped values are left to the binder
                let Some(table) = ctx.external(key).and_then(ParamValue::as_table) else {
                    continue;
                };
                if !is_table || !checked.insert(table.to_string()) {
                    continue;
                }

                if !self.datastore.table_exists(table).await? {
                    return Err(PipelineError::binding(
                        node.id,
                        BindingError::MissingInputTable {
                            param: input.to_string(),
                            table: table.to_string(),
                        },
                    ));
                }
                debug!("Input table {} found", table);
            }
        }

        Ok(())
    }

    fn bind(node: &StepNode, ctx: &BindingContext, ledger: &mut StepLedger) -> Result<BoundArguments> {
        ParameterBinder::bind(node, ctx).map_err(|source| {
            let e = PipelineError::binding(node.id, source);
            error!("Step {} could not be bound: {}", node.id, e);
            ledger.failed(node.id, &e, Duration::ZERO);
            e
        })
    }

    fn context(&self, run_id: Uuid, step: StepId) -> ProcessContext {
        ProcessContext {
            run_id,
            step,
            datastore: self.datastore.clone(),
        }
    }

    /// Record a finished step; the error is handed back for the caller to abort on
    fn record(
        ctx: &mut BindingContext,
        ledger: &mut StepLedger,
        step: StepId,
        result: Result<ProcessOutputs>,
        elapsed: Duration,
    ) -> Result<()> {
        match result {
            Ok(outputs) => {
                info!(
                    "Step {} completed in {}ms",
                    step,
                    elapsed.as_millis()
                );
                ledger.succeeded(step, &outputs, elapsed);
                ctx.record(step, &outputs);
                Ok(())
            }
            Err(e) => {
                error!("Step {} failed: {}", step, e);
                ledger.failed(step, &e, elapsed);
                Err(e)
            }
        }
    }

    /// Steps one at a time, in declared order
    async fn run_sequential(
        &self,
        run_id: Uuid,
        ctx: &mut BindingContext,
        ledger: &mut StepLedger,
    ) -> Result<()> {
        for node in self.plan.steps() {
            let args = Self::bind(node, ctx, ledger)?;
            let process = self.registry.get(node.process.name)?;

            let started = Instant::now();
            let result = Self::execute_step(process, args, self.context(run_id, node.id)).await;
            Self::record(ctx, ledger, node.id, result, started.elapsed())?;
        }

        Ok(())
    }

    /// Execute DAG with parallel phases
    async fn run_concurrent(
        &self,
        run_id: Uuid,
        ctx: &mut BindingContext,
        ledger: &mut StepLedger,
    ) -> Result<()> {
        for (phase_idx, parallel_group) in self.plan.phases().iter().enumerate() {
            info!(
                "Phase {} - {} steps{}",
                phase_idx + 1,
                parallel_group.len(),
                if parallel_group.len() > 1 {
                    " (parallel)"
                } else {
                    ""
                }
            );

            // Bind the whole phase first; its steps only read earlier phases
            let mut invocations = Vec::with_capacity(parallel_group.len());
            for step_id in parallel_group {
                let node = self.plan.step(*step_id).ok_or_else(|| {
                    PipelineError::invalid_plan(format!("Phase step {} is not planned", step_id))
                })?;
                let args = Self::bind(node, ctx, ledger)?;
                let process = self.registry.get(node.process.name)?;
                invocations.push((node.id, process, args));
            }

            // Execute steps in parallel using tokio::spawn
            let phase_start = Instant::now();
            let mut tasks = Vec::with_capacity(invocations.len());
            for (step_id, process, args) in invocations {
                let step_ctx = self.context(run_id, step_id);
                tasks.push(tokio::spawn(async move {
                    let started = Instant::now();
                    let result = Self::execute_step(process, args, step_ctx).await;
                    (result, started.elapsed())
                }));
            }

            let results = futures::future::join_all(tasks).await;

            // Every result is recorded; the first failure in declared order aborts
            let mut first_failure = None;
            for (step_id, task_result) in parallel_group.iter().copied().zip(results) {
                let (result, elapsed) = match task_result {
                    Ok(finished) => finished,
                    Err(join_err) => (
                        Err(PipelineError::step_failed(
                            step_id,
                            format!("panicked: {}", join_err),
                        )),
                        phase_start.elapsed(),
                    ),
                };

                if let Err(e) = Self::record(ctx, ledger, step_id, result, elapsed) {
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }

            if let Some(e) = first_failure {
                return Err(e);
            }
        }

        Ok(())
    }

    /// Execute a single step
    async fn execute_step(
        process: Arc<dyn Process>,
        args: BoundArguments,
        ctx: ProcessContext,
    ) -> Result<ProcessOutputs> {
        let step = ctx.step;
        let spec = process.spec();
        let span = info_span!("step", step = %step, process = spec.name);

        async {
            info!("Executing step {} ({})", step, spec.name);
            debug!(
                "Arguments: {}",
                args.iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let outcome = AssertUnwindSafe(process.execute(args, &ctx))
                .catch_unwind()
                .await
                .map_err(|payload| {
                    PipelineError::step_failed(
                        step,
                        format!("panicked: {}", panic_message(&*payload)),
                    )
                })?
                .map_err(|e| PipelineError::step_failed(step, format!("{:#}", e)))?;

            let outputs = match outcome {
                ProcessOutcome::Succeeded(outputs) => outputs,
                ProcessOutcome::Failed { reason } => {
                    return Err(PipelineError::step_failed(step, reason));
                }
            };

            for declared in &spec.outputs {
                match outputs.get(declared.name) {
                    None => {
                        return Err(PipelineError::step_failed(
                            step,
                            format!(
                                "{} did not return declared output '{}'",
                                spec.name, declared.name
                            ),
                        ));
                    }
                    Some(value) if value.param_type() != declared.ty => {
                        return Err(PipelineError::step_failed(
                            step,
                            format!(
                                "{} returned a {} for output '{}', declared {}",
                                spec.name,
                                value.param_type(),
                                declared.name,
                                declared.ty
                            ),
                        ));
                    }
                    Some(_) => {}
                }
            }

            for extra in outputs.keys().filter(|k| spec.find_output(k).is_none()) {
                warn!("{} returned undeclared output '{}'", spec.name, extra);
            }

            Ok(outputs)
        }
        .instrument(span)
        .await
    }

    /// Read the result bundle from the recorded outputs
    fn assemble(ctx: &BindingContext) -> Result<UnitsOfAnalysis> {
        let table = |step: StepId| {
            ctx.output(step, params::OUTPUT_TABLE)
                .and_then(ParamValue::as_table)
                .map(str::to_string)
                .ok_or_else(|| PipelineError::step_failed(step, "no output table was recorded"))
        };

        Ok(UnitsOfAnalysis {
            building_table: table(StepId::RelateBuildingRsu)?,
            block_table: table(StepId::RelateBlockRsu)?,
            rsu_table: table(StepId::CreateRsu)?,
        })
    }

    /// Drop every produced table that is not part of the bundle
    ///
    /// Failures are logged; the run has already succeeded.
    async fn drop_intermediate_tables(&self, ctx: &BindingContext, units: &UnitsOfAnalysis) {
        let keep: HashSet<&str> = [
            units.building_table.as_str(),
            units.block_table.as_str(),
            units.rsu_table.as_str(),
        ]
        .into_iter()
        .collect();

        for node in self.plan.steps() {
            for output in &node.process.outputs {
                if output.ty != ParamType::Table {
                    continue;
                }
                let Some(table) = ctx
                    .output(node.id, output.name)
                    .and_then(ParamValue::as_table)
                else {
                    continue;
                };
                if keep.contains(table) || Self::is_external_table(ctx, table) {
                    continue;
                }

                match self.datastore.drop_table(table).await {
                    Ok(()) => info!("Dropped intermediate table {}", table),
                    Err(e) => warn!("Failed to drop intermediate table {}: {}", table, e),
                }
            }
        }
    }

    fn is_external_table(ctx: &BindingContext, table: &str) -> bool {
        [
            params::ZONE_TABLE,
            params::BUILDING_TABLE,
            params::ROAD_TABLE,
            params::RAIL_TABLE,
            params::VEGETATION_TABLE,
            params::HYDROGRAPHIC_TABLE,
        ]
        .iter()
        .any(|key| ctx.external(key).and_then(ParamValue::as_table) == Some(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs;
    use async_trait::async_trait;
    use geounits_storage::InMemoryDatastore;

    /// Returns `<prefix>_<step>` for every declared output
    struct NamingProcess {
        spec: crate::process::ProcessSpec,
    }

    #[async_trait]
    impl Process for NamingProcess {
        fn spec(&self) -> &crate::process::ProcessSpec {
            &self.spec
        }

        async fn execute(
            &self,
            args: BoundArguments,
            ctx: &ProcessContext,
        ) -> anyhow::Result<ProcessOutcome> {
            let prefix = args.text(params::PREFIX)?;
            Ok(ProcessOutcome::success(self.spec.outputs.iter().map(|out| {
                let value = match out.ty {
                    ParamType::Column => ParamValue::column(format!("id_{}", ctx.step)),
                    _ => ParamValue::table(format!("{}_{}", prefix, ctx.step)),
                };
                (out.name, value)
            })))
        }
    }

    fn registry() -> ProcessRegistry {
        [
            specs::prepare_rsu_data(),
            specs::create_rsu(),
            specs::create_blocks(),
            specs::create_scales_relations(),
        ]
        .into_iter()
        .fold(ProcessRegistry::new(), |reg, spec| {
            reg.with(Arc::new(NamingProcess { spec }))
        })
    }

    fn input() -> UnitsInput {
        UnitsInput::new("Z1", "BU", "RD", "RL", "VG", "HY", "p1")
    }

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings::default().verify_input_tables(false)
    }

    #[tokio::test]
    async fn test_bundle_comes_from_last_relations_and_rsu() {
        let orchestrator =
            PipelineOrchestrator::new(registry(), Arc::new(InMemoryDatastore::new()))
                .unwrap()
                .with_settings(settings());

        let units = orchestrator.run(&input()).await.unwrap();
        assert_eq!(units.building_table, "p1_relate_building_rsu");
        assert_eq!(units.block_table, "p1_relate_block_rsu");
        assert_eq!(units.rsu_table, "p1_create_rsu");
    }

    #[tokio::test]
    async fn test_report_records_every_step() {
        let orchestrator =
            PipelineOrchestrator::new(registry(), Arc::new(InMemoryDatastore::new()))
                .unwrap()
                .with_settings(settings().execution_mode(ExecutionMode::Concurrent));

        let report = orchestrator.run_with_report(&input()).await;
        assert!(report.is_success());
        assert_eq!(report.steps.len(), 6);
        assert!(report
            .steps
            .iter()
            .all(|r| r.status == StepStatus::Succeeded));
        assert_eq!(
            report.step(StepId::CreateRsu).unwrap().outputs[params::OUTPUT_ID_RSU],
            ParamValue::column("id_create_rsu")
        );
    }

    #[tokio::test]
    async fn test_unregistered_process_rejected() {
        let registry = ProcessRegistry::new().with(Arc::new(NamingProcess {
            spec: specs::create_rsu(),
        }));

        let result = PipelineOrchestrator::new(registry, Arc::new(InMemoryDatastore::new()));
        assert!(matches!(result, Err(PipelineError::ProcessNotFound(_))));
    }

    #[tokio::test]
    async fn test_schema_drift_rejected() {
        let drifted = specs::create_blocks().input(params::ZONE_TABLE, ParamType::Table);
        let registry = registry().with(Arc::new(NamingProcess { spec: drifted }));

        let result = PipelineOrchestrator::new(registry, Arc::new(InMemoryDatastore::new()));
        assert!(matches!(result, Err(PipelineError::InvalidPlan(_))));
    }

    #[tokio::test]
    async fn test_invalid_input_fails_before_any_step() {
        let orchestrator =
            PipelineOrchestrator::new(registry(), Arc::new(InMemoryDatastore::new()))
                .unwrap()
                .with_settings(settings());

        let report = orchestrator.run_with_report(&input().distance(-1.0)).await;
        assert_eq!(report.failed_step(), None);
        assert!(report.failure_message().unwrap().contains("distance"));
        assert_eq!(report.attempted_steps().count(), 0);
    }
}
