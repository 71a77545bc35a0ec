use crate::binder::BindingSource;
use crate::error::{PipelineError, Result};
use crate::process::ProcessSpec;
use crate::specs::{self, params};
use crate::step::StepId;
use std::collections::HashMap;

/// Step node in the plan
#[derive(Debug, Clone)]
pub struct StepNode {
    pub id: StepId,
    pub process: ProcessSpec,
    /// Input name → source, in binding order
    pub bindings: Vec<(&'static str, BindingSource)>,
    /// Ordering-only dependencies (no data flows along these edges)
    pub after: Vec<StepId>,
}

impl StepNode {
    pub fn new(id: StepId, process: ProcessSpec) -> Self {
        Self {
            id,
            process,
            bindings: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn bind(mut self, input: &'static str, source: BindingSource) -> Self {
        self.bindings.push((input, source));
        self
    }

    pub fn after(mut self, step: StepId) -> Self {
        self.after.push(step);
        self
    }

    pub fn binding_for(&self, input: &str) -> Option<&BindingSource> {
        self.bindings
            .iter()
            .find(|(name, _)| *name == input)
            .map(|(_, source)| source)
    }

    /// Data and ordering dependencies, first occurrence order
    pub fn dependencies(&self) -> Vec<StepId> {
        let mut deps = Vec::new();
        let producers = self.bindings.iter().filter_map(|(_, s)| s.producer());
        for dep in producers.chain(self.after.iter().copied()) {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        deps
    }
}

/// Validated step plan with phase grouping
///
/// Steps run in declaration order. Phases group steps by dependency depth:
/// steps sharing a phase have no dependency on one another.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    steps: Vec<StepNode>,
    phases: Vec<Vec<StepId>>, // Vec of parallel groups
}

impl PipelinePlan {
    /// Create a plan from step definitions
    pub fn new(steps: Vec<StepNode>) -> Result<Self> {
        Self::validate(&steps)?;
        let phases = Self::phase_groups(&steps);
        Ok(Self { steps, phases })
    }

    /// Default pipeline: RSU branch ∥ blocks → relations
    pub fn units_of_analysis() -> Result<Self> {
        let prefix = BindingSource::external(params::PREFIX);

        let steps = vec![
            StepNode::new(StepId::PrepareRsuData, specs::prepare_rsu_data())
                .bind(params::ZONE_TABLE, BindingSource::external(params::ZONE_TABLE))
                .bind(params::ROAD_TABLE, BindingSource::external(params::ROAD_TABLE))
                .bind(params::RAIL_TABLE, BindingSource::external(params::RAIL_TABLE))
                .bind(
                    params::VEGETATION_TABLE,
                    BindingSource::external(params::VEGETATION_TABLE),
                )
                .bind(
                    params::HYDROGRAPHIC_TABLE,
                    BindingSource::external(params::HYDROGRAPHIC_TABLE),
                )
                .bind(
                    params::SURFACE_VEGETATION,
                    BindingSource::external(params::SURFACE_VEGETATION),
                )
                .bind(
                    params::SURFACE_HYDRO,
                    BindingSource::external(params::SURFACE_HYDRO),
                )
                .bind(params::PREFIX, prefix),
            StepNode::new(StepId::CreateRsu, specs::create_rsu())
                .bind(
                    params::INPUT_TABLE,
                    BindingSource::output(StepId::PrepareRsuData, params::OUTPUT_TABLE),
                )
                .bind(params::PREFIX, prefix),
            StepNode::new(StepId::CreateBlocks, specs::create_blocks())
                .bind(
                    params::INPUT_TABLE,
                    BindingSource::external(params::BUILDING_TABLE),
                )
                .bind(params::DISTANCE, BindingSource::external(params::DISTANCE))
                .bind(params::PREFIX, prefix),
            StepNode::new(StepId::RelateBlockRsu, specs::create_scales_relations())
                .bind(
                    params::LOWER_TABLE,
                    BindingSource::output(StepId::CreateBlocks, params::OUTPUT_TABLE),
                )
                .bind(
                    params::UPPER_TABLE,
                    BindingSource::output(StepId::CreateRsu, params::OUTPUT_TABLE),
                )
                .bind(
                    params::ID_COLUMN_UP,
                    BindingSource::output(StepId::CreateRsu, params::OUTPUT_ID_RSU),
                )
                .bind(params::PREFIX, prefix),
            StepNode::new(StepId::RelateBuildingBlock, specs::create_scales_relations())
                .bind(
                    params::LOWER_TABLE,
                    BindingSource::external(params::BUILDING_TABLE),
                )
                .bind(
                    params::UPPER_TABLE,
                    BindingSource::output(StepId::CreateBlocks, params::OUTPUT_TABLE),
                )
                .bind(
                    params::ID_COLUMN_UP,
                    BindingSource::output(StepId::CreateBlocks, params::OUTPUT_ID_BLOCK),
                )
                .bind(params::PREFIX, prefix)
                .after(StepId::RelateBlockRsu),
            StepNode::new(StepId::RelateBuildingRsu, specs::create_scales_relations())
                .bind(
                    params::LOWER_TABLE,
                    BindingSource::output(StepId::RelateBuildingBlock, params::OUTPUT_TABLE),
                )
                .bind(
                    params::UPPER_TABLE,
                    BindingSource::output(StepId::CreateRsu, params::OUTPUT_TABLE),
                )
                .bind(
                    params::ID_COLUMN_UP,
                    BindingSource::output(StepId::CreateRsu, params::OUTPUT_ID_RSU),
                )
                .bind(params::PREFIX, prefix),
        ];

        Self::new(steps)
    }

    /// Every edge must point strictly backwards and name a declared output
    fn validate(steps: &[StepNode]) -> Result<()> {
        let mut position: HashMap<StepId, usize> = HashMap::new();

        for (idx, step) in steps.iter().enumerate() {
            if position.insert(step.id, idx).is_some() {
                return Err(PipelineError::invalid_plan(format!(
                    "Step {} is declared twice",
                    step.id
                )));
            }

            for (input, source) in &step.bindings {
                let declared = step.process.find_input(input).ok_or_else(|| {
                    PipelineError::invalid_plan(format!(
                        "Step {} binds '{}', which {} does not declare",
                        step.id, input, step.process.name
                    ))
                })?;

                if let BindingSource::StepOutput {
                    step: producer,
                    output,
                } = source
                {
                    let producer_idx = position.get(producer).copied().filter(|&p| p < idx);
                    let producer_node = producer_idx.map(|p| &steps[p]).ok_or_else(|| {
                        PipelineError::invalid_plan(format!(
                            "Step {} depends on {}, which is not declared before it",
                            step.id, producer
                        ))
                    })?;

                    let produced = producer_node.process.find_output(output).ok_or_else(|| {
                        PipelineError::invalid_plan(format!(
                            "Step {} binds '{}' to {}.{}, which {} does not declare",
                            step.id, input, producer, output, producer_node.process.name
                        ))
                    })?;

                    if produced.ty != declared.ty {
                        return Err(PipelineError::invalid_plan(format!(
                            "Step {} input '{}' is {} but {}.{} is {}",
                            step.id, input, declared.ty, producer, output, produced.ty
                        )));
                    }
                }
            }

            for dep in &step.after {
                if !matches!(position.get(dep), Some(&p) if p < idx) {
                    return Err(PipelineError::invalid_plan(format!(
                        "Step {} is ordered after {}, which is not declared before it",
                        step.id, dep
                    )));
                }
            }
        }

        Ok(())
    }

    /// Phase index = longest dependency chain leading to the step
    fn phase_groups(steps: &[StepNode]) -> Vec<Vec<StepId>> {
        let mut level: HashMap<StepId, usize> = HashMap::new();
        let mut phases: Vec<Vec<StepId>> = Vec::new();

        // Dependencies always precede their dependents, so one pass suffices
        for step in steps {
            let depth = step
                .dependencies()
                .iter()
                .filter_map(|dep| level.get(dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level.insert(step.id, depth);

            if phases.len() <= depth {
                phases.resize_with(depth + 1, Vec::new);
            }
            phases[depth].push(step.id);
        }

        phases
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[StepNode] {
        &self.steps
    }

    pub fn step(&self, id: StepId) -> Option<&StepNode> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.step(id).is_some()
    }

    /// Phases of mutually independent steps
    pub fn phases(&self) -> &[Vec<StepId>] {
        &self.phases
    }

    /// Get execution plan as string (for logging)
    pub fn execution_plan(&self) -> String {
        self.phases
            .iter()
            .enumerate()
            .map(|(i, group)| {
                let names: Vec<_> = group.iter().map(|id| id.as_str()).collect();

                if group.len() > 1 {
                    format!("Phase {}: {} (parallel)", i + 1, names.join(" ∥ "))
                } else {
                    format!("Phase {}: {}", i + 1, names[0])
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
