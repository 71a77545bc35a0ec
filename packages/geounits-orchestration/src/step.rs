use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Step identifier
///
/// One variant per invocation in the units-of-analysis pipeline. The same
/// process may back several steps (the three relation steps all run
/// `createScalesRelations`), so outputs are keyed by step, not by process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    PrepareRsuData,
    CreateRsu,
    CreateBlocks,
    RelateBlockRsu,
    RelateBuildingBlock,
    RelateBuildingRsu,
}

impl StepId {
    /// Declaration order of the default pipeline
    pub const ALL: [StepId; 6] = [
        StepId::PrepareRsuData,
        StepId::CreateRsu,
        StepId::CreateBlocks,
        StepId::RelateBlockRsu,
        StepId::RelateBuildingBlock,
        StepId::RelateBuildingRsu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::PrepareRsuData => "prepare_rsu_data",
            StepId::CreateRsu => "create_rsu",
            StepId::CreateBlocks => "create_blocks",
            StepId::RelateBlockRsu => "relate_block_rsu",
            StepId::RelateBuildingBlock => "relate_building_block",
            StepId::RelateBuildingRsu => "relate_building_rsu",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        StepId::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| PipelineError::parse(format!("Invalid step ID: {}", s)))
    }

    /// 1-based position in the default pipeline
    pub fn ordinal(&self) -> usize {
        StepId::ALL
            .iter()
            .position(|step| step == self)
            .map(|i| i + 1)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
