//! Parameter schemas of the geoprocessing collaborators
//!
//! The processes themselves live outside this crate. These declarations are
//! the contract both sides agree on: a registered process must declare
//! exactly the schema returned here.

use crate::process::{ParamType, ParamValue, ProcessSpec};

/// Process names
pub mod names {
    pub const PREPARE_RSU_DATA: &str = "prepareRSUData";
    pub const CREATE_RSU: &str = "createRSU";
    pub const CREATE_BLOCKS: &str = "createBlocks";
    pub const CREATE_SCALES_RELATIONS: &str = "createScalesRelations";
}

/// Parameter names
pub mod params {
    pub const ZONE_TABLE: &str = "zoneTable";
    pub const BUILDING_TABLE: &str = "buildingTable";
    pub const ROAD_TABLE: &str = "roadTable";
    pub const RAIL_TABLE: &str = "railTable";
    pub const VEGETATION_TABLE: &str = "vegetationTable";
    pub const HYDROGRAPHIC_TABLE: &str = "hydrographicTable";
    pub const SURFACE_VEGETATION: &str = "surface_vegetation";
    pub const SURFACE_HYDRO: &str = "surface_hydro";
    pub const DISTANCE: &str = "distance";
    pub const PREFIX: &str = "prefixName";

    pub const INPUT_TABLE: &str = "inputTableName";
    pub const LOWER_TABLE: &str = "inputLowerScaleTableName";
    pub const UPPER_TABLE: &str = "inputUpperScaleTableName";
    pub const ID_COLUMN_UP: &str = "idColumnUp";

    pub const OUTPUT_TABLE: &str = "outputTableName";
    pub const OUTPUT_ID_RSU: &str = "outputIdRsu";
    pub const OUTPUT_ID_BLOCK: &str = "outputIdBlock";
}

/// Minimum vegetation area (m²) for a patch to bound an RSU
pub const DEFAULT_SURFACE_VEGETATION: f64 = 100_000.0;

/// Minimum water area (m²) for a water body to bound an RSU
pub const DEFAULT_SURFACE_HYDRO: f64 = 2_500.0;

/// Building contact distance (m) for block grouping
pub const DEFAULT_DISTANCE: f64 = 0.01;

/// Merge barrier layers (roads, rail, large vegetation and water) into RSU input
pub fn prepare_rsu_data() -> ProcessSpec {
    ProcessSpec::new(names::PREPARE_RSU_DATA)
        .input(params::ZONE_TABLE, ParamType::Table)
        .input(params::ROAD_TABLE, ParamType::Table)
        .input(params::RAIL_TABLE, ParamType::Table)
        .input(params::VEGETATION_TABLE, ParamType::Table)
        .input(params::HYDROGRAPHIC_TABLE, ParamType::Table)
        .input_with_default(
            params::SURFACE_VEGETATION,
            ParamType::Float,
            ParamValue::Float(DEFAULT_SURFACE_VEGETATION),
        )
        .input_with_default(
            params::SURFACE_HYDRO,
            ParamType::Float,
            ParamValue::Float(DEFAULT_SURFACE_HYDRO),
        )
        .input(params::PREFIX, ParamType::Text)
        .output(params::OUTPUT_TABLE, ParamType::Table)
}

/// Polygonize the prepared barriers into RSUs
pub fn create_rsu() -> ProcessSpec {
    ProcessSpec::new(names::CREATE_RSU)
        .input(params::INPUT_TABLE, ParamType::Table)
        .input(params::PREFIX, ParamType::Text)
        .output(params::OUTPUT_TABLE, ParamType::Table)
        .output(params::OUTPUT_ID_RSU, ParamType::Column)
}

/// Group buildings in contact into blocks
pub fn create_blocks() -> ProcessSpec {
    ProcessSpec::new(names::CREATE_BLOCKS)
        .input(params::INPUT_TABLE, ParamType::Table)
        .input_with_default(
            params::DISTANCE,
            ParamType::Float,
            ParamValue::Float(DEFAULT_DISTANCE),
        )
        .input(params::PREFIX, ParamType::Text)
        .output(params::OUTPUT_TABLE, ParamType::Table)
        .output(params::OUTPUT_ID_BLOCK, ParamType::Column)
}

/// Copy the lower-scale table, adding the id of the containing upper-scale unit
pub fn create_scales_relations() -> ProcessSpec {
    ProcessSpec::new(names::CREATE_SCALES_RELATIONS)
        .input(params::LOWER_TABLE, ParamType::Table)
        .input(params::UPPER_TABLE, ParamType::Table)
        .input(params::ID_COLUMN_UP, ParamType::Column)
        .input(params::PREFIX, ParamType::Text)
        .output(params::OUTPUT_TABLE, ParamType::Table)
}
