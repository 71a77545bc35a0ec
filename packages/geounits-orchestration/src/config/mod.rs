//! Pipeline configuration
//!
//! A run is described by a [`UnitsInput`] (table names, thresholds, naming
//! prefix) and [`OrchestratorSettings`]. Both can be built in code or loaded
//! together from a versioned YAML file:
//!
//! ```yaml
//! version: 1
//! input:
//!   zone_table: Z1
//!   building_table: BU
//!   road_table: RD
//!   rail_table: RL
//!   vegetation_table: VG
//!   hydrographic_table: HY
//!   distance: 0.01
//!   prefix: p1
//! orchestrator:
//!   execution_mode: concurrent
//! ```

pub mod error;

pub use error::{ConfigError, ConfigResult};

use crate::process::ParamValue;
use crate::specs::params;
use geounits_storage::is_valid_identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Supported YAML schema versions
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Top-level inputs of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitsInput {
    pub zone_table: String,
    pub building_table: String,
    pub road_table: String,
    pub rail_table: String,
    pub vegetation_table: String,
    pub hydrographic_table: String,

    /// Minimum vegetation area (m²); process default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_vegetation: Option<f64>,

    /// Minimum water area (m²); process default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_hydro: Option<f64>,

    /// Building contact distance (m); process default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,

    /// Prefix of every table the run creates
    pub prefix: String,
}

impl UnitsInput {
    pub fn new(
        zone_table: impl Into<String>,
        building_table: impl Into<String>,
        road_table: impl Into<String>,
        rail_table: impl Into<String>,
        vegetation_table: impl Into<String>,
        hydrographic_table: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            zone_table: zone_table.into(),
            building_table: building_table.into(),
            road_table: road_table.into(),
            rail_table: rail_table.into(),
            vegetation_table: vegetation_table.into(),
            hydrographic_table: hydrographic_table.into(),
            surface_vegetation: None,
            surface_hydro: None,
            distance: None,
            prefix: prefix.into(),
        }
    }

    pub fn surface_vegetation(mut self, area: f64) -> Self {
        self.surface_vegetation = Some(area);
        self
    }

    pub fn surface_hydro(mut self, area: f64) -> Self {
        self.surface_hydro = Some(area);
        self
    }

    pub fn distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("zone_table", &self.zone_table),
            ("building_table", &self.building_table),
            ("road_table", &self.road_table),
            ("rail_table", &self.rail_table),
            ("vegetation_table", &self.vegetation_table),
            ("hydrographic_table", &self.hydrographic_table),
            ("prefix", &self.prefix),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Empty(field.to_string()));
            }
            if !is_valid_identifier(value) {
                return Err(ConfigError::invalid_name(field, value.as_str()));
            }
        }

        for (field, value) in [
            ("surface_vegetation", self.surface_vegetation),
            ("surface_hydro", self.surface_hydro),
            ("distance", self.distance),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(ConfigError::range(
                        field,
                        v,
                        "Expected a finite, non-negative number",
                    ));
                }
            }
        }

        Ok(())
    }

    /// External parameter values keyed by parameter name
    ///
    /// Unset thresholds are left out so the process defaults apply.
    pub fn external_inputs(&self) -> BTreeMap<String, ParamValue> {
        let mut map = BTreeMap::new();

        for (key, table) in [
            (params::ZONE_TABLE, &self.zone_table),
            (params::BUILDING_TABLE, &self.building_table),
            (params::ROAD_TABLE, &self.road_table),
            (params::RAIL_TABLE, &self.rail_table),
            (params::VEGETATION_TABLE, &self.vegetation_table),
            (params::HYDROGRAPHIC_TABLE, &self.hydrographic_table),
        ] {
            map.insert(key.to_string(), ParamValue::table(table.as_str()));
        }

        for (key, value) in [
            (params::SURFACE_VEGETATION, self.surface_vegetation),
            (params::SURFACE_HYDRO, self.surface_hydro),
            (params::DISTANCE, self.distance),
        ] {
            if let Some(v) = value {
                map.insert(key.to_string(), ParamValue::Float(v));
            }
        }

        map.insert(
            params::PREFIX.to_string(),
            ParamValue::text(self.prefix.as_str()),
        );
        map
    }
}

/// Step scheduling mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One step at a time, in declared order
    #[default]
    Sequential,
    /// Independent steps of a phase run together
    Concurrent,
}

/// Orchestrator behaviour switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorSettings {
    pub execution_mode: ExecutionMode,
    /// Check that every external input table exists before step 1
    pub verify_input_tables: bool,
    /// Drop tables that are not part of the result after a successful run
    pub drop_intermediate_tables: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Sequential,
            verify_input_tables: true,
            drop_intermediate_tables: false,
        }
    }
}

impl OrchestratorSettings {
    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn verify_input_tables(mut self, enabled: bool) -> Self {
        self.verify_input_tables = enabled;
        self
    }

    pub fn drop_intermediate_tables(mut self, enabled: bool) -> Self {
        self.drop_intermediate_tables = enabled;
        self
    }
}

/// YAML schema v1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Schema version (always 1 for v1)
    pub version: u32,

    pub input: UnitsInput,

    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

impl PipelineConfig {
    pub fn new(input: UnitsInput) -> Self {
        Self {
            version: 1,
            input,
            orchestrator: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.orchestrator = settings;
        self
    }

    /// Load and validate a YAML configuration file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;

        // Version check before the schema, so old files get a clear message
        let version = value
            .get("version")
            .ok_or(ConfigError::MissingVersion)?
            .as_u64();
        if let Some(found) = version {
            if !SUPPORTED_VERSIONS.iter().any(|v| u64::from(*v) == found) {
                return Err(ConfigError::UnsupportedVersion {
                    found,
                    supported: SUPPORTED_VERSIONS.to_vec(),
                });
            }
        }

        let config: PipelineConfig = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        serde_yaml::to_string(self).map_err(ConfigError::Yaml)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version) {
            return Err(ConfigError::UnsupportedVersion {
                found: u64::from(self.version),
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }
        self.input.validate()
    }
}
