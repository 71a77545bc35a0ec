use crate::config::ConfigError;
use crate::process::ParamType;
use crate::step::StepId;
use geounits_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Binding failed for step '{step}': {source}")]
    Binding {
        step: StepId,
        #[source]
        source: BindingError,
    },

    #[error("Step '{step}' failed: {reason}")]
    StepExecution { step: StepId, reason: String },

    #[error("Invalid pipeline plan: {0}")]
    InvalidPlan(String),

    #[error("No process registered for '{0}'")]
    ProcessNotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl PipelineError {
    pub fn binding(step: StepId, source: BindingError) -> Self {
        Self::Binding { step, source }
    }

    pub fn step_failed(step: StepId, reason: impl Into<String>) -> Self {
        Self::StepExecution {
            step,
            reason: reason.into(),
        }
    }

    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan(message.into())
    }

    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }

    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::Parse(e.to_string())
    }

    /// Step the error is attributed to, if any
    pub fn step(&self) -> Option<StepId> {
        match self {
            Self::Binding { step, .. } | Self::StepExecution { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Failure to build the argument set of a step
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("no binding for input parameter '{param}'")]
    MissingBinding { param: String },

    #[error("external input '{key}' for parameter '{param}' was not supplied")]
    MissingExternal { param: String, key: String },

    #[error("parameter '{param}' is bound to '{output}', which has not been produced")]
    UnresolvedOutput { param: String, output: String },

    #[error("parameter '{param}' expects a {expected} value, got {found}")]
    TypeMismatch {
        param: String,
        expected: ParamType,
        found: ParamType,
    },

    #[error("input table '{table}' for parameter '{param}' does not exist")]
    MissingInputTable { param: String, table: String },
}

impl BindingError {
    /// Name of the parameter that could not be bound
    pub fn param(&self) -> &str {
        match self {
            Self::MissingBinding { param }
            | Self::MissingExternal { param, .. }
            | Self::UnresolvedOutput { param, .. }
            | Self::TypeMismatch { param, .. }
            | Self::MissingInputTable { param, .. } => param,
        }
    }
}
