use crate::error::{PipelineError, Result};
use crate::step::StepId;
use async_trait::async_trait;
use geounits_storage::Datastore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Semantic type of a process parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Table identifier in the datastore
    Table,
    /// Column name
    Column,
    /// Numeric threshold or distance
    Float,
    /// Free text (naming prefix)
    Text,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Table => "table",
            ParamType::Column => "column",
            ParamType::Float => "float",
            ParamType::Text => "text",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Table(String),
    Column(String),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn table(name: impl Into<String>) -> Self {
        ParamValue::Table(name.into())
    }

    pub fn column(name: impl Into<String>) -> Self {
        ParamValue::Column(name.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        ParamValue::Text(value.into())
    }

    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Table(_) => ParamType::Table,
            ParamValue::Column(_) => ParamType::Column,
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Text(_) => ParamType::Text,
        }
    }

    pub fn as_table(&self) -> Option<&str> {
        match self {
            ParamValue::Table(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_column(&self) -> Option<&str> {
        match self {
            ParamValue::Column(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Table(v) | ParamValue::Column(v) | ParamValue::Text(v) => {
                write!(f, "{}", v)
            }
            ParamValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Declared input parameter
#[derive(Debug, Clone, PartialEq)]
pub struct InputParam {
    pub name: &'static str,
    pub ty: ParamType,
    pub default: Option<ParamValue>,
}

/// Declared output parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputParam {
    pub name: &'static str,
    pub ty: ParamType,
}

/// Static parameter schema of a process
///
/// Inputs and outputs keep their declaration order; arguments are bound in
/// that order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
    pub name: &'static str,
    pub inputs: Vec<InputParam>,
    pub outputs: Vec<OutputParam>,
}

impl ProcessSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, name: &'static str, ty: ParamType) -> Self {
        self.inputs.push(InputParam {
            name,
            ty,
            default: None,
        });
        self
    }

    pub fn input_with_default(
        mut self,
        name: &'static str,
        ty: ParamType,
        default: ParamValue,
    ) -> Self {
        debug_assert_eq!(default.param_type(), ty);
        self.inputs.push(InputParam {
            name,
            ty,
            default: Some(default),
        });
        self
    }

    pub fn output(mut self, name: &'static str, ty: ParamType) -> Self {
        self.outputs.push(OutputParam { name, ty });
        self
    }

    pub fn find_input(&self, name: &str) -> Option<&InputParam> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&OutputParam> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

/// Arguments of one process invocation, in input declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoundArguments {
    values: Vec<(&'static str, ParamValue)>,
}

impl BoundArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: &'static str, value: ParamValue) {
        self.values.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn table(&self, name: &str) -> anyhow::Result<&str> {
        self.get(name)
            .and_then(ParamValue::as_table)
            .ok_or_else(|| anyhow::anyhow!("missing table argument '{}'", name))
    }

    pub fn column(&self, name: &str) -> anyhow::Result<&str> {
        self.get(name)
            .and_then(ParamValue::as_column)
            .ok_or_else(|| anyhow::anyhow!("missing column argument '{}'", name))
    }

    pub fn float(&self, name: &str) -> anyhow::Result<f64> {
        self.get(name)
            .and_then(ParamValue::as_float)
            .ok_or_else(|| anyhow::anyhow!("missing numeric argument '{}'", name))
    }

    pub fn text(&self, name: &str) -> anyhow::Result<&str> {
        self.get(name)
            .and_then(ParamValue::as_text)
            .ok_or_else(|| anyhow::anyhow!("missing text argument '{}'", name))
    }
}

/// Output name → value reported by a successful process
pub type ProcessOutputs = BTreeMap<String, ParamValue>;

/// Result of a process execution
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Succeeded(ProcessOutputs),
    /// Domain failure; carries no usable outputs
    Failed { reason: String },
}

impl ProcessOutcome {
    pub fn success<I, K>(outputs: I) -> Self
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: Into<String>,
    {
        ProcessOutcome::Succeeded(outputs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        ProcessOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Succeeded(_))
    }
}

/// Context passed to every process invocation
#[derive(Clone)]
pub struct ProcessContext {
    pub run_id: Uuid,
    pub step: StepId,
    pub datastore: Arc<dyn Datastore>,
}

/// Process trait (pluggable geoprocessing collaborators)
///
/// An implementation returning `Ok(ProcessOutcome::Failed { .. })` and one
/// returning `Err(_)` abort the pipeline the same way.
#[async_trait]
pub trait Process: Send + Sync {
    /// Declared parameter schema
    fn spec(&self) -> &ProcessSpec;

    /// Execute with fully bound arguments
    async fn execute(
        &self,
        args: BoundArguments,
        ctx: &ProcessContext,
    ) -> anyhow::Result<ProcessOutcome>;
}

/// Processes available to the orchestrator, keyed by process name
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    processes: HashMap<&'static str, Arc<dyn Process>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a process; replaces any process with the same name
    pub fn register(&mut self, process: Arc<dyn Process>) {
        self.processes.insert(process.spec().name, process);
    }

    pub fn with(mut self, process: Arc<dyn Process>) -> Self {
        self.register(process);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Process>> {
        self.processes
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::ProcessNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}
