//! Parameter binding between steps
//!
//! Outputs of completed steps are recorded under `"<step>.<output>"` and are
//! never overwritten. Binding is a pure function of the recorded outputs, the
//! external inputs and the step's declared schema.

use crate::dag::StepNode;
use crate::error::BindingError;
use crate::process::{BoundArguments, ParamValue, ProcessOutputs};
use crate::step::StepId;
use std::collections::BTreeMap;
use std::fmt;

/// Where a step input gets its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    /// Top-level pipeline input
    External(&'static str),
    /// Output of an earlier step
    StepOutput { step: StepId, output: &'static str },
}

impl BindingSource {
    pub fn external(key: &'static str) -> Self {
        BindingSource::External(key)
    }

    pub fn output(step: StepId, output: &'static str) -> Self {
        BindingSource::StepOutput { step, output }
    }

    /// Producing step, for output bindings
    pub fn producer(&self) -> Option<StepId> {
        match self {
            BindingSource::External(_) => None,
            BindingSource::StepOutput { step, .. } => Some(*step),
        }
    }
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingSource::External(key) => write!(f, "external:{}", key),
            BindingSource::StepOutput { step, output } => write!(f, "{}", output_key(*step, output)),
        }
    }
}

/// Context key of a step output
pub fn output_key(step: StepId, output: &str) -> String {
    format!("{}.{}", step, output)
}

/// Accumulated result context of a run
#[derive(Debug, Clone, Default)]
pub struct BindingContext {
    external: BTreeMap<String, ParamValue>,
    outputs: BTreeMap<String, ParamValue>,
}

impl BindingContext {
    pub fn new(external: BTreeMap<String, ParamValue>) -> Self {
        Self {
            external,
            outputs: BTreeMap::new(),
        }
    }

    /// Record the outputs of a completed step
    ///
    /// Keys already present keep their first value.
    pub fn record(&mut self, step: StepId, outputs: &ProcessOutputs) {
        for (name, value) in outputs {
            self.outputs
                .entry(output_key(step, name))
                .or_insert_with(|| value.clone());
        }
    }

    pub fn external(&self, key: &str) -> Option<&ParamValue> {
        self.external.get(key)
    }

    pub fn output(&self, step: StepId, output: &str) -> Option<&ParamValue> {
        self.outputs.get(&output_key(step, output))
    }

    pub fn resolve(&self, source: &BindingSource) -> Option<&ParamValue> {
        match source {
            BindingSource::External(key) => self.external(key),
            BindingSource::StepOutput { step, output } => self.output(*step, output),
        }
    }

    /// Recorded outputs, keyed `"<step>.<output>"`
    pub fn outputs(&self) -> &BTreeMap<String, ParamValue> {
        &self.outputs
    }
}

/// Maps recorded outputs and external inputs onto a step's declared inputs
pub struct ParameterBinder;

impl ParameterBinder {
    /// Build the argument set for `node`
    ///
    /// Per declared input: explicit binding, then declared default, else
    /// `MissingBinding`. Defaults only stand in for absent external inputs;
    /// an output binding to a step that produced nothing is always an error.
    /// Resolved values must match the declared type.
    pub fn bind(node: &StepNode, ctx: &BindingContext) -> Result<BoundArguments, BindingError> {
        let mut args = BoundArguments::new();

        for input in &node.process.inputs {
            let value = match node.binding_for(input.name) {
                Some(source) => match ctx.resolve(source) {
                    Some(value) => value.clone(),
                    None => match (source, &input.default) {
                        (BindingSource::External(_), Some(default)) => default.clone(),
                        (BindingSource::External(key), None) => {
                            return Err(BindingError::MissingExternal {
                                param: input.name.to_string(),
                                key: key.to_string(),
                            })
                        }
                        (BindingSource::StepOutput { step, output }, _) => {
                            return Err(BindingError::UnresolvedOutput {
                                param: input.name.to_string(),
                                output: output_key(*step, output),
                            })
                        }
                    },
                },
                None => match &input.default {
                    Some(default) => default.clone(),
                    None => {
                        return Err(BindingError::MissingBinding {
                            param: input.name.to_string(),
                        })
                    }
                },
            };

            if value.param_type() != input.ty {
                return Err(BindingError::TypeMismatch {
                    param: input.name.to_string(),
                    expected: input.ty,
                    found: value.param_type(),
                });
            }

            args.push(input.name, value);
        }

        Ok(args)
    }
}
