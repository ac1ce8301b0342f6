//! Interception specs and their compilation into wrapper-building contracts.

use crate::errors::TapedeckError;
use crate::replay::target::Target;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub type ArgTransformer = Arc<dyn Fn(Vec<Value>) -> Vec<Value> + Send + Sync>;
pub type ArgKeyFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;
pub type RecordablePredicate = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;
pub type ReturnTransformer = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// User-facing description of one intercepted target. Every strategy is optional.
#[derive(Clone, Default)]
pub struct InterceptionSpec {
    target: Option<Arc<Target>>,
    arg_transformer: Option<ArgTransformer>,
    arg_key_fn: Option<ArgKeyFn>,
    recordable: Option<RecordablePredicate>,
    return_transformer: Option<ReturnTransformer>,
}

impl InterceptionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_target(target: Arc<Target>) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    pub fn target(mut self, target: Arc<Target>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn arg_transformer(
        mut self,
        f: impl Fn(Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    ) -> Self {
        self.arg_transformer = Some(Arc::new(f));
        self
    }

    pub fn arg_key_fn(mut self, f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        self.arg_key_fn = Some(Arc::new(f));
        self
    }

    pub fn recordable(mut self, f: impl Fn(&[Value]) -> bool + Send + Sync + 'static) -> Self {
        self.recordable = Some(Arc::new(f));
        self
    }

    pub fn return_transformer(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.return_transformer = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for InterceptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionSpec")
            .field("target", &self.target.as_ref().map(|t| t.id().to_string()))
            .field("arg_transformer", &self.arg_transformer.is_some())
            .field("arg_key_fn", &self.arg_key_fn.is_some())
            .field("recordable", &self.recordable.is_some())
            .field("return_transformer", &self.return_transformer.is_some())
            .finish()
    }
}

/// Whatever a caller handed to a session entry point as its specs.
#[derive(Debug, Clone)]
pub enum SpecSource {
    List(Vec<InterceptionSpec>),
    Scalar(String),
}

impl From<Vec<InterceptionSpec>> for SpecSource {
    fn from(specs: Vec<InterceptionSpec>) -> Self {
        Self::List(specs)
    }
}

impl<const N: usize> From<[InterceptionSpec; N]> for SpecSource {
    fn from(specs: [InterceptionSpec; N]) -> Self {
        Self::List(specs.into())
    }
}

impl From<&str> for SpecSource {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for SpecSource {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

/// A spec with every default filled in.
#[derive(Clone)]
pub struct CompiledSpec {
    pub target: Arc<Target>,
    pub arg_transformer: ArgTransformer,
    pub arg_key_fn: ArgKeyFn,
    pub recordable: RecordablePredicate,
    pub return_transformer: ReturnTransformer,
}

impl CompiledSpec {
    pub fn target_id(&self) -> &str {
        self.target.id()
    }
}

impl fmt::Debug for CompiledSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSpec")
            .field("target", &self.target.id())
            .finish()
    }
}

pub fn compile_specs(source: impl Into<SpecSource>) -> Result<Vec<CompiledSpec>, TapedeckError> {
    let specs = match source.into() {
        SpecSource::List(specs) => specs,
        SpecSource::Scalar(value) => {
            return Err(TapedeckError::InvalidSpecs(format!(
                "expected a collection of specs, got {value:?}"
            )))
        }
    };

    let mut seen = BTreeSet::new();
    let mut compiled = Vec::with_capacity(specs.len());
    for (idx, spec) in specs.into_iter().enumerate() {
        let target = spec.target.ok_or_else(|| {
            TapedeckError::InvalidSpecs(format!("spec at index {idx} has no target"))
        })?;
        if !seen.insert(target.id().to_string()) {
            return Err(TapedeckError::InvalidSpecs(format!(
                "target {} appears in more than one spec",
                target.id()
            )));
        }
        compiled.push(CompiledSpec {
            target,
            arg_transformer: spec.arg_transformer.unwrap_or_else(default_arg_transformer),
            arg_key_fn: spec.arg_key_fn.unwrap_or_else(default_arg_key_fn),
            recordable: spec.recordable.unwrap_or_else(default_recordable),
            return_transformer: spec
                .return_transformer
                .unwrap_or_else(default_return_transformer),
        });
    }
    Ok(compiled)
}

fn default_arg_transformer() -> ArgTransformer {
    Arc::new(|args: Vec<Value>| args)
}

fn default_arg_key_fn() -> ArgKeyFn {
    Arc::new(|args: &[Value]| Value::Array(args.to_vec()))
}

fn default_recordable() -> RecordablePredicate {
    Arc::new(|_: &[Value]| true)
}

fn default_return_transformer() -> ReturnTransformer {
    Arc::new(|value: Value| value)
}
