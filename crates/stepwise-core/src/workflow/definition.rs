//! Workflow definition building, parsing, and validation.
//!
//! A `WorkflowDefinition` is the runnable form of a workflow: an id, a name,
//! and an ordered list of `ExecutionStep`s whose handlers are already
//! resolved. Definitions are built in code with the builder methods or from
//! a declarative `WorkflowSpec` (YAML/JSON) against a `StepRegistry`, which
//! rejects unknown step kinds before anything runs.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use stepwise_types::workflow::{RetryConfig, StepKind, WorkflowSpec};
use thiserror::Error;

use super::registry::StepRegistry;
use super::step::BoxStepHandler;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while building or running a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A step names a kind with no registered handler.
    #[error("step '{step}' has kind '{kind}' but no handler is registered for it")]
    UnknownStepKind { step: String, kind: StepKind },

    /// Serialized workflow state exceeds the configured bound.
    #[error("workflow state is {size} bytes, exceeding the {max} byte limit")]
    StateTooLarge { size: usize, max: usize },

    /// State, input, or output could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// ExecutionStep
// ---------------------------------------------------------------------------

/// One runnable step: a name, declared input, handler, and policy overrides.
#[derive(Debug, Clone)]
pub struct ExecutionStep {
    pub name: String,
    pub input: Value,
    pub handler: BoxStepHandler,
    /// Retry override; the engine default applies when `None`.
    pub retry: Option<RetryConfig>,
    /// Per-attempt timeout override; the engine default applies when `None`.
    pub timeout: Option<Duration>,
}

impl ExecutionStep {
    pub fn new(name: impl Into<String>, handler: BoxStepHandler) -> Self {
        Self {
            name: name.into(),
            input: Value::Null,
            handler,
            retry: None,
            timeout: None,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// An ordered, linear chain of steps executed as one unit.
///
/// The position of a step is its step number. Resuming a run requires a
/// definition with the same step names in the same order.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub steps: Vec<ExecutionStep>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn step(mut self, step: ExecutionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Check structural constraints before execution.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        validate_header(&self.id, &self.name, self.steps.len())?;
        validate_step_names(self.steps.iter().map(|s| s.name.as_str()))?;
        for step in &self.steps {
            if let Some(retry) = &step.retry {
                validate_retry(&step.name, retry)?;
            }
            if step.timeout == Some(Duration::ZERO) {
                return Err(WorkflowError::ValidationError(format!(
                    "step '{}': timeout must be > 0",
                    step.name
                )));
            }
        }
        if u32::try_from(self.steps.len()).is_err() {
            return Err(WorkflowError::ValidationError(format!(
                "workflow has {} steps, more than step numbers can address",
                self.steps.len()
            )));
        }
        Ok(())
    }

    /// Resolve a declarative spec into a runnable definition.
    ///
    /// Every step kind must have a handler in `registry`; the first one that
    /// does not fails the build with `UnknownStepKind`.
    pub fn from_spec(spec: &WorkflowSpec, registry: &StepRegistry) -> Result<Self, WorkflowError> {
        validate_spec(spec)?;

        let mut def = WorkflowDefinition::new(spec.id.clone(), spec.name.clone());
        for step in &spec.steps {
            let handler = registry
                .get(step.kind)
                .cloned()
                .ok_or_else(|| WorkflowError::UnknownStepKind {
                    step: step.name.clone(),
                    kind: step.kind,
                })?;
            def.steps.push(ExecutionStep {
                name: step.name.clone(),
                input: step.input.clone(),
                handler,
                retry: step.retry.clone(),
                timeout: step.timeout_secs.map(Duration::from_secs),
            });
        }
        Ok(def)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML (or JSON) string into a validated `WorkflowSpec`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowSpec, WorkflowError> {
    let spec: WorkflowSpec =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Serialize a `WorkflowSpec` to YAML.
pub fn serialize_workflow_yaml(spec: &WorkflowSpec) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(spec).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Load and validate a workflow spec file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowSpec, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowSpec`.
///
/// Checks:
/// - Id and name are non-empty
/// - At least one step exists
/// - Step names are non-empty and unique
/// - Retry overrides allow at least one attempt and do not shrink delays
/// - Timeouts are > 0 if set
pub fn validate_spec(spec: &WorkflowSpec) -> Result<(), WorkflowError> {
    validate_header(&spec.id, &spec.name, spec.steps.len())?;
    validate_step_names(spec.steps.iter().map(|s| s.name.as_str()))?;

    for step in &spec.steps {
        if let Some(retry) = &step.retry {
            validate_retry(&step.name, retry)?;
        }
        if step.timeout_secs == Some(0) {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}': timeout must be > 0",
                step.name
            )));
        }
    }

    Ok(())
}

fn validate_header(id: &str, name: &str, step_count: usize) -> Result<(), WorkflowError> {
    if id.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow id must not be empty".to_string(),
        ));
    }
    if name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }
    if step_count == 0 {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }
    Ok(())
}

fn validate_step_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), WorkflowError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(WorkflowError::ValidationError(
                "step name must not be empty".to_string(),
            ));
        }
        if !seen.insert(name) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step name: '{name}'"
            )));
        }
    }
    Ok(())
}

fn validate_retry(step: &str, retry: &RetryConfig) -> Result<(), WorkflowError> {
    if retry.max_attempts < 1 {
        return Err(WorkflowError::ValidationError(format!(
            "step '{step}': max_attempts must be >= 1"
        )));
    }
    if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
        return Err(WorkflowError::ValidationError(format!(
            "step '{step}': backoff_factor must be a finite number >= 1.0"
        )));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(WorkflowError::ValidationError(format!(
            "step '{step}': max_delay_ms must be >= initial_delay_ms"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::{StepContext, StepOutput, fn_step};
    use serde_json::json;

    fn echo() -> BoxStepHandler {
        fn_step(|ctx: StepContext| async move { Ok(StepOutput::new(ctx.input)) })
    }

    fn registry() -> StepRegistry {
        StepRegistry::new()
            .with(StepKind::Compute, echo())
            .with(StepKind::Tool, echo())
    }

    const PIPELINE: &str = r#"
id: nightly-2024-06-01
name: nightly-export
description: Export and publish the nightly report
steps:
  - name: extract
    kind: tool
    input: { table: orders }
  - name: transform
    kind: compute
    retry:
      max_attempts: 5
      jitter: false
  - name: publish
    kind: tool
    timeout_secs: 30
"#;

    #[test]
    fn parse_yaml_spec() {
        let spec = parse_workflow_yaml(PIPELINE).expect("should parse");
        assert_eq!(spec.name, "nightly-export");
        assert_eq!(spec.steps.len(), 3);
        assert_eq!(spec.steps[0].input, json!({"table": "orders"}));
        assert_eq!(spec.steps[1].retry.as_ref().map(|r| r.max_attempts), Some(5));
        assert_eq!(spec.steps[2].timeout_secs, Some(30));

        let yaml = serialize_workflow_yaml(&spec).unwrap();
        assert_eq!(parse_workflow_yaml(&yaml).unwrap(), spec);
    }

    #[test]
    fn parse_json_spec() {
        let json = r#"{"id": "j1", "name": "json", "steps": [{"name": "only", "kind": "compute"}]}"#;
        let spec = parse_workflow_yaml(json).unwrap();
        assert_eq!(spec.steps[0].kind, StepKind::Compute);
        assert_eq!(spec.steps[0].input, Value::Null);
    }

    #[test]
    fn parse_rejects_malformed_yaml() {
        let err = parse_workflow_yaml("id: [unterminated").unwrap_err();
        assert!(matches!(err, WorkflowError::ParseError(_)));
    }

    #[test]
    fn parse_rejects_unknown_kind_name() {
        let yaml = "id: a\nname: b\nsteps:\n  - name: s\n    kind: teleport\n";
        assert!(matches!(
            parse_workflow_yaml(yaml).unwrap_err(),
            WorkflowError::ParseError(_)
        ));
    }

    #[test]
    fn validation_rejects_duplicate_step_names() {
        let yaml = "id: a\nname: b\nsteps:\n  - {name: s, kind: tool}\n  - {name: s, kind: tool}\n";
        let msg = parse_workflow_yaml(yaml).unwrap_err().to_string();
        assert!(msg.contains("duplicate step name"), "got: {msg}");
    }

    #[test]
    fn validation_rejects_empty_workflow() {
        let msg = parse_workflow_yaml("id: a\nname: b\nsteps: []\n")
            .unwrap_err()
            .to_string();
        assert!(msg.contains("at least one step"), "got: {msg}");
    }

    #[test]
    fn validation_rejects_empty_id() {
        let msg = parse_workflow_yaml("id: ''\nname: b\nsteps: [{name: s, kind: tool}]\n")
            .unwrap_err()
            .to_string();
        assert!(msg.contains("id must not be empty"), "got: {msg}");
    }

    #[test]
    fn validation_rejects_zero_attempts_and_timeout() {
        let yaml = "id: a\nname: b\nsteps:\n  - {name: s, kind: tool, retry: {max_attempts: 0}}\n";
        let msg = parse_workflow_yaml(yaml).unwrap_err().to_string();
        assert!(msg.contains("max_attempts must be >= 1"), "got: {msg}");

        let yaml = "id: a\nname: b\nsteps:\n  - {name: s, kind: tool, timeout_secs: 0}\n";
        let msg = parse_workflow_yaml(yaml).unwrap_err().to_string();
        assert!(msg.contains("timeout must be > 0"), "got: {msg}");
    }

    #[test]
    fn validation_rejects_shrinking_backoff() {
        let yaml =
            "id: a\nname: b\nsteps:\n  - {name: s, kind: tool, retry: {backoff_factor: 0.5}}\n";
        let msg = parse_workflow_yaml(yaml).unwrap_err().to_string();
        assert!(msg.contains("backoff_factor"), "got: {msg}");
    }

    #[test]
    fn from_spec_resolves_handlers() {
        let spec = parse_workflow_yaml(PIPELINE).unwrap();
        let def = WorkflowDefinition::from_spec(&spec, &registry()).unwrap();
        assert_eq!(def.id, "nightly-2024-06-01");
        assert_eq!(def.step_names(), vec!["extract", "transform", "publish"]);
        assert_eq!(def.steps[2].timeout, Some(Duration::from_secs(30)));
        assert!(def.steps[0].retry.is_none());
        def.validate().unwrap();
    }

    #[test]
    fn from_spec_rejects_unregistered_kind() {
        let spec = parse_workflow_yaml(
            "id: a\nname: b\nsteps:\n  - {name: ok, kind: tool}\n  - {name: review, kind: approval}\n",
        )
        .unwrap();
        match WorkflowDefinition::from_spec(&spec, &registry()).unwrap_err() {
            WorkflowError::UnknownStepKind { step, kind } => {
                assert_eq!(step, "review");
                assert_eq!(kind, StepKind::Approval);
            }
            other => panic!("expected UnknownStepKind, got {other:?}"),
        }
    }

    #[test]
    fn builder_definition_validates() {
        let def = WorkflowDefinition::new("wf", "demo")
            .step(ExecutionStep::new("a", echo()).with_input(json!(1)))
            .step(ExecutionStep::new("b", echo()).with_retry(RetryConfig::fixed(2, 0)));
        def.validate().unwrap();

        let dup = def.clone().step(ExecutionStep::new("a", echo()));
        assert!(dup.validate().is_err());

        let zero = WorkflowDefinition::new("wf", "demo")
            .step(ExecutionStep::new("a", echo()).with_timeout(Duration::ZERO));
        assert!(zero.validate().is_err());

        assert!(WorkflowDefinition::new("wf", "demo").validate().is_err());
    }

    #[test]
    fn load_workflow_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, PIPELINE).unwrap();

        let spec = load_workflow_file(&path).unwrap();
        assert_eq!(spec.steps.len(), 3);

        let missing = load_workflow_file(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(missing, WorkflowError::IoError(_)));
    }
}
