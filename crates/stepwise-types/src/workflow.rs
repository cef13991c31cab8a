//! Workflow domain types for Stepwise.
//!
//! Declarative workflow specs (`WorkflowSpec`, `StepSpec`) describe a linear
//! chain of steps in YAML or JSON; the engine resolves them into executable
//! definitions. This module also holds per-step retry configuration and the
//! `WorkflowResult` returned from execute/resume.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Workflow Spec (declarative form)
// ---------------------------------------------------------------------------

/// Declarative description of a workflow.
///
/// Step order is significant: a step's position is its step number, and
/// resuming a run requires the same ordered list of step names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Identifies the workflow run; groups its checkpoints.
    pub id: String,
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered list of steps.
    pub steps: Vec<StepSpec>,
}

/// A single step in a workflow spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step name, unique within the workflow.
    pub name: String,
    /// Which registered handler runs this step.
    pub kind: StepKind,
    /// Declared input passed to the handler.
    #[serde(default)]
    pub input: serde_json::Value,
    /// Retry override (engine default when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    /// Per-attempt timeout in seconds (engine default when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// The kind of work a step performs.
///
/// Kinds are resolved against a step registry when a definition is built,
/// so a spec naming a kind with no registered handler is rejected before
/// anything runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Delegates to an agent collaborator.
    Agent,
    /// Invokes an external tool or service.
    Tool,
    /// Pure in-process computation.
    Compute,
    /// Waits on an external approval callback.
    Approval,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepKind::Agent => "agent",
            StepKind::Tool => "tool",
            StepKind::Compute => "compute",
            StepKind::Approval => "approval",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Retry Configuration
// ---------------------------------------------------------------------------

/// Retry configuration for a workflow step.
///
/// The delay before retry `k` (1-based) is
/// `min(initial_delay_ms * backoff_factor^(k-1), max_delay_ms)`, scaled by a
/// random factor in `[0.5, 1.5]` when `jitter` is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default 200).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Multiplier applied per retry (default 2.0).
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound on any single delay in milliseconds (default 800).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomize delays (default true).
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    800
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Deterministic policy with a fixed base delay and no jitter.
    pub fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: delay_ms,
            backoff_factor: 1.0,
            max_delay_ms: delay_ms,
            jitter: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow Result
// ---------------------------------------------------------------------------

/// Outcome of an execute or resume call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// The workflow that ran.
    pub workflow_id: String,
    /// True iff every step reached `Completed`.
    pub success: bool,
    /// Output of the last executed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<serde_json::Value>,
    /// Steps completed so far, including ones completed by earlier calls.
    pub completed_steps: u32,
    /// Number of steps in the definition.
    pub total_steps: u32,
    /// Wall-clock time of this call, backoff sleeps included.
    pub total_duration_ms: u64,
    /// Step number that exhausted its retries, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<u32>,
    /// Error message of the failed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retry_config_defaults_from_empty_yaml() {
        let config: RetryConfig = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(config, RetryConfig::default());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay_ms, 200);
        assert_eq!(config.max_delay_ms, 800);
        assert!(config.jitter);
    }

    #[test]
    fn test_retry_config_partial_override() {
        let config: RetryConfig =
            serde_yaml_ng::from_str("max_attempts: 5\njitter: false").unwrap();
        assert_eq!(config.max_attempts, 5);
        assert!(!config.jitter);
        assert_eq!(config.backoff_factor, 2.0);
    }

    #[test]
    fn test_fixed_retry_has_no_growth() {
        let config = RetryConfig::fixed(4, 10);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_delay_ms, config.max_delay_ms);
        assert!(!config.jitter);
    }

    #[test]
    fn test_step_kind_serde() {
        for (kind, name) in [
            (StepKind::Agent, "agent"),
            (StepKind::Tool, "tool"),
            (StepKind::Compute, "compute"),
            (StepKind::Approval, "approval"),
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(name));
            assert_eq!(kind.to_string(), name);
        }
    }

    #[test]
    fn test_parse_realistic_yaml_spec() {
        let yaml = r#"
id: quarterly-report-2024q3
name: quarterly-report
description: Collect figures and draft the report
steps:
  - name: collect
    kind: tool
    input:
      source: ledger
    timeout_secs: 60
  - name: draft
    kind: agent
    retry:
      max_attempts: 5
      initial_delay_ms: 100
  - name: sign-off
    kind: approval
"#;
        let spec: WorkflowSpec = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(spec.steps.len(), 3);
        assert_eq!(spec.steps[0].kind, StepKind::Tool);
        assert_eq!(spec.steps[0].input, json!({"source": "ledger"}));
        assert_eq!(spec.steps[0].timeout_secs, Some(60));
        assert_eq!(spec.steps[1].retry.as_ref().unwrap().max_attempts, 5);
        assert_eq!(spec.steps[2].input, serde_json::Value::Null);
    }

    #[test]
    fn test_workflow_result_json_roundtrip() {
        let result = WorkflowResult {
            workflow_id: "wf".to_string(),
            success: false,
            final_output: Some(json!({"rows": 3})),
            completed_steps: 1,
            total_steps: 3,
            total_duration_ms: 250,
            failed_step: Some(1),
            error: Some("boom".to_string()),
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: WorkflowResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
