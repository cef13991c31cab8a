//! Checkpoint records: the durable unit of workflow progress.
//!
//! One `ExecutionCheckpoint` is written per concluded step (completed or
//! failed after exhausting retries). Checkpoints are immutable once written;
//! a later write for the same `(workflow_id, step_number)` supersedes the
//! earlier one in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CheckpointStatus
// ---------------------------------------------------------------------------

/// Status of a step within a workflow run.
///
/// `Pending` and `Running` are transient engine states; only the terminal
/// states (`Completed`, `Failed`, `Skipped`) are ever persisted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl CheckpointStatus {
    /// Whether no further transition is allowed out of this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CheckpointStatus::Completed | CheckpointStatus::Failed | CheckpointStatus::Skipped
        )
    }

    /// Stable lowercase name, used as the persisted column value.
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Running => "running",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
            CheckpointStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CheckpointStatus::Pending),
            "running" => Ok(CheckpointStatus::Running),
            "completed" => Ok(CheckpointStatus::Completed),
            "failed" => Ok(CheckpointStatus::Failed),
            "skipped" => Ok(CheckpointStatus::Skipped),
            other => Err(format!("invalid checkpoint status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionCheckpoint
// ---------------------------------------------------------------------------

/// Durable record of one step's outcome within a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCheckpoint {
    /// UUIDv7 assigned at write time.
    pub id: Uuid,
    /// Owning workflow run.
    pub workflow_id: String,
    /// 0-based position of the step in the workflow.
    pub step_number: u32,
    /// Step name (audit and resume verification).
    pub step_name: String,
    /// Outcome of the step.
    pub status: CheckpointStatus,
    /// Number of attempts made (1-based).
    pub attempts: u32,
    /// Serialized workflow state after this step.
    pub state_json: String,
    /// Serialized step input.
    pub input_json: String,
    /// Serialized step output (absent for failed steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_json: Option<String>,
    /// Error message; present iff `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the checkpoint was written.
    pub created_at: DateTime<Utc>,
    /// Work time across all attempts, excluding backoff sleeps.
    pub execution_duration_ms: u64,
    /// Fingerprint of the full ordered step list of the definition that
    /// wrote this checkpoint. Resume refuses a definition whose fingerprint
    /// differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_hash: Option<String>,
}

impl ExecutionCheckpoint {
    /// Build a `Completed` checkpoint.
    #[allow(clippy::too_many_arguments)]
    pub fn completed(
        workflow_id: &str,
        step_number: u32,
        step_name: &str,
        attempts: u32,
        state_json: String,
        input_json: String,
        output_json: String,
        execution_duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id: workflow_id.to_string(),
            step_number,
            step_name: step_name.to_string(),
            status: CheckpointStatus::Completed,
            attempts,
            state_json,
            input_json,
            output_json: Some(output_json),
            error_message: None,
            created_at: Utc::now(),
            execution_duration_ms,
            definition_hash: None,
        }
    }

    /// Build a `Failed` checkpoint. The state snapshot is the state the
    /// step was invoked with, since a failed step contributes nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn failed(
        workflow_id: &str,
        step_number: u32,
        step_name: &str,
        attempts: u32,
        state_json: String,
        input_json: String,
        error: &str,
        execution_duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id: workflow_id.to_string(),
            step_number,
            step_name: step_name.to_string(),
            status: CheckpointStatus::Failed,
            attempts,
            state_json,
            input_json,
            output_json: None,
            error_message: Some(error.to_string()),
            created_at: Utc::now(),
            execution_duration_ms,
            definition_hash: None,
        }
    }

    /// Tag the checkpoint with the fingerprint of its definition.
    pub fn with_definition_hash(mut self, hash: impl Into<String>) -> Self {
        self.definition_hash = Some(hash.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == CheckpointStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
