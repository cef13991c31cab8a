//! Durable checkpoint manager for workflow execution state.
//!
//! Wraps a `CheckpointStore` to provide the engine-facing API: persisting
//! step outcomes and working out where a resumed run must continue. Resume
//! verification lives here so that every backend gets the same structural
//! checks against the definition being resumed.

use sha2::{Digest, Sha256};
use stepwise_types::checkpoint::{CheckpointStatus, ExecutionCheckpoint};
use stepwise_types::error::StoreError;

use super::store::CheckpointStore;

// ---------------------------------------------------------------------------
// ResumePoint
// ---------------------------------------------------------------------------

/// Where a resumed run continues, derived from the stored checkpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    /// First step number that still has to run (== completed count).
    pub next_step: u32,
    /// State snapshot of the last completed step, if any.
    pub state_json: Option<String>,
    /// Output of the last completed step, if any.
    pub last_output_json: Option<String>,
}

impl ResumePoint {
    /// A resume point for a workflow with no completed steps.
    pub fn fresh() -> Self {
        Self {
            next_step: 0,
            state_json: None,
            last_output_json: None,
        }
    }
}

/// Lowercase hex SHA-256 over the step count and every step name, each
/// length-prefixed. Two step lists share a fingerprint only if they have
/// the same length, order and names.
pub fn definition_fingerprint(step_names: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((step_names.len() as u64).to_le_bytes());
    for name in step_names {
        hasher.update((name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages durable execution checkpoints for workflow runs.
///
/// Generic over `S: CheckpointStore` so it works with any storage backend
/// (SQLite, in-memory, etc.). The engine persists every step outcome through
/// this manager before moving on, which is what makes runs resumable.
pub struct CheckpointManager<S: CheckpointStore> {
    store: S,
}

impl<S: CheckpointStore> CheckpointManager<S> {
    /// Create a new checkpoint manager backed by the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Persist a step outcome. Only terminal statuses are accepted.
    pub async fn record(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), CheckpointError> {
        if !checkpoint.status.is_terminal() {
            return Err(CheckpointError::Corrupt(format!(
                "refusing to persist non-terminal status '{}' for step {}",
                checkpoint.status, checkpoint.step_number
            )));
        }

        self.store.save_checkpoint(checkpoint).await?;

        tracing::debug!(
            workflow_id = checkpoint.workflow_id.as_str(),
            step_number = checkpoint.step_number,
            step_name = checkpoint.step_name.as_str(),
            status = %checkpoint.status,
            checkpoint_id = %checkpoint.id,
            "checkpoint written"
        );

        Ok(())
    }

    /// Delete every checkpoint of a workflow.
    pub async fn purge(&self, workflow_id: &str) -> Result<(), CheckpointError> {
        self.store.purge_workflow_checkpoints(workflow_id).await?;
        tracing::debug!(workflow_id, "checkpoints purged");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recovery helpers
    // -----------------------------------------------------------------------

    /// Whether any checkpoint exists for the workflow.
    pub async fn has_checkpoints(&self, workflow_id: &str) -> Result<bool, CheckpointError> {
        Ok(self.store.get_latest_checkpoint(workflow_id).await?.is_some())
    }

    /// Load the workflow's checkpoints, verify them against `step_names`,
    /// and return where execution must continue.
    ///
    /// Every stored checkpoint must sit at a step number inside the
    /// definition and carry that step's name, and the `Completed`
    /// checkpoints must form the contiguous prefix `0..N`. Checkpoints
    /// tagged with a definition fingerprint must match the fingerprint of
    /// `step_names`, which also rejects steps added, dropped or renamed
    /// past the last checkpoint.
    pub async fn load_resume_point(
        &self,
        workflow_id: &str,
        step_names: &[&str],
    ) -> Result<ResumePoint, CheckpointError> {
        let checkpoints = self.store.get_workflow_checkpoints(workflow_id).await?;

        for cp in &checkpoints {
            let expected = step_names.get(cp.step_number as usize).copied();
            if expected != Some(cp.step_name.as_str()) {
                return Err(CheckpointError::ResumeMismatch {
                    step_number: cp.step_number,
                    expected: expected.unwrap_or("<no such step>").to_string(),
                    found: cp.step_name.clone(),
                });
            }
        }

        let current = definition_fingerprint(step_names);
        for cp in &checkpoints {
            if let Some(stored) = cp.definition_hash.as_deref() {
                if stored != current {
                    return Err(CheckpointError::DefinitionChanged {
                        step_number: cp.step_number,
                        stored: stored.to_string(),
                        current,
                    });
                }
            }
        }

        let mut next_step: u32 = 0;
        let mut last_completed: Option<&ExecutionCheckpoint> = None;
        for cp in &checkpoints {
            if cp.status != CheckpointStatus::Completed {
                continue;
            }
            if cp.step_number != next_step {
                return Err(CheckpointError::CheckpointGap {
                    missing: next_step,
                    found: cp.step_number,
                });
            }
            next_step += 1;
            last_completed = Some(cp);
        }

        let point = match last_completed {
            Some(cp) => ResumePoint {
                next_step,
                state_json: Some(cp.state_json.clone()),
                last_output_json: cp.output_json.clone(),
            },
            None => ResumePoint::fresh(),
        };

        tracing::debug!(
            workflow_id,
            stored = checkpoints.len(),
            next_step = point.next_step,
            "resume point loaded"
        );

        Ok(point)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying store operation failed.
    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),

    /// A record is malformed or must not be written.
    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),

    /// The definition being resumed does not match the stored checkpoints.
    #[error(
        "resume mismatch at step {step_number}: definition has '{expected}', checkpoint has '{found}'"
    )]
    ResumeMismatch {
        step_number: u32,
        expected: String,
        found: String,
    },

    /// The checkpoints were written by a definition with a different
    /// ordered step list (length, order or names).
    #[error(
        "resume mismatch: checkpoint for step {step_number} was written by definition {stored}, resuming with {current}"
    )]
    DefinitionChanged {
        step_number: u32,
        stored: String,
        current: String,
    },

    /// A completed checkpoint exists beyond a step that never completed.
    #[error("checkpoint gap: step {missing} is not completed but step {found} is")]
    CheckpointGap { missing: u32, found: u32 },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
