//! Accumulated workflow state.
//!
//! `WorkflowState` is the value that flows from step to step. Each completed
//! step folds its `StepOutput` into it: `state_updates` are merged into
//! `variables` and the step's value becomes `last_output`. The state is
//! snapshotted into every completed checkpoint and restored from the latest
//! one on resume, so it is kept small and bounded in size.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::definition::WorkflowError;
use super::step::StepOutput;

/// Default maximum size of the serialized state (10 MB).
pub const MAX_STATE_SIZE: usize = 10_485_760;

/// State accumulated across the steps of one workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Values published by steps through `StepOutput::with_state`.
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Output of the most recently completed step.
    #[serde(default)]
    pub last_output: Option<Value>,
    /// Number of steps folded into this state.
    #[serde(default)]
    pub completed_steps: u32,
}

impl WorkflowState {
    /// Empty state for a fresh run.
    pub fn new() -> Self {
        Self::default()
    }

    /// State seeded with initial variables.
    pub fn with_variables(variables: Map<String, Value>) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Fold a completed step's output into the state.
    pub fn apply(&mut self, output: &StepOutput) {
        for (key, value) in &output.state_updates {
            self.variables.insert(key.clone(), value.clone());
        }
        self.last_output = Some(output.value.clone());
        self.completed_steps += 1;
    }

    /// Serialize for a checkpoint, enforcing `max_bytes`.
    pub fn to_json(&self, max_bytes: usize) -> Result<String, WorkflowError> {
        let json = serde_json::to_string(self)
            .map_err(|e| WorkflowError::Serialization(e.to_string()))?;
        if json.len() > max_bytes {
            return Err(WorkflowError::StateTooLarge {
                size: json.len(),
                max: max_bytes,
            });
        }
        Ok(json)
    }

    /// Restore from a checkpoint snapshot.
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(json).map_err(|e| WorkflowError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
