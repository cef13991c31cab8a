//! Lifecycle events broadcast while a workflow runs.
//!
//! `WorkflowEvent` mirrors the step state machine (started, retrying,
//! completed, failed, skipped) plus run-level transitions. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

/// Events emitted by the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    // -- Run lifecycle --

    /// A fresh run has started.
    RunStarted {
        workflow_id: String,
        workflow_name: String,
        total_steps: u32,
    },

    /// A run is resuming after `skipped` already-completed steps.
    RunResumed {
        workflow_id: String,
        workflow_name: String,
        resume_from: u32,
        skipped: u32,
    },

    /// Every step completed.
    RunCompleted {
        workflow_id: String,
        duration_ms: u64,
        steps_completed: u32,
    },

    /// A step exhausted its retries and the run halted.
    RunFailed {
        workflow_id: String,
        step_number: u32,
        error: String,
    },

    /// The run was cancelled before finishing.
    RunCancelled {
        workflow_id: String,
        step_number: u32,
    },

    // -- Step lifecycle --

    /// A step attempt is running.
    StepStarted {
        workflow_id: String,
        step_number: u32,
        step_name: String,
        attempt: u32,
    },

    /// An attempt failed and another will follow after `delay_ms`.
    StepRetrying {
        workflow_id: String,
        step_number: u32,
        step_name: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// A step completed and its checkpoint was written.
    StepCompleted {
        workflow_id: String,
        step_number: u32,
        step_name: String,
        attempts: u32,
        duration_ms: u64,
    },

    /// A step exhausted its retries.
    StepFailed {
        workflow_id: String,
        step_number: u32,
        step_name: String,
        attempts: u32,
        error: String,
    },

    /// A step was skipped because an earlier call already completed it.
    StepSkipped {
        workflow_id: String,
        step_number: u32,
        step_name: String,
    },
}

impl WorkflowEvent {
    /// The workflow this event belongs to.
    pub fn workflow_id(&self) -> &str {
        match self {
            WorkflowEvent::RunStarted { workflow_id, .. }
            | WorkflowEvent::RunResumed { workflow_id, .. }
            | WorkflowEvent::RunCompleted { workflow_id, .. }
            | WorkflowEvent::RunFailed { workflow_id, .. }
            | WorkflowEvent::RunCancelled { workflow_id, .. }
            | WorkflowEvent::StepStarted { workflow_id, .. }
            | WorkflowEvent::StepRetrying { workflow_id, .. }
            | WorkflowEvent::StepCompleted { workflow_id, .. }
            | WorkflowEvent::StepFailed { workflow_id, .. }
            | WorkflowEvent::StepSkipped { workflow_id, .. } => workflow_id,
        }
    }

    /// The step number for step-scoped events, None for run-scoped ones.
    pub fn step_number(&self) -> Option<u32> {
        match self {
            WorkflowEvent::StepStarted { step_number, .. }
            | WorkflowEvent::StepRetrying { step_number, .. }
            | WorkflowEvent::StepCompleted { step_number, .. }
            | WorkflowEvent::StepFailed { step_number, .. }
            | WorkflowEvent::StepSkipped { step_number, .. } => Some(*step_number),

            WorkflowEvent::RunStarted { .. }
            | WorkflowEvent::RunResumed { .. }
            | WorkflowEvent::RunCompleted { .. }
            | WorkflowEvent::RunFailed { .. }
            | WorkflowEvent::RunCancelled { .. } => None,
        }
    }
}
