//! Sequential workflow engine with durable checkpointing.
//!
//! The `WorkflowEngine` runs the steps of a `WorkflowDefinition` one after
//! another. Each attempt runs under the step's timeout and the caller's
//! cancellation token; failed attempts are retried with backoff. Every step
//! outcome is written to the checkpoint store before the next step starts,
//! which is what makes `resume` possible.
//!
//! # Execution flow
//!
//! 1. `execute` refuses a workflow id that already has checkpoints;
//!    `resume` verifies the stored checkpoints against the definition and
//!    seeds the state from the last completed step.
//! 2. For each remaining step: run attempts until one succeeds or the retry
//!    policy is exhausted.
//! 3. Success folds the output into the state and writes a `Completed`
//!    checkpoint. Exhaustion writes a `Failed` checkpoint and halts with
//!    `success = false`.
//! 4. Cancellation mid-step writes nothing for that step and returns
//!    `ExecutorError::Cancelled`.

use std::time::{Duration, Instant};

use stepwise_types::checkpoint::ExecutionCheckpoint;
use stepwise_types::config::EngineConfig;
use stepwise_types::event::WorkflowEvent;
use stepwise_types::workflow::WorkflowResult;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{
    CheckpointError, CheckpointManager, CheckpointStore, definition_fingerprint,
};
use crate::event::EventBus;

use super::definition::{ExecutionStep, WorkflowDefinition, WorkflowError};
use super::retry::RetryHandler;
use super::state::WorkflowState;
use super::step::{StepContext, StepError, StepOutput};

// ---------------------------------------------------------------------------
// WorkflowExecutor trait
// ---------------------------------------------------------------------------

/// Trait for workflow execution engines.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods,
/// consistent with the project's Rust 2024 edition approach.
pub trait WorkflowExecutor: Send + Sync {
    /// Execute a workflow definition from the first step.
    fn execute(
        &self,
        definition: &WorkflowDefinition,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<WorkflowResult, ExecutorError>> + Send;

    /// Continue a workflow after its last completed checkpoint.
    fn resume(
        &self,
        definition: &WorkflowDefinition,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<WorkflowResult, ExecutorError>> + Send;
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// How one step's attempts ended.
enum StepRun {
    Completed {
        output: StepOutput,
        attempts: u32,
        work: Duration,
    },
    Failed {
        error: String,
        attempts: u32,
        work: Duration,
    },
    Cancelled,
}

/// Sequential executor over a checkpoint store.
///
/// Generic over `S: CheckpointStore` for storage flexibility. The engine
/// holds no per-run state, so one instance can drive any number of
/// concurrent runs with distinct workflow ids.
pub struct WorkflowEngine<S: CheckpointStore> {
    checkpoints: CheckpointManager<S>,
    config: EngineConfig,
    event_bus: Option<EventBus>,
}

impl<S: CheckpointStore> WorkflowEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            checkpoints: CheckpointManager::new(store),
            config,
            event_bus: None,
        }
    }

    /// Publish lifecycle events to `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// The checkpoint manager, for inspection and purging.
    pub fn checkpoints(&self) -> &CheckpointManager<S> {
        &self.checkpoints
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Run steps `start..` over `state`. Every checkpoint written is tagged
    /// with `fingerprint`.
    async fn run_steps(
        &self,
        definition: &WorkflowDefinition,
        fingerprint: &str,
        start: u32,
        mut state: WorkflowState,
        cancel: &CancellationToken,
        run_start: Instant,
    ) -> Result<WorkflowResult, ExecutorError> {
        let workflow_id = definition.id.as_str();
        let total_steps = definition.steps.len() as u32;
        let mut final_output = state.last_output.clone();

        for (step_number, step) in (start..).zip(definition.steps.iter().skip(start as usize)) {
            if cancel.is_cancelled() {
                return Err(self.cancelled(workflow_id, step_number));
            }

            match self
                .run_step(workflow_id, step_number, step, &state, cancel)
                .await
            {
                StepRun::Completed {
                    output,
                    attempts,
                    work,
                } => {
                    state.apply(&output);
                    let state_json = state.to_json(self.config.max_state_bytes)?;
                    let checkpoint = ExecutionCheckpoint::completed(
                        workflow_id,
                        step_number,
                        &step.name,
                        attempts,
                        state_json,
                        to_json(&step.input)?,
                        to_json(&output.value)?,
                        work.as_millis() as u64,
                    )
                    .with_definition_hash(fingerprint);
                    self.checkpoints.record(&checkpoint).await?;

                    tracing::debug!(
                        workflow_id,
                        step_number,
                        step_name = step.name.as_str(),
                        attempts,
                        duration_ms = checkpoint.execution_duration_ms,
                        "step completed"
                    );
                    self.publish(WorkflowEvent::StepCompleted {
                        workflow_id: workflow_id.to_string(),
                        step_number,
                        step_name: step.name.clone(),
                        attempts,
                        duration_ms: checkpoint.execution_duration_ms,
                    });

                    final_output = Some(output.value);
                }
                StepRun::Failed {
                    error,
                    attempts,
                    work,
                } => {
                    let checkpoint = ExecutionCheckpoint::failed(
                        workflow_id,
                        step_number,
                        &step.name,
                        attempts,
                        state.to_json(self.config.max_state_bytes)?,
                        to_json(&step.input)?,
                        &error,
                        work.as_millis() as u64,
                    )
                    .with_definition_hash(fingerprint);
                    self.checkpoints.record(&checkpoint).await?;

                    tracing::error!(
                        workflow_id,
                        step_number,
                        step_name = step.name.as_str(),
                        attempts,
                        error = error.as_str(),
                        "step failed after exhausting retries, halting workflow"
                    );
                    self.publish(WorkflowEvent::StepFailed {
                        workflow_id: workflow_id.to_string(),
                        step_number,
                        step_name: step.name.clone(),
                        attempts,
                        error: error.clone(),
                    });
                    self.publish(WorkflowEvent::RunFailed {
                        workflow_id: workflow_id.to_string(),
                        step_number,
                        error: error.clone(),
                    });

                    return Ok(WorkflowResult {
                        workflow_id: workflow_id.to_string(),
                        success: false,
                        final_output,
                        completed_steps: step_number,
                        total_steps,
                        total_duration_ms: run_start.elapsed().as_millis() as u64,
                        failed_step: Some(step_number),
                        error: Some(error),
                    });
                }
                StepRun::Cancelled => {
                    return Err(self.cancelled(workflow_id, step_number));
                }
            }
        }

        Ok(self.finished(definition, final_output, run_start))
    }

    /// Run the attempts of one step until success, exhaustion, or cancellation.
    async fn run_step(
        &self,
        workflow_id: &str,
        step_number: u32,
        step: &ExecutionStep,
        state: &WorkflowState,
        cancel: &CancellationToken,
    ) -> StepRun {
        let retry = step.retry.as_ref().unwrap_or(&self.config.default_retry);
        let timeout = step
            .timeout
            .unwrap_or(Duration::from_secs(self.config.step_timeout_secs));
        let mut work = Duration::ZERO;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                workflow_id,
                step_number,
                step_name = step.name.as_str(),
                attempt,
                "step running"
            );
            self.publish(WorkflowEvent::StepStarted {
                workflow_id: workflow_id.to_string(),
                step_number,
                step_name: step.name.clone(),
                attempt,
            });

            let ctx = StepContext {
                workflow_id: workflow_id.to_string(),
                step_number,
                step_name: step.name.clone(),
                attempt,
                state: state.clone(),
                input: step.input.clone(),
                cancel: cancel.clone(),
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout(timeout, step.handler.run(ctx)) => Some(result),
            };
            work += started.elapsed();

            let error = match outcome {
                None => return StepRun::Cancelled,
                Some(Ok(Ok(output))) => {
                    return StepRun::Completed {
                        output,
                        attempts: attempt,
                        work,
                    };
                }
                Some(Ok(Err(StepError::Cancelled))) if cancel.is_cancelled() => {
                    return StepRun::Cancelled;
                }
                Some(Ok(Err(e))) => e,
                Some(Err(_elapsed)) => StepError::Timeout(timeout),
            };

            if !RetryHandler::should_retry(retry, attempt) {
                return StepRun::Failed {
                    error: error.to_string(),
                    attempts: attempt,
                    work,
                };
            }

            let delay = RetryHandler::backoff_delay(retry, attempt);
            tracing::warn!(
                workflow_id,
                step_number,
                step_name = step.name.as_str(),
                attempt,
                max_attempts = retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "step attempt failed, retrying"
            );
            self.publish(WorkflowEvent::StepRetrying {
                workflow_id: workflow_id.to_string(),
                step_number,
                step_name: step.name.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                error: error.to_string(),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StepRun::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn cancelled(&self, workflow_id: &str, step_number: u32) -> ExecutorError {
        tracing::info!(workflow_id, step_number, "workflow cancelled");
        self.publish(WorkflowEvent::RunCancelled {
            workflow_id: workflow_id.to_string(),
            step_number,
        });
        ExecutorError::Cancelled {
            workflow_id: workflow_id.to_string(),
            step_number,
        }
    }

    fn finished(
        &self,
        definition: &WorkflowDefinition,
        final_output: Option<serde_json::Value>,
        run_start: Instant,
    ) -> WorkflowResult {
        let total_steps = definition.steps.len() as u32;
        let duration_ms = run_start.elapsed().as_millis() as u64;

        tracing::info!(
            workflow_id = definition.id.as_str(),
            workflow = definition.name.as_str(),
            steps = total_steps,
            duration_ms,
            "workflow completed"
        );
        self.publish(WorkflowEvent::RunCompleted {
            workflow_id: definition.id.clone(),
            duration_ms,
            steps_completed: total_steps,
        });

        WorkflowResult {
            workflow_id: definition.id.clone(),
            success: true,
            final_output,
            completed_steps: total_steps,
            total_steps,
            total_duration_ms: duration_ms,
            failed_step: None,
            error: None,
        }
    }
}

impl<S: CheckpointStore> WorkflowExecutor for WorkflowEngine<S> {
    async fn execute(
        &self,
        definition: &WorkflowDefinition,
        cancel: &CancellationToken,
    ) -> Result<WorkflowResult, ExecutorError> {
        let run_start = Instant::now();
        definition.validate()?;

        if self.checkpoints.has_checkpoints(&definition.id).await? {
            return Err(ExecutorError::AlreadyStarted {
                workflow_id: definition.id.clone(),
            });
        }

        tracing::info!(
            workflow_id = definition.id.as_str(),
            workflow = definition.name.as_str(),
            steps = definition.steps.len(),
            "starting workflow execution"
        );
        self.publish(WorkflowEvent::RunStarted {
            workflow_id: definition.id.clone(),
            workflow_name: definition.name.clone(),
            total_steps: definition.steps.len() as u32,
        });

        let fingerprint = definition_fingerprint(&definition.step_names());
        self.run_steps(definition, &fingerprint, 0, WorkflowState::new(), cancel, run_start)
            .await
            .inspect_err(|e| log_fatal(&definition.id, e))
    }

    async fn resume(
        &self,
        definition: &WorkflowDefinition,
        cancel: &CancellationToken,
    ) -> Result<WorkflowResult, ExecutorError> {
        let run_start = Instant::now();
        definition.validate()?;

        let step_names = definition.step_names();
        let point = self
            .checkpoints
            .load_resume_point(&definition.id, &step_names)
            .await?;

        let mut state = match point.state_json.as_deref() {
            Some(json) => WorkflowState::from_json(json)?,
            None => WorkflowState::new(),
        };
        if state.last_output.is_none() {
            if let Some(json) = point.last_output_json.as_deref() {
                state.last_output = Some(
                    serde_json::from_str(json)
                        .map_err(|e| WorkflowError::Serialization(e.to_string()))?,
                );
            }
        }

        let next_step = point.next_step;
        if next_step == 0 {
            tracing::info!(
                workflow_id = definition.id.as_str(),
                workflow = definition.name.as_str(),
                "no completed checkpoints, running from the first step"
            );
            self.publish(WorkflowEvent::RunStarted {
                workflow_id: definition.id.clone(),
                workflow_name: definition.name.clone(),
                total_steps: definition.steps.len() as u32,
            });
        } else {
            tracing::info!(
                workflow_id = definition.id.as_str(),
                workflow = definition.name.as_str(),
                skipping = next_step,
                "resuming workflow execution"
            );
            self.publish(WorkflowEvent::RunResumed {
                workflow_id: definition.id.clone(),
                workflow_name: definition.name.clone(),
                resume_from: next_step,
                skipped: next_step,
            });
            for (step_number, step) in (0..next_step).zip(&definition.steps) {
                self.publish(WorkflowEvent::StepSkipped {
                    workflow_id: definition.id.clone(),
                    step_number,
                    step_name: step.name.clone(),
                });
            }
        }

        if next_step as usize >= definition.steps.len() {
            let final_output = state.last_output.clone();
            return Ok(self.finished(definition, final_output, run_start));
        }

        let fingerprint = definition_fingerprint(&step_names);
        self.run_steps(definition, &fingerprint, next_step, state, cancel, run_start)
            .await
            .inspect_err(|e| log_fatal(&definition.id, e))
    }
}

fn to_json(value: &serde_json::Value) -> Result<String, WorkflowError> {
    serde_json::to_string(value).map_err(|e| WorkflowError::Serialization(e.to_string()))
}

fn log_fatal(workflow_id: &str, err: &ExecutorError) {
    if !matches!(err, ExecutorError::Cancelled { .. }) {
        tracing::error!(workflow_id, error = %err, "workflow aborted");
    }
}

// ---------------------------------------------------------------------------
// ExecutorError
// ---------------------------------------------------------------------------

/// Errors that abort an execute or resume call.
///
/// A step that exhausts its retries is not an error: it is reported through
/// `WorkflowResult::success == false`.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Definition, state, or serialization error.
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Checkpoint persistence or resume verification error.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// `execute` was called for a workflow that already has checkpoints.
    #[error("workflow '{workflow_id}' already has checkpoints; resume or purge it first")]
    AlreadyStarted { workflow_id: String },

    /// The run was cancelled before `step_number` completed.
    #[error("workflow '{workflow_id}' cancelled at step {step_number}")]
    Cancelled {
        workflow_id: String,
        step_number: u32,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
