//! Task routing: the entry point external callers use to reach the engine.
//!
//! A `TaskRequest` names either a multi-step workflow (a built definition,
//! or a declarative spec resolved against the router's `StepRegistry`) or a
//! single unit of work. Workflows go through the `ApprovalGate` unless they
//! are flagged `pre_approved` (the hot path) and then to the executor; single
//! tasks go to the `SingleShotPort`. Either way the caller gets one
//! normalized `RoutedResult`. The router holds no state of its own.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stepwise_types::workflow::{WorkflowResult, WorkflowSpec};
use tokio_util::sync::CancellationToken;

use crate::workflow::definition::{WorkflowDefinition, WorkflowError};
use crate::workflow::engine::{ExecutorError, WorkflowExecutor};
use crate::workflow::registry::StepRegistry;
use crate::workflow::step::StepError;

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// One unit of work for the single-shot path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleTask {
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

/// What a caller asks the router to run.
#[derive(Debug, Clone)]
pub enum TaskRequest {
    /// A built workflow definition.
    Workflow {
        definition: WorkflowDefinition,
        pre_approved: bool,
    },
    /// A declarative workflow resolved against the router's registry.
    Spec {
        spec: WorkflowSpec,
        pre_approved: bool,
    },
    /// A single unit of work.
    Single(SingleTask),
}

/// Which path handled a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    Workflow,
    SingleShot,
}

/// Normalized outcome of a routed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub completed_steps: u32,
    pub total_steps: u32,
    pub duration_ms: u64,
    pub path: ExecutionPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<WorkflowResult> for RoutedResult {
    fn from(result: WorkflowResult) -> Self {
        Self {
            success: result.success,
            output: result.final_output,
            completed_steps: result.completed_steps,
            total_steps: result.total_steps,
            duration_ms: result.total_duration_ms,
            path: ExecutionPath::Workflow,
            error: result.error,
        }
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Executes one-step work outside the workflow engine.
pub trait SingleShotPort: Send + Sync {
    fn run(
        &self,
        task: &SingleTask,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<Value, StepError>> + Send;
}

/// Outcome of an approval review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: String },
}

/// External approval collaborator consulted before a workflow runs.
pub trait ApprovalGate: Send + Sync {
    fn review(
        &self,
        definition: &WorkflowDefinition,
    ) -> impl std::future::Future<Output = ApprovalDecision> + Send;
}

/// Gate that approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    async fn review(&self, _definition: &WorkflowDefinition) -> ApprovalDecision {
        ApprovalDecision::Approved
    }
}

// ---------------------------------------------------------------------------
// TaskRouter
// ---------------------------------------------------------------------------

/// Dispatches requests to the workflow executor or the single-shot port.
pub struct TaskRouter<E, P, G = AutoApprove> {
    executor: E,
    single_shot: P,
    gate: G,
    registry: StepRegistry,
}

impl<E, P> TaskRouter<E, P, AutoApprove>
where
    E: WorkflowExecutor,
    P: SingleShotPort,
{
    /// Router with an approve-all gate.
    pub fn new(executor: E, single_shot: P, registry: StepRegistry) -> Self {
        Self::with_gate(executor, single_shot, AutoApprove, registry)
    }
}

impl<E, P, G> TaskRouter<E, P, G>
where
    E: WorkflowExecutor,
    P: SingleShotPort,
    G: ApprovalGate,
{
    pub fn with_gate(executor: E, single_shot: P, gate: G, registry: StepRegistry) -> Self {
        Self {
            executor,
            single_shot,
            gate,
            registry,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run a request and normalize its outcome.
    pub async fn route(
        &self,
        request: TaskRequest,
        cancel: &CancellationToken,
    ) -> Result<RoutedResult, RouterError> {
        match request {
            TaskRequest::Workflow {
                definition,
                pre_approved,
            } => self.route_workflow(&definition, pre_approved, cancel).await,
            TaskRequest::Spec { spec, pre_approved } => {
                let definition = WorkflowDefinition::from_spec(&spec, &self.registry)?;
                self.route_workflow(&definition, pre_approved, cancel).await
            }
            TaskRequest::Single(task) => Ok(self.route_single(&task, cancel).await),
        }
    }

    async fn route_workflow(
        &self,
        definition: &WorkflowDefinition,
        pre_approved: bool,
        cancel: &CancellationToken,
    ) -> Result<RoutedResult, RouterError> {
        let total_steps = definition.steps.len() as u32;

        if !pre_approved {
            if let ApprovalDecision::Denied { reason } = self.gate.review(definition).await {
                tracing::info!(
                    workflow_id = definition.id.as_str(),
                    reason = reason.as_str(),
                    "workflow denied by approval gate"
                );
                return Ok(RoutedResult {
                    success: false,
                    output: None,
                    completed_steps: 0,
                    total_steps,
                    duration_ms: 0,
                    path: ExecutionPath::Workflow,
                    error: Some(format!("approval denied: {reason}")),
                });
            }
        }

        tracing::debug!(
            workflow_id = definition.id.as_str(),
            pre_approved,
            steps = total_steps,
            "routing to workflow engine"
        );
        let result = self.executor.execute(definition, cancel).await?;
        Ok(result.into())
    }

    async fn route_single(&self, task: &SingleTask, cancel: &CancellationToken) -> RoutedResult {
        tracing::debug!(task = task.name.as_str(), "routing to single-shot port");
        let start = Instant::now();
        let outcome = self.single_shot.run(task, cancel).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => RoutedResult {
                success: true,
                output: Some(output),
                completed_steps: 1,
                total_steps: 1,
                duration_ms,
                path: ExecutionPath::SingleShot,
                error: None,
            },
            Err(e) => {
                tracing::warn!(task = task.name.as_str(), error = %e, "single-shot task failed");
                RoutedResult {
                    success: false,
                    output: None,
                    completed_steps: 0,
                    total_steps: 1,
                    duration_ms,
                    path: ExecutionPath::SingleShot,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while routing a request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;
    use stepwise_types::config::EngineConfig;
    use stepwise_types::workflow::{StepKind, StepSpec};

    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::workflow::definition::ExecutionStep;
    use crate::workflow::engine::WorkflowEngine;
    use crate::workflow::step::{StepContext, StepOutput, fn_step};

    struct Echo;

    impl SingleShotPort for Echo {
        async fn run(&self, task: &SingleTask, _cancel: &CancellationToken) -> Result<Value, StepError> {
            if task.name == "explode" {
                return Err(StepError::failed("boom"));
            }
            Ok(json!({"task": task.name, "input": task.input}))
        }
    }

    #[derive(Default)]
    struct DenyAll {
        reviews: AtomicU32,
    }

    impl ApprovalGate for Arc<DenyAll> {
        async fn review(&self, _definition: &WorkflowDefinition) -> ApprovalDecision {
            self.reviews.fetch_add(1, Ordering::SeqCst);
            ApprovalDecision::Denied {
                reason: "change freeze".to_string(),
            }
        }
    }

    fn engine() -> WorkflowEngine<InMemoryCheckpointStore> {
        WorkflowEngine::new(InMemoryCheckpointStore::new(), EngineConfig::default())
    }

    fn registry() -> StepRegistry {
        StepRegistry::new().with(
            StepKind::Compute,
            fn_step(|ctx: StepContext| async move { Ok(StepOutput::new(ctx.input)) }),
        )
    }

    fn two_steps(id: &str) -> WorkflowDefinition {
        let step = || fn_step(|ctx: StepContext| async move { Ok(StepOutput::new(json!(ctx.step_number))) });
        WorkflowDefinition::new(id, "two")
            .step(ExecutionStep::new("a", step()))
            .step(ExecutionStep::new("b", step()))
    }

    #[tokio::test]
    async fn workflow_request_goes_to_engine() {
        let router = TaskRouter::new(engine(), Echo, registry());
        let result = router
            .route(
                TaskRequest::Workflow {
                    definition: two_steps("r1"),
                    pre_approved: false,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.path, ExecutionPath::Workflow);
        assert_eq!((result.completed_steps, result.total_steps), (2, 2));
        assert_eq!(result.output, Some(json!(1)));
        assert!(router.executor().checkpoints().has_checkpoints("r1").await.unwrap());
    }

    #[tokio::test]
    async fn single_request_goes_to_port() {
        let router = TaskRouter::new(engine(), Echo, registry());
        let task = SingleTask {
            name: "summarize".to_string(),
            input: json!("text"),
        };
        let result = router
            .route(TaskRequest::Single(task), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.path, ExecutionPath::SingleShot);
        assert_eq!(result.output, Some(json!({"task": "summarize", "input": "text"})));
    }

    #[tokio::test]
    async fn single_failure_is_normalized() {
        let router = TaskRouter::new(engine(), Echo, registry());
        let task = SingleTask {
            name: "explode".to_string(),
            input: Value::Null,
        };
        let result = router
            .route(TaskRequest::Single(task), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.completed_steps, 0);
        assert!(result.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn denied_workflow_never_reaches_engine() {
        let gate = Arc::new(DenyAll::default());
        let router = TaskRouter::with_gate(engine(), Echo, gate.clone(), registry());
        let result = router
            .route(
                TaskRequest::Workflow {
                    definition: two_steps("denied"),
                    pre_approved: false,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("change freeze"));
        assert_eq!(gate.reviews.load(Ordering::SeqCst), 1);
        assert!(!router.executor().checkpoints().has_checkpoints("denied").await.unwrap());
    }

    #[tokio::test]
    async fn pre_approved_workflow_skips_gate() {
        let gate = Arc::new(DenyAll::default());
        let router = TaskRouter::with_gate(engine(), Echo, gate.clone(), registry());
        let result = router
            .route(
                TaskRequest::Workflow {
                    definition: two_steps("hot"),
                    pre_approved: true,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(gate.reviews.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn spec_request_resolves_against_registry() {
        let router = TaskRouter::new(engine(), Echo, registry());
        let spec = WorkflowSpec {
            id: "spec-1".to_string(),
            name: "spec".to_string(),
            description: None,
            steps: vec![StepSpec {
                name: "only".to_string(),
                kind: StepKind::Compute,
                input: json!({"x": 1}),
                retry: None,
                timeout_secs: None,
            }],
        };
        let result = router
            .route(
                TaskRequest::Spec {
                    spec: spec.clone(),
                    pre_approved: true,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.output, Some(json!({"x": 1})));

        let mut unknown = spec;
        unknown.id = "spec-2".to_string();
        unknown.steps[0].kind = StepKind::Agent;
        let err = router
            .route(
                TaskRequest::Spec {
                    spec: unknown,
                    pre_approved: true,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Workflow(WorkflowError::UnknownStepKind { .. })
        ));
    }

    #[tokio::test]
    async fn engine_errors_propagate() {
        let router = TaskRouter::new(engine(), Echo, registry());
        let request = || TaskRequest::Workflow {
            definition: two_steps("dup"),
            pre_approved: true,
        };
        router.route(request(), &CancellationToken::new()).await.unwrap();
        let err = router
            .route(request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Executor(ExecutorError::AlreadyStarted { .. })
        ));
    }
}
