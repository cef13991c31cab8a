//! Step work functions.
//!
//! A step's work is a `StepHandler`: an async function from a `StepContext`
//! (accumulated state, declared input, attempt number, cancellation token)
//! to a `StepOutput`. Handlers use RPITIT, so they are not object-safe; the
//! `StepHandlerDyn` / `BoxStepHandler` pair provides type-erased storage:
//! 1. `StepHandlerDyn` is an object-safe trait with boxed futures
//! 2. a blanket impl covers every `T: StepHandler`
//! 3. `BoxStepHandler` wraps `Arc<dyn StepHandlerDyn>` and delegates
//!
//! `fn_step` adapts closures over raw JSON; `typed_step` adapts closures with
//! concrete input/output types, keeping JSON at the checkpoint boundary.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::state::WorkflowState;

// ---------------------------------------------------------------------------
// StepContext / StepOutput
// ---------------------------------------------------------------------------

/// Everything a step attempt receives.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub workflow_id: String,
    pub step_number: u32,
    pub step_name: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// State accumulated by the steps before this one.
    pub state: WorkflowState,
    /// The step's declared input.
    pub input: Value,
    /// Cancelled when the run is cancelled; long-running work should watch it.
    pub cancel: CancellationToken,
}

/// Output from a step execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// The step's result, persisted as the checkpoint's output.
    pub value: Value,
    /// Variables merged into the workflow state.
    pub state_updates: Map<String, Value>,
}

impl StepOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            state_updates: Map::new(),
        }
    }

    /// Publish a variable to the steps that follow.
    pub fn with_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state_updates.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors a step attempt can raise. All of them count as transient
/// failures and are retried per the step's policy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    /// Step execution failed.
    #[error("step execution failed: {0}")]
    ExecutionFailed(String),

    /// The declared input did not match the step's input type.
    #[error("invalid step input: {0}")]
    InvalidInput(String),

    /// The attempt exceeded its timeout.
    #[error("step timed out after {0:?}")]
    Timeout(Duration),

    /// The step observed cancellation and gave up.
    #[error("step cancelled")]
    Cancelled,
}

impl StepError {
    /// Shorthand for `ExecutionFailed`.
    pub fn failed(message: impl Into<String>) -> Self {
        StepError::ExecutionFailed(message.into())
    }
}

// ---------------------------------------------------------------------------
// StepHandler
// ---------------------------------------------------------------------------

/// The work function of a step.
pub trait StepHandler: Send + Sync {
    fn run(
        &self,
        ctx: StepContext,
    ) -> impl Future<Output = Result<StepOutput, StepError>> + Send;
}

/// Object-safe version of [`StepHandler`] with boxed futures.
///
/// This trait exists solely to enable dynamic dispatch (`dyn StepHandlerDyn`).
pub trait StepHandlerDyn: Send + Sync {
    fn run_boxed<'a>(
        &'a self,
        ctx: StepContext,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutput, StepError>> + Send + 'a>>;
}

impl<T: StepHandler> StepHandlerDyn for T {
    fn run_boxed<'a>(
        &'a self,
        ctx: StepContext,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutput, StepError>> + Send + 'a>> {
        Box::pin(self.run(ctx))
    }
}

/// Type-erased, cheaply clonable step handler.
#[derive(Clone)]
pub struct BoxStepHandler {
    inner: Arc<dyn StepHandlerDyn>,
}

impl BoxStepHandler {
    /// Wrap a concrete handler.
    pub fn new<T: StepHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    /// Run one attempt.
    pub async fn run(&self, ctx: StepContext) -> Result<StepOutput, StepError> {
        self.inner.run_boxed(ctx).await
    }
}

impl std::fmt::Debug for BoxStepHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxStepHandler")
    }
}

// ---------------------------------------------------------------------------
// Closure adapters
// ---------------------------------------------------------------------------

/// Handler backed by a closure over the raw `StepContext`.
pub struct FnStep<F> {
    f: F,
}

impl<F, Fut> StepHandler for FnStep<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send,
{
    fn run(
        &self,
        ctx: StepContext,
    ) -> impl Future<Output = Result<StepOutput, StepError>> + Send {
        (self.f)(ctx)
    }
}

/// Box a closure as a step handler.
pub fn fn_step<F, Fut>(f: F) -> BoxStepHandler
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
{
    BoxStepHandler::new(FnStep { f })
}

/// Handler with a concrete input type `I` and output type `O`.
///
/// The declared JSON input is deserialized into `I` on every attempt and
/// `O` is serialized back into the step output.
pub struct TypedStep<I, O, F> {
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F, Fut> StepHandler for TypedStep<I, O, F>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(WorkflowState, I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, StepError>> + Send,
{
    fn run(
        &self,
        ctx: StepContext,
    ) -> impl Future<Output = Result<StepOutput, StepError>> + Send {
        let call = serde_json::from_value::<I>(ctx.input)
            .map_err(|e| StepError::InvalidInput(e.to_string()))
            .map(|input| (self.f)(ctx.state, input));

        async move {
            let output = call?.await?;
            let value = serde_json::to_value(output)
                .map_err(|e| StepError::failed(format!("output serialization: {e}")))?;
            Ok(StepOutput::new(value))
        }
    }
}

/// Box a typed closure as a step handler.
pub fn typed_step<I, O, F, Fut>(f: F) -> BoxStepHandler
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(WorkflowState, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, StepError>> + Send + 'static,
{
    BoxStepHandler::new(TypedStep {
        f,
        _types: PhantomData,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
