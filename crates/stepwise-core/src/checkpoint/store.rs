//! Checkpoint store trait definition.
//!
//! Defines the storage interface for execution checkpoints. The core ships an
//! in-memory implementation; the infrastructure layer (stepwise-infra)
//! implements this trait with SQLite persistence.

use std::sync::Arc;

use stepwise_types::checkpoint::ExecutionCheckpoint;
use stepwise_types::error::StoreError;
use uuid::Uuid;

/// Storage port for execution checkpoints.
///
/// Implementations must tolerate concurrent calls for different workflow IDs.
/// For a single workflow ID the engine calls `save_checkpoint` serially, so
/// same-key writes need no extra serialization, but a write for an existing
/// `(workflow_id, step_number)` must supersede the previous record.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointStore: Send + Sync {
    /// Persist one checkpoint.
    fn save_checkpoint(
        &self,
        checkpoint: &ExecutionCheckpoint,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Get a checkpoint by its ID within a workflow.
    fn get_checkpoint(
        &self,
        workflow_id: &str,
        checkpoint_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionCheckpoint>, StoreError>> + Send;

    /// Get the checkpoint with the highest step number, if any.
    fn get_latest_checkpoint(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionCheckpoint>, StoreError>> + Send;

    /// List the current checkpoints of a workflow, ascending by step number.
    fn get_workflow_checkpoints(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionCheckpoint>, StoreError>> + Send;

    /// Delete every checkpoint of a workflow. Purging an unknown workflow is a no-op.
    fn purge_workflow_checkpoints(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Shared stores: lets a caller keep a handle for inspection while the
/// engine owns another.
impl<S: CheckpointStore> CheckpointStore for Arc<S> {
    async fn save_checkpoint(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), StoreError> {
        (**self).save_checkpoint(checkpoint).await
    }

    async fn get_checkpoint(
        &self,
        workflow_id: &str,
        checkpoint_id: &Uuid,
    ) -> Result<Option<ExecutionCheckpoint>, StoreError> {
        (**self).get_checkpoint(workflow_id, checkpoint_id).await
    }

    async fn get_latest_checkpoint(
        &self,
        workflow_id: &str,
    ) -> Result<Option<ExecutionCheckpoint>, StoreError> {
        (**self).get_latest_checkpoint(workflow_id).await
    }

    async fn get_workflow_checkpoints(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<ExecutionCheckpoint>, StoreError> {
        (**self).get_workflow_checkpoints(workflow_id).await
    }

    async fn purge_workflow_checkpoints(&self, workflow_id: &str) -> Result<(), StoreError> {
        (**self).purge_workflow_checkpoints(workflow_id).await
    }
}
