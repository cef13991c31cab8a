//! In-memory checkpoint store.
//!
//! Reference implementation of `CheckpointStore`: a `DashMap` keyed by
//! workflow ID whose values are `BTreeMap`s keyed by step number. DashMap
//! locks per shard, so writers for different workflows never contend on a
//! global lock, and the BTreeMap keeps each chain ordered by step number.

use std::collections::BTreeMap;

use dashmap::DashMap;
use stepwise_types::checkpoint::ExecutionCheckpoint;
use stepwise_types::error::StoreError;
use uuid::Uuid;

use super::store::CheckpointStore;

/// Process-local checkpoint store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    workflows: DashMap<String, BTreeMap<u32, ExecutionCheckpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workflows with at least one checkpoint.
    pub fn workflow_count(&self) -> usize {
        self.workflows.len()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    async fn save_checkpoint(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), StoreError> {
        self.workflows
            .entry(checkpoint.workflow_id.clone())
            .or_default()
            .insert(checkpoint.step_number, checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(
        &self,
        workflow_id: &str,
        checkpoint_id: &Uuid,
    ) -> Result<Option<ExecutionCheckpoint>, StoreError> {
        Ok(self.workflows.get(workflow_id).and_then(|chain| {
            chain
                .values()
                .find(|cp| cp.id == *checkpoint_id)
                .cloned()
        }))
    }

    async fn get_latest_checkpoint(
        &self,
        workflow_id: &str,
    ) -> Result<Option<ExecutionCheckpoint>, StoreError> {
        Ok(self
            .workflows
            .get(workflow_id)
            .and_then(|chain| chain.values().next_back().cloned()))
    }

    async fn get_workflow_checkpoints(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<ExecutionCheckpoint>, StoreError> {
        Ok(self
            .workflows
            .get(workflow_id)
            .map(|chain| chain.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn purge_workflow_checkpoints(&self, workflow_id: &str) -> Result<(), StoreError> {
        self.workflows.remove(workflow_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
