//! Checkpoint persistence: the store port, the in-memory reference store,
//! and the manager the engine writes through.
//!
//! - `store` -- `CheckpointStore` trait (the port durable backends implement)
//! - `memory` -- `InMemoryCheckpointStore`, per-workflow ordered maps
//! - `manager` -- `CheckpointManager`, the engine-facing write/recovery API

pub mod manager;
pub mod memory;
pub mod store;

pub use manager::{CheckpointError, CheckpointManager, ResumePoint, definition_fingerprint};
pub use memory::InMemoryCheckpointStore;
pub use store::CheckpointStore;
