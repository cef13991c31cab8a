//! Shared domain types for Stepwise.
//!
//! This crate contains the types passed between the engine, its checkpoint
//! stores, and callers: checkpoint records, step and workflow specs, results,
//! lifecycle events, configuration, and the store error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
