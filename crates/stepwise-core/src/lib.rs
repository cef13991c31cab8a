//! Workflow engine and port definitions for Stepwise.
//!
//! This crate defines the "ports" (the `CheckpointStore` trait, step handler
//! traits, the single-shot execution port, the approval gate) and the logic
//! that drives them. It depends only on `stepwise-types` -- never on
//! `stepwise-infra` or any database/IO crate.

pub mod checkpoint;
pub mod event;
pub mod router;
pub mod workflow;
