//! Workflow engine core: definitions, step execution, and durable resume.
//!
//! - `definition` -- YAML parsing, validation, and building runnable definitions
//! - `step` -- Step handler abstraction, context, output, and closure adapters
//! - `registry` -- Step-kind to handler registry resolved at build time
//! - `state` -- Accumulated workflow state with size bounds
//! - `retry` -- Retry decisions and exponential backoff with jitter
//! - `engine` -- Sequential executor with checkpointing, retry, and resume

pub mod definition;
pub mod engine;
pub mod registry;
pub mod retry;
pub mod state;
pub mod step;
