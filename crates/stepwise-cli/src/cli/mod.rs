//! CLI command definitions for the `stepwise` binary.

pub mod checkpoints;
pub mod hanoi;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run and inspect durable, checkpointed workflows.
#[derive(Parser)]
#[command(name = "stepwise", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Solve Towers of Hanoi as a checkpointed workflow, one move per step.
    Hanoi(hanoi::HanoiArgs),

    /// List the checkpoints of a workflow (or all workflows with checkpoints).
    #[command(alias = "ls")]
    Checkpoints {
        /// Workflow id. Omit to list workflow ids.
        workflow_id: Option<String>,
    },

    /// Delete every checkpoint of a workflow.
    #[command(alias = "rm")]
    Purge {
        /// Workflow id.
        workflow_id: String,
    },

    /// Parse and validate a workflow YAML file.
    Validate {
        /// Path to the workflow YAML file.
        file: PathBuf,
    },
}
