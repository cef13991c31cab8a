//! Stepwise CLI entry point.
//!
//! Binary name: `stepwise`
//!
//! Parses CLI arguments, sets up tracing, opens the checkpoint store, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;
use stepwise_observe::tracing_setup::{init_tracing_with_filter, shutdown_tracing, verbosity_filter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing_with_filter(verbosity_filter(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let outcome = run(cli).await;
    shutdown_tracing();
    outcome
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Validation needs no database.
    if let Commands::Validate { file } = &cli.command {
        return cli::validate::handle_validate(file, cli.json);
    }

    let state = AppState::init().await?;

    let outcome = match cli.command {
        Commands::Hanoi(args) => cli::hanoi::handle_hanoi(args, &state, cli.json).await,
        Commands::Checkpoints { workflow_id } => {
            cli::checkpoints::handle_list(&state.checkpoint_store(), workflow_id.as_deref(), cli.json)
                .await
        }
        Commands::Purge { workflow_id } => {
            cli::checkpoints::handle_purge(state.checkpoint_store(), &workflow_id, cli.json).await
        }
        Commands::Validate { .. } => unreachable!("handled above"),
    };

    state.db_pool.close().await;
    outcome
}
