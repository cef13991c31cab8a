//! Towers of Hanoi as a durable workflow.
//!
//! An `n`-disc puzzle becomes `2^n - 1` steps, one per move. Move `m`
//! (1-based) is derived from its number alone: the disc is
//! `trailing_zeros(m) + 1`, it leaves peg `(m & (m - 1)) % 3` and lands on
//! `((m | (m - 1)) + 1) % 3`. Each step checks the move against the peg
//! layout carried in the workflow state and publishes the new layout, so a
//! resumed run continues from exactly the pegs the last checkpoint saw.

use anyhow::{Result, bail};
use clap::Args;
use console::style;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use stepwise_core::checkpoint::CheckpointStore;
use stepwise_core::event::{EventBus, WorkflowSubscription};
use stepwise_core::workflow::definition::{ExecutionStep, WorkflowDefinition};
use stepwise_core::workflow::engine::{ExecutorError, WorkflowEngine, WorkflowExecutor};
use stepwise_core::workflow::state::WorkflowState;
use stepwise_core::workflow::step::{StepContext, StepError, StepOutput, fn_step};
use stepwise_types::event::WorkflowEvent;

use crate::state::AppState;

/// Largest supported puzzle (1,048,575 moves).
pub const MAX_DISCS: u32 = 20;

const PEGS_KEY: &str = "pegs";

#[derive(Args)]
pub struct HanoiArgs {
    /// Number of discs.
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=MAX_DISCS as i64))]
    pub discs: u32,

    /// Workflow id used for checkpoints.
    #[arg(long)]
    pub workflow_id: String,

    /// Make move K (1-based) fail on every attempt.
    #[arg(long, value_name = "K")]
    pub fail_at: Option<u64>,

    /// Continue from the last completed checkpoint instead of starting fresh.
    #[arg(long)]
    pub resume: bool,
}

// ---------------------------------------------------------------------------
// Moves and pegs
// ---------------------------------------------------------------------------

/// One disc move between pegs `0..3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub disc: u32,
    pub from: usize,
    pub to: usize,
}

/// The move made at 1-based position `m`.
pub fn nth_move(m: u64) -> Move {
    debug_assert!(m > 0);
    Move {
        disc: m.trailing_zeros() + 1,
        from: ((m & (m - 1)) % 3) as usize,
        to: (((m | (m - 1)) + 1) % 3) as usize,
    }
}

/// Starting layout: every disc on peg 0, largest at the bottom.
pub fn initial_pegs(discs: u32) -> Vec<Vec<u32>> {
    vec![(1..=discs).rev().collect(), Vec::new(), Vec::new()]
}

/// Peg holding the finished tower: 2 for an odd disc count, 1 for even.
pub fn target_peg(discs: u32) -> usize {
    if discs % 2 == 1 { 2 } else { 1 }
}

/// Apply `mv` to `pegs`, rejecting moves that break the puzzle rules.
pub fn apply_move(pegs: &mut [Vec<u32>], mv: Move) -> Result<(), String> {
    if mv.from == mv.to || mv.from >= pegs.len() || mv.to >= pegs.len() {
        return Err(format!(
            "move {} -> {} does not fit {} pegs",
            mv.from,
            mv.to,
            pegs.len()
        ));
    }
    let top = pegs[mv.from].last().copied();
    if top != Some(mv.disc) {
        return Err(format!(
            "disc {} is not on top of peg {} (top is {:?})",
            mv.disc, mv.from, top
        ));
    }
    if let Some(&below) = pegs[mv.to].last() {
        if below < mv.disc {
            return Err(format!(
                "cannot place disc {} on smaller disc {} at peg {}",
                mv.disc, below, mv.to
            ));
        }
    }
    pegs[mv.from].pop();
    pegs[mv.to].push(mv.disc);
    Ok(())
}

fn pegs_from_state(state: &WorkflowState, discs: u32) -> Result<Vec<Vec<u32>>, StepError> {
    let Some(value) = state.get(PEGS_KEY) else {
        return Ok(initial_pegs(discs));
    };
    let pegs: Vec<Vec<u32>> = serde_json::from_value(value.clone())
        .map_err(|e| StepError::InvalidInput(format!("malformed pegs: {e}")))?;
    if pegs.len() != 3 {
        return Err(StepError::InvalidInput(format!(
            "expected 3 pegs, found {}",
            pegs.len()
        )));
    }
    Ok(pegs)
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Build the `2^discs - 1` step workflow. With `fail_at`, that move fails
/// on every attempt.
pub fn hanoi_workflow(workflow_id: &str, discs: u32, fail_at: Option<u64>) -> WorkflowDefinition {
    let total = (1u64 << discs) - 1;
    let mut def = WorkflowDefinition::new(workflow_id, format!("hanoi-{discs}"));

    for m in 1..=total {
        let handler = fn_step(move |ctx: StepContext| async move {
            let m = ctx.input["move"]
                .as_u64()
                .ok_or_else(|| StepError::InvalidInput("missing move number".to_string()))?;
            if fail_at == Some(m) {
                return Err(StepError::failed(format!("injected failure at move {m}")));
            }

            let mv = nth_move(m);
            let mut pegs = pegs_from_state(&ctx.state, discs)?;
            apply_move(&mut pegs, mv).map_err(StepError::failed)?;

            Ok(StepOutput::new(json!({
                "move": m,
                "disc": mv.disc,
                "from": mv.from,
                "to": mv.to,
            }))
            .with_state(PEGS_KEY, json!(pegs)))
        });

        def = def.step(ExecutionStep::new(format!("move-{m}"), handler).with_input(json!({ "move": m })));
    }

    def
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// Run (or resume) a Hanoi workflow against the SQLite store.
pub async fn handle_hanoi(args: HanoiArgs, state: &AppState, json: bool) -> Result<()> {
    let def = hanoi_workflow(&args.workflow_id, args.discs, args.fail_at);

    let bus = EventBus::new(state.config.engine.event_channel_capacity);
    let engine = WorkflowEngine::new(state.checkpoint_store(), state.config.engine.clone())
        .with_event_bus(bus.clone());

    let reporter =
        (!json).then(|| tokio::spawn(report_events(bus.subscribe_workflow(&args.workflow_id))));

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let outcome = if args.resume {
        engine.resume(&def, &cancel).await
    } else {
        engine.execute(&def, &cancel).await
    };
    ctrl_c.abort();
    drop(engine);
    drop(bus);
    if let Some(reporter) = reporter {
        let _ = reporter.await;
    }

    let result = match outcome {
        Ok(result) => result,
        Err(ExecutorError::AlreadyStarted { workflow_id }) => bail!(
            "Workflow '{workflow_id}' already has checkpoints. Re-run with --resume, or `stepwise purge {workflow_id}` first"
        ),
        Err(ExecutorError::Cancelled { workflow_id, step_number }) => {
            if json {
                println!(
                    "{}",
                    json!({"workflow_id": workflow_id, "cancelled_at_step": step_number})
                );
            } else {
                println!();
                println!(
                    "  {} Cancelled before move {}. Resume with --resume.",
                    style("!").yellow().bold(),
                    step_number + 1
                );
                println!();
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let pegs = final_pegs(&state.checkpoint_store(), &args.workflow_id).await?;

    if json {
        let out = json!({
            "workflow_id": result.workflow_id,
            "success": result.success,
            "discs": args.discs,
            "completed_steps": result.completed_steps,
            "total_steps": result.total_steps,
            "duration_ms": result.total_duration_ms,
            "failed_step": result.failed_step,
            "error": result.error,
            "pegs": pegs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if result.success {
        let solved = pegs
            .as_ref()
            .and_then(|p| p.get(target_peg(args.discs)))
            .is_some_and(|t| t.len() == args.discs as usize);
        println!(
            "  {} Solved {} discs in {} moves ({} ms)",
            style("*").green().bold(),
            args.discs,
            result.total_steps,
            result.total_duration_ms
        );
        if let Some(last) = result.final_output.as_ref().and_then(describe_move) {
            println!("  Last move: {last}");
        }
        if !solved {
            println!("  {}", style("Final layout does not match the expected tower").red());
        }
    } else {
        println!(
            "  {} Stopped at move {} after {}/{} moves: {}",
            style("x").red().bold(),
            result.failed_step.map_or(0, |s| s + 1),
            result.completed_steps,
            result.total_steps,
            result.error.as_deref().unwrap_or("unknown error")
        );
        println!("  Fix the cause and re-run with --resume.");
    }
    if let Some(pegs) = pegs {
        for (i, peg) in pegs.iter().enumerate() {
            println!("  peg {i}: {peg:?}");
        }
    }
    println!();

    Ok(())
}

/// Peg layout recorded by the last completed checkpoint.
async fn final_pegs(
    store: &impl CheckpointStore,
    workflow_id: &str,
) -> Result<Option<Vec<Vec<u32>>>> {
    let chain = store.get_workflow_checkpoints(workflow_id).await?;
    let Some(last) = chain.iter().rev().find(|cp| cp.is_completed()) else {
        return Ok(None);
    };
    let state = WorkflowState::from_json(&last.state_json)?;
    Ok(state
        .get(PEGS_KEY)
        .cloned()
        .map(serde_json::from_value::<Vec<Vec<u32>>>)
        .transpose()?)
}

/// Print retries and failures as they happen.
async fn report_events(mut events: WorkflowSubscription) {
    while let Some(event) = events.recv().await {
        match event {
            WorkflowEvent::StepRetrying {
                step_name,
                attempt,
                delay_ms,
                error,
                ..
            } => {
                println!(
                    "  {} {step_name} attempt {attempt} failed: {error} (retrying in {delay_ms} ms)",
                    style("~").yellow()
                );
            }
            WorkflowEvent::StepFailed {
                step_name,
                attempts,
                error,
                ..
            } => {
                println!(
                    "  {} {step_name} failed after {attempts} attempts: {error}",
                    style("x").red()
                );
            }
            WorkflowEvent::RunResumed { skipped, .. } => {
                println!("  Resuming after {skipped} completed moves");
            }
            _ => {}
        }
    }
}

/// Human-readable form of a move step output.
pub fn describe_move(value: &Value) -> Option<String> {
    Some(format!(
        "disc {} : {} -> {}",
        value.get("disc")?,
        value.get("from")?,
        value.get("to")?
    ))
}
