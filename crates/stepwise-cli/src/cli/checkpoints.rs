//! Checkpoint inspection and purge subcommands.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use stepwise_core::checkpoint::{CheckpointManager, CheckpointStore};
use stepwise_infra::sqlite::SqliteCheckpointStore;
use stepwise_types::checkpoint::CheckpointStatus;

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// List the checkpoints of one workflow, or the workflow ids on record.
pub async fn handle_list(
    store: &SqliteCheckpointStore,
    workflow_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let Some(workflow_id) = workflow_id else {
        return list_workflows(store, json).await;
    };

    let checkpoints = store
        .get_workflow_checkpoints(workflow_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list checkpoints: {e}"))?;

    if json {
        let out: Vec<_> = checkpoints
            .iter()
            .map(|cp| {
                serde_json::json!({
                    "id": cp.id.to_string(),
                    "step_number": cp.step_number,
                    "step_name": cp.step_name,
                    "status": cp.status.as_str(),
                    "attempts": cp.attempts,
                    "duration_ms": cp.execution_duration_ms,
                    "created_at": cp.created_at.to_rfc3339(),
                    "error": cp.error_message,
                    "definition_hash": cp.definition_hash,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!();
        println!("  No checkpoints for workflow '{workflow_id}'.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Status"),
            Cell::new("Attempts"),
            Cell::new("Duration"),
            Cell::new("Written"),
            Cell::new("Error"),
        ]);

    for cp in &checkpoints {
        let error = cp
            .error_message
            .as_ref()
            .map(|e| e.chars().take(40).collect::<String>())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(cp.step_number),
            Cell::new(&cp.step_name),
            format_status(cp.status),
            Cell::new(cp.attempts),
            Cell::new(format!("{} ms", cp.execution_duration_ms)),
            Cell::new(cp.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(error),
        ]);
    }

    let completed = checkpoints.iter().filter(|cp| cp.is_completed()).count();

    println!();
    println!(
        "  Checkpoints for '{}' ({} completed)",
        style(workflow_id).cyan(),
        completed
    );
    println!("{table}");
    println!();

    Ok(())
}

async fn list_workflows(store: &SqliteCheckpointStore, json: bool) -> Result<()> {
    let ids = store
        .list_workflows()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list workflows: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    println!();
    if ids.is_empty() {
        println!("  No workflows have checkpoints.");
    } else {
        for id in &ids {
            println!("  {}", style(id).cyan());
        }
    }
    println!();

    Ok(())
}

fn format_status(status: CheckpointStatus) -> Cell {
    match status {
        CheckpointStatus::Completed => Cell::new("completed").fg(Color::Green),
        CheckpointStatus::Failed => Cell::new("failed").fg(Color::Red),
        other => Cell::new(other.as_str()).fg(Color::Yellow),
    }
}

// ---------------------------------------------------------------------------
// Purge
// ---------------------------------------------------------------------------

/// Delete every checkpoint of a workflow. Purging an unknown id succeeds.
pub async fn handle_purge(store: SqliteCheckpointStore, workflow_id: &str, json: bool) -> Result<()> {
    let manager = CheckpointManager::new(store);
    let existed = manager.has_checkpoints(workflow_id).await?;
    manager.purge(workflow_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"purged": workflow_id, "had_checkpoints": existed})
        );
    } else {
        println!();
        if existed {
            println!(
                "  {} Purged checkpoints for '{}'",
                style("*").green().bold(),
                style(workflow_id).cyan()
            );
        } else {
            println!("  No checkpoints for '{}'; nothing to purge.", workflow_id);
        }
        println!();
    }

    Ok(())
}
