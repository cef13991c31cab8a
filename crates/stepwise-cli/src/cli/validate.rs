//! `stepwise validate`: check a workflow YAML file without running it.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use stepwise_core::workflow::definition::{WorkflowError, load_workflow_file};
use stepwise_types::workflow::WorkflowSpec;

/// Parse and validate `file`, then print its steps.
pub fn handle_validate(file: &Path, json: bool) -> Result<()> {
    let spec = load_spec(file)?;

    if json {
        let steps: Vec<_> = spec
            .steps
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "kind": s.kind.to_string(),
                    "max_attempts": s.retry.as_ref().map(|r| r.max_attempts),
                    "timeout_secs": s.timeout_secs,
                })
            })
            .collect();
        let out = serde_json::json!({
            "valid": true,
            "id": spec.id,
            "name": spec.name,
            "steps": steps,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Step"),
            Cell::new("Kind"),
            Cell::new("Attempts"),
            Cell::new("Timeout"),
        ]);

    for (i, s) in spec.steps.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(&s.name),
            Cell::new(s.kind.to_string()),
            Cell::new(
                s.retry
                    .as_ref()
                    .map_or_else(|| "default".to_string(), |r| r.max_attempts.to_string()),
            ),
            Cell::new(
                s.timeout_secs
                    .map_or_else(|| "default".to_string(), |t| format!("{t}s")),
            ),
        ]);
    }

    println!();
    println!(
        "  {} Workflow '{}' ({}) is valid",
        style("*").green().bold(),
        style(&spec.name).cyan(),
        spec.id
    );
    if let Some(desc) = &spec.description {
        println!("  {}", style(desc).dim());
    }
    println!("{table}");
    println!();

    Ok(())
}

fn load_spec(file: &Path) -> Result<WorkflowSpec> {
    load_workflow_file(file).map_err(|e| match e {
        WorkflowError::ParseError(msg) => anyhow::anyhow!("Failed to parse workflow YAML: {msg}"),
        WorkflowError::ValidationError(msg) => anyhow::anyhow!("Workflow validation failed: {msg}"),
        other => anyhow::anyhow!("Failed to load workflow: {other}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.yaml");
        std::fs::write(
            &path,
            r#"
id: ingest-1
name: ingest
steps:
  - name: fetch
    kind: tool
    retry:
      max_attempts: 5
  - name: summarize
    kind: agent
    timeout_secs: 30
"#,
        )
        .unwrap();

        let spec = load_spec(&path).unwrap();
        assert_eq!(spec.steps.len(), 2);
        handle_validate(&path, true).unwrap();
    }

    #[test]
    fn duplicate_step_names_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.yaml");
        std::fs::write(
            &path,
            "id: d\nname: d\nsteps:\n  - name: a\n    kind: compute\n  - name: a\n    kind: compute\n",
        )
        .unwrap();

        let err = load_spec(&path).unwrap_err().to_string();
        assert!(err.starts_with("Workflow validation failed"), "{err}");
    }

    #[test]
    fn missing_file_reported() {
        let err = load_spec(Path::new("/nonexistent/workflow.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("Failed to load workflow"), "{err}");
    }
}
