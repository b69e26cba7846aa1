//! `leadflow execute`: run a workflow from the command line.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use leadflow_types::execution::{ExecutionRequest, LeadOutcomeStatus};

use crate::state::AppState;

pub async fn execute(
    state: &AppState,
    workflow_id: Uuid,
    user_id: Uuid,
    leads: Vec<Uuid>,
    test_mode: bool,
    json: bool,
) -> Result<()> {
    let request = ExecutionRequest {
        workflow_id,
        lead_ids: (!leads.is_empty()).then_some(leads),
        test_mode,
        user_id,
    };
    let result = state.runner.execute(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Workflow {}{}",
        style("▶").bold(),
        style(workflow_id).cyan(),
        if test_mode {
            format!(" {}", style("(test mode)").yellow())
        } else {
            String::new()
        }
    );
    println!(
        "  Total: {}  Enrolled: {}  Skipped: {}  Failed: {}",
        style(result.total).bold(),
        style(result.enrolled).green(),
        style(result.skipped).yellow(),
        style(result.failed).red()
    );
    println!();

    if result.details.is_empty() {
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Lead").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Enrollment").fg(Color::White),
        Cell::new("Note").fg(Color::White),
    ]);

    for detail in &result.details {
        let status = match detail.status {
            LeadOutcomeStatus::Enrolled => Cell::new("● enrolled").fg(Color::Green),
            LeadOutcomeStatus::Skipped => Cell::new("○ skipped").fg(Color::Yellow),
            LeadOutcomeStatus::Failed => Cell::new("✗ failed").fg(Color::Red),
        };
        let note = detail
            .error
            .as_deref()
            .or(detail.reason.as_deref())
            .unwrap_or("");
        table.add_row(vec![
            Cell::new(detail.lead_id),
            status,
            Cell::new(
                detail
                    .enrollment_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            ),
            Cell::new(note),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}
