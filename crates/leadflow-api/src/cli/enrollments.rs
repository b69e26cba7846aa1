//! `leadflow enrollments`: inspect a workflow's enrollments.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use leadflow_core::repository::enrollment::EnrollmentRepository;
use leadflow_types::enrollment::EnrollmentStatus;

use crate::state::AppState;

pub async fn list(state: &AppState, workflow_id: Uuid, limit: u32, json: bool) -> Result<()> {
    let enrollments = state.enrollments.list_enrollments(&workflow_id, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&enrollments)?);
        return Ok(());
    }

    if enrollments.is_empty() {
        println!();
        println!("  No enrollments for workflow {}.", style(workflow_id).cyan());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Lead").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Next Run").fg(Color::White),
        Cell::new("Exit Reason").fg(Color::White),
    ]);

    for enrollment in &enrollments {
        let status = match enrollment.status {
            EnrollmentStatus::Active => Cell::new("● active").fg(Color::Green),
            EnrollmentStatus::Completed => Cell::new("◌ completed").fg(Color::DarkGrey),
        };
        let next = enrollment
            .next_step_scheduled_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(enrollment.lead_id),
            status,
            Cell::new(enrollment.current_step_index),
            Cell::new(next),
            Cell::new(enrollment.exit_reason.as_deref().unwrap_or("")),
        ]);
    }

    println!("{table}");
    Ok(())
}
