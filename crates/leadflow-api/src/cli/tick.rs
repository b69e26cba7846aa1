//! `leadflow tick`: one scheduler pass, for cron-driven deployments.

use anyhow::Result;
use chrono::Utc;
use console::style;

use crate::state::AppState;

pub async fn tick(state: &AppState, json: bool) -> Result<()> {
    let summary = state.scheduler.tick(Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "  {} Processed {} due enrollment(s): {} advanced, {} completed, {} failed",
        style("⏱").bold(),
        style(summary.processed).bold(),
        style(summary.advanced).green(),
        style(summary.completed).cyan(),
        style(summary.failed).red()
    );
    Ok(())
}
