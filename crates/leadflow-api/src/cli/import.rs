//! `leadflow import`: load a JSON bundle of workflows, leads and advisors.
//!
//! ```json
//! { "workflows": [ ... ], "leads": [ ... ], "advisors": [ ... ] }
//! ```
//!
//! Workflows use the builder wire format and are validated before anything
//! is written. Existing rows with the same IDs are replaced.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use serde::Deserialize;

use leadflow_core::repository::workflow::WorkflowRepository;
use leadflow_types::crm::AdvisorRouting;
use leadflow_types::lead::Lead;
use leadflow_types::workflow::WorkflowDefinition;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
    #[serde(default)]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub advisors: Vec<AdvisorRouting>,
}

impl Bundle {
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid import bundle")
    }
}

pub async fn import(state: &AppState, path: &Path, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let bundle = Bundle::parse(&content)?;

    for workflow in &bundle.workflows {
        state.workflows.save_definition(workflow).await?;
    }
    for lead in &bundle.leads {
        state.crm.upsert_lead(lead).await?;
    }
    for advisor in &bundle.advisors {
        state.crm.upsert_advisor(advisor).await?;
    }

    tracing::info!(
        workflows = bundle.workflows.len(),
        leads = bundle.leads.len(),
        advisors = bundle.advisors.len(),
        "import complete"
    );

    if json {
        let summary = serde_json::json!({
            "workflows": bundle.workflows.len(),
            "leads": bundle.leads.len(),
            "advisors": bundle.advisors.len(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "  {} Imported {} workflow(s), {} lead(s), {} advisor(s)",
            style("✓").green(),
            bundle.workflows.len(),
            bundle.leads.len(),
            bundle.advisors.len()
        );
    }
    Ok(())
}
