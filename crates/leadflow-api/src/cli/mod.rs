//! CLI command definitions for the `leadflow` binary.

pub mod enrollments;
pub mod execute;
pub mod import;
pub mod tick;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Run CRM workflows: serve the execute endpoint, trigger runs, advance schedules.
#[derive(Parser)]
#[command(name = "leadflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to <data dir>/leadflow.toml).
    #[arg(long, global = true, env = "LEADFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the background scheduler.
    Serve {
        /// Port to listen on (overrides config).
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind (overrides config).
        #[arg(long)]
        host: Option<String>,
    },

    /// Execute a workflow once, as the HTTP endpoint would.
    Execute {
        /// Workflow ID.
        workflow_id: Uuid,

        /// Acting CRM user.
        #[arg(long)]
        user: Uuid,

        /// Explicit lead IDs (repeatable). Without any, the audience filter applies.
        #[arg(long = "lead")]
        leads: Vec<Uuid>,

        /// Simulate: no provider calls, no CRM writes.
        #[arg(long)]
        test_mode: bool,
    },

    /// Advance every due enrollment once.
    Tick,

    /// Load workflows, leads and advisors from a JSON bundle.
    Import {
        /// Path to the bundle file.
        path: PathBuf,
    },

    /// List enrollments of a workflow.
    #[command(alias = "ls")]
    Enrollments {
        /// Workflow ID.
        workflow_id: Uuid,

        /// Maximum enrollments to show.
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_execute_accepts_repeated_leads() {
        let wf = Uuid::now_v7();
        let user = Uuid::now_v7();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let cli = Cli::try_parse_from([
            "leadflow",
            "execute",
            &wf.to_string(),
            "--user",
            &user.to_string(),
            "--lead",
            &a.to_string(),
            "--lead",
            &b.to_string(),
            "--test-mode",
        ])
        .unwrap();

        match cli.command {
            Commands::Execute {
                workflow_id,
                leads,
                test_mode,
                ..
            } => {
                assert_eq!(workflow_id, wf);
                assert_eq!(leads, vec![a, b]);
                assert!(test_mode);
            }
            _ => panic!("expected execute"),
        }
    }
}
