//! `tally project init <name>` and `tally project list`.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use tally_core::ProjectName;
use tally_daemon::{request_status, send_request, DaemonRequest};

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create an empty project (idempotent).
    Init(InitArgs),

    /// List projects known to the daemon.
    List,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project name (e.g. "main-hall").
    pub name: String,
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "sections")]
    sections: u64,
    #[tabled(rename = "occupancy")]
    occupancy: u64,
}

pub fn run(command: ProjectCommand) -> Result<()> {
    let home = crate::home_dir()?;

    match command {
        ProjectCommand::Init(args) => {
            let request = DaemonRequest::InitProject {
                project: ProjectName::from(args.name.clone()),
            };
            let response = send_request(&home, &request)
                .with_context(|| format!("failed to create project '{}'", args.name))?;
            if response.ok {
                println!("✓ project '{}' ready", args.name);
            } else {
                anyhow::bail!(
                    "daemon rejected project init: {}",
                    response.error.unwrap_or_else(|| "unknown error".into())
                );
            }
        }
        ProjectCommand::List => {
            let status = request_status(&home).context("failed to query daemon")?;
            let projects = status["projects"].as_array().cloned().unwrap_or_default();
            if projects.is_empty() {
                println!("No projects yet. Run `tally project init <name>` first.");
                return Ok(());
            }

            let rows: Vec<ProjectRow> = projects
                .iter()
                .map(|p| ProjectRow {
                    project: p["name"].as_str().unwrap_or("?").to_string(),
                    sections: p["sections"].as_u64().unwrap_or(0),
                    occupancy: p["total_count"].as_u64().unwrap_or(0),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }

    Ok(())
}
