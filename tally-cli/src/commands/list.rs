//! `tally list` — one-shot section listing.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tally_core::Section;
use tally_daemon::request_snapshot;

/// Arguments for `tally list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter to a specific project.
    #[arg(long)]
    pub project: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct SectionRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "id")]
    id: u32,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "occupancy")]
    occupancy: String,
    #[tabled(rename = "updated")]
    updated: String,
}

#[derive(Serialize)]
struct SectionJson {
    project: String,
    id: u32,
    name: String,
    count: u64,
    capacity: Option<u64>,
    last_modified: String,
}

impl ListArgs {
    pub fn run(self) -> Result<()> {
        let home = crate::home_dir()?;

        let mut sections =
            request_snapshot(&home).context("failed to fetch sections from the daemon")?;
        if let Some(filter) = self.project.as_ref() {
            sections.retain(|s| s.project.0 == *filter);
        }

        if self.json {
            let payload: Vec<SectionJson> = sections.iter().map(to_json_row).collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize sections")?
            );
            return Ok(());
        }

        if sections.is_empty() {
            println!("No sections yet. Run `tally add <project> <name>` first.");
            return Ok(());
        }

        print_table(&sections);
        Ok(())
    }
}

fn to_json_row(section: &Section) -> SectionJson {
    SectionJson {
        project: section.project.0.clone(),
        id: section.id.0,
        name: section.name.clone(),
        count: section.count,
        capacity: section.capacity,
        last_modified: section.last_modified.to_rfc3339(),
    }
}

fn print_table(sections: &[Section]) {
    let rows: Vec<SectionRow> = sections
        .iter()
        .map(|s| SectionRow {
            project: s.project.0.clone(),
            id: s.id.0,
            name: s.name.clone(),
            occupancy: occupancy_cell(s),
            updated: super::format_age(s.last_modified),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let total: u64 = sections.iter().map(|s| s.count).sum();
    println!("{} {total}", "total occupancy:".bold());
}

fn occupancy_cell(section: &Section) -> String {
    match section.capacity {
        Some(capacity) if section.count >= capacity => {
            format!("{}/{capacity}", section.count).red().to_string()
        }
        Some(capacity) => format!("{}/{capacity}", section.count),
        None => section.count.to_string(),
    }
}
