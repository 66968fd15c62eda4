//! `tally stats` — latest update and edit activity for one project.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use tally_core::ProjectName;

use crate::remote::SocketBackend;

/// Arguments for `tally stats`.
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Project to summarize.
    pub project: String,
}

#[derive(Tabled)]
struct DayRow {
    #[tabled(rename = "day")]
    day: u32,
    #[tabled(rename = "edits")]
    edits: u64,
}

impl StatsArgs {
    pub fn run(self) -> Result<()> {
        let home = crate::home_dir()?;

        crate::block_on(async move {
            let backend = SocketBackend::new(home);
            let handle = tally_client::spawn(backend, ProjectName::from(self.project.clone()))
                .await
                .context("failed to start session — is the daemon running?")?;

            let stats = handle.stats(Utc::now()).await.context("stats failed")?;
            handle.shutdown().await.context("session shutdown failed")?;

            println!("{}", self.project.to_uppercase().bold());
            println!(
                "{} sections | {} occupied | last update: {}",
                stats.section_count,
                stats.total_count,
                match stats.latest_last_modified {
                    Some(at) => super::format_age(at),
                    None => "never".to_string(),
                },
            );
            println!("edits today: {}", stats.edits_today);

            let rows: Vec<DayRow> = stats
                .last_five_days
                .iter()
                .map(|(day, edits)| DayRow {
                    day: *day,
                    edits: *edits,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");

            Ok(())
        })
    }
}
