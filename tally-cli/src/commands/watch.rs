//! `tally watch` — live section table, redrawn on every change.
//!
//! Consumes the daemon's `watch` stream: the full current collection
//! arrives as one JSON line per change, so a dropped frame costs nothing.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use tally_core::Section;
use tally_daemon::paths::socket_path;
use tally_daemon::{DaemonRequest, DaemonResponse};

/// Arguments for `tally watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Project to follow.
    pub project: String,
}

#[derive(Tabled)]
struct WatchRow {
    #[tabled(rename = "id")]
    id: u32,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "occupancy")]
    occupancy: String,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let home = crate::home_dir()?;
        let socket = socket_path(&home);
        if !socket.exists() {
            bail!("daemon is not running (socket missing: {})", socket.display());
        }

        let mut stream = UnixStream::connect(&socket)
            .with_context(|| format!("failed to connect to {}", socket.display()))?;
        let payload =
            serde_json::to_string(&DaemonRequest::Watch).context("failed to encode request")?;
        stream
            .write_all(payload.as_bytes())
            .and_then(|_| stream.write_all(b"\n"))
            .and_then(|_| stream.flush())
            .context("failed to send watch request")?;

        let mut lines = BufReader::new(stream).lines();

        // The acknowledgement carries the initial collection.
        let first = lines
            .next()
            .context("daemon closed the watch stream")?
            .context("failed to read watch acknowledgement")?;
        let response: DaemonResponse =
            serde_json::from_str(first.trim_end()).context("malformed watch acknowledgement")?;
        if !response.ok {
            bail!(
                "daemon rejected watch: {}",
                response.error.unwrap_or_else(|| "unknown error".into())
            );
        }
        let sections: Vec<Section> =
            serde_json::from_value(response.data.unwrap_or_default()).unwrap_or_default();
        render(&self.project, &sections);

        for line in lines {
            let line = line.context("watch stream read failed")?;
            match serde_json::from_str::<Vec<Section>>(&line) {
                Ok(sections) => render(&self.project, &sections),
                Err(err) => tracing::warn!("dropping malformed snapshot frame: {err}"),
            }
        }

        println!("daemon closed the watch stream");
        Ok(())
    }
}

fn render(project: &str, sections: &[Section]) {
    let filtered: Vec<&Section> = sections
        .iter()
        .filter(|s| s.project.0 == project)
        .collect();

    // Clear screen and home the cursor between frames.
    print!("\x1b[2J\x1b[H");
    println!(
        "{} — {} sections, {} occupied",
        project.to_uppercase().bold(),
        filtered.len(),
        filtered.iter().map(|s| s.count).sum::<u64>(),
    );

    if filtered.is_empty() {
        println!("(no sections yet)");
        return;
    }

    let rows: Vec<WatchRow> = filtered
        .iter()
        .map(|s| WatchRow {
            id: s.id.0,
            name: s.name.clone(),
            occupancy: match s.capacity {
                Some(capacity) if s.count >= capacity => {
                    format!("{}/{capacity}", s.count).red().to_string()
                }
                Some(capacity) => format!("{}/{capacity}", s.count),
                None => s.count.to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
