//! `tally add` — create a section through a reconciler session.

use anyhow::{Context, Result};
use clap::Args;

use tally_core::ProjectName;

use crate::remote::SocketBackend;

/// Arguments for `tally add`.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Project the section belongs to.
    pub project: String,

    /// Display name for the new section.
    pub name: String,

    /// Optional seat capacity.
    #[arg(long)]
    pub capacity: Option<u64>,
}

impl AddArgs {
    pub fn run(self) -> Result<()> {
        let home = crate::home_dir()?;

        crate::block_on(async move {
            let backend = SocketBackend::new(home);
            let handle = tally_client::spawn(backend, ProjectName::from(self.project.clone()))
                .await
                .context("failed to start session — is the daemon running?")?;

            handle
                .add_section(self.name.clone(), self.capacity)
                .await
                .context("add failed")?;

            // Flush now so we can report the daemon-assigned id.
            handle.flush_now().await.context("flush failed")?;
            let sections = handle.sections().await.context("read-back failed")?;
            let created = sections
                .iter()
                .rev()
                .find(|s| s.name == self.name)
                .context("section did not persist — check daemon logs")?;

            println!(
                "✓ added section {} '{}' to '{}'{}",
                created.id,
                created.name,
                self.project,
                match created.capacity {
                    Some(cap) => format!(" (capacity {cap})"),
                    None => String::new(),
                }
            );

            handle.shutdown().await.context("session shutdown failed")?;
            Ok(())
        })
    }
}
