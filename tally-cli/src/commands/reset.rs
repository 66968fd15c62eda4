//! `tally reset` — zero every count in a project, immediately.

use anyhow::{Context, Result};
use clap::Args;

use tally_core::ProjectName;

use crate::remote::SocketBackend;

/// Arguments for `tally reset`.
#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Project whose counts should be zeroed.
    pub project: String,
}

impl ResetArgs {
    pub fn run(self) -> Result<()> {
        let home = crate::home_dir()?;

        crate::block_on(async move {
            let backend = SocketBackend::new(home);
            let handle = tally_client::spawn(backend, ProjectName::from(self.project.clone()))
                .await
                .context("failed to start session — is the daemon running?")?;

            let before = handle.sections().await.context("snapshot failed")?;
            handle.reset_counts().await.context("reset failed")?;
            println!(
                "✓ reset {} section{} in '{}' to 0",
                before.len(),
                if before.len() == 1 { "" } else { "s" },
                self.project,
            );

            handle.shutdown().await.context("session shutdown failed")?;
            Ok(())
        })
    }
}
