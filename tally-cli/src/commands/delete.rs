//! `tally delete` — optimistic batched deletion.

use anyhow::{Context, Result};
use clap::Args;

use tally_core::{ProjectName, SectionId};

use crate::remote::SocketBackend;

/// Arguments for `tally delete`.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Project the sections belong to.
    pub project: String,

    /// Section ids to delete.
    #[arg(required = true)]
    pub ids: Vec<u32>,
}

impl DeleteArgs {
    pub fn run(self) -> Result<()> {
        let home = crate::home_dir()?;

        crate::block_on(async move {
            let backend = SocketBackend::new(home);
            let handle = tally_client::spawn(backend, ProjectName::from(self.project.clone()))
                .await
                .context("failed to start session — is the daemon running?")?;

            for id in &self.ids {
                handle
                    .delete_section(SectionId(*id))
                    .await
                    .context("delete failed")?;
            }

            // Shutdown flushes the accumulated batch as one delete call.
            handle.shutdown().await.context("session shutdown failed")?;
            println!(
                "✓ deleted {} section{} from '{}'",
                self.ids.len(),
                if self.ids.len() == 1 { "" } else { "s" },
                self.project,
            );
            Ok(())
        })
    }
}
