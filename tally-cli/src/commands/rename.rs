//! `tally rename` — immediate (non-debounced) section rename.

use anyhow::{Context, Result};
use clap::Args;

use tally_core::{ProjectName, SectionId};

use crate::remote::SocketBackend;

/// Arguments for `tally rename`.
#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Project the section belongs to.
    pub project: String,

    /// Section id.
    pub id: u32,

    /// New display name.
    pub name: String,
}

impl RenameArgs {
    pub fn run(self) -> Result<()> {
        let home = crate::home_dir()?;

        crate::block_on(async move {
            let backend = SocketBackend::new(home);
            let handle = tally_client::spawn(backend, ProjectName::from(self.project.clone()))
                .await
                .context("failed to start session — is the daemon running?")?;

            handle
                .rename_section(SectionId(self.id), self.name.clone())
                .await
                .context("rename failed")?;
            println!("✓ section {} renamed to '{}'", self.id, self.name);

            handle.shutdown().await.context("session shutdown failed")?;
            Ok(())
        })
    }
}
