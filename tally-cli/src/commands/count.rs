//! `tally inc` / `tally dec` — optimistic count mutations.
//!
//! Bounds are enforced here, at the call site: the session applies whatever
//! it is told, exactly like the dashboard buttons that guard their own
//! clicks.

use anyhow::{bail, Context, Result};
use clap::Args;

use tally_core::{ProjectName, SectionId};

use crate::remote::SocketBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Arguments for `tally inc` / `tally dec`.
#[derive(Args, Debug)]
pub struct CountArgs {
    /// Project the section belongs to.
    pub project: String,

    /// Section id.
    pub id: u32,

    /// How many steps to apply.
    #[arg(long, default_value_t = 1)]
    pub by: u64,
}

impl CountArgs {
    pub fn run(self, direction: Direction) -> Result<()> {
        let home = crate::home_dir()?;

        crate::block_on(async move {
            let backend = SocketBackend::new(home);
            let handle = tally_client::spawn(backend, ProjectName::from(self.project.clone()))
                .await
                .context("failed to start session — is the daemon running?")?;

            let id = SectionId(self.id);
            let sections = handle.sections().await.context("snapshot failed")?;
            let Some(section) = sections.iter().find(|s| s.id == id) else {
                bail!("no section {} in project '{}'", self.id, self.project);
            };

            match direction {
                Direction::Up => {
                    if !section.has_room_for(self.by) {
                        bail!(
                            "'{}' is at capacity ({} of {})",
                            section.name,
                            section.count,
                            section.capacity.unwrap_or(section.count),
                        );
                    }
                    for _ in 0..self.by {
                        handle.increment(id).await.context("increment failed")?;
                    }
                }
                Direction::Down => {
                    if self.by > section.count {
                        bail!(
                            "'{}' only holds {} — cannot remove {}",
                            section.name,
                            section.count,
                            self.by,
                        );
                    }
                    for _ in 0..self.by {
                        handle.decrement(id).await.context("decrement failed")?;
                    }
                }
            }

            let after = handle
                .sections()
                .await
                .context("read-back failed")?
                .into_iter()
                .find(|s| s.id == id)
                .map(|s| s.count)
                .unwrap_or_default();
            println!("'{}' → {}", section.name, after);

            // Shutdown force-flushes the coalesced update.
            handle.shutdown().await.context("session shutdown failed")?;
            Ok(())
        })
    }
}
