//! Async shell around [`ReconcilerState`].
//!
//! The session task owns the state and serializes the three update channels
//! in one `select!` loop: handle commands, the snapshot feed, the push-event
//! feed, and the earliest pending debounce deadline. Flush failures are
//! logged and dropped — the optimistic view stays ahead of the backend until
//! the next snapshot refresh overwrites it.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use tally_core::{ProjectName, PushEvent, Section, SectionId};

use crate::backend::Backend;
use crate::error::ClientError;
use crate::reconciler::{Flush, ReconcilerState};

/// Summary of the active project, for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStats {
    pub section_count: usize,
    pub total_count: u64,
    pub latest_last_modified: Option<DateTime<Utc>>,
    pub edits_today: u64,
    pub last_five_days: Vec<(u32, u64)>,
}

enum Command {
    Increment {
        id: SectionId,
        ack: oneshot::Sender<()>,
    },
    Decrement {
        id: SectionId,
        ack: oneshot::Sender<()>,
    },
    UpdateSections {
        sections: Vec<Section>,
        ack: oneshot::Sender<()>,
    },
    Rename {
        id: SectionId,
        name: String,
        ack: oneshot::Sender<()>,
    },
    AddSection {
        name: String,
        capacity: Option<u64>,
        ack: oneshot::Sender<SectionId>,
    },
    DeleteSection {
        id: SectionId,
        ack: oneshot::Sender<()>,
    },
    ResetCounts {
        ack: oneshot::Sender<()>,
    },
    Sections {
        all: bool,
        respond_to: oneshot::Sender<Vec<Section>>,
    },
    Stats {
        today: DateTime<Utc>,
        respond_to: oneshot::Sender<ProjectStats>,
    },
    FlushNow {
        ack: oneshot::Sender<()>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

/// Start a session: bulk-read the current state, subscribe to both feeds,
/// and spawn the reconciliation loop. The backend is injected here and torn
/// down by [`SessionHandle::shutdown`]; nothing is process-global.
pub async fn spawn<B: Backend>(
    backend: B,
    active_project: ProjectName,
) -> Result<SessionHandle, ClientError> {
    let backend = Arc::new(backend);
    let mut state = ReconcilerState::new(active_project);
    state.apply_snapshot(backend.fetch_sections().await?);
    state.set_edit_log(backend.fetch_edit_log().await?);
    let events = backend.subscribe_events().await?;
    let snapshots = backend.subscribe_snapshots().await?;

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(run(state, backend, rx, events, snapshots));
    Ok(SessionHandle { tx })
}

impl SessionHandle {
    pub async fn increment(&self, id: SectionId) -> Result<(), ClientError> {
        self.ack(|ack| Command::Increment { id, ack }).await
    }

    pub async fn decrement(&self, id: SectionId) -> Result<(), ClientError> {
        self.ack(|ack| Command::Decrement { id, ack }).await
    }

    pub async fn update_sections(&self, sections: Vec<Section>) -> Result<(), ClientError> {
        self.ack(|ack| Command::UpdateSections { sections, ack }).await
    }

    pub async fn rename_section(&self, id: SectionId, name: String) -> Result<(), ClientError> {
        self.ack(|ack| Command::Rename { id, name, ack }).await
    }

    /// Returns the provisional id assigned to the new section.
    pub async fn add_section(
        &self,
        name: String,
        capacity: Option<u64>,
    ) -> Result<SectionId, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::AddSection {
                name,
                capacity,
                ack: tx,
            })
            .await
            .map_err(|_| ClientError::ChannelClosed("session commands"))?;
        rx.await
            .map_err(|_| ClientError::ChannelClosed("session response"))
    }

    pub async fn delete_section(&self, id: SectionId) -> Result<(), ClientError> {
        self.ack(|ack| Command::DeleteSection { id, ack }).await
    }

    pub async fn reset_counts(&self) -> Result<(), ClientError> {
        self.ack(|ack| Command::ResetCounts { ack }).await
    }

    /// The active project's sections, sorted by id.
    pub async fn sections(&self) -> Result<Vec<Section>, ClientError> {
        self.query(|respond_to| Command::Sections {
            all: false,
            respond_to,
        })
        .await
    }

    /// Every project's sections, sorted by project then id.
    pub async fn all_sections(&self) -> Result<Vec<Section>, ClientError> {
        self.query(|respond_to| Command::Sections {
            all: true,
            respond_to,
        })
        .await
    }

    pub async fn stats(&self, today: DateTime<Utc>) -> Result<ProjectStats, ClientError> {
        self.query(|respond_to| Command::Stats { today, respond_to })
            .await
    }

    /// Force every pending buffer to flush now, regardless of deadlines.
    pub async fn flush_now(&self) -> Result<(), ClientError> {
        self.ack(|ack| Command::FlushNow { ack }).await
    }

    /// Flush all pending buffers and stop the session task.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.ack(|ack| Command::Shutdown { ack }).await
    }

    async fn ack(
        &self,
        make: impl FnOnce(oneshot::Sender<()>) -> Command,
    ) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| ClientError::ChannelClosed("session commands"))?;
        rx.await
            .map_err(|_| ClientError::ChannelClosed("session response"))
    }

    async fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| ClientError::ChannelClosed("session commands"))?;
        rx.await
            .map_err(|_| ClientError::ChannelClosed("session response"))
    }
}

async fn run<B: Backend>(
    mut state: ReconcilerState,
    backend: Arc<B>,
    mut commands: mpsc::Receiver<Command>,
    mut events: mpsc::Receiver<PushEvent>,
    mut snapshots: mpsc::Receiver<Vec<Section>>,
) {
    let mut events_open = true;
    let mut snapshots_open = true;

    loop {
        let deadline = state.next_deadline();
        let flush_timer = async {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            maybe_cmd = commands.recv() => {
                let Some(cmd) = maybe_cmd else {
                    // Every handle dropped: drain pending writes, then stop.
                    let flushes = state.take_all_flushes();
                    execute_flushes(&mut state, backend.as_ref(), flushes).await;
                    break;
                };
                if handle_command(&mut state, backend.as_ref(), cmd).await == Flow::Stop {
                    break;
                }
            }
            maybe_snapshot = snapshots.recv(), if snapshots_open => {
                match maybe_snapshot {
                    Some(snapshot) => state.apply_snapshot(snapshot),
                    None => snapshots_open = false,
                }
            }
            maybe_event = events.recv(), if events_open => {
                match maybe_event {
                    Some(event) => state.apply_event(event),
                    None => events_open = false,
                }
            }
            _ = flush_timer => {
                let due = state.take_due_flushes(Instant::now());
                execute_flushes(&mut state, backend.as_ref(), due).await;
            }
        }
    }
}

#[derive(PartialEq)]
enum Flow {
    Continue,
    Stop,
}

async fn handle_command<B: Backend>(
    state: &mut ReconcilerState,
    backend: &B,
    cmd: Command,
) -> Flow {
    match cmd {
        Command::Increment { id, ack } => {
            let forced = state.increment(id, Instant::now());
            execute_forced(state, backend, forced).await;
            let _ = ack.send(());
        }
        Command::Decrement { id, ack } => {
            let forced = state.decrement(id, Instant::now());
            execute_forced(state, backend, forced).await;
            let _ = ack.send(());
        }
        Command::UpdateSections { sections, ack } => {
            let forced = state.update_sections(sections, Instant::now());
            execute_forced(state, backend, forced).await;
            let _ = ack.send(());
        }
        Command::Rename { id, name, ack } => {
            if let Some(request) = state.rename_section(id, name) {
                if let Err(err) = backend
                    .rename_section(request.project, request.id, request.name)
                    .await
                {
                    tracing::warn!("rename failed: {err}");
                }
            }
            let _ = ack.send(());
        }
        Command::AddSection {
            name,
            capacity,
            ack,
        } => {
            let (id, forced) = state.add_section(name, capacity, Utc::now(), Instant::now());
            execute_forced(state, backend, forced).await;
            let _ = ack.send(id);
        }
        Command::DeleteSection { id, ack } => {
            let forced = state.delete_section(id, Instant::now());
            execute_forced(state, backend, forced).await;
            let _ = ack.send(());
        }
        Command::ResetCounts { ack } => {
            let batch = state.reset_counts();
            if !batch.is_empty() {
                if let Err(err) = backend.update_counts(batch).await {
                    tracing::warn!("count reset failed: {err}");
                }
            }
            let _ = ack.send(());
        }
        Command::Sections { all, respond_to } => {
            let sections = if all {
                state.sections().to_vec()
            } else {
                state.active_project_sections()
            };
            let _ = respond_to.send(sections);
        }
        Command::Stats { today, respond_to } => {
            let active = state.active_project_sections();
            let stats = ProjectStats {
                section_count: active.len(),
                total_count: active.iter().map(|s| s.count).sum(),
                latest_last_modified: state.latest_last_modified(),
                edits_today: state.total_edits_for_day(today.day()),
                last_five_days: state.total_edits_for_last_five_days(today),
            };
            let _ = respond_to.send(stats);
        }
        Command::FlushNow { ack } => {
            let flushes = state.take_all_flushes();
            execute_flushes(state, backend, flushes).await;
            let _ = ack.send(());
        }
        Command::Shutdown { ack } => {
            let flushes = state.take_all_flushes();
            execute_flushes(state, backend, flushes).await;
            let _ = ack.send(());
            return Flow::Stop;
        }
    }
    Flow::Continue
}

async fn execute_forced<B: Backend>(
    state: &mut ReconcilerState,
    backend: &B,
    forced: Option<Flush>,
) {
    if let Some(flush) = forced {
        tracing::debug!("pending buffer overflow forced an early flush");
        execute_flush(state, backend, flush).await;
    }
}

async fn execute_flushes<B: Backend>(
    state: &mut ReconcilerState,
    backend: &B,
    flushes: Vec<Flush>,
) {
    for flush in flushes {
        execute_flush(state, backend, flush).await;
    }
}

async fn execute_flush<B: Backend>(state: &mut ReconcilerState, backend: &B, flush: Flush) {
    match flush {
        Flush::Updates { updates, edited } => {
            if let Err(err) = backend.update_counts(updates).await {
                tracing::warn!("count flush failed; local state stays ahead until the next snapshot: {err}");
                return;
            }
            let day = Utc::now().day();
            for (project, ids) in edited {
                match backend.record_edits(project.clone(), ids.clone(), day).await {
                    Ok(()) => state.note_edits(project, &ids, day),
                    Err(err) => tracing::warn!("edit tally for '{project}' failed: {err}"),
                }
            }
        }
        Flush::Adds { sections } => match backend.create_sections(sections.clone()).await {
            Ok(authoritative) => state.confirm_adds(&sections, authoritative),
            Err(err) => tracing::warn!("create flush failed: {err}"),
        },
        Flush::Deletes { ids } => {
            if let Err(err) = backend.delete_sections(ids).await {
                tracing::warn!("delete flush failed: {err}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, RecordedCall};
    use crate::reconciler::QUIET_PERIOD;
    use tokio::time::{advance, Duration};

    fn proj() -> ProjectName {
        ProjectName::from("hall")
    }

    fn section(id: u32, count: u64) -> Section {
        Section {
            id: SectionId(id),
            name: format!("section-{id}"),
            count,
            capacity: Some(30),
            project: proj(),
            last_modified: Utc::now(),
            version: 1,
            layout: None,
        }
    }

    /// Let the session task catch up with whatever was just queued.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn rapid_increments_batch_into_one_call_after_quiet_period() {
        let backend = MemoryBackend::with_sections(vec![section(1, 5)]);
        let handle = spawn(backend.clone(), proj()).await.expect("spawn");

        handle.increment(SectionId(1)).await.expect("inc");
        handle.increment(SectionId(1)).await.expect("inc");
        handle.increment(SectionId(1)).await.expect("inc");

        let visible = handle.sections().await.expect("sections");
        assert_eq!(visible[0].count, 8, "optimistic count visible instantly");
        assert!(backend.calls().is_empty(), "no call before the quiet period");

        advance(QUIET_PERIOD + Duration::from_millis(10)).await;
        settle().await;

        let calls = backend.calls();
        let updates: Vec<_> = calls
            .iter()
            .filter(|c| matches!(c, RecordedCall::UpdateCounts(_)))
            .collect();
        assert_eq!(updates.len(), 1, "exactly one batched persistence call");
        match updates[0] {
            RecordedCall::UpdateCounts(batch) => {
                assert_eq!(batch.len(), 1);
                assert_eq!(batch[0].count, 8, "final value only");
            }
            _ => unreachable!(),
        }
        assert!(
            calls
                .iter()
                .any(|c| matches!(c, RecordedCall::RecordEdits { .. })),
            "flush records the day's edit tally"
        );
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn each_call_restarts_the_quiet_period() {
        let backend = MemoryBackend::with_sections(vec![section(1, 0)]);
        let handle = spawn(backend.clone(), proj()).await.expect("spawn");

        handle.increment(SectionId(1)).await.expect("inc");
        advance(Duration::from_millis(2000)).await;
        handle.increment(SectionId(1)).await.expect("inc");
        advance(Duration::from_millis(2000)).await;
        settle().await;
        assert!(
            backend.calls().is_empty(),
            "second call pushed the deadline past this point"
        );

        advance(Duration::from_millis(1100)).await;
        settle().await;
        assert_eq!(backend.calls().iter().filter(|c| matches!(c, RecordedCall::UpdateCounts(_))).count(), 1);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn rename_is_sent_immediately() {
        let backend = MemoryBackend::with_sections(vec![section(1, 0)]);
        let handle = spawn(backend.clone(), proj()).await.expect("spawn");

        handle
            .rename_section(SectionId(1), "balcony".into())
            .await
            .expect("rename");
        settle().await;

        assert_eq!(
            backend.calls(),
            vec![RecordedCall::Rename {
                project: proj(),
                id: SectionId(1),
                name: "balcony".into(),
            }],
            "rename is not debounced"
        );
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn failed_flush_leaves_state_ahead_until_snapshot_heals_it() {
        let backend = MemoryBackend::with_sections(vec![section(1, 5)]);
        let handle = spawn(backend.clone(), proj()).await.expect("spawn");

        backend.fail_writes(true);
        handle.increment(SectionId(1)).await.expect("inc");
        advance(QUIET_PERIOD + Duration::from_millis(10)).await;
        settle().await;

        let visible = handle.sections().await.expect("sections");
        assert_eq!(visible[0].count, 6, "optimistic value survives the failure");

        // The periodic snapshot eventually overwrites the unreconciled state.
        backend.push_snapshot(vec![section(1, 5)]).await;
        settle().await;
        let visible = handle.sections().await.expect("sections");
        assert_eq!(visible[0].count, 5, "snapshot wins once buffers are empty");
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn shutdown_flushes_pending_writes() {
        let backend = MemoryBackend::with_sections(vec![section(1, 5)]);
        let handle = spawn(backend.clone(), proj()).await.expect("spawn");

        handle.increment(SectionId(1)).await.expect("inc");
        handle.shutdown().await.expect("shutdown");

        assert!(
            backend
                .calls()
                .iter()
                .any(|c| matches!(c, RecordedCall::UpdateCounts(_))),
            "pending count update flushed on shutdown"
        );
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn push_events_update_the_view() {
        let backend = MemoryBackend::with_sections(vec![section(1, 5)]);
        let handle = spawn(backend.clone(), proj()).await.expect("spawn");

        backend
            .push_event(PushEvent::CountUpdated {
                id: SectionId(1),
                project: proj(),
                count: 11,
                capacity: Some(30),
                last_modified: Utc::now(),
                version: 9,
            })
            .await;
        settle().await;

        let visible = handle.sections().await.expect("sections");
        assert_eq!(visible[0].count, 11);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn add_then_flush_adopts_authoritative_record() {
        let backend = MemoryBackend::new();
        let handle = spawn(backend.clone(), proj()).await.expect("spawn");

        let provisional = handle
            .add_section("floor".into(), Some(20))
            .await
            .expect("add");
        assert_eq!(provisional, SectionId(1));

        handle.flush_now().await.expect("flush");
        let visible = handle.sections().await.expect("sections");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].version, 1, "authoritative record adopted");

        assert!(backend
            .calls()
            .iter()
            .any(|c| matches!(c, RecordedCall::Create(_))));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn reset_counts_is_immediate() {
        let backend = MemoryBackend::with_sections(vec![section(1, 5), section(2, 9)]);
        let handle = spawn(backend.clone(), proj()).await.expect("spawn");

        handle.reset_counts().await.expect("reset");

        let calls = backend.calls();
        assert_eq!(calls.len(), 1, "reset does not wait out a quiet period");
        match &calls[0] {
            RecordedCall::UpdateCounts(batch) => {
                assert_eq!(batch.len(), 2);
                assert!(batch.iter().all(|u| u.count == 0));
            }
            other => panic!("expected update call, got {other:?}"),
        }
    }
}
