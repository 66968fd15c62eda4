//! The backend contract the reconciler consumes.
//!
//! The session never talks to a transport directly: everything it needs from
//! the outside world — bulk reads, batched writes, the push-event feed, and
//! the full-snapshot feed — arrives through this trait. The daemon socket
//! client implements it in production; [`MemoryBackend`] implements it for
//! tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use tally_core::{CountUpdate, ProjectName, PushEvent, Section, SectionId};

use crate::edits::EditLog;
use crate::error::ClientError;

/// Batched persistence and subscription capabilities.
///
/// Write methods correspond one-to-one with the daemon's batched endpoints.
/// `create_sections` returns the authoritative records (daemon-assigned ids,
/// stamped `last_modified`/`version`); the caller replaces its provisional
/// entries with them.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Fetch every section across all projects, ordered by project then id.
    async fn fetch_sections(&self) -> Result<Vec<Section>, ClientError>;

    /// Fetch every project's edit aggregate.
    async fn fetch_edit_log(&self) -> Result<EditLog, ClientError>;

    /// Persist a batch of new sections. The returned records are
    /// authoritative and may differ from the request in id and version.
    async fn create_sections(&self, sections: Vec<Section>) -> Result<Vec<Section>, ClientError>;

    /// Persist a batch of count/capacity/layout updates.
    async fn update_counts(&self, updates: Vec<CountUpdate>) -> Result<(), ClientError>;

    /// Delete a batch of sections.
    async fn delete_sections(
        &self,
        ids: Vec<(ProjectName, SectionId)>,
    ) -> Result<(), ClientError>;

    /// Rename one section, immediately.
    async fn rename_section(
        &self,
        project: ProjectName,
        id: SectionId,
        name: String,
    ) -> Result<(), ClientError>;

    /// Add one edit to the `day` bucket for each of `ids`.
    async fn record_edits(
        &self,
        project: ProjectName,
        ids: Vec<SectionId>,
        day: u32,
    ) -> Result<(), ClientError>;

    /// Subscribe to the push-event feed.
    async fn subscribe_events(&self) -> Result<mpsc::Receiver<PushEvent>, ClientError>;

    /// Subscribe to the full-snapshot feed: the complete current section
    /// collection, delivered on every underlying change.
    async fn subscribe_snapshots(&self) -> Result<mpsc::Receiver<Vec<Section>>, ClientError>;
}

// ---------------------------------------------------------------------------
// In-memory test backend
// ---------------------------------------------------------------------------

/// Recorded write calls, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Create(Vec<Section>),
    UpdateCounts(Vec<CountUpdate>),
    Delete(Vec<(ProjectName, SectionId)>),
    Rename {
        project: ProjectName,
        id: SectionId,
        name: String,
    },
    RecordEdits {
        project: ProjectName,
        ids: Vec<SectionId>,
        day: u32,
    },
}

#[derive(Default)]
struct MemoryInner {
    sections: Vec<Section>,
    edit_log: EditLog,
    calls: Vec<RecordedCall>,
    fail_writes: bool,
    next_version: u64,
}

/// An in-memory [`Backend`] that records every write call and lets tests
/// inject snapshots and push events through the returned senders.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
    event_txs: Arc<Mutex<Vec<mpsc::Sender<PushEvent>>>>,
    snapshot_txs: Arc<Mutex<Vec<mpsc::Sender<Vec<Section>>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sections(sections: Vec<Section>) -> Self {
        let backend = Self::default();
        backend.inner.lock().unwrap().sections = sections;
        backend
    }

    /// Make every subsequent write call fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    pub fn set_edit_log(&self, log: EditLog) {
        self.inner.lock().unwrap().edit_log = log;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Deliver a push event to every subscriber.
    pub async fn push_event(&self, event: PushEvent) {
        let txs = self.event_txs.lock().unwrap().clone();
        for tx in txs {
            let _ = tx.send(event.clone()).await;
        }
    }

    /// Deliver a full snapshot to every subscriber.
    pub async fn push_snapshot(&self, sections: Vec<Section>) {
        let txs = self.snapshot_txs.lock().unwrap().clone();
        for tx in txs {
            let _ = tx.send(sections.clone()).await;
        }
    }

    fn check_writes(&self) -> Result<(), ClientError> {
        if self.inner.lock().unwrap().fail_writes {
            return Err(ClientError::Backend("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn fetch_sections(&self) -> Result<Vec<Section>, ClientError> {
        Ok(self.inner.lock().unwrap().sections.clone())
    }

    async fn fetch_edit_log(&self) -> Result<EditLog, ClientError> {
        Ok(self.inner.lock().unwrap().edit_log.clone())
    }

    async fn create_sections(&self, sections: Vec<Section>) -> Result<Vec<Section>, ClientError> {
        self.check_writes()?;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedCall::Create(sections.clone()));
        let mut authoritative = Vec::with_capacity(sections.len());
        for mut section in sections {
            inner.next_version += 1;
            section.version = inner.next_version;
            inner.sections.push(section.clone());
            authoritative.push(section);
        }
        Ok(authoritative)
    }

    async fn update_counts(&self, updates: Vec<CountUpdate>) -> Result<(), ClientError> {
        self.check_writes()?;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedCall::UpdateCounts(updates.clone()));
        for update in updates {
            inner.next_version += 1;
            let version = inner.next_version;
            if let Some(section) = inner
                .sections
                .iter_mut()
                .find(|s| s.project == update.project && s.id == update.id)
            {
                section.count = update.count;
                section.capacity = update.capacity;
                section.layout = update.layout;
                section.version = version;
            }
        }
        Ok(())
    }

    async fn delete_sections(
        &self,
        ids: Vec<(ProjectName, SectionId)>,
    ) -> Result<(), ClientError> {
        self.check_writes()?;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedCall::Delete(ids.clone()));
        inner
            .sections
            .retain(|s| !ids.iter().any(|(p, id)| *p == s.project && *id == s.id));
        Ok(())
    }

    async fn rename_section(
        &self,
        project: ProjectName,
        id: SectionId,
        name: String,
    ) -> Result<(), ClientError> {
        self.check_writes()?;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedCall::Rename {
            project: project.clone(),
            id,
            name: name.clone(),
        });
        inner.next_version += 1;
        let version = inner.next_version;
        if let Some(section) = inner
            .sections
            .iter_mut()
            .find(|s| s.project == project && s.id == id)
        {
            section.name = name;
            section.version = version;
        }
        Ok(())
    }

    async fn record_edits(
        &self,
        project: ProjectName,
        ids: Vec<SectionId>,
        day: u32,
    ) -> Result<(), ClientError> {
        self.check_writes()?;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedCall::RecordEdits {
            project: project.clone(),
            ids: ids.clone(),
            day,
        });
        inner
            .edit_log
            .entry(project)
            .or_default()
            .record(day, &ids, chrono::Utc::now());
        Ok(())
    }

    async fn subscribe_events(&self) -> Result<mpsc::Receiver<PushEvent>, ClientError> {
        let (tx, rx) = mpsc::channel(64);
        self.event_txs.lock().unwrap().push(tx);
        Ok(rx)
    }

    async fn subscribe_snapshots(&self) -> Result<mpsc::Receiver<Vec<Section>>, ClientError> {
        let (tx, rx) = mpsc::channel(64);
        self.snapshot_txs.lock().unwrap().push(tx);
        Ok(rx)
    }
}
