//! The counter state reconciler.
//!
//! [`ReconcilerState`] owns the merged in-memory section view and the
//! write-coalescing buffers. Three channels mutate the view: local optimistic
//! edits, full snapshot replaces, and push events. Local mutations accumulate
//! into per-kind pending buffers behind trailing-edge debounce deadlines;
//! [`take_due_flushes`](ReconcilerState::take_due_flushes) extracts the
//! batches once a deadline expires. The state is synchronous and clock-free —
//! callers pass `Instant`s in — so the coalescing rules are testable without
//! a runtime.
//!
//! Merge rules: pending local edits overlay snapshots, and push events older
//! than the local record's `version` are dropped as stale.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::time::{Duration, Instant};

use tally_core::{CountUpdate, ProjectName, PushEvent, Section, SectionId};

use crate::edits::{last_five_day_numbers, EditLog};

/// Quiet period before accumulated local mutations are flushed. Every
/// accumulating call restarts the window (debounce, not throttle).
pub const QUIET_PERIOD: Duration = Duration::from_millis(3000);

/// Hard cap per pending buffer; reaching it forces that kind's flush
/// immediately, independent of the timer.
pub const MAX_PENDING: usize = 64;

type Key = (ProjectName, SectionId);

/// A batch extracted from a pending buffer, ready for one backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Flush {
    /// One batched count-update call, plus the per-project section lists to
    /// record in the day's edit aggregate after it succeeds.
    Updates {
        updates: Vec<CountUpdate>,
        edited: Vec<(ProjectName, Vec<SectionId>)>,
    },
    /// One batched create call carrying the provisional records.
    Adds { sections: Vec<Section> },
    /// One batched delete call.
    Deletes { ids: Vec<Key> },
}

/// An immediate (non-debounced) rename call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    pub project: ProjectName,
    pub id: SectionId,
    pub name: String,
}

/// The merged section view plus write-coalescing state for one session.
pub struct ReconcilerState {
    active_project: ProjectName,
    sections: Vec<Section>,
    edits: EditLog,

    pending_updates: BTreeMap<Key, Section>,
    pending_adds: Vec<Section>,
    pending_deletes: Vec<Key>,

    update_deadline: Option<Instant>,
    add_deadline: Option<Instant>,
    delete_deadline: Option<Instant>,

    quiet_period: Duration,
    max_pending: usize,
}

impl ReconcilerState {
    pub fn new(active_project: ProjectName) -> Self {
        Self::with_limits(active_project, QUIET_PERIOD, MAX_PENDING)
    }

    pub fn with_limits(
        active_project: ProjectName,
        quiet_period: Duration,
        max_pending: usize,
    ) -> Self {
        Self {
            active_project,
            sections: Vec::new(),
            edits: EditLog::new(),
            pending_updates: BTreeMap::new(),
            pending_adds: Vec::new(),
            pending_deletes: Vec::new(),
            update_deadline: None,
            add_deadline: None,
            delete_deadline: None,
            quiet_period,
            max_pending,
        }
    }

    pub fn active_project(&self) -> &ProjectName {
        &self.active_project
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    // -----------------------------------------------------------------------
    // Channel 1: local optimistic mutations
    // -----------------------------------------------------------------------

    /// `count + 1` for the active project's section `id`.
    /// Silent no-op when the id is unknown; bounds are the caller's job.
    pub fn increment(&mut self, id: SectionId, now: Instant) -> Option<Flush> {
        self.adjust_count(id, 1, now)
    }

    /// `count - 1` for the active project's section `id`.
    pub fn decrement(&mut self, id: SectionId, now: Instant) -> Option<Flush> {
        self.adjust_count(id, -1, now)
    }

    fn adjust_count(&mut self, id: SectionId, delta: i64, now: Instant) -> Option<Flush> {
        let section = self.find_active(id)?;
        let mut updated = section.clone();
        updated.count = if delta >= 0 {
            updated.count + delta as u64
        } else {
            updated.count.saturating_sub((-delta) as u64)
        };
        self.update_sections(vec![updated], now)
    }

    /// Optimistically upsert every record and accumulate it for the next
    /// count-update flush. A newer call overwrites the older pending value
    /// for the same section; each call restarts the quiet period.
    ///
    /// Returns a forced flush when the pending buffer hits its cap.
    pub fn update_sections(&mut self, updates: Vec<Section>, now: Instant) -> Option<Flush> {
        for section in updates {
            let key = (section.project.clone(), section.id);
            self.upsert(section.clone());
            self.pending_updates.insert(key, section);
        }
        if self.pending_updates.len() >= self.max_pending {
            return self.extract_updates();
        }
        self.update_deadline = Some(now + self.quiet_period);
        None
    }

    /// Optimistic rename. Returns the immediate backend call when the name
    /// actually changed; `None` for an unknown id or an unchanged name.
    pub fn rename_section(&mut self, id: SectionId, name: String) -> Option<RenameRequest> {
        let project = self.active_project.clone();
        let section = self
            .sections
            .iter_mut()
            .find(|s| s.project == project && s.id == id)?;
        if section.name == name {
            return None;
        }
        section.name = name.clone();
        Some(RenameRequest { project, id, name })
    }

    /// Create a section with a provisional id (`last id + 1`, or 1 when the
    /// active project is empty), `count = 0`, and `at` as `last_modified`;
    /// merge it into the view and accumulate it for the next create flush.
    pub fn add_section(
        &mut self,
        name: String,
        capacity: Option<u64>,
        at: DateTime<Utc>,
        now: Instant,
    ) -> (SectionId, Option<Flush>) {
        let id = self.next_provisional_id();
        let section = Section {
            id,
            name,
            count: 0,
            capacity,
            project: self.active_project.clone(),
            last_modified: at,
            version: 0,
            layout: None,
        };
        self.upsert(section.clone());
        self.pending_adds.push(section);
        if self.pending_adds.len() >= self.max_pending {
            let flush = self.extract_adds();
            return (id, flush);
        }
        self.add_deadline = Some(now + self.quiet_period);
        (id, None)
    }

    /// Mark a section for deletion: hide every pending id from the view
    /// immediately and accumulate the id for the next delete flush.
    pub fn delete_section(&mut self, id: SectionId, now: Instant) -> Option<Flush> {
        let key = (self.active_project.clone(), id);
        if !self.pending_deletes.contains(&key) {
            self.pending_deletes.push(key);
        }
        let hidden = self.pending_deletes.clone();
        self.sections
            .retain(|s| !hidden.iter().any(|(p, i)| *p == s.project && *i == s.id));
        if self.pending_deletes.len() >= self.max_pending {
            return self.extract_deletes();
        }
        self.delete_deadline = Some(now + self.quiet_period);
        None
    }

    /// Zero every active-project count locally and return the whole set as
    /// one batch for immediate (non-debounced) persistence.
    pub fn reset_counts(&mut self) -> Vec<CountUpdate> {
        let project = self.active_project.clone();
        let mut batch = Vec::new();
        for section in self.sections.iter_mut().filter(|s| s.project == project) {
            section.count = 0;
            batch.push(CountUpdate::from_section(section));
        }
        batch
    }

    // -----------------------------------------------------------------------
    // Channel 2: full snapshot replace
    // -----------------------------------------------------------------------

    /// Replace the view wholesale, then re-apply the pending overlays:
    /// pending updates and adds win over snapshot contents, pending deletes
    /// stay hidden. Once a flush has cleared the buffers, a snapshot that
    /// still carries a "deleted" id restores it.
    pub fn apply_snapshot(&mut self, snapshot: Vec<Section>) {
        self.sections = snapshot;
        let pending_updates: Vec<Section> = self.pending_updates.values().cloned().collect();
        for section in pending_updates {
            self.upsert(section);
        }
        let pending_adds = self.pending_adds.clone();
        for section in pending_adds {
            if self.find_key(&section.project, section.id).is_none() {
                self.sections.push(section);
            }
        }
        let hidden = self.pending_deletes.clone();
        self.sections
            .retain(|s| !hidden.iter().any(|(p, i)| *p == s.project && *i == s.id));
        self.sort();
    }

    pub fn set_edit_log(&mut self, log: EditLog) {
        self.edits = log;
    }

    // -----------------------------------------------------------------------
    // Channel 3: push events
    // -----------------------------------------------------------------------

    /// Apply one push event. `count-updated` only touches an existing entry
    /// (unknown id is a no-op), skips sections with a pending local update,
    /// and drops events older than the local record's version.
    pub fn apply_event(&mut self, event: PushEvent) {
        match event {
            PushEvent::CountUpdated {
                id,
                project,
                count,
                capacity,
                last_modified,
                version,
            } => {
                if self.pending_updates.contains_key(&(project.clone(), id)) {
                    return;
                }
                let Some(section) = self.find_key_mut(&project, id) else {
                    return;
                };
                if version < section.version {
                    return;
                }
                section.count = count;
                section.capacity = capacity;
                section.last_modified = last_modified;
                section.version = version;
            }
            PushEvent::SectionAdded { section } => {
                match self.find_key_mut(&section.project, section.id) {
                    Some(existing) if section.version < existing.version => {}
                    Some(existing) => *existing = section,
                    None => {
                        self.sections.push(section);
                        self.sort();
                    }
                }
            }
            PushEvent::SectionDeleted { id, project } => {
                self.sections
                    .retain(|s| !(s.project == project && s.id == id));
                self.pending_updates.remove(&(project, id));
            }
            PushEvent::SectionRenamed {
                id,
                project,
                name,
                version,
            } => {
                let Some(section) = self.find_key_mut(&project, id) else {
                    return;
                };
                if version < section.version {
                    return;
                }
                section.name = name;
                section.version = version;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Debounce deadlines and flush extraction
    // -----------------------------------------------------------------------

    /// The earliest pending deadline across the three mutation kinds.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.update_deadline, self.add_deadline, self.delete_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    /// Extract every batch whose deadline has passed.
    pub fn take_due_flushes(&mut self, now: Instant) -> Vec<Flush> {
        let mut flushes = Vec::new();
        if self.update_deadline.is_some_and(|d| d <= now) {
            flushes.extend(self.extract_updates());
        }
        if self.add_deadline.is_some_and(|d| d <= now) {
            flushes.extend(self.extract_adds());
        }
        if self.delete_deadline.is_some_and(|d| d <= now) {
            flushes.extend(self.extract_deletes());
        }
        flushes
    }

    /// Extract every non-empty batch regardless of deadlines (shutdown path).
    pub fn take_all_flushes(&mut self) -> Vec<Flush> {
        let mut flushes = Vec::new();
        flushes.extend(self.extract_updates());
        flushes.extend(self.extract_adds());
        flushes.extend(self.extract_deletes());
        flushes
    }

    /// Replace the flushed provisional records with the authoritative ones
    /// returned by the create call.
    pub fn confirm_adds(&mut self, provisional: &[Section], authoritative: Vec<Section>) {
        self.sections.retain(|s| {
            !provisional
                .iter()
                .any(|p| p.project == s.project && p.id == s.id)
        });
        for section in authoritative {
            self.upsert(section);
        }
    }

    /// Mirror a successful `record_edits` call into the local aggregate.
    pub fn note_edits(&mut self, project: ProjectName, ids: &[SectionId], day: u32) {
        self.edits
            .entry(project)
            .or_default()
            .record(day, ids, Utc::now());
    }

    fn extract_updates(&mut self) -> Option<Flush> {
        self.update_deadline = None;
        if self.pending_updates.is_empty() {
            return None;
        }
        let mut updates = Vec::with_capacity(self.pending_updates.len());
        let mut edited: BTreeMap<ProjectName, Vec<SectionId>> = BTreeMap::new();
        for ((project, id), section) in std::mem::take(&mut self.pending_updates) {
            updates.push(CountUpdate::from_section(&section));
            edited.entry(project).or_default().push(id);
        }
        Some(Flush::Updates {
            updates,
            edited: edited.into_iter().collect(),
        })
    }

    fn extract_adds(&mut self) -> Option<Flush> {
        self.add_deadline = None;
        if self.pending_adds.is_empty() {
            return None;
        }
        Some(Flush::Adds {
            sections: std::mem::take(&mut self.pending_adds),
        })
    }

    fn extract_deletes(&mut self) -> Option<Flush> {
        self.delete_deadline = None;
        if self.pending_deletes.is_empty() {
            return None;
        }
        Some(Flush::Deletes {
            ids: std::mem::take(&mut self.pending_deletes),
        })
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    pub fn active_project_sections(&self) -> Vec<Section> {
        self.sections
            .iter()
            .filter(|s| s.project == self.active_project)
            .cloned()
            .collect()
    }

    pub fn latest_last_modified(&self) -> Option<DateTime<Utc>> {
        self.sections
            .iter()
            .filter(|s| s.project == self.active_project)
            .map(|s| s.last_modified)
            .max()
    }

    /// Total edits recorded in the `day` bucket across the active project's
    /// current sections.
    pub fn total_edits_for_day(&self, day: u32) -> u64 {
        let Some(edits) = self.edits.get(&self.active_project) else {
            return 0;
        };
        let ids: Vec<SectionId> = self
            .sections
            .iter()
            .filter(|s| s.project == self.active_project)
            .map(|s| s.id)
            .collect();
        edits.total_for_day(day, &ids)
    }

    /// `(day number, total)` pairs for today back through four days ago,
    /// newest first, day numbers wrapping across month boundaries.
    pub fn total_edits_for_last_five_days(&self, today: DateTime<Utc>) -> Vec<(u32, u64)> {
        last_five_day_numbers(today)
            .into_iter()
            .map(|day| (day, self.total_edits_for_day(day)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn next_provisional_id(&self) -> SectionId {
        let last = self
            .sections
            .iter()
            .filter(|s| s.project == self.active_project)
            .map(|s| s.id.0)
            .max()
            .unwrap_or(0);
        SectionId(last + 1)
    }

    fn find_active(&self, id: SectionId) -> Option<&Section> {
        self.find_key(&self.active_project, id)
    }

    fn find_key(&self, project: &ProjectName, id: SectionId) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.project == *project && s.id == id)
    }

    fn find_key_mut(&mut self, project: &ProjectName, id: SectionId) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .find(|s| s.project == *project && s.id == id)
    }

    fn upsert(&mut self, section: Section) {
        match self.find_key_mut(&section.project, section.id) {
            Some(existing) => *existing = section,
            None => {
                self.sections.push(section);
                self.sort();
            }
        }
    }

    fn sort(&mut self) {
        self.sections
            .sort_by(|a, b| a.project.cmp(&b.project).then(a.id.cmp(&b.id)));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::EditDocument;

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

    fn other_project_section(id: u32, count: u64) -> Section {
        let mut s = section(id, count);
        s.project = ProjectName::from("annex");
        s
    }

    fn state_with(sections: Vec<Section>) -> ReconcilerState {
        let mut state = ReconcilerState::new(proj());
        state.apply_snapshot(sections);
        state
    }

    fn visible_count(state: &ReconcilerState, id: u32) -> Option<u64> {
        state
            .sections()
            .iter()
            .find(|s| s.project == proj() && s.id == SectionId(id))
            .map(|s| s.count)
    }

    #[test]
    fn increments_and_decrements_apply_synchronously() {
        let mut state = state_with(vec![section(1, 5)]);
        let now = Instant::now();

        state.increment(SectionId(1), now);
        state.increment(SectionId(1), now);
        state.increment(SectionId(1), now);
        state.decrement(SectionId(1), now);

        assert_eq!(visible_count(&state, 1), Some(7), "net +2 visible at once");
    }

    #[test]
    fn increment_of_unknown_id_is_silent_noop() {
        let mut state = state_with(vec![section(1, 5)]);
        let flush = state.increment(SectionId(42), Instant::now());
        assert!(flush.is_none());
        assert_eq!(state.sections().len(), 1);
        assert!(state.next_deadline().is_none(), "no deadline was started");
    }

    #[test]
    fn repeated_updates_coalesce_to_final_value() {
        let mut state = state_with(vec![section(1, 5)]);
        let t0 = Instant::now();

        state.increment(SectionId(1), t0);
        state.increment(SectionId(1), t0 + Duration::from_millis(100));
        state.increment(SectionId(1), t0 + Duration::from_millis(200));
        assert_eq!(visible_count(&state, 1), Some(8));

        // Quiet period counts from the LAST call, not the first.
        let early = state.take_due_flushes(t0 + Duration::from_millis(3100));
        assert!(early.is_empty(), "flush must not fire before quiet period");

        let due = state.take_due_flushes(t0 + Duration::from_millis(3200));
        assert_eq!(due.len(), 1);
        match &due[0] {
            Flush::Updates { updates, edited } => {
                assert_eq!(updates.len(), 1, "one coalesced record");
                assert_eq!(updates[0].count, 8, "final value only");
                assert_eq!(edited, &vec![(proj(), vec![SectionId(1)])]);
            }
            other => panic!("expected update flush, got {other:?}"),
        }

        // Buffer and deadline are cleared after extraction.
        assert!(state.next_deadline().is_none());
        assert!(state.take_due_flushes(t0 + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn three_rapid_increments_produce_one_call_with_count_8() {
        let mut state = state_with(vec![section(1, 5)]);
        let t0 = Instant::now();

        for _ in 0..3 {
            assert!(state.increment(SectionId(1), t0).is_none());
        }
        assert_eq!(visible_count(&state, 1), Some(8), "8 visible instantly");

        let flushes = state.take_due_flushes(t0 + QUIET_PERIOD);
        assert_eq!(flushes.len(), 1, "exactly one batched call");
        match &flushes[0] {
            Flush::Updates { updates, .. } => {
                assert_eq!(updates.len(), 1);
                assert_eq!(updates[0].count, 8);
            }
            other => panic!("expected update flush, got {other:?}"),
        }
    }

    #[test]
    fn provisional_ids_start_at_one_and_follow_the_max() {
        let mut empty = ReconcilerState::new(proj());
        let (id, _) = empty.add_section("first".into(), None, Utc::now(), Instant::now());
        assert_eq!(id, SectionId(1));

        let mut state = state_with(vec![section(3, 0), section(7, 0)]);
        let (id, _) = state.add_section("next".into(), Some(12), Utc::now(), Instant::now());
        assert_eq!(id, SectionId(8));

        let added = state
            .sections()
            .iter()
            .find(|s| s.id == SectionId(8))
            .expect("optimistically visible");
        assert_eq!(added.count, 0);
        assert_eq!(added.capacity, Some(12));
    }

    #[test]
    fn provisional_id_ignores_other_projects() {
        let mut state = state_with(vec![section(2, 0), other_project_section(9, 0)]);
        let (id, _) = state.add_section("ours".into(), None, Utc::now(), Instant::now());
        assert_eq!(id, SectionId(3), "max is per active project");
    }

    #[test]
    fn delete_hides_immediately_and_snapshot_restores_after_flush() {
        let mut state = state_with(vec![section(1, 5), section(2, 0)]);
        let t0 = Instant::now();

        state.delete_section(SectionId(1), t0);
        assert_eq!(state.sections().len(), 1, "hidden before any backend call");

        // While the delete is pending, a snapshot cannot resurrect it.
        state.apply_snapshot(vec![section(1, 5), section(2, 0)]);
        assert_eq!(state.sections().len(), 1, "pending delete stays hidden");

        let flushes = state.take_due_flushes(t0 + QUIET_PERIOD);
        assert_eq!(
            flushes,
            vec![Flush::Deletes {
                ids: vec![(proj(), SectionId(1))]
            }]
        );

        // Backend delete failed; the next snapshot still carries id 1.
        state.apply_snapshot(vec![section(1, 5), section(2, 0)]);
        assert_eq!(state.sections().len(), 2, "failed delete self-heals");
    }

    #[test]
    fn rapid_deletes_accumulate_into_one_batch() {
        let mut state = state_with(vec![section(1, 0), section(2, 0), section(3, 0)]);
        let t0 = Instant::now();

        state.delete_section(SectionId(1), t0);
        state.delete_section(SectionId(3), t0 + Duration::from_millis(50));
        assert_eq!(state.sections().len(), 1, "both hidden optimistically");

        let flushes = state.take_due_flushes(t0 + Duration::from_millis(50) + QUIET_PERIOD);
        assert_eq!(
            flushes,
            vec![Flush::Deletes {
                ids: vec![(proj(), SectionId(1)), (proj(), SectionId(3))]
            }]
        );
    }

    #[test]
    fn count_updated_event_for_unknown_id_is_noop() {
        let mut state = state_with(vec![section(1, 5)]);
        state.apply_event(PushEvent::CountUpdated {
            id: SectionId(99),
            project: proj(),
            count: 3,
            capacity: None,
            last_modified: Utc::now(),
            version: 10,
        });
        assert_eq!(state.sections().len(), 1);
        assert_eq!(visible_count(&state, 1), Some(5));
    }

    #[test]
    fn stale_count_updated_event_is_dropped() {
        let mut sections = vec![section(1, 5)];
        sections[0].version = 7;
        let mut state = state_with(sections);

        state.apply_event(PushEvent::CountUpdated {
            id: SectionId(1),
            project: proj(),
            count: 2,
            capacity: Some(30),
            last_modified: Utc::now(),
            version: 6,
        });
        assert_eq!(visible_count(&state, 1), Some(5), "older version ignored");

        state.apply_event(PushEvent::CountUpdated {
            id: SectionId(1),
            project: proj(),
            count: 2,
            capacity: Some(30),
            last_modified: Utc::now(),
            version: 8,
        });
        assert_eq!(visible_count(&state, 1), Some(2), "newer version applies");
    }

    #[test]
    fn event_does_not_clobber_pending_local_update() {
        let mut state = state_with(vec![section(1, 5)]);
        let t0 = Instant::now();
        state.increment(SectionId(1), t0);

        state.apply_event(PushEvent::CountUpdated {
            id: SectionId(1),
            project: proj(),
            count: 5,
            capacity: Some(30),
            last_modified: Utc::now(),
            version: 99,
        });
        assert_eq!(
            visible_count(&state, 1),
            Some(6),
            "local optimistic edit wins until flushed"
        );
    }

    #[test]
    fn added_and_renamed_and_deleted_events_apply() {
        let mut state = state_with(vec![section(1, 5)]);

        let mut incoming = section(2, 0);
        incoming.version = 3;
        state.apply_event(PushEvent::SectionAdded {
            section: incoming.clone(),
        });
        assert_eq!(state.sections().len(), 2);

        state.apply_event(PushEvent::SectionRenamed {
            id: SectionId(2),
            project: proj(),
            name: "balcony".into(),
            version: 4,
        });
        let renamed = state.sections().iter().find(|s| s.id == SectionId(2)).unwrap();
        assert_eq!(renamed.name, "balcony");

        state.apply_event(PushEvent::SectionDeleted {
            id: SectionId(2),
            project: proj(),
        });
        assert_eq!(state.sections().len(), 1);
    }

    #[test]
    fn snapshot_overlays_pending_updates_and_adds() {
        let mut state = state_with(vec![section(1, 5)]);
        let t0 = Instant::now();

        state.increment(SectionId(1), t0);
        let (added_id, _) = state.add_section("new".into(), None, Utc::now(), t0);

        // A snapshot from before either local edit.
        state.apply_snapshot(vec![section(1, 5)]);

        assert_eq!(visible_count(&state, 1), Some(6), "pending update re-applied");
        assert!(
            state.sections().iter().any(|s| s.id == added_id),
            "pending add re-applied"
        );
    }

    #[test]
    fn rename_emits_request_only_when_name_changes() {
        let mut state = state_with(vec![section(1, 5)]);

        let request = state.rename_section(SectionId(1), "balcony".into());
        assert_eq!(
            request,
            Some(RenameRequest {
                project: proj(),
                id: SectionId(1),
                name: "balcony".into(),
            })
        );
        assert_eq!(state.sections()[0].name, "balcony");

        assert!(
            state.rename_section(SectionId(1), "balcony".into()).is_none(),
            "unchanged name sends nothing"
        );
        assert!(
            state.rename_section(SectionId(9), "ghost".into()).is_none(),
            "unknown id is a silent no-op"
        );
    }

    #[test]
    fn reset_counts_zeroes_active_project_and_returns_batch() {
        let mut state = state_with(vec![
            section(1, 5),
            section(2, 9),
            other_project_section(1, 4),
        ]);

        let batch = state.reset_counts();
        assert_eq!(batch.len(), 2, "only the active project's sections");
        assert!(batch.iter().all(|u| u.count == 0));
        assert_eq!(visible_count(&state, 1), Some(0));
        assert_eq!(visible_count(&state, 2), Some(0));

        let other = state
            .sections()
            .iter()
            .find(|s| s.project == ProjectName::from("annex"))
            .unwrap();
        assert_eq!(other.count, 4, "other projects untouched");
    }

    #[test]
    fn buffer_overflow_forces_immediate_flush() {
        let mut state = ReconcilerState::with_limits(proj(), QUIET_PERIOD, 3);
        state.apply_snapshot(vec![section(1, 0), section(2, 0), section(3, 0)]);
        let t0 = Instant::now();

        assert!(state.increment(SectionId(1), t0).is_none());
        assert!(state.increment(SectionId(2), t0).is_none());
        let forced = state.increment(SectionId(3), t0);

        match forced {
            Some(Flush::Updates { updates, .. }) => {
                assert_eq!(updates.len(), 3, "cap reached → whole buffer flushes")
            }
            other => panic!("expected forced flush, got {other:?}"),
        }
        assert!(state.next_deadline().is_none(), "deadline cleared by forced flush");
    }

    #[test]
    fn confirm_adds_swaps_provisional_for_authoritative() {
        let mut state = state_with(vec![section(1, 5)]);
        let t0 = Instant::now();
        let (provisional_id, _) = state.add_section("new".into(), None, Utc::now(), t0);
        assert_eq!(provisional_id, SectionId(2));

        let flushed = match state.take_due_flushes(t0 + QUIET_PERIOD).pop() {
            Some(Flush::Adds { sections }) => sections,
            other => panic!("expected add flush, got {other:?}"),
        };

        // The daemon allocated id 5 instead (another client got there first).
        let mut authoritative = flushed.clone();
        authoritative[0].id = SectionId(5);
        authoritative[0].version = 1;
        state.confirm_adds(&flushed, authoritative);

        assert!(state.sections().iter().all(|s| s.id != SectionId(2)));
        assert!(state.sections().iter().any(|s| s.id == SectionId(5)));
    }

    #[test]
    fn edit_totals_filter_by_active_project() {
        let mut state = state_with(vec![section(1, 0), other_project_section(1, 0)]);

        let mut log = EditLog::new();
        let mut ours = EditDocument::default();
        ours.record(5, &[SectionId(1)], Utc::now());
        ours.record(5, &[SectionId(1)], Utc::now());
        log.insert(proj(), ours);

        let mut theirs = EditDocument::default();
        theirs.record(5, &[SectionId(1)], Utc::now());
        log.insert(ProjectName::from("annex"), theirs);

        state.set_edit_log(log);
        assert_eq!(state.total_edits_for_day(5), 2, "other projects excluded");
        assert_eq!(state.total_edits_for_day(6), 0);
    }

    #[test]
    fn last_five_days_view_pairs_days_with_totals() {
        use chrono::TimeZone;
        let mut state = state_with(vec![section(1, 0)]);
        let mut log = EditLog::new();
        let mut edits = EditDocument::default();
        edits.record(2, &[SectionId(1)], Utc::now());
        edits.record(28, &[SectionId(1)], Utc::now());
        log.insert(proj(), edits);
        state.set_edit_log(log);

        let today = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let view = state.total_edits_for_last_five_days(today);
        assert_eq!(view, vec![(2, 1), (1, 0), (28, 1), (27, 0), (26, 0)]);
    }

    #[test]
    fn latest_last_modified_is_the_active_project_max() {
        use chrono::TimeZone;
        let mut a = section(1, 0);
        a.last_modified = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
        let mut b = section(2, 0);
        b.last_modified = Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap();
        let mut other = other_project_section(1, 0);
        other.last_modified = Utc.with_ymd_and_hms(2026, 8, 9, 10, 0, 0).unwrap();

        let state = state_with(vec![a, b.clone(), other]);
        assert_eq!(state.latest_last_modified(), Some(b.last_modified));
    }

    #[test]
    fn take_all_flushes_drains_every_kind() {
        let mut state = state_with(vec![section(1, 5), section(2, 0)]);
        let t0 = Instant::now();

        state.increment(SectionId(1), t0);
        state.add_section("new".into(), None, Utc::now(), t0);
        state.delete_section(SectionId(2), t0);

        let flushes = state.take_all_flushes();
        assert_eq!(flushes.len(), 3);
        assert!(state.take_all_flushes().is_empty(), "buffers fully drained");
        assert!(state.next_deadline().is_none());
    }
}
