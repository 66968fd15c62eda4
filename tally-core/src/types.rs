//! Domain types for the Tally document store.
//!
//! All types are serializable/deserializable via serde + serde_yaml. Wire
//! payloads reuse the same structs through serde_json.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a project partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectName(pub String);

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Numeric section identifier, unique within a project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SectionId(pub u32);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for SectionId {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A 2-D seat grid: rows of nullable seat markers.
///
/// Owned by the seat-planner surface; the counting path carries it through
/// writes without inspecting it.
pub type SeatGrid = Vec<Vec<Option<String>>>;

/// A named occupancy counter scoped to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
    pub project: ProjectName,
    /// Stamped by the daemon's write path, never by clients.
    pub last_modified: DateTime<Utc>,
    /// Monotonic per-section revision, bumped by the daemon on every write.
    /// Clients use it to drop stale push events.
    #[serde(default)]
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<SeatGrid>,
}

impl Section {
    /// True when `count` may grow by `delta` without exceeding `capacity`.
    pub fn has_room_for(&self, delta: u64) -> bool {
        match self.capacity {
            Some(cap) => self.count + delta <= cap,
            None => true,
        }
    }
}

/// Batched count-update payload: the fields a client may change on an
/// existing section. `last_modified` and `version` are stamped server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountUpdate {
    pub id: SectionId,
    pub project: ProjectName,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<SeatGrid>,
}

impl CountUpdate {
    pub fn from_section(section: &Section) -> Self {
        Self {
            id: section.id,
            project: section.project.clone(),
            count: section.count,
            capacity: section.capacity,
            layout: section.layout.clone(),
        }
    }
}

/// A change published by the daemon's write path and fanned out to every
/// event subscriber. Payloads are minimal: the id plus the changed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PushEvent {
    CountUpdated {
        id: SectionId,
        project: ProjectName,
        count: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        capacity: Option<u64>,
        last_modified: DateTime<Utc>,
        version: u64,
    },
    SectionAdded {
        section: Section,
    },
    SectionDeleted {
        id: SectionId,
        project: ProjectName,
    },
    SectionRenamed {
        id: SectionId,
        project: ProjectName,
        name: String,
        version: u64,
    },
}

/// Root of a per-project sections document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDocument {
    /// Document schema version.
    pub version: u32,
    pub project: ProjectName,
    /// Next id handed out by [`crate::store::allocate_ids_at`].
    pub next_id: u32,
    #[serde(default)]
    pub sections: Vec<Section>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectDocument {
    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn section_mut(&mut self, id: SectionId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id == id)
    }
}

/// Per-day edit counters for a project: day bucket → section → edit count.
///
/// Buckets are keyed by day-of-month (1–31), so the same bucket is shared by
/// equal day numbers of different months. This matches the display the
/// counters feed (a rolling "last five days" bar) and is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EditDocument {
    #[serde(default)]
    pub days: BTreeMap<u32, BTreeMap<SectionId, u64>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EditDocument {
    /// Add one edit for each of `ids` in the `day` bucket.
    pub fn record(&mut self, day: u32, ids: &[SectionId], at: DateTime<Utc>) {
        let bucket = self.days.entry(day).or_default();
        for id in ids {
            *bucket.entry(*id).or_insert(0) += 1;
        }
        self.updated_at = Some(at);
    }

    /// Total edits across the given sections for one day bucket.
    pub fn total_for_day(&self, day: u32, ids: &[SectionId]) -> u64 {
        let Some(bucket) = self.days.get(&day) else {
            return 0;
        };
        ids.iter()
            .filter_map(|id| bucket.get(id))
            .copied()
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
