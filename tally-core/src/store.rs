//! Per-project YAML document store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.tally/
//!   projects/
//!     <project_name>/
//!       sections.yaml   (ProjectDocument — mode 0600)
//!       edits.yaml      (EditDocument — mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function that touches the filesystem has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::StoreError;
use crate::types::{EditDocument, ProjectDocument, ProjectName, SectionId};

/// Current schema version written into new project documents.
pub const DOCUMENT_VERSION: u32 = 1;

const SECTIONS_FILE: &str = "sections.yaml";
const EDITS_FILE: &str = "edits.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.tally/projects/<project>/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn project_dir_at(home: &Path, project: &ProjectName) -> Result<PathBuf, StoreError> {
    let dir = home.join(".tally").join("projects").join(&project.0);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.tally/projects/<project>/sections.yaml` — pure, no I/O.
pub fn sections_path_at(home: &Path, project: &ProjectName) -> PathBuf {
    home.join(".tally")
        .join("projects")
        .join(&project.0)
        .join(SECTIONS_FILE)
}

/// `<home>/.tally/projects/<project>/edits.yaml` — pure, no I/O.
pub fn edits_path_at(home: &Path, project: &ProjectName) -> PathBuf {
    home.join(".tally")
        .join("projects")
        .join(&project.0)
        .join(EDITS_FILE)
}

/// Lists the names of all project directories under `<home>/.tally/projects/`.
pub fn list_project_names_at(home: &Path) -> Result<Vec<ProjectName>, StoreError> {
    let dir = home.join(".tally").join("projects");
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut names: Vec<ProjectName> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| ProjectName::from(e.file_name().to_string_lossy().into_owned()))
        .collect();
    names.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(names)
}

/// `list_project_names_at` convenience wrapper.
pub fn list_project_names() -> Result<Vec<ProjectName>, StoreError> {
    list_project_names_at(&home()?)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load a project document from `<home>/.tally/projects/<project>/sections.yaml`.
///
/// Returns `StoreError::ProjectNotFound` if absent,
/// `StoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_project_at(home: &Path, project: &ProjectName) -> Result<ProjectDocument, StoreError> {
    let path = sections_path_at(home, project);
    if !path.exists() {
        return Err(StoreError::ProjectNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// `load_project_at` convenience wrapper.
pub fn load_project(project: &ProjectName) -> Result<ProjectDocument, StoreError> {
    load_project_at(&home()?, project)
}

/// Walk `<home>/.tally/projects/*/sections.yaml` and return every project
/// document, sorted by project name.
pub fn list_projects_at(home: &Path) -> Result<Vec<ProjectDocument>, StoreError> {
    let mut docs = Vec::new();
    for name in list_project_names_at(home)? {
        match load_project_at(home, &name) {
            Ok(doc) => docs.push(doc),
            // A project dir without a sections file is an empty shell; skip it.
            Err(StoreError::ProjectNotFound { .. }) => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(docs)
}

/// `list_projects_at` convenience wrapper.
pub fn list_projects() -> Result<Vec<ProjectDocument>, StoreError> {
    list_projects_at(&home()?)
}

/// Load the edit aggregate for a project.
///
/// Returns an empty document if the file does not yet exist.
pub fn load_edits_at(home: &Path, project: &ProjectName) -> Result<EditDocument, StoreError> {
    let path = edits_path_at(home, project);
    if !path.exists() {
        return Ok(EditDocument::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// `load_edits_at` convenience wrapper.
pub fn load_edits(project: &ProjectName) -> Result<EditDocument, StoreError> {
    load_edits_at(&home()?, project)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a project document.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem).
pub fn save_project_at(home: &Path, doc: &ProjectDocument) -> Result<(), StoreError> {
    project_dir_at(home, &doc.project)?; // create dir + 0700 if absent
    let path = sections_path_at(home, &doc.project);
    atomic_write_yaml(&path, doc)
}

/// `save_project_at` convenience wrapper.
pub fn save_project(doc: &ProjectDocument) -> Result<(), StoreError> {
    save_project_at(&home()?, doc)
}

/// Atomically save the edit aggregate for a project.
pub fn save_edits_at(
    home: &Path,
    project: &ProjectName,
    edits: &EditDocument,
) -> Result<(), StoreError> {
    project_dir_at(home, project)?;
    let path = edits_path_at(home, project);
    atomic_write_yaml(&path, edits)
}

/// `save_edits_at` convenience wrapper.
pub fn save_edits(project: &ProjectName, edits: &EditDocument) -> Result<(), StoreError> {
    save_edits_at(&home()?, project, edits)
}

fn atomic_write_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| SECTIONS_FILE.to_string());
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let yaml = serde_yaml::to_string(value)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(StoreError::Io(e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Create an empty project document under `<home>/.tally/projects/<project>/`.
///
/// Idempotent: if the document already exists, loads and returns it unchanged.
pub fn init_project_at(home: &Path, project: &ProjectName) -> Result<ProjectDocument, StoreError> {
    let path = sections_path_at(home, project);
    if path.exists() {
        return load_project_at(home, project);
    }

    let now = Utc::now();
    let doc = ProjectDocument {
        version: DOCUMENT_VERSION,
        project: project.clone(),
        next_id: 1,
        sections: vec![],
        created_at: now,
        updated_at: now,
    };
    save_project_at(home, &doc)?;
    Ok(doc)
}

/// `init_project_at` convenience wrapper.
pub fn init_project(project: &ProjectName) -> Result<ProjectDocument, StoreError> {
    init_project_at(&home()?, project)
}

// ---------------------------------------------------------------------------
// 5. Id allocation
// ---------------------------------------------------------------------------

/// Reserve `n` consecutive section ids for a project.
///
/// The `next_id` bump is persisted before the ids are returned, so two
/// sequential allocations can never hand out the same id. Callers that need
/// concurrency safety must serialize their calls (the daemon routes every
/// allocation through its single write queue).
pub fn allocate_ids_at(
    home: &Path,
    project: &ProjectName,
    n: u32,
) -> Result<Vec<SectionId>, StoreError> {
    let mut doc = load_project_at(home, project)?;
    let first = doc.next_id;
    doc.next_id += n;
    doc.updated_at = Utc::now();
    save_project_at(home, &doc)?;
    Ok((first..first + n).map(SectionId).collect())
}

/// `allocate_ids_at` convenience wrapper.
pub fn allocate_ids(project: &ProjectName, n: u32) -> Result<Vec<SectionId>, StoreError> {
    allocate_ids_at(&home()?, project, n)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Section, SectionId};
    use rstest::rstest;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    fn proj() -> ProjectName {
        ProjectName::from("hall")
    }

    fn make_section(id: u32) -> Section {
        Section {
            id: SectionId(id),
            name: format!("section-{id}"),
            count: 0,
            capacity: Some(40),
            project: proj(),
            last_modified: Utc::now(),
            version: 0,
            layout: None,
        }
    }

    #[test]
    fn sections_path_is_correct() {
        let home = make_home();
        let path = sections_path_at(home.path(), &proj());
        assert!(path.ends_with(".tally/projects/hall/sections.yaml"));
    }

    #[test]
    fn project_dir_created_with_perms() {
        let home = make_home();
        let dir = project_dir_at(home.path(), &proj()).expect("project_dir_at");
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn init_save_load_roundtrip() {
        let home = make_home();
        let mut doc = init_project_at(home.path(), &proj()).expect("init");
        doc.sections.push(make_section(1));
        doc.next_id = 2;
        save_project_at(home.path(), &doc).expect("save");

        let loaded = load_project_at(home.path(), &proj()).expect("load");
        assert_eq!(loaded.sections.len(), 1);
        assert_eq!(loaded.next_id, 2);
        assert_eq!(loaded.sections[0].id, SectionId(1));
    }

    #[test]
    fn init_is_idempotent() {
        let home = make_home();
        let mut doc = init_project_at(home.path(), &proj()).expect("first init");
        doc.sections.push(make_section(1));
        doc.next_id = 2;
        save_project_at(home.path(), &doc).expect("save");

        let again = init_project_at(home.path(), &proj()).expect("second init");
        assert_eq!(again.sections.len(), 1, "re-init must not reset the document");
        assert_eq!(again.next_id, 2);
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = make_home();
        let doc = init_project_at(home.path(), &proj()).expect("init");
        save_project_at(home.path(), &doc).expect("save");
        let tmp = sections_path_at(home.path(), &proj()).with_file_name("sections.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn load_missing_project_returns_not_found() {
        let home = make_home();
        let err = load_project_at(home.path(), &proj()).unwrap_err();
        assert!(matches!(err, StoreError::ProjectNotFound { .. }));
    }

    #[test]
    fn list_projects_empty_when_no_projects() {
        let home = make_home();
        let list = list_projects_at(home.path()).expect("list");
        assert!(list.is_empty());
    }

    #[test]
    fn list_projects_sorted_by_name() {
        let home = make_home();
        init_project_at(home.path(), &ProjectName::from("west-wing")).expect("init");
        init_project_at(home.path(), &ProjectName::from("atrium")).expect("init");

        let docs = list_projects_at(home.path()).expect("list");
        let names: Vec<&str> = docs.iter().map(|d| d.project.0.as_str()).collect();
        assert_eq!(names, ["atrium", "west-wing"]);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    fn allocate_ids_are_consecutive_and_persisted(#[case] n: u32) {
        let home = make_home();
        init_project_at(home.path(), &proj()).expect("init");

        let first = allocate_ids_at(home.path(), &proj(), n).expect("first alloc");
        let second = allocate_ids_at(home.path(), &proj(), n).expect("second alloc");

        assert_eq!(first.len() as u32, n);
        assert_eq!(first[0], SectionId(1));
        assert_eq!(
            second[0],
            SectionId(1 + n),
            "second allocation must start past the persisted bump"
        );
    }

    #[test]
    fn edits_load_default_when_missing() {
        let home = make_home();
        let edits = load_edits_at(home.path(), &proj()).expect("load");
        assert!(edits.days.is_empty());
    }

    #[test]
    fn edits_save_load_roundtrip() {
        let home = make_home();
        let mut edits = EditDocument::default();
        edits.record(14, &[SectionId(1), SectionId(2)], Utc::now());
        save_edits_at(home.path(), &proj(), &edits).expect("save");

        let loaded = load_edits_at(home.path(), &proj()).expect("load");
        assert_eq!(loaded.total_for_day(14, &[SectionId(1), SectionId(2)]), 2);
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(StoreError::HomeNotFound.to_string().contains("home directory"));
    }
}
