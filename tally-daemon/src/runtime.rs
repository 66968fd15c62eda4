//! Daemon runtime: write processor + socket server + fan-out.
//!
//! All writes funnel through a single mpsc queue, so id allocation and
//! version stamping never race. Each applied write publishes its push events
//! on a broadcast channel (the `subscribe` stream) and a change tick on a
//! second one (the `watch` full-snapshot stream).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

use tally_core::{
    store, CountUpdate, EditDocument, ProjectDocument, ProjectName, PushEvent, Section, SectionId,
};

use crate::error::{io_err, DaemonError};
use crate::paths::{logs_dir, projects_root, run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse, SectionRef};

/// Fan-out capacity. A subscriber that lags this far drops events; the
/// `watch` stream self-heals because every tick carries the full state.
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub type ProjectCache = HashMap<ProjectName, ProjectDocument>;
type EditCache = HashMap<ProjectName, EditDocument>;

#[derive(Debug, Clone)]
enum WriteRequest {
    InitProject {
        project: ProjectName,
    },
    Create {
        sections: Vec<Section>,
    },
    UpdateCounts {
        updates: Vec<CountUpdate>,
    },
    Delete {
        ids: Vec<SectionRef>,
    },
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

#[derive(Debug)]
enum WriteOutcome {
    Done,
    Created(Vec<Section>),
}

struct WriteJob {
    request: WriteRequest,
    respond_to: oneshot::Sender<Result<WriteOutcome, String>>,
}

struct Shared {
    home: PathBuf,
    projects: RwLock<ProjectCache>,
    edits: RwLock<EditCache>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let (projects, edits) = load_caches(&home)?;
    let shared = std::sync::Arc::new(Shared {
        home: home.clone(),
        projects: RwLock::new(projects),
        edits: RwLock::new(edits),
    });
    let started_at_unix = unix_seconds_now();

    let (write_tx, write_rx) = mpsc::channel::<WriteJob>(64);
    let (event_tx, _) = broadcast::channel::<PushEvent>(EVENT_CHANNEL_CAPACITY);
    let (change_tx, _) = broadcast::channel::<()>(EVENT_CHANNEL_CAPACITY);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        let event_tx = event_tx.clone();
        let change_tx = change_tx.clone();
        tokio::spawn(async move {
            let result =
                write_processor_task(shared, write_rx, event_tx, change_tx, shutdown.subscribe())
                    .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        let write_tx = write_tx.clone();
        let event_tx = event_tx.clone();
        let change_tx = change_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                shared,
                write_tx,
                event_tx,
                change_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (processor_result, socket_result, rotation_result, signal_result) = tokio::join!(
        processor_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("write_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Write processor
// ---------------------------------------------------------------------------

async fn write_processor_task(
    shared: std::sync::Arc<Shared>,
    mut write_rx: mpsc::Receiver<WriteJob>,
    event_tx: broadcast::Sender<PushEvent>,
    change_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = write_rx.recv() => {
                let Some(job) = maybe_job else { break };

                let home = shared.home.clone();
                let request = job.request.clone();
                let applied = tokio::task::spawn_blocking(move || apply_write(&home, request))
                    .await
                    .map_err(|err| DaemonError::Protocol(format!("write task join error: {err}")))?;

                let outcome = match applied {
                    Ok((outcome, events)) => {
                        match refresh_caches(&shared).await {
                            Ok(()) => {
                                for event in events {
                                    // No receivers is fine; send only fails then.
                                    let _ = event_tx.send(event);
                                }
                                let _ = change_tx.send(());
                                Ok(outcome)
                            }
                            Err(err) => Err(err.to_string()),
                        }
                    }
                    Err(err) => Err(err.to_string()),
                };

                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

/// Apply one write to the store and return its outcome plus the push events
/// to fan out. Runs on a blocking thread; all stamping happens here, under
/// the single write queue.
fn apply_write(
    home: &Path,
    request: WriteRequest,
) -> Result<(WriteOutcome, Vec<PushEvent>), DaemonError> {
    match request {
        WriteRequest::InitProject { project } => {
            store::init_project_at(home, &project)?;
            Ok((WriteOutcome::Done, vec![]))
        }

        WriteRequest::Create { sections } => {
            let now = Utc::now();
            let mut docs: HashMap<ProjectName, ProjectDocument> = HashMap::new();
            let mut events = Vec::with_capacity(sections.len());
            let mut authoritative = Vec::with_capacity(sections.len());

            for mut section in sections {
                let doc = load_for_write(home, &mut docs, &section.project, true)?;
                section.id = SectionId(doc.next_id);
                doc.next_id += 1;
                section.version = 1;
                section.last_modified = now;
                doc.sections.push(section.clone());
                doc.updated_at = now;
                events.push(PushEvent::SectionAdded {
                    section: section.clone(),
                });
                authoritative.push(section);
            }

            save_docs(home, docs)?;
            Ok((WriteOutcome::Created(authoritative), events))
        }

        WriteRequest::UpdateCounts { updates } => {
            let now = Utc::now();
            let mut docs: HashMap<ProjectName, ProjectDocument> = HashMap::new();
            let mut events = Vec::new();

            for update in updates {
                let doc = load_for_write(home, &mut docs, &update.project, false)?;
                let Some(section) = doc.section_mut(update.id) else {
                    tracing::debug!(
                        project = %update.project,
                        id = %update.id,
                        "count update for unknown section skipped",
                    );
                    continue;
                };
                section.count = update.count;
                section.capacity = update.capacity;
                section.layout = update.layout;
                section.last_modified = now;
                section.version += 1;
                events.push(PushEvent::CountUpdated {
                    id: section.id,
                    project: section.project.clone(),
                    count: section.count,
                    capacity: section.capacity,
                    last_modified: section.last_modified,
                    version: section.version,
                });
                doc.updated_at = now;
            }

            save_docs(home, docs)?;
            Ok((WriteOutcome::Done, events))
        }

        WriteRequest::Delete { ids } => {
            let now = Utc::now();
            let mut docs: HashMap<ProjectName, ProjectDocument> = HashMap::new();
            let mut events = Vec::new();

            for SectionRef { project, id } in ids {
                let doc = load_for_write(home, &mut docs, &project, false)?;
                let before = doc.sections.len();
                doc.sections.retain(|s| s.id != id);
                if doc.sections.len() < before {
                    doc.updated_at = now;
                    events.push(PushEvent::SectionDeleted { id, project });
                }
            }

            save_docs(home, docs)?;
            Ok((WriteOutcome::Done, events))
        }

        WriteRequest::Rename { project, id, name } => {
            let now = Utc::now();
            let mut doc = store::load_project_at(home, &project)?;
            let mut events = Vec::new();

            if let Some(section) = doc.section_mut(id) {
                if section.name != name {
                    section.name = name.clone();
                    section.last_modified = now;
                    section.version += 1;
                    let version = section.version;
                    doc.updated_at = now;
                    store::save_project_at(home, &doc)?;
                    events.push(PushEvent::SectionRenamed {
                        id,
                        project,
                        name,
                        version,
                    });
                }
            }

            Ok((WriteOutcome::Done, events))
        }

        WriteRequest::RecordEdits { project, ids, day } => {
            let mut edits = store::load_edits_at(home, &project)?;
            edits.record(day, &ids, Utc::now());
            store::save_edits_at(home, &project, &edits)?;
            Ok((WriteOutcome::Done, vec![]))
        }
    }
}

fn load_for_write<'a>(
    home: &Path,
    docs: &'a mut HashMap<ProjectName, ProjectDocument>,
    project: &ProjectName,
    create_missing: bool,
) -> Result<&'a mut ProjectDocument, DaemonError> {
    match docs.entry(project.clone()) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            let doc = if create_missing {
                store::init_project_at(home, entry.key())?
            } else {
                store::load_project_at(home, entry.key())?
            };
            Ok(entry.insert(doc))
        }
    }
}

fn save_docs(home: &Path, docs: HashMap<ProjectName, ProjectDocument>) -> Result<(), DaemonError> {
    for doc in docs.values() {
        store::save_project_at(home, doc)?;
    }
    Ok(())
}

async fn refresh_caches(shared: &Shared) -> Result<(), DaemonError> {
    let home = shared.home.clone();
    let (projects, edits) = tokio::task::spawn_blocking(move || load_caches(&home))
        .await
        .map_err(|err| DaemonError::Protocol(format!("cache refresh join error: {err}")))??;
    *shared.projects.write().await = projects;
    *shared.edits.write().await = edits;
    Ok(())
}

fn load_caches(home: &Path) -> Result<(ProjectCache, EditCache), DaemonError> {
    let mut projects = HashMap::new();
    let mut edits = HashMap::new();
    for doc in store::list_projects_at(home)? {
        edits.insert(doc.project.clone(), store::load_edits_at(home, &doc.project)?);
        projects.insert(doc.project.clone(), doc);
    }
    Ok((projects, edits))
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    shared: std::sync::Arc<Shared>,
    write_tx: mpsc::Sender<WriteJob>,
    event_tx: broadcast::Sender<PushEvent>,
    change_tx: broadcast::Sender<()>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let run = run_dir(&shared.home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&shared.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let shared = shared.clone();
                let write_tx = write_tx.clone();
                let event_tx = event_tx.clone();
                let change_tx = change_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        shared,
                        write_tx,
                        event_tx,
                        change_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    shared: std::sync::Arc<Shared>,
    write_tx: mpsc::Sender<WriteJob>,
    event_tx: broadcast::Sender<PushEvent>,
    change_tx: broadcast::Sender<()>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        match request {
            DaemonRequest::Snapshot => {
                let sections = snapshot_sections(&shared).await;
                write_response(&mut writer, &DaemonResponse::ok(json!(sections))).await?;
            }
            DaemonRequest::EditLog => {
                let edits = shared.edits.read().await.clone();
                write_response(&mut writer, &DaemonResponse::ok(json!(edits))).await?;
            }
            DaemonRequest::Status => {
                let payload = build_status_payload(&shared, started_at_unix).await;
                write_response(&mut writer, &DaemonResponse::ok(payload)).await?;
            }
            DaemonRequest::Stop => {
                let _ = shutdown_tx.send(());
                write_response(&mut writer, &DaemonResponse::ok(json!({ "stopping": true })))
                    .await?;
                break;
            }
            DaemonRequest::Subscribe => {
                write_response(&mut writer, &DaemonResponse::ok(Value::Null)).await?;
                return stream_events(writer, event_tx.subscribe(), shutdown_tx.subscribe()).await;
            }
            DaemonRequest::Watch => {
                let sections = snapshot_sections(&shared).await;
                write_response(&mut writer, &DaemonResponse::ok(json!(sections))).await?;
                return stream_snapshots(
                    writer,
                    shared,
                    change_tx.subscribe(),
                    shutdown_tx.subscribe(),
                )
                .await;
            }
            DaemonRequest::InitProject { project } => {
                let response =
                    enqueue_write(&write_tx, WriteRequest::InitProject { project }).await;
                write_response(&mut writer, &write_result_response(response)).await?;
            }
            DaemonRequest::Create { sections } => {
                let response = enqueue_write(&write_tx, WriteRequest::Create { sections }).await;
                let response = match response {
                    Ok(WriteOutcome::Created(sections)) => DaemonResponse::ok(json!(sections)),
                    Ok(WriteOutcome::Done) => DaemonResponse::ok(Value::Null),
                    Err(err) => DaemonResponse::error(err.to_string()),
                };
                write_response(&mut writer, &response).await?;
            }
            DaemonRequest::UpdateCounts { updates } => {
                let response =
                    enqueue_write(&write_tx, WriteRequest::UpdateCounts { updates }).await;
                write_response(&mut writer, &write_result_response(response)).await?;
            }
            DaemonRequest::Delete { ids } => {
                let response = enqueue_write(&write_tx, WriteRequest::Delete { ids }).await;
                write_response(&mut writer, &write_result_response(response)).await?;
            }
            DaemonRequest::Rename { project, id, name } => {
                let response =
                    enqueue_write(&write_tx, WriteRequest::Rename { project, id, name }).await;
                write_response(&mut writer, &write_result_response(response)).await?;
            }
            DaemonRequest::RecordEdits { project, ids, day } => {
                let response =
                    enqueue_write(&write_tx, WriteRequest::RecordEdits { project, ids, day })
                        .await;
                write_response(&mut writer, &write_result_response(response)).await?;
            }
        }
    }

    Ok(())
}

/// Forward push events to one subscriber until it disconnects or the daemon
/// shuts down. A lagging subscriber loses the skipped events.
async fn stream_events(
    mut writer: OwnedWriteHalf,
    mut event_rx: broadcast::Receiver<PushEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        let payload = serde_json::to_string(&event)?;
                        if write_line(&mut writer, &payload).await.is_err() {
                            break; // client went away
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event subscriber lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    Ok(())
}

/// Send the full section collection to one subscriber after every change.
async fn stream_snapshots(
    mut writer: OwnedWriteHalf,
    shared: std::sync::Arc<Shared>,
    mut change_rx: broadcast::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            tick = change_rx.recv() => {
                match tick {
                    // Lagged ticks collapse naturally: the next frame carries
                    // the full current state anyway.
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let sections = snapshot_sections(&shared).await;
                        let payload = serde_json::to_string(&sections)?;
                        if write_line(&mut writer, &payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    Ok(())
}

async fn snapshot_sections(shared: &Shared) -> Vec<Section> {
    let cache = shared.projects.read().await;
    let mut sections: Vec<Section> = cache
        .values()
        .flat_map(|doc| doc.sections.iter().cloned())
        .collect();
    sections.sort_by(|a, b| a.project.cmp(&b.project).then(a.id.cmp(&b.id)));
    sections
}

async fn build_status_payload(shared: &Shared, started_at_unix: u64) -> Value {
    let cache = shared.projects.read().await;
    let mut names: Vec<&ProjectName> = cache.keys().collect();
    names.sort();

    let projects: Vec<Value> = names
        .iter()
        .map(|name| {
            let doc = &cache[*name];
            let total_count: u64 = doc.sections.iter().map(|s| s.count).sum();
            let last_modified_unix = doc
                .sections
                .iter()
                .map(|s| s.last_modified.timestamp())
                .max()
                .unwrap_or(0);
            json!({
                "name": name.0,
                "sections": doc.sections.len(),
                "total_count": total_count,
                "last_modified_unix": last_modified_unix,
            })
        })
        .collect();

    json!({
        "running": true,
        "label": crate::paths::DAEMON_LABEL,
        "started_at_unix": started_at_unix,
        "projects": projects,
        "socket": socket_path(&shared.home).display().to_string(),
        "projects_root": projects_root(&shared.home).display().to_string(),
    })
}

async fn enqueue_write(
    write_tx: &mpsc::Sender<WriteJob>,
    request: WriteRequest,
) -> Result<WriteOutcome, DaemonError> {
    let (tx, rx) = oneshot::channel();
    write_tx
        .send(WriteJob {
            request,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("write queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("write response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn write_result_response(result: Result<WriteOutcome, DaemonError>) -> DaemonResponse {
    match result {
        Ok(_) => DaemonResponse::ok(Value::Null),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Housekeeping tasks and helpers
// ---------------------------------------------------------------------------

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    // Skip the first (immediate) tick to avoid rotating on startup.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the first immediate tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok(); // rotation errors are logged inside rotate_logs; never crash the daemon
            }
        }
    }
    Ok(())
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [projects_root(home), run_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    write_line(writer, &payload)
        .await
        .map_err(|e| io_err("daemon socket write", e))
}

async fn write_line(writer: &mut OwnedWriteHalf, payload: &str) -> std::io::Result<()> {
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
