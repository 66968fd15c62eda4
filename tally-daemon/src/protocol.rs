//! JSON newline-delimited daemon protocol.
//!
//! One request per line, one response per line. The `subscribe` and `watch`
//! commands switch the connection into streaming mode after the initial
//! response: `subscribe` delivers one [`PushEvent`] per line, `watch`
//! delivers the full current section collection per line on every change.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tally_core::{CountUpdate, ProjectName, Section, SectionId};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// A `(project, id)` pair addressing one section on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRef {
    pub project: ProjectName,
    pub id: SectionId,
}

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    /// Bulk read: every section across all projects.
    Snapshot,
    /// Bulk read: every project's edit aggregate.
    EditLog,
    /// Create an empty project document (idempotent).
    InitProject { project: ProjectName },
    /// Batched create. Ids in the request are provisional; the response
    /// carries the authoritative records.
    Create { sections: Vec<Section> },
    /// Batched count/capacity/layout update. `last_modified` and `version`
    /// are stamped server-side.
    UpdateCounts { updates: Vec<CountUpdate> },
    /// Batched delete.
    Delete { ids: Vec<SectionRef> },
    /// Immediate single-section rename.
    Rename {
        project: ProjectName,
        id: SectionId,
        name: String,
    },
    /// Add one edit to the `day` bucket for each listed section.
    RecordEdits {
        project: ProjectName,
        ids: Vec<SectionId>,
        day: u32,
    },
    /// Switch this connection to the push-event stream.
    Subscribe,
    /// Switch this connection to the full-snapshot stream.
    Watch,
    Status,
    Stop,
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// Query daemon status, retrying briefly while the socket comes up.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &DaemonRequest::Status) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::Stop)?;
    response_into_data(response).map(|_| ())
}

/// Fetch the full section collection in one blocking call.
pub fn request_snapshot(home: &Path) -> Result<Vec<Section>, DaemonError> {
    let response = send_request(home, &DaemonRequest::Snapshot)?;
    let data = response_into_data(response)?;
    serde_json::from_value(data).map_err(DaemonError::Json)
}

pub fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tags_are_snake_case() {
        let json = serde_json::to_string(&DaemonRequest::Snapshot).unwrap();
        assert_eq!(json, r#"{"cmd":"snapshot"}"#);

        let json = serde_json::to_string(&DaemonRequest::RecordEdits {
            project: ProjectName::from("hall"),
            ids: vec![SectionId(1)],
            day: 6,
        })
        .unwrap();
        assert!(json.starts_with(r#"{"cmd":"record_edits""#), "got: {json}");
    }

    #[test]
    fn request_roundtrips_through_json() {
        let request = DaemonRequest::Rename {
            project: ProjectName::from("hall"),
            id: SectionId(3),
            name: "balcony".into(),
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: DaemonRequest = serde_json::from_str(&json).unwrap();
        match back {
            DaemonRequest::Rename { project, id, name } => {
                assert_eq!(project, ProjectName::from("hall"));
                assert_eq!(id, SectionId(3));
                assert_eq!(name, "balcony");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn response_error_skips_data_field() {
        let response = DaemonResponse::error("boom");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"ok":false,"error":"boom"}"#);
    }

    #[test]
    fn unknown_cmd_fails_to_parse() {
        let err = serde_json::from_str::<DaemonRequest>(r#"{"cmd":"frobnicate"}"#);
        assert!(err.is_err());
    }
}
