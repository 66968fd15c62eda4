//! [`Backend`] implementation over the daemon's Unix socket protocol.
//!
//! One-shot calls open a fresh connection per request, mirroring the
//! blocking client in `tally_daemon::protocol`. The two subscriptions hold
//! their connection open and pump parsed lines into mpsc channels until the
//! daemon goes away or the session drops the receiver.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use tally_client::{Backend, ClientError, EditLog};
use tally_core::{CountUpdate, ProjectName, PushEvent, Section, SectionId};
use tally_daemon::paths::socket_path;
use tally_daemon::{DaemonRequest, DaemonResponse, SectionRef};

/// Daemon-socket backend for a reconciler session.
#[derive(Clone)]
pub struct SocketBackend {
    home: PathBuf,
}

impl SocketBackend {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    /// Open a connection, send one request line, and read the response line.
    /// The returned line reader owns the connection, so streaming commands
    /// can keep consuming frames from it.
    async fn open(
        &self,
        request: &DaemonRequest,
    ) -> Result<(Value, Lines<BufReader<UnixStream>>), ClientError> {
        let socket = socket_path(&self.home);
        if !socket.exists() {
            return Err(ClientError::Backend(format!(
                "daemon is not running (socket missing: {})",
                socket.display()
            )));
        }

        let mut stream = UnixStream::connect(&socket)
            .await
            .map_err(|err| ClientError::Backend(format!("daemon connect failed: {err}")))?;

        let payload = serde_json::to_string(request)
            .map_err(|err| ClientError::Backend(format!("request encode failed: {err}")))?;
        stream
            .write_all(payload.as_bytes())
            .await
            .map_err(|err| ClientError::Backend(format!("daemon write failed: {err}")))?;
        stream
            .write_all(b"\n")
            .await
            .map_err(|err| ClientError::Backend(format!("daemon write failed: {err}")))?;
        stream
            .flush()
            .await
            .map_err(|err| ClientError::Backend(format!("daemon write failed: {err}")))?;

        let mut lines = BufReader::new(stream).lines();
        let line = lines
            .next_line()
            .await
            .map_err(|err| ClientError::Backend(format!("daemon read failed: {err}")))?
            .ok_or_else(|| {
                ClientError::Backend("daemon closed connection before responding".into())
            })?;

        let response: DaemonResponse = serde_json::from_str(line.trim_end())
            .map_err(|err| ClientError::Backend(format!("malformed daemon response: {err}")))?;
        if !response.ok {
            return Err(ClientError::Backend(
                response.error.unwrap_or_else(|| "unknown daemon error".into()),
            ));
        }
        Ok((response.data.unwrap_or(Value::Null), lines))
    }

    async fn request(&self, request: &DaemonRequest) -> Result<Value, ClientError> {
        let (data, _connection) = self.open(request).await?;
        Ok(data)
    }
}

#[async_trait]
impl Backend for SocketBackend {
    async fn fetch_sections(&self) -> Result<Vec<Section>, ClientError> {
        let data = self.request(&DaemonRequest::Snapshot).await?;
        serde_json::from_value(data)
            .map_err(|err| ClientError::Backend(format!("malformed snapshot payload: {err}")))
    }

    async fn fetch_edit_log(&self) -> Result<EditLog, ClientError> {
        let data = self.request(&DaemonRequest::EditLog).await?;
        serde_json::from_value(data)
            .map_err(|err| ClientError::Backend(format!("malformed edit log payload: {err}")))
    }

    async fn create_sections(&self, sections: Vec<Section>) -> Result<Vec<Section>, ClientError> {
        let data = self.request(&DaemonRequest::Create { sections }).await?;
        serde_json::from_value(data)
            .map_err(|err| ClientError::Backend(format!("malformed create payload: {err}")))
    }

    async fn update_counts(&self, updates: Vec<CountUpdate>) -> Result<(), ClientError> {
        self.request(&DaemonRequest::UpdateCounts { updates })
            .await
            .map(|_| ())
    }

    async fn delete_sections(
        &self,
        ids: Vec<(ProjectName, SectionId)>,
    ) -> Result<(), ClientError> {
        let ids = ids
            .into_iter()
            .map(|(project, id)| SectionRef { project, id })
            .collect();
        self.request(&DaemonRequest::Delete { ids }).await.map(|_| ())
    }

    async fn rename_section(
        &self,
        project: ProjectName,
        id: SectionId,
        name: String,
    ) -> Result<(), ClientError> {
        self.request(&DaemonRequest::Rename { project, id, name })
            .await
            .map(|_| ())
    }

    async fn record_edits(
        &self,
        project: ProjectName,
        ids: Vec<SectionId>,
        day: u32,
    ) -> Result<(), ClientError> {
        self.request(&DaemonRequest::RecordEdits { project, ids, day })
            .await
            .map(|_| ())
    }

    async fn subscribe_events(&self) -> Result<mpsc::Receiver<PushEvent>, ClientError> {
        let (_, mut lines) = self.open(&DaemonRequest::Subscribe).await?;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<PushEvent>(&line) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break; // session gone
                        }
                    }
                    Err(err) => {
                        tracing::warn!("dropping malformed push event: {err}");
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn subscribe_snapshots(&self) -> Result<mpsc::Receiver<Vec<Section>>, ClientError> {
        let (initial, mut lines) = self.open(&DaemonRequest::Watch).await?;
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            // The watch acknowledgement already carries the current state.
            if let Ok(sections) = serde_json::from_value::<Vec<Section>>(initial) {
                if tx.send(sections).await.is_err() {
                    return;
                }
            }
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<Vec<Section>>(&line) {
                    Ok(sections) => {
                        if tx.send(sections).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!("dropping malformed snapshot frame: {err}");
                    }
                }
            }
        });
        Ok(rx)
    }
}
