use thiserror::Error;

/// Error surface for the reconciler session and its backend calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A backend request failed (transport or server-side).
    #[error("backend request failed: {0}")]
    Backend(String),

    /// A session channel closed while a caller was waiting on it.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A mutation referenced a section the local view does not contain.
    #[error("unknown section {id} in project '{project}'")]
    UnknownSection { project: String, id: u32 },
}
