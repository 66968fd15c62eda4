//! # tally-client
//!
//! The counter state reconciler and its async session.
//!
//! Call [`session::spawn`] with a [`Backend`] implementation to start a
//! reconciliation session, then drive it through the returned
//! [`SessionHandle`]. Local mutations apply optimistically and coalesce into
//! debounced batched persistence calls; snapshot refreshes and push events
//! merge into the same view.

pub mod backend;
pub mod edits;
pub mod error;
pub mod reconciler;
pub mod session;

pub use backend::{Backend, MemoryBackend};
pub use edits::EditLog;
pub use error::ClientError;
pub use reconciler::{Flush, ReconcilerState, MAX_PENDING, QUIET_PERIOD};
pub use session::{spawn, ProjectStats, SessionHandle};
