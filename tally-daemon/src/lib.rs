//! Daemon runtime: write processor + socket server + push-event fan-out.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_snapshot, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
    SectionRef,
};
pub use runtime::{run, start_blocking, ProjectCache};
