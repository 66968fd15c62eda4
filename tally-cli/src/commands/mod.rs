use chrono::{DateTime, Utc};

pub mod add;
pub mod count;
pub mod daemon;
pub mod delete;
pub mod list;
pub mod project;
pub mod rename;
pub mod reset;
pub mod stats;
pub mod watch;

/// Human-friendly age of a timestamp, for table cells.
pub(crate) fn format_age(at: DateTime<Utc>) -> String {
    let seconds = (Utc::now() - at).num_seconds().max(0);
    match seconds {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

