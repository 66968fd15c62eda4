use std::path::{Path, PathBuf};

pub const DAEMON_LABEL: &str = "dev.tally.daemon";

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn tally_root(home: &Path) -> PathBuf {
    home.join(".tally")
}

pub fn projects_root(home: &Path) -> PathBuf {
    tally_root(home).join("projects")
}

pub fn run_dir(home: &Path) -> PathBuf {
    tally_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    tally_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}
