use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("process has no pid (already reaped)")]
    NoPid,
    #[error("failed to signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },
    #[error("graceful termination is not supported on this platform")]
    Unsupported,
}

/// Ask the process to exit cleanly. frpc traps SIGTERM and shuts its
/// proxies down before exiting.
#[cfg(unix)]
pub fn request_graceful_exit(pid: Option<u32>) -> Result<(), ProcessError> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let pid = pid.ok_or(ProcessError::NoPid)?;
    tracing::info!("Sending TERM signal to frpc (pid: {})", pid);
    signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
        ProcessError::SignalFailed {
            pid,
            reason: e.to_string(),
        }
    })
}

#[cfg(not(unix))]
pub fn request_graceful_exit(_pid: Option<u32>) -> Result<(), ProcessError> {
    Err(ProcessError::Unsupported)
}

/// Make sure the bundled binary carries the execute bit. Best effort: the
/// binary may live on a read-only mount that is already executable.
#[cfg(unix)]
pub fn ensure_executable(binary: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(binary) {
        Ok(m) => m,
        // spawn 단계에서 구체적인 에러로 보고됨
        Err(_) => return,
    };
    let mut perms = metadata.permissions();
    let mode = perms.mode();
    if mode & 0o111 == 0o111 {
        return;
    }
    perms.set_mode(mode | 0o111);
    if let Err(e) = std::fs::set_permissions(binary, perms) {
        tracing::warn!("Could not set execute bit on {}: {}", binary.display(), e);
    }
}

#[cfg(not(unix))]
pub fn ensure_executable(_binary: &Path) {}
