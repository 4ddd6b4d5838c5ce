use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Client side of the refresh signal: asks a running engine to resync now.
///
/// Returns `Ok(false)` when there is nobody to notify (no pid file, empty or
/// garbled file, process gone). Callers should treat that as routine, since
/// the engine's polling picks the change up anyway.
pub fn notify_refresh(pid_file: &Path) -> Result<bool> {
    let contents = match std::fs::read_to_string(pid_file) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No pid file at {}; skipping refresh signal", pid_file.display());
            return Ok(false);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", pid_file.display()))
        }
    };

    let pid: i32 = match contents.trim().parse() {
        Ok(pid) if pid > 0 => pid,
        _ => {
            debug!("Pid file {} holds {:?}; ignoring", pid_file.display(), contents.trim());
            return Ok(false);
        }
    };

    match kill(Pid::from_raw(pid), Signal::SIGUSR1) {
        Ok(()) => {
            debug!("Sent refresh signal to pid {}", pid);
            Ok(true)
        }
        Err(Errno::ESRCH) => {
            debug!("Stale pid file {} (pid {} not running)", pid_file.display(), pid);
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to signal pid {pid}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_garbled_pid_files() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("blocker.pid");
        assert!(!notify_refresh(&pid_file).unwrap());

        std::fs::write(&pid_file, "").unwrap();
        assert!(!notify_refresh(&pid_file).unwrap());

        std::fs::write(&pid_file, "not-a-pid\n").unwrap();
        assert!(!notify_refresh(&pid_file).unwrap());

        std::fs::write(&pid_file, "0\n").unwrap();
        assert!(!notify_refresh(&pid_file).unwrap());
    }
}
