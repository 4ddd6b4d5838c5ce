use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Publishes this process's pid so the API side can deliver refresh signals.
///
/// Removed on drop if it still holds our pid. Failing to write it is not
/// fatal: the engine still notices changes by polling.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
    written: bool,
}

impl PidFile {
    pub fn create(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let pid = std::process::id();
        let written = match write_pid(&path, pid) {
            Ok(()) => {
                info!("Blocker PID file written: {}", path.display());
                true
            }
            Err(e) => {
                warn!("Could not write PID file {}: {}", path.display(), e);
                false
            }
        };
        Self { path, pid, written }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_written(&self) -> bool {
        self.written
    }
}

fn write_pid(path: &Path, pid: u32) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    fs::write(path, format!("{pid}\n"))
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if !self.written {
            return;
        }
        // Another instance may have taken over the path since.
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim() == self.pid.to_string() => {
                if let Err(e) = fs::remove_file(&self.path) {
                    debug!("Could not remove PID file {}: {}", self.path.display(), e);
                }
            }
            _ => {}
        }
    }
}
