use super::traits::MailServer;
use crate::config::CommandConfig;
use crate::error::SyncError;
use crate::maps::MapPaths;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Where the controller is within one `apply` call. Every failure drops
/// straight back to `Idle`; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    Indexing,
    Reloading,
}

#[derive(Debug)]
pub enum StepOutcome {
    Ok,
    Skipped(&'static str),
    Failed(SyncError),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

#[derive(Debug)]
pub struct ApplyReport {
    pub indexing: Vec<(PathBuf, StepOutcome)>,
    pub reload: StepOutcome,
}

impl ApplyReport {
    pub fn failures(&self) -> usize {
        self.indexing.iter().filter(|(_, o)| o.is_failed()).count()
            + usize::from(self.reload.is_failed())
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

/// Drives Postfix through `postmap`, `postfix status|reload` and `postconf -m`.
pub struct PostfixController {
    postmap: PathBuf,
    postfix: PathBuf,
    postconf: PathBuf,
    phase: Mutex<ControllerPhase>,
}

impl PostfixController {
    pub fn new(commands: &CommandConfig) -> Self {
        Self {
            postmap: commands.postmap.clone(),
            postfix: commands.postfix.clone(),
            postconf: commands.postconf.clone(),
            phase: Mutex::new(ControllerPhase::Idle),
        }
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
            .lock()
            .map(|p| *p)
            .unwrap_or(ControllerPhase::Idle)
    }

    fn set_phase(&self, phase: ControllerPhase) {
        if let Ok(mut guard) = self.phase.lock() {
            *guard = phase;
        }
    }

    async fn index(&self, map: &Path) -> StepOutcome {
        match run(&self.postmap, [map.as_os_str()]).await {
            Ok(_) => {
                debug!("Indexed {}", map.display());
                StepOutcome::Ok
            }
            Err(e) => {
                warn!("Indexing {} failed: {}", map.display(), e);
                StepOutcome::Failed(e)
            }
        }
    }

    async fn reload(&self) -> StepOutcome {
        if let Err(e) = run(&self.postfix, ["status"]).await {
            debug!("Postfix master not running; skipping reload ({})", e);
            return StepOutcome::Skipped("mail server not running");
        }
        info!("Reloading postfix");
        match run(&self.postfix, ["reload"]).await {
            Ok(_) => StepOutcome::Ok,
            Err(e) => {
                warn!("Postfix reload failed: {}", e);
                StepOutcome::Failed(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl MailServer for PostfixController {
    async fn has_advanced_pattern_support(&self) -> bool {
        match run(&self.postconf, ["-m"]).await {
            Ok(stdout) => stdout.to_lowercase().contains("pcre"),
            Err(e) => {
                error!(
                    "Could not verify pattern map support via `{} -m`: {}",
                    self.postconf.display(),
                    e
                );
                false
            }
        }
    }

    async fn apply(&self, paths: &MapPaths) -> ApplyReport {
        self.set_phase(ControllerPhase::Indexing);
        let mut indexing = Vec::with_capacity(2);
        for map in [&paths.enforce_literal, &paths.test_literal] {
            let outcome = self.index(map).await;
            indexing.push((map.clone(), outcome));
        }

        self.set_phase(ControllerPhase::Reloading);
        let reload = self.reload().await;
        self.set_phase(ControllerPhase::Idle);

        let report = ApplyReport { indexing, reload };
        if !report.is_success() {
            warn!(
                "Postfix apply finished with {} failed step(s); will retry on the next change",
                report.failures()
            );
        }
        report
    }
}

/// Runs `program args...` and returns stdout. Spawn failures and non-zero
/// exits both become `SyncError::ExternalCommand` with stderr attached.
async fn run<I, S>(program: &Path, args: I) -> Result<String, SyncError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let command = std::iter::once(program.display().to_string())
        .chain(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ");

    let output = Command::new(program)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SyncError::ExternalCommand {
            command: command.clone(),
            status: "spawn error".to_string(),
            stderr: e.to_string(),
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(SyncError::ExternalCommand {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stderr() {
        let err = run(Path::new("/bin/sh"), ["-c", "echo broken map >&2; exit 3"])
            .await
            .unwrap_err();
        match err {
            SyncError::ExternalCommand { stderr, status, .. } => {
                assert_eq!(stderr, "broken map");
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let err = run(Path::new("/nonexistent/postmap"), ["x"]).await.unwrap_err();
        assert!(matches!(err, SyncError::ExternalCommand { .. }));
    }

    #[test]
    fn test_report_counts_failures() {
        let report = ApplyReport {
            indexing: vec![
                (PathBuf::from("a"), StepOutcome::Ok),
                (
                    PathBuf::from("b"),
                    StepOutcome::Failed(SyncError::ExternalCommand {
                        command: "postmap b".into(),
                        status: "exit status: 1".into(),
                        stderr: String::new(),
                    }),
                ),
            ],
            reload: StepOutcome::Skipped("mail server not running"),
        };
        assert_eq!(report.failures(), 1);
        assert!(!report.is_success());
    }
}
