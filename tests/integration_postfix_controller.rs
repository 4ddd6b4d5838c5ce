use postfix_blocker::config::CommandConfig;
use postfix_blocker::maps::MapPaths;
use postfix_blocker::postfix::{ControllerPhase, MailServer, PostfixController, StepOutcome};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable shell script standing in for a Postfix binary.
fn fake_bin(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn commands(dir: &Path, postmap: &str, postfix: &str, postconf: &str) -> CommandConfig {
    let log = dir.join("calls.log");
    let log = log.display();
    CommandConfig {
        postmap: fake_bin(dir, "postmap", &format!("echo \"postmap $1\" >> {log}\n{postmap}")),
        postfix: fake_bin(dir, "postfix", &format!("echo \"postfix $1\" >> {log}\n{postfix}")),
        postconf: fake_bin(dir, "postconf", postconf),
    }
}

fn calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

// Kept as a single test so the fake binaries are never written while another
// test thread is forking.
#[tokio::test]
async fn test_controller_against_fake_postfix() {
    let root = tempfile::tempdir().unwrap();

    // Healthy server: both literal maps indexed, then status, then reload.
    let healthy = root.path().join("healthy");
    fs::create_dir(&healthy).unwrap();
    let controller = PostfixController::new(&commands(
        &healthy,
        "exit 0",
        "exit 0",
        "printf 'btree\\nhash\\nPCRE\\nregexp\\n'",
    ));
    let paths = MapPaths::in_dir(&healthy);
    assert!(controller.has_advanced_pattern_support().await);

    let report = controller.apply(&paths).await;
    assert!(report.is_success());
    assert_eq!(controller.phase(), ControllerPhase::Idle);
    assert_eq!(
        calls(&healthy),
        vec![
            format!("postmap {}", paths.enforce_literal.display()),
            format!("postmap {}", paths.test_literal.display()),
            "postfix status".to_string(),
            "postfix reload".to_string(),
        ]
    );

    // Master not running: indexing still happens, reload is skipped.
    let stopped = root.path().join("stopped");
    fs::create_dir(&stopped).unwrap();
    let controller = PostfixController::new(&commands(
        &stopped,
        "exit 0",
        "[ \"$1\" = status ] && exit 1\nexit 0",
        "printf 'btree\\nhash\\n'",
    ));
    assert!(!controller.has_advanced_pattern_support().await);
    let report = controller.apply(&MapPaths::in_dir(&stopped)).await;
    assert!(matches!(report.reload, StepOutcome::Skipped(_)));
    assert!(report.is_success());
    assert!(!calls(&stopped).contains(&"postfix reload".to_string()));

    // Failing postmap and reload are reported, not raised.
    let broken = root.path().join("broken");
    fs::create_dir(&broken).unwrap();
    let controller = PostfixController::new(&commands(
        &broken,
        "echo 'fatal: map locked' >&2\nexit 1",
        "[ \"$1\" = reload ] && exit 75\nexit 0",
        "exit 1",
    ));
    assert!(!controller.has_advanced_pattern_support().await);
    let report = controller.apply(&MapPaths::in_dir(&broken)).await;
    assert_eq!(report.failures(), 3);
    assert_eq!(controller.phase(), ControllerPhase::Idle);
    match &report.indexing[0].1 {
        StepOutcome::Failed(e) => assert!(e.to_string().contains("fatal: map locked")),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // Missing binaries behave like an unsupported, unreachable server.
    let controller = PostfixController::new(&CommandConfig {
        postmap: root.path().join("nope/postmap"),
        postfix: root.path().join("nope/postfix"),
        postconf: root.path().join("nope/postconf"),
    });
    assert!(!controller.has_advanced_pattern_support().await);
    let report = controller.apply(&MapPaths::in_dir(root.path())).await;
    assert_eq!(report.failures(), 2);
    assert!(matches!(report.reload, StepOutcome::Skipped(_)));
}
