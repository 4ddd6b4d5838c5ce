use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use postfix_blocker::config::Config;
use postfix_blocker::engine::{PidFile, SyncEngine};
use postfix_blocker::init::{init_store, setup_logging};
use postfix_blocker::postfix::PostfixController;
use postfix_blocker::stats::SyncStats;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let _ = dotenvy::dotenv();
    let config = Config::from_env().await?;

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting postfix-blocker...");
    info!(
        "Maps in {}, polling every {:?}",
        config.postfix_dir.display(),
        config.check_interval()
    );

    // 3. Collaborators
    let store = init_store(&config).context("Failed to configure blocklist store")?;
    let mail_server = Arc::new(PostfixController::new(&config.commands));
    let stats = SyncStats::new();
    let cancel = CancellationToken::new();

    if config.stats.enable {
        stats.spawn_reporter(
            Duration::from_secs(config.stats.log_interval_seconds.max(1)),
            cancel.clone(),
        );
    }

    // 4. Engine, refresh signal and pid file
    let engine = SyncEngine::from_config(&config, store, mail_server, stats);
    if let Err(e) = engine.listen_for_signal() {
        warn!("Could not set SIGUSR1 handler: {}", e);
    }
    let pid_file = PidFile::create(&config.pid_file);

    let worker = tokio::spawn(engine.run(cancel.clone()));

    // 5. Graceful Shutdown
    shutdown_signal().await;
    info!("Shutdown signal received.");
    cancel.cancel();
    worker.await.context("Sync loop panicked")?;
    drop(pid_file);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
