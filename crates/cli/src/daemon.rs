//! Process lifecycle helpers: PID file and termination signals.

use std::path::{Path, PathBuf};

use proto::Shutdown;
use tokio::signal;
use tracing::{info, warn};

/// PID file of the supervisor process.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current process ID, creating parent directories.
    pub async fn write(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let pid = std::process::id().to_string();
        tokio::fs::write(&self.path, pid).await?;
        info!("PID file written: {}", self.path.display());
        Ok(())
    }

    /// Removes the PID file if it exists.
    pub async fn remove(&self) {
        if self.path.exists() {
            let _ = tokio::fs::remove_file(&self.path).await;
            info!("PID file removed: {}", self.path.display());
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!("Failed to register SIGTERM handler: {e}"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
    }
}

/// Triggers `shutdown` from a background task once a termination signal arrives.
pub fn trigger_on_signal(shutdown: Shutdown) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        shutdown.trigger();
    });
}
