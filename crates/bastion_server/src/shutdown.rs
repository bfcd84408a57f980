//! Termination-signal wiring for graceful teardown.

use tokio::sync::oneshot;
use tracing::info;

/// Resolves the returned receiver once the process is asked to stop.
///
/// On Unix that is SIGINT or SIGTERM; elsewhere, Ctrl+C. Only the first
/// signal is reported — repeated signals while teardown is in flight are
/// ignored rather than escalated.
pub async fn shutdown_signal() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = tx.send(());
    });

    rx
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down"),
        _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("interrupt received, shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn receiver_stays_pending_until_a_signal_arrives() {
        let shutdown_rx = shutdown_signal().await;

        let outcome = timeout(Duration::from_millis(10), shutdown_rx).await;
        assert!(outcome.is_err(), "no signal was sent");
    }
}
