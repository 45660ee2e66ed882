use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Cancels `token` when either signal is received. The scheduling loop stops
/// admitting new jobs, harvests what is already in flight, and returns the
/// results collected so far.
pub fn install_shutdown_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, draining in-flight jobs");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, draining in-flight jobs");
            }
        }

        token.cancel();
    });
}
