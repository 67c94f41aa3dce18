use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `cancelation` when the process receives ctrl-c or, on unix, SIGTERM. Returns as soon as
/// anything else cancels the token, for example the console's `quit`.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = cancelation.cancelled() => {},
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
            cancelation.cancel();
        },
        _ = terminate_signal() => {
            info!("Received termination signal, shutting down");
            cancelation.cancel();
        },
    };
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            terminate.recv().await;
        }
        Err(e) => {
            tracing::warn!("Couldn't listen for SIGTERM {e}");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await
}
