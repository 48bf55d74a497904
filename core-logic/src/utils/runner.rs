use std::future::Future;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct WorkerRunner;

impl WorkerRunner {
    /// Returns a token that is cancelled on Ctrl+C.
    pub fn shutdown_token() -> CancellationToken {
        let token = CancellationToken::new();
        let cloned_token = token.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("🛑 Received Ctrl+C. Stopping...");
                    cloned_token.cancel();
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                }
            }
        });

        token
    }

    /// Drives `work` until it finishes or the token is cancelled, whichever
    /// comes first. In-flight state is simply dropped on cancellation.
    pub async fn run_until_cancelled<F, T>(token: CancellationToken, work: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            _ = token.cancelled() => {
                info!("Stopped by user.");
                None
            }
            out = work => Some(out),
        }
    }
}
