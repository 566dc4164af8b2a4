//! Process signals that stop the service

use std::fmt;

use tracing::warn;

/// Signal that ended [`wait_for_shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        })
    }
}

async fn interrupt() -> ShutdownSignal {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl+C listener failed, stopping: {}", e);
    }
    ShutdownSignal::Interrupt
}

/// Wait for Ctrl+C, or SIGTERM from a service manager on Unix
pub async fn wait_for_shutdown() -> ShutdownSignal {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                signal = interrupt() => signal,
                _ = term.recv() => ShutdownSignal::Terminate,
            },
            Err(e) => {
                warn!("SIGTERM unavailable ({}), stop with Ctrl+C", e);
                interrupt().await
            },
        }
    }
    #[cfg(not(unix))]
    {
        interrupt().await
    }
}
