use crate::error::Result;
use std::fmt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code used when a second signal forces the process down
pub const FORCED_EXIT_CODE: i32 = 1;

/// Signals that start a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    /// Display name recorded in the crash marker.
    pub fn name(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "interrupt",
            ShutdownSignal::Terminate => "terminated",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owns the process-wide cancellation token and reacts to SIGINT/SIGTERM.
///
/// The first signal runs the callback and then cancels the token. A second
/// signal exits the process immediately.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Register the signal handlers. Must be called before anything else is
    /// started so that no signal is missed. `callback` must return quickly.
    pub fn install<F>(callback: F) -> Result<Self>
    where
        F: FnOnce(ShutdownSignal) + Send + 'static,
    {
        let token = CancellationToken::new();
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = sigint.recv() => ShutdownSignal::Interrupt,
                    Some(()) = sigterm.recv() => ShutdownSignal::Terminate,
                    else => break,
                };
                if tx.send(received).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(handle_signals(rx, callback, token.clone(), || {
            std::process::exit(FORCED_EXIT_CODE);
        }));

        Ok(Self { token })
    }

    /// Token cancelled on the first shutdown signal.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Two-stage shutdown: callback then cancel on the first signal, `force_exit`
/// on the second.
pub async fn handle_signals<F, X>(
    mut signals: mpsc::Receiver<ShutdownSignal>,
    callback: F,
    token: CancellationToken,
    force_exit: X,
) where
    F: FnOnce(ShutdownSignal),
    X: FnOnce(),
{
    let Some(first) = signals.recv().await else {
        return;
    };
    info!("Caught shutdown signal: {}", first);
    callback(first);
    token.cancel();

    if let Some(second) = signals.recv().await {
        warn!("Caught second shutdown signal ({}), forcing exit", second);
        force_exit();
    }
}
