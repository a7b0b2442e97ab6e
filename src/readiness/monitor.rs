use super::probe::{StoreProbe, PROBE_TIMEOUT};
use super::state::ReadinessReporter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time between two probes
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Periodically probes etcd and publishes the outcome. It is the only
/// writer of the readiness flag; request handlers only read it.
pub struct ReadinessMonitor {
    probe: Arc<dyn StoreProbe>,
    reporter: ReadinessReporter,
    probe_interval: Duration,
    probe_timeout: Duration,
}

impl ReadinessMonitor {
    pub fn new(probe: Arc<dyn StoreProbe>, reporter: ReadinessReporter) -> Self {
        Self {
            probe,
            reporter,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, probe_interval: Duration) -> Self {
        self.probe_interval = probe_interval;
        self
    }

    pub fn with_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Runs until `token` is cancelled. Never cancels anything itself.
    pub async fn run(self, token: CancellationToken) {
        info!(
            "Starting readiness monitor (interval {:?}, timeout {:?})",
            self.probe_interval, self.probe_timeout
        );

        let mut ticker = interval(self.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                outcome = timeout(self.probe_timeout, self.probe.check()) => outcome,
            };

            let ready = match outcome {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!("Readiness probe failed: {}", e);
                    false
                }
                Err(_) => {
                    warn!("Readiness probe timed out after {:?}", self.probe_timeout);
                    false
                }
            };

            let previous = self.reporter.set(ready);
            if previous != ready {
                info!("Readiness changed to {}", ready);
            } else {
                debug!("Readiness unchanged: {}", ready);
            }
        }

        info!("Readiness monitor stopped, context cancelled");
    }
}
