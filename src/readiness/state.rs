use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Create the single writer and the shareable reader of the readiness flag.
pub fn readiness() -> (ReadinessReporter, ReadinessState) {
    let flag = Arc::new(AtomicBool::new(false));
    (
        ReadinessReporter {
            flag: Arc::clone(&flag),
        },
        ReadinessState { flag },
    )
}

/// Read side of the readiness flag, cloned into HTTP handlers.
#[derive(Debug, Clone)]
pub struct ReadinessState {
    flag: Arc<AtomicBool>,
}

impl ReadinessState {
    pub fn is_ready(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Write side of the readiness flag. Not `Clone`: only the monitor owns one.
#[derive(Debug)]
pub struct ReadinessReporter {
    flag: Arc<AtomicBool>,
}

impl ReadinessReporter {
    /// Returns the previous value.
    pub fn set(&self, ready: bool) -> bool {
        self.flag.swap(ready, Ordering::AcqRel)
    }
}
