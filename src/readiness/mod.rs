mod monitor;
mod probe;
mod server;
mod state;

pub use monitor::{ReadinessMonitor, DEFAULT_PROBE_INTERVAL};
pub use probe::{EtcdProbe, ProbeTls, StoreProbe, PROBE_TIMEOUT};
pub use server::{router, ReadyServer, ServerState};
pub use state::{readiness, ReadinessReporter, ReadinessState};
