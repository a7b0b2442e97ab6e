pub mod app;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod marker;
pub mod readiness;
pub mod retry;
pub mod shutdown;
pub mod sidecar;
pub mod tls;

pub use app::Application;
pub use bootstrap::{Initializer, InitializerSettings, StoreInitializer};
pub use config::{ClientTlsConfig, SidecarConfig, WrapperConfig};
pub use engine::{EngineConfig, EngineHandle, EngineLauncher, ProcessEngine};
pub use error::{Result, WrapperError};
pub use marker::CrashMarker;
pub use readiness::{EtcdProbe, ReadinessMonitor, ReadinessState, ReadyServer, StoreProbe};
pub use retry::{always_retry, never_retry, retry, RetryResult};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use sidecar::{HttpSidecarClient, InitStatus, SidecarClient, ValidationType};
