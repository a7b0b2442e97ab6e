mod orchestrator;
mod runtime;
mod startup;


pub use orchestrator::Application;
pub use runtime::ENGINE_STOP_TIMEOUT;
