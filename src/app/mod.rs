mod faults;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use faults::{FaultAction, FaultPolicy, FaultReporter, ProcessFault};
pub use orchestrator::DashboardOrchestrator;
pub use types::{ComponentState, ShutdownReason, ShutdownTrigger};
