pub mod halt;
pub mod orchestrator;
pub mod paper;
pub mod registry;

pub use halt::{HaltError, HaltFlag, HaltState};
pub use orchestrator::{CycleError, CycleReport, ExecutionOrchestrator, OrchestratorConfig};
pub use paper::PaperConnector;
pub use registry::StrategyRegistry;
