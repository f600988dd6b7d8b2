pub mod orchestrator;
pub mod progress;

pub use orchestrator::{IndexingOrchestrator, IndexingReport, OrchestratorConfig};
pub use progress::{CancelToken, IndexingStage, ProgressEvent, ProgressObserver};
