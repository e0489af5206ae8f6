pub mod batching;
pub mod error;
pub mod prompts;
pub mod response;
pub mod retry;
pub mod runner;
pub mod stage;
pub mod stages;
pub mod state;

pub use batching::{partition, BatchSpan};
pub use error::PipelineError;
pub use retry::{RetryExhausted, RetryPolicy};
pub use runner::{PipelineObserver, PipelineRunner};
pub use stage::{PipelineNode, Stage, StageReport};
pub use state::{
    BatchAbstraction, BatchResult, DegradedReport, IdentifyPartials, SharedState, TutorialRequest,
};
