//! The seven stages of tutorial generation, in run order.

pub mod combine;
pub mod fetch;
pub mod identify;
pub mod order;
pub mod reduce;
pub mod relationships;
pub mod write;

pub use combine::CombineTutorial;
pub use fetch::FetchRepository;
pub use identify::{IdentifyAbstractions, IDENTIFY_STAGE};
pub use order::OrderChapters;
pub use reduce::{merge_batches, ReduceAbstractions, REDUCE_STAGE};
pub use relationships::AnalyzeRelationships;
pub use write::WriteChapters;
