pub mod events;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod types;

pub use pipeline::{Orchestrator, PipelineBusy};
