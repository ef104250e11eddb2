//! Pipeline orchestration: the durable step sequencer, the per-kind job
//! pipelines, and the fire-and-forget task dispatcher.

pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod steps;

pub use dispatch::{DispatchHandler, TokioDispatcher};
pub use error::PipelineError;
pub use orchestrator::Orchestrator;
pub use steps::StepSequencer;
