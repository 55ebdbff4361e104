/*!
 * Pipeline orchestration over the fixed stage order.
 */

pub mod orchestrator;

pub use orchestrator::{Pipeline, PipelineInput, PipelineOptions, PipelineReport, Stage, StageReport};
