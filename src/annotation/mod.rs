/*!
 * Annotation operations: descriptors, per-segment annotators and the runner
 * that fans an operation out over a text.
 */

pub mod annotator;
pub mod operations;
pub mod outputs;
pub mod runner;
pub mod spec;
pub mod units;

pub use annotator::{Annotator, GenerativeAnnotator, SegmentJob};
pub use runner::{CancelHandle, CancelPolicy, OperationOutcome, OperationRunner, RunControl};
pub use spec::{FailurePolicy, OperationScope, OperationSpec, OutputShape, Predecessor};
pub use units::{lemma_units, pending_work, token_units, PendingWork, Unit};
