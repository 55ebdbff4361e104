/*!
 * Fan-out/fan-in execution of one operation over every segment of a text.
 *
 * The runner decides per segment whether work is pending, dispatches pending
 * segments concurrently under a bounded number of permits, collects their
 * patches and merges them into a copy of the text in document order. The
 * input text is never modified, so completion order cannot leak into the
 * result.
 */

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;

use crate::annotation::annotator::{Annotator, SegmentJob};
use crate::annotation::spec::{FailurePolicy, OperationSpec};
use crate::annotation::units::{missing_predecessor, pending_work};
use crate::document::{merge, NodePath, PatchSet, Text};
use crate::errors::{PipelineError, UnitError};
use crate::telemetry::{new_op_id, EventLevel, Telemetry};

/// What happens to segments already in flight when a run is cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelPolicy {
    /// Let in-flight segments finish and keep their results
    #[default]
    Drain,
    /// Drop in-flight segments immediately
    Abandon,
}

/// Cancellation signal and deadline for one run
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
    policy: CancelPolicy,
}

/// Sender side of a run's cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl RunControl {
    /// Control with no cancellation and no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Control that can be cancelled through the returned handle
    pub fn cancellable() -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                cancel: Some(receiver),
                ..Self::default()
            },
            CancelHandle { sender },
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_policy(mut self, policy: CancelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Resolves once the run is cancelled or its deadline passes
    async fn cancelled(&self) {
        let signal = async {
            match &self.cancel {
                Some(rx) => {
                    let mut rx = rx.clone();
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        // Handle dropped without cancelling
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = signal => {}
            _ = deadline => {}
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    /// Input text with every successful segment's patches merged
    pub text: Text,
    /// Segments that failed, with the reason, in document order
    pub failures: Vec<(NodePath, String)>,
    /// Segments sent to the annotator
    pub dispatched: usize,
    /// Segments with nothing left to do
    pub skipped: usize,
    pub op_id: String,
}

enum SegmentResult {
    Done(Result<PatchSet, UnitError>),
    NotStarted,
}

/// Runs one operation over a text
#[derive(Clone)]
pub struct OperationRunner {
    annotator: Arc<dyn Annotator>,
}

impl OperationRunner {
    pub fn new(annotator: Arc<dyn Annotator>) -> Self {
        Self { annotator }
    }

    /// Run `spec` over `text` without cancellation.
    pub async fn run(
        &self,
        text: &Text,
        spec: &OperationSpec,
        concurrency_limit: usize,
        force: bool,
        telemetry: &dyn Telemetry,
    ) -> Result<OperationOutcome, PipelineError> {
        self.run_with_control(text, spec, concurrency_limit, force, telemetry, &RunControl::new())
            .await
    }

    /// Run `spec` over `text`, honoring `control`.
    ///
    /// Never mutates `text`. Under [`FailurePolicy::AbortRun`] the first
    /// failing segment stops the run: in-flight segments are dropped, the
    /// rest are never sent, and the result is `OperationAborted` carrying the
    /// input unchanged. Under [`FailurePolicy::SkipSegment`] a segment whose
    /// patches the merge rejects is listed as failed like any other. A
    /// cancelled run with segments left over returns `Cancelled` with the
    /// finished segments merged.
    pub async fn run_with_control(
        &self,
        text: &Text,
        spec: &OperationSpec,
        concurrency_limit: usize,
        force: bool,
        telemetry: &dyn Telemetry,
        control: &RunControl,
    ) -> Result<OperationOutcome, PipelineError> {
        let op_id = new_op_id();
        let started = Instant::now();
        let limit = concurrency_limit.max(1);

        let mut failures: Vec<(NodePath, String)> = Vec::new();
        let mut jobs: Vec<SegmentJob> = Vec::new();
        let mut skipped = 0usize;

        for (path, segment) in text.segments() {
            if let Some(missing) = missing_predecessor(spec, segment) {
                failures.push((path, UnitError::MissingPredecessor(missing).to_string()));
                continue;
            }
            let pending = pending_work(spec, segment, force);
            if pending.is_empty() {
                skipped += 1;
                continue;
            }

            let hints: BTreeMap<String, Value> = spec
                .hints
                .iter()
                .filter_map(|key| segment.annotation(key).map(|v| (key.clone(), v.clone())))
                .collect();

            jobs.push(SegmentJob {
                path,
                segment: segment.clone(),
                units: pending.units,
                segment_pending: pending.segment,
                hints,
                op_id: format!("{}-p{}-s{}", op_id, path.page, path.segment),
                source_language: text.source_language().to_string(),
                target_language: text.target_language().map(str::to_string),
            });
        }

        let abort_on_failure = spec.failure_policy == FailurePolicy::AbortRun;
        if abort_on_failure && !failures.is_empty() {
            return Err(PipelineError::OperationAborted {
                operation: spec.name.clone(),
                failed_paths: failures,
                partial: Box::new(text.clone()),
            });
        }

        let dispatched = jobs.len();
        telemetry.event(
            &op_id,
            EventLevel::Info,
            "operation started",
            Some(&json!({
                "operation": spec.name,
                "segments": text.segment_count(),
                "dispatched": dispatched,
                "skipped": skipped,
                "concurrency": limit,
            })),
        );
        info!("Running {} on {} segment(s), {} already done", spec.name, dispatched, skipped);

        let semaphore = Arc::new(Semaphore::new(limit));
        let annotator = &self.annotator;
        let mut results: Vec<Option<SegmentResult>> = (0..dispatched).map(|_| None).collect();
        let mut cancelled = false;
        let mut aborted = false;

        {
            let mut segments = stream::iter(jobs.iter().enumerate())
                .map(|(index, job)| {
                    let semaphore = Arc::clone(&semaphore);
                    async move {
                        let Ok(_permit) = semaphore.acquire_owned().await else {
                            return (index, SegmentResult::NotStarted);
                        };
                        if control.is_cancelled() {
                            return (index, SegmentResult::NotStarted);
                        }
                        (index, SegmentResult::Done(annotator.annotate(spec, job, telemetry).await))
                    }
                })
                .buffer_unordered(limit);

            let cancel = control.cancelled();
            tokio::pin!(cancel);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel, if !cancelled => {
                        cancelled = true;
                        warn!("{} cancelled ({:?})", spec.name, control.policy);
                        if control.policy == CancelPolicy::Abandon {
                            break;
                        }
                    }
                    next = segments.next() => match next {
                        Some((index, result)) => {
                            let failed = matches!(result, SegmentResult::Done(Err(_)));
                            results[index] = Some(result);
                            // One failure dooms an abort-run operation; drop everything still outstanding
                            if failed && abort_on_failure {
                                aborted = true;
                                warn!("{} aborting after a failed segment", spec.name);
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        }

        let mut segment_patches: Vec<(NodePath, PatchSet)> = Vec::new();
        let mut pending_paths = Vec::new();
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Some(SegmentResult::Done(Ok(patches))) => segment_patches.push((job.path, patches)),
                Some(SegmentResult::Done(Err(error))) => {
                    telemetry.event(
                        &job.op_id,
                        EventLevel::Warn,
                        "segment failed",
                        Some(&json!({ "path": job.path.to_string(), "error": error.to_string() })),
                    );
                    failures.push((job.path, error.to_string()));
                }
                Some(SegmentResult::NotStarted) | None => pending_paths.push(job.path),
            }
        }

        // Abort-run operations are all-or-nothing for the whole text
        if aborted {
            failures.sort_by_key(|(path, _)| *path);
            telemetry.event(
                &op_id,
                EventLevel::Warn,
                "operation aborted",
                Some(&json!({
                    "operation": spec.name,
                    "failed": failures.len(),
                    "not_run": pending_paths.len(),
                })),
            );
            return Err(PipelineError::OperationAborted {
                operation: spec.name.clone(),
                failed_paths: failures,
                partial: Box::new(text.clone()),
            });
        }

        let policy = spec.merge_policy(force);
        let owned_segment_keys = spec.segment_keys();
        let owned_token_keys = spec.token_keys();
        let segment_keys: Vec<&str> = owned_segment_keys.iter().map(String::as_str).collect();
        let token_keys: Vec<&str> = owned_token_keys.iter().map(String::as_str).collect();
        // A forced re-run owns its keys outright on every segment it answered
        let base_for = |base: &Text, paths: &[NodePath]| {
            if force {
                base.cleared_at(paths, &segment_keys, &token_keys)
            } else {
                base.clone()
            }
        };

        let all: PatchSet = segment_patches
            .iter()
            .flat_map(|(_, patches)| patches.clone())
            .collect();
        let answered: Vec<NodePath> = segment_patches.iter().map(|(path, _)| *path).collect();
        let (merged, succeeded) = match merge(&base_for(text, &answered), &all, &policy) {
            Ok(merged) => (merged, segment_patches.len()),
            Err(error) if spec.failure_policy == FailurePolicy::SkipSegment => {
                // Find the offending segments one by one and keep the rest
                debug!("{} merge rejected ({}), merging per segment", spec.name, error);
                let mut merged = text.clone();
                let mut succeeded = 0usize;
                for (path, patches) in &segment_patches {
                    match merge(&base_for(&merged, &[*path]), patches, &policy) {
                        Ok(next) => {
                            merged = next;
                            succeeded += 1;
                        }
                        Err(error) => {
                            telemetry.event(
                                &op_id,
                                EventLevel::Warn,
                                "segment merge rejected",
                                Some(&json!({ "path": path.to_string(), "error": error.to_string() })),
                            );
                            failures.push((*path, error.to_string()));
                        }
                    }
                }
                (merged, succeeded)
            }
            Err(error) => return Err(error.into()),
        };
        failures.sort_by_key(|(path, _)| *path);

        telemetry.event(
            &op_id,
            EventLevel::Info,
            "operation finished",
            Some(&json!({
                "operation": spec.name,
                "succeeded": succeeded,
                "failed": failures.len(),
                "pending": pending_paths.len(),
                "elapsed_ms": started.elapsed().as_millis() as u64,
            })),
        );

        if cancelled && !pending_paths.is_empty() {
            return Err(PipelineError::Cancelled {
                stage: spec.name.clone(),
                pending_paths,
                partial: Box::new(merged),
            });
        }

        debug!("{} finished with {} failure(s)", spec.name, failures.len());
        Ok(OperationOutcome {
            text: merged,
            failures,
            dispatched,
            skipped,
            op_id,
        })
    }
}
