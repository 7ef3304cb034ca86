//! Pipeline orchestration: stage sequence, failure policy and termination.
//!
//! The stage topology is fixed: one parallel fan-out stage, two sequential
//! refinement stages, one persistence step. The orchestrator owns the
//! [`RunState`] machine and the cleanup asymmetry: consumed inputs are
//! removed on the `Done` path and on the empty-aggregate abort, but not when
//! discovery found nothing.

#[cfg(test)]
mod integration_tests;

use crate::aggregate::{aggregate, AggregateDocument};
use crate::errors::{AbortReason, NotegenError};
use crate::events::EventSink;
use crate::gateway::Gateway;
use crate::inputs::InputSource;
use crate::materialize::{parse_flat_text, validate, write_all, FileRecord};
use crate::pool::{ExtractionPrompt, TaskResult, WorkerPool};
use crate::refine::{parse_blueprints, RefineStage, StageOutput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Which materialization strategy and rendering cardinality a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    /// Stage outputs are free text; the final text is parsed with the
    /// sentinel-delimited file protocol.
    #[default]
    FlatText,
    /// The structural stage emits blueprint records and the rendering stage
    /// is invoked once per record.
    Blueprint,
}

/// The orchestrator's state machine. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not yet started.
    Idle,
    /// Enumerating input items.
    Discovering,
    /// Parallel extraction over input items.
    FanOut,
    /// Combining task results.
    Aggregating,
    /// Structural refinement.
    Structuring,
    /// Final rendering.
    Rendering,
    /// Writing output files.
    Persisting,
    /// Removing consumed inputs.
    Cleanup,
    /// Finished normally.
    Done,
    /// Halted early; reachable only from `Discovering` and `Aggregating`.
    Aborted,
}

impl RunState {
    /// Returns the state name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Discovering => "Discovering",
            Self::FanOut => "FanOut",
            Self::Aggregating => "Aggregating",
            Self::Structuring => "Structuring",
            Self::Rendering => "Rendering",
            Self::Persisting => "Persisting",
            Self::Cleanup => "Cleanup",
            Self::Done => "Done",
            Self::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a [`Pipeline`] needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Worker pool concurrency limit.
    pub concurrency: usize,
    /// Optional per-task timeout.
    pub task_timeout: Option<Duration>,
    /// Pipeline variant.
    pub variant: PipelineVariant,
    /// Target directory for output files.
    pub output_dir: PathBuf,
    /// Extraction stage prompts.
    pub extraction: ExtractionPrompt,
    /// Structural refinement stage.
    pub structural: RefineStage,
    /// Rendering stage.
    pub rendering: RefineStage,
}

/// Report of one pipeline invocation. No identity persists across runs.
#[derive(Debug)]
pub struct PipelineRun {
    /// Unique ID of this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Terminal state: `Done` or `Aborted`.
    pub state: RunState,
    /// The variant that ran.
    pub variant: PipelineVariant,
    /// Number of input items discovered.
    pub tasks_total: usize,
    /// Number of extraction tasks that succeeded.
    pub tasks_succeeded: usize,
    /// The aggregate document, if aggregation was reached and succeeded.
    pub aggregate: Option<AggregateDocument>,
    /// Refinement stage outputs in execution order. The blueprint variant
    /// records only the structural stage here; its rendering product is the
    /// per-record file list.
    pub stages: Vec<StageOutput>,
    /// The validated records handed to the writer, in persistence order.
    pub files: Vec<FileRecord>,
    /// Number of files actually written.
    pub files_written: usize,
    /// Number of consumed inputs removed during cleanup.
    pub inputs_removed: usize,
    /// Why the run aborted, if it did.
    pub abort: Option<AbortReason>,
}

impl PipelineRun {
    fn new(variant: PipelineVariant) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: RunState::Idle,
            variant,
            tasks_total: 0,
            tasks_succeeded: 0,
            aggregate: None,
            stages: Vec::new(),
            files: Vec::new(),
            files_written: 0,
            inputs_removed: 0,
            abort: None,
        }
    }

    /// Returns the output of the named stage, if it ran.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageOutput> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

/// Composes the worker pool, aggregator, refinement chain and materializer
/// into one run.
pub struct Pipeline {
    extraction_gateway: Arc<dyn Gateway>,
    structural_gateway: Arc<dyn Gateway>,
    rendering_gateway: Arc<dyn Gateway>,
    source: Arc<dyn InputSource>,
    sink: Arc<dyn EventSink>,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Creates a pipeline routing every stage through one gateway.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn Gateway>,
        source: Arc<dyn InputSource>,
        sink: Arc<dyn EventSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extraction_gateway: Arc::clone(&gateway),
            structural_gateway: Arc::clone(&gateway),
            rendering_gateway: gateway,
            source,
            sink,
            settings,
        }
    }

    /// Creates a pipeline with one gateway per stage, for deployments that
    /// use a different model identity for extraction, structuring and
    /// rendering.
    #[must_use]
    pub fn with_gateways(
        extraction_gateway: Arc<dyn Gateway>,
        structural_gateway: Arc<dyn Gateway>,
        rendering_gateway: Arc<dyn Gateway>,
        source: Arc<dyn InputSource>,
        sink: Arc<dyn EventSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extraction_gateway,
            structural_gateway,
            rendering_gateway,
            source,
            sink,
            settings,
        }
    }

    async fn transition(&self, run: &mut PipelineRun, to: RunState) {
        let from = run.state;
        run.state = to;
        self.sink
            .emit(
                "run.state_changed",
                Some(serde_json::json!({
                    "run_id": run.run_id.to_string(),
                    "from": from.name(),
                    "to": to.name(),
                })),
            )
            .await;
    }

    async fn abort(&self, run: &mut PipelineRun, reason: AbortReason) {
        run.abort = Some(reason);
        self.transition(run, RunState::Aborted).await;
        self.sink
            .emit(
                "run.aborted",
                Some(serde_json::json!({ "reason": reason.to_string() })),
            )
            .await;
        warn!(run_id = %run.run_id, %reason, "Pipeline run aborted");
    }

    async fn emit_task_failures(&self, results: &[TaskResult]) {
        for result in results.iter().filter(|r| !r.is_success()) {
            self.sink
                .emit(
                    "task.failed",
                    Some(serde_json::json!({
                        "item": result.item.path.display().to_string(),
                        "error": result.error,
                    })),
                )
                .await;
        }
    }

    async fn run_stage(
        &self,
        run: &mut PipelineRun,
        gateway: &dyn Gateway,
        stage: &RefineStage,
        input: &str,
    ) -> String {
        let output = stage.run(gateway, input).await;
        if output.degraded {
            self.sink
                .emit(
                    "stage.degraded",
                    Some(serde_json::json!({ "stage": output.stage })),
                )
                .await;
        }
        let text = output.text.clone();
        run.stages.push(output);
        text
    }

    /// Executes one pipeline run to its terminal state.
    ///
    /// Aborts are in-band (`state == Aborted` with a reason); the only hard
    /// error is an input-discovery I/O failure.
    ///
    /// # Errors
    ///
    /// Returns [`NotegenError::Io`] when the input source cannot be
    /// enumerated at all.
    pub async fn run(&self) -> Result<PipelineRun, NotegenError> {
        let mut run = PipelineRun::new(self.settings.variant);
        info!(run_id = %run.run_id, variant = ?run.variant, "Pipeline run started");

        self.transition(&mut run, RunState::Discovering).await;
        let items = self.source.discover().await?;
        run.tasks_total = items.len();

        if items.is_empty() {
            // Nothing was consumed, so no cleanup on this path.
            self.abort(&mut run, AbortReason::NoInput).await;
            return Ok(run);
        }

        self.transition(&mut run, RunState::FanOut).await;
        let mut pool = WorkerPool::new(self.settings.concurrency);
        if let Some(timeout) = self.settings.task_timeout {
            pool = pool.with_task_timeout(timeout);
        }
        let results = pool
            .run(
                Arc::clone(&self.extraction_gateway),
                &self.settings.extraction,
                items.clone(),
            )
            .await;
        run.tasks_succeeded = results.iter().filter(|r| r.is_success()).count();
        self.emit_task_failures(&results).await;

        self.transition(&mut run, RunState::Aggregating).await;
        let document = match aggregate(&results) {
            Ok(document) => document,
            Err(reason) => {
                // Inputs were consumed by the fan-out, so cleanup still runs.
                run.inputs_removed = self.source.remove(&items).await;
                self.abort(&mut run, reason).await;
                return Ok(run);
            }
        };
        run.aggregate = Some(document.clone());

        self.transition(&mut run, RunState::Structuring).await;
        let structured = self
            .run_stage(
                &mut run,
                self.structural_gateway.as_ref(),
                &self.settings.structural,
                &document.text,
            )
            .await;

        self.transition(&mut run, RunState::Rendering).await;
        let records = match self.settings.variant {
            PipelineVariant::FlatText => {
                let rendered = self
                    .run_stage(
                        &mut run,
                        self.rendering_gateway.as_ref(),
                        &self.settings.rendering,
                        &structured,
                    )
                    .await;
                parse_flat_text(&rendered)
            }
            PipelineVariant::Blueprint => {
                let blueprints = parse_blueprints(&structured);
                self.settings
                    .rendering
                    .run_per_record(self.rendering_gateway.as_ref(), &blueprints)
                    .await
            }
        };

        self.transition(&mut run, RunState::Persisting).await;
        run.files = validate(records);
        run.files_written = write_all(&run.files, &self.settings.output_dir);
        self.sink
            .emit(
                "files.persisted",
                Some(serde_json::json!({ "count": run.files_written })),
            )
            .await;

        self.transition(&mut run, RunState::Cleanup).await;
        run.inputs_removed = self.source.remove(&items).await;

        self.transition(&mut run, RunState::Done).await;
        info!(
            run_id = %run.run_id,
            files_written = run.files_written,
            inputs_removed = run.inputs_removed,
            "Pipeline run finished"
        );
        Ok(run)
    }
}
