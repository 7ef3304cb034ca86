//! Sequential refinement stages with degrade-on-failure semantics.
//!
//! A stage whose gateway call fails does not abort the run: it logs the
//! failure, marks its output `degraded` and forwards its *input* text
//! unchanged, so the next stage operates on pre-refinement content. Only the
//! aggregator can halt a run.

mod blueprint;

pub use blueprint::{parse_blueprints, BlueprintRecord};

use crate::gateway::{Conversation, Gateway};
use crate::materialize::FileRecord;
use tracing::{info, warn};

/// The output of one refinement stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// Stage name, e.g. `structural` or `rendering`.
    pub stage: String,
    /// The stage's text product.
    pub text: String,
    /// True when the stage's own generation failed and `text` is the input
    /// passed through unchanged.
    pub degraded: bool,
}

impl StageOutput {
    /// Creates a normal (non-degraded) output.
    #[must_use]
    pub fn refined(stage: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            text: text.into(),
            degraded: false,
        }
    }

    /// Creates a degraded pass-through output.
    #[must_use]
    pub fn passed_through(stage: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            text: input.into(),
            degraded: true,
        }
    }
}

/// One refinement stage: a named prompt pair applied to an input text.
#[derive(Debug, Clone)]
pub struct RefineStage {
    /// Stage name used in logs and reports.
    pub name: String,
    /// System prompt establishing the stage's agent identity.
    pub system_prompt: String,
    /// Instruction prepended to the stage input.
    pub instruction: String,
}

impl RefineStage {
    /// Creates a stage.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            instruction: instruction.into(),
        }
    }

    /// Runs the stage on `input`, degrading to pass-through on failure.
    ///
    /// Always produces some text; never errors.
    pub async fn run(&self, gateway: &dyn Gateway, input: &str) -> StageOutput {
        let conversation = Conversation::with_system(&self.system_prompt);
        let prompt = format!("{}\n\n{input}", self.instruction);

        match gateway.generate(&conversation, &prompt, &[]).await {
            Ok(text) => {
                info!(stage = %self.name, "Refinement stage finished");
                StageOutput::refined(&self.name, text)
            }
            Err(e) => {
                warn!(stage = %self.name, error = %e, "Refinement failed, passing input through");
                StageOutput::passed_through(&self.name, input)
            }
        }
    }

    /// Runs the stage once per blueprint record, producing one file per
    /// record. A failed record is logged and skipped without affecting its
    /// siblings.
    pub async fn run_per_record(
        &self,
        gateway: &dyn Gateway,
        records: &[BlueprintRecord],
    ) -> Vec<FileRecord> {
        let mut rendered = Vec::with_capacity(records.len());
        for record in records {
            let conversation = Conversation::with_system(&self.system_prompt);
            let prompt = format!(
                "{}\n\nFilename: {}\nOutline:\n{}",
                self.instruction, record.filename, record.outline
            );

            match gateway.generate(&conversation, &prompt, &[]).await {
                Ok(content) => {
                    rendered.push(FileRecord::new(&record.filename, content));
                }
                Err(e) => {
                    warn!(
                        stage = %self.name,
                        filename = %record.filename,
                        error = %e,
                        "Record rendering failed, skipping record"
                    );
                }
            }
        }
        rendered
    }
}
