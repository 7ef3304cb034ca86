//! # Notegen
//!
//! A staged text-generation pipeline that turns a set of source images into
//! a set of derived note files:
//!
//! - **Fan-out**: a bounded worker pool extracts text from each image
//!   independently, one isolated conversation per task
//! - **Fan-in**: successful extractions are aggregated deterministically
//! - **Refinement**: two sequential stages refine the aggregate, each
//!   degrading to pass-through when its own generation fails
//! - **Materialization**: the final output is parsed into named files and
//!   written under a sandboxed target directory
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use notegen::prelude::*;
//!
//! let pipeline = Pipeline::new(gateway, source, sink, settings);
//! let run = pipeline.run().await?;
//! println!("{} files written", run.files_written);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregate;
pub mod config;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod inputs;
pub mod materialize;
pub mod pipeline;
pub mod pool;
pub mod refine;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::{aggregate, AggregateDocument};
    pub use crate::config::{AgentConfig, NotegenConfig};
    pub use crate::errors::{AbortReason, GatewayError, NotegenError};
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::gateway::{Attachment, Conversation, Gateway, OpenAiGateway};
    pub use crate::inputs::{ImageDirSource, InputItem, InputSource};
    pub use crate::materialize::{
        encode_flat_text, parse_flat_text, persist, FileRecord,
    };
    pub use crate::pipeline::{
        Pipeline, PipelineRun, PipelineSettings, PipelineVariant, RunState,
    };
    pub use crate::pool::{ExtractionPrompt, TaskResult, TaskStatus, WorkerPool};
    pub use crate::refine::{parse_blueprints, BlueprintRecord, RefineStage, StageOutput};
}
