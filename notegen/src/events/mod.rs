//! Run-scoped observability.
//!
//! Instead of a global logging singleton, the orchestrator is handed an
//! explicit [`EventSink`] at construction; its lifetime is one pipeline run.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
