//! End-to-end pipeline tests over mock collaborators.

use super::*;
use crate::aggregate::SEPARATOR;
use crate::events::{CollectingEventSink, NoOpEventSink};
use crate::inputs::InputItem;
use crate::materialize::SENTINEL;
use crate::testing::{MemorySource, MockGateway};
use pretty_assertions::assert_eq;
use std::fs;

const EXTRACT_NEEDLE: &str = "transcribe the image";
const STRUCTURAL_NEEDLE: &str = "revise the draft";
const RENDER_NEEDLE: &str = "format into files";

fn settings(variant: PipelineVariant, output_dir: &std::path::Path) -> PipelineSettings {
    PipelineSettings {
        concurrency: 2,
        task_timeout: None,
        variant,
        output_dir: output_dir.to_path_buf(),
        extraction: ExtractionPrompt {
            system_prompt: "transcriber".to_string(),
            instruction: EXTRACT_NEEDLE.to_string(),
        },
        structural: RefineStage::new("structural", "editor", STRUCTURAL_NEEDLE),
        rendering: RefineStage::new("rendering", "formatter", RENDER_NEEDLE),
    }
}

fn seed_inputs(dir: &std::path::Path, count: usize) -> Vec<InputItem> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("page{i}.jpg"));
            fs::write(&path, b"image bytes").expect("write");
            InputItem::new(i, path)
        })
        .collect()
}

fn flat_text_reply() -> String {
    format!("FILENAME: a.md\nalpha\n{SENTINEL}\nFILENAME: b.md\nbeta\n{SENTINEL}\n")
}

#[tokio::test]
async fn test_flat_text_happy_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let items = seed_inputs(dir.path(), 3);

    let gateway = Arc::new(
        MockGateway::always("extracted")
            .replying_to(STRUCTURAL_NEEDLE, "structured draft")
            .replying_to(RENDER_NEEDLE, flat_text_reply()),
    );
    let source = Arc::new(MemorySource::new(items));
    let pipeline = Pipeline::new(
        gateway,
        Arc::clone(&source) as Arc<dyn InputSource>,
        Arc::new(NoOpEventSink),
        settings(PipelineVariant::FlatText, &out),
    );

    let run = pipeline.run().await.expect("run");

    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.tasks_total, 3);
    assert_eq!(run.tasks_succeeded, 3);
    assert_eq!(run.files_written, 2);
    assert_eq!(run.inputs_removed, 3);
    assert!(run.abort.is_none());
    assert_eq!(run.files.len(), 2);
    assert_eq!(run.files[0].filename, "a.md");
    assert_eq!(run.stages.len(), 2);
    assert!(run.stages.iter().all(|s| !s.degraded));
    assert_eq!(fs::read_to_string(out.join("a.md")).expect("a"), "alpha");
    assert_eq!(fs::read_to_string(out.join("b.md")).expect("b"), "beta");
    assert_eq!(source.removed().len(), 3);
}

#[tokio::test]
async fn test_blueprint_happy_path_renders_per_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let items = seed_inputs(dir.path(), 2);

    let blueprints = r#"[
        {"filename": "cell.md", "outline": "membranes"},
        {"filename": "dna.md", "outline": "double helix"}
    ]"#;
    let gateway = Arc::new(
        MockGateway::always("extracted")
            .replying_to(STRUCTURAL_NEEDLE, blueprints)
            .replying_to(RENDER_NEEDLE, "rendered body"),
    );
    let source = Arc::new(MemorySource::new(items));
    let pipeline = Pipeline::new(
        Arc::clone(&gateway) as Arc<dyn Gateway>,
        source,
        Arc::new(NoOpEventSink),
        settings(PipelineVariant::Blueprint, &out),
    );

    let run = pipeline.run().await.expect("run");

    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.files_written, 2);
    assert_eq!(
        fs::read_to_string(out.join("cell.md")).expect("cell"),
        "rendered body"
    );
    // 2 extraction + 1 structural + 2 per-record rendering calls.
    assert_eq!(gateway.call_count(), 5);
    // Only the structural stage appears as a text stage output.
    assert_eq!(run.stages.len(), 1);
}

#[tokio::test]
async fn test_no_input_aborts_without_cleanup_or_gateway_calls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let gateway = Arc::new(MockGateway::always("unused"));
    let source = Arc::new(MemorySource::empty());

    let pipeline = Pipeline::new(
        Arc::clone(&gateway) as Arc<dyn Gateway>,
        Arc::clone(&source) as Arc<dyn InputSource>,
        Arc::new(NoOpEventSink),
        settings(PipelineVariant::FlatText, dir.path()),
    );

    let run = pipeline.run().await.expect("run");

    assert_eq!(run.state, RunState::Aborted);
    assert_eq!(run.abort, Some(AbortReason::NoInput));
    assert_eq!(gateway.call_count(), 0);
    assert!(source.removed().is_empty());
    assert_eq!(run.inputs_removed, 0);
}

#[tokio::test]
async fn test_all_failures_abort_but_still_clean_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let items = seed_inputs(dir.path(), 3);

    let gateway = Arc::new(MockGateway::always("x").failing_on(EXTRACT_NEEDLE, "vision down"));
    let source = Arc::new(MemorySource::new(items));
    let pipeline = Pipeline::new(
        gateway,
        Arc::clone(&source) as Arc<dyn InputSource>,
        Arc::new(NoOpEventSink),
        settings(PipelineVariant::FlatText, dir.path()),
    );

    let run = pipeline.run().await.expect("run");

    assert_eq!(run.state, RunState::Aborted);
    assert_eq!(run.abort, Some(AbortReason::NoValidExtractions));
    assert_eq!(run.files_written, 0);
    // The asymmetry: inputs were consumed, so cleanup still runs here.
    assert_eq!(source.removed().len(), 3);
    assert_eq!(run.inputs_removed, 3);
}

#[tokio::test]
async fn test_degraded_structural_stage_feeds_rendering_verbatim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let items = seed_inputs(dir.path(), 2);

    let gateway = Arc::new(
        MockGateway::always("extracted")
            .failing_on(STRUCTURAL_NEEDLE, "editor overloaded")
            .replying_to(RENDER_NEEDLE, flat_text_reply()),
    );
    let source = Arc::new(MemorySource::new(items));
    let pipeline = Pipeline::new(
        Arc::clone(&gateway) as Arc<dyn Gateway>,
        source,
        Arc::new(NoOpEventSink),
        settings(PipelineVariant::FlatText, &out),
    );

    let run = pipeline.run().await.expect("run");

    assert_eq!(run.state, RunState::Done);
    let structural = run.stage("structural").expect("structural ran");
    assert!(structural.degraded);
    let rendering = run.stage("rendering").expect("rendering ran");
    assert!(!rendering.degraded);

    // Rendering received the pre-refinement aggregate text verbatim.
    let aggregate_text = format!("extracted{SEPARATOR}extracted");
    assert_eq!(structural.text, aggregate_text);
    let render_prompt = gateway
        .recorded_prompts()
        .into_iter()
        .find(|p| p.contains(RENDER_NEEDLE))
        .expect("render prompt");
    assert!(render_prompt.ends_with(&aggregate_text));

    assert_eq!(run.files_written, 2);
}

#[tokio::test]
async fn test_adversarial_filenames_never_reach_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let items = seed_inputs(dir.path(), 1);

    let reply = format!(
        "FILENAME: ../../etc/passwd\nowned\n{SENTINEL}\nFILENAME: /etc/shadow\nowned\n{SENTINEL}\n"
    );
    let gateway = Arc::new(
        MockGateway::always("extracted")
            .replying_to(STRUCTURAL_NEEDLE, "structured")
            .replying_to(RENDER_NEEDLE, reply),
    );
    let pipeline = Pipeline::new(
        gateway,
        Arc::new(MemorySource::new(items)),
        Arc::new(NoOpEventSink),
        settings(PipelineVariant::FlatText, &out),
    );

    let run = pipeline.run().await.expect("run");

    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.files_written, 0);
    assert!(run.files.is_empty());
    assert!(!dir.path().join("../../etc/passwd").exists());
}

#[tokio::test]
async fn test_per_record_blueprint_failure_skips_only_that_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let items = seed_inputs(dir.path(), 1);

    let blueprints = r#"[
        {"filename": "keep.md", "outline": "fine"},
        {"filename": "skip.md", "outline": "UNRENDERABLE"},
        {"filename": "also-keep.md", "outline": "fine"}
    ]"#;
    let gateway = Arc::new(
        MockGateway::always("extracted")
            .replying_to(STRUCTURAL_NEEDLE, blueprints)
            .failing_on("UNRENDERABLE", "render glitch")
            .replying_to(RENDER_NEEDLE, "body"),
    );
    let pipeline = Pipeline::new(
        gateway,
        Arc::new(MemorySource::new(items)),
        Arc::new(NoOpEventSink),
        settings(PipelineVariant::Blueprint, &out),
    );

    let run = pipeline.run().await.expect("run");

    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.files_written, 2);
    assert!(out.join("keep.md").exists());
    assert!(!out.join("skip.md").exists());
    assert!(out.join("also-keep.md").exists());
}

#[tokio::test]
async fn test_state_transitions_are_forward_and_complete() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let items = seed_inputs(dir.path(), 1);

    let gateway = Arc::new(
        MockGateway::always("extracted")
            .replying_to(STRUCTURAL_NEEDLE, "structured")
            .replying_to(RENDER_NEEDLE, flat_text_reply()),
    );
    let sink = Arc::new(CollectingEventSink::new());
    let pipeline = Pipeline::new(
        gateway,
        Arc::new(MemorySource::new(items)),
        Arc::clone(&sink) as Arc<dyn EventSink>,
        settings(PipelineVariant::FlatText, &out),
    );

    pipeline.run().await.expect("run");

    let states: Vec<String> = sink
        .events_of_type("run.state_changed")
        .into_iter()
        .filter_map(|(_, data)| data?.get("to")?.as_str().map(String::from))
        .collect();
    assert_eq!(
        states,
        vec![
            "Discovering",
            "FanOut",
            "Aggregating",
            "Structuring",
            "Rendering",
            "Persisting",
            "Cleanup",
            "Done",
        ]
    );
}

#[tokio::test]
async fn test_aggregate_is_deterministic_across_runs() {
    // Same inputs twice with a concurrency-heavy pool; the aggregate text
    // must not depend on completion order.
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let items = seed_inputs(dir.path(), 5);

    let mut texts = Vec::new();
    for _ in 0..2 {
        let gateway = Arc::new(
            MockGateway::always("extracted")
                .with_delay_ms(5)
                .replying_to(STRUCTURAL_NEEDLE, "structured")
                .replying_to(RENDER_NEEDLE, flat_text_reply()),
        );
        let pipeline = Pipeline::new(
            gateway,
            Arc::new(MemorySource::new(items.clone())),
            Arc::new(NoOpEventSink),
            settings(PipelineVariant::FlatText, &out),
        );
        let run = pipeline.run().await.expect("run");
        texts.push(run.aggregate.expect("aggregate").text);
    }

    assert_eq!(texts[0], texts[1]);
}
