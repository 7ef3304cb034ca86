//! Notegen binary: load configuration, wire the pipeline, run once.

use anyhow::Context as _;
use notegen::config::{AgentConfig, NotegenConfig};
use notegen::events::LoggingEventSink;
use notegen::gateway::OpenAiGateway;
use notegen::inputs::ImageDirSource;
use notegen::pipeline::{Pipeline, PipelineSettings, RunState};
use notegen::pool::ExtractionPrompt;
use notegen::refine::RefineStage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn gateway_for(agent: &AgentConfig) -> anyhow::Result<Arc<OpenAiGateway>> {
    Ok(Arc::new(
        OpenAiGateway::new(&agent.base_url, &agent.api_key, &agent.model)
            .with_context(|| format!("gateway for model {}", agent.model))?,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("notegen.json"), PathBuf::from);
    let config = NotegenConfig::load_or_init(Path::new(&config_path))
        .with_context(|| format!("loading {}", config_path.display()))?;

    let output_dir = PathBuf::from(&config.output_dir);
    let source = ImageDirSource::new(&config.input_dir)
        .skip_dir(
            output_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("output"),
        )
        .skip_dir("log");

    let settings = PipelineSettings {
        concurrency: config.concurrency,
        task_timeout: config.task_timeout_secs.map(Duration::from_secs),
        variant: config.variant,
        output_dir,
        extraction: ExtractionPrompt {
            system_prompt: config.extraction.system_prompt.clone(),
            instruction: config.extraction.instruction.clone(),
        },
        structural: RefineStage::new(
            "structural",
            &config.structural.system_prompt,
            &config.structural.instruction,
        ),
        rendering: RefineStage::new(
            "rendering",
            &config.rendering.system_prompt,
            &config.rendering.instruction,
        ),
    };

    let pipeline = Pipeline::with_gateways(
        gateway_for(&config.extraction)?,
        gateway_for(&config.structural)?,
        gateway_for(&config.rendering)?,
        Arc::new(source),
        Arc::new(LoggingEventSink::default()),
        settings,
    );

    let run = pipeline.run().await?;
    match run.state {
        RunState::Done => {
            println!(
                "run {} finished: {} files written, {} inputs removed",
                run.run_id, run.files_written, run.inputs_removed
            );
            Ok(())
        }
        _ => {
            let reason = run
                .abort
                .map_or_else(|| "unknown".to_string(), |r| r.to_string());
            println!("run {} aborted: {reason}", run.run_id);
            Ok(())
        }
    }
}
