//! Run configuration.
//!
//! Configuration lives in a JSON file. A missing file is created from
//! defaults so a fresh checkout produces a template the operator can fill in
//! with real credentials.

use crate::errors::NotegenError;
use crate::pipeline::PipelineVariant;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for one generation agent (one pipeline stage's model identity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Endpoint base URL (OpenAI-compatible).
    pub base_url: String,
    /// API key.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// System prompt establishing the agent identity.
    pub system_prompt: String,
    /// Instruction prepended to the stage input.
    pub instruction: String,
}

impl AgentConfig {
    fn placeholder(system_prompt: &str, instruction: &str) -> Self {
        Self {
            base_url: "https://api.example.com/v1".to_string(),
            api_key: "sk-REPLACE-ME".to_string(),
            model: "REPLACE-ME".to_string(),
            system_prompt: system_prompt.to_string(),
            instruction: instruction.to_string(),
        }
    }
}

/// Full configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotegenConfig {
    /// Directory scanned for input images.
    pub input_dir: String,
    /// Directory the derived files are written to.
    pub output_dir: String,
    /// Worker pool concurrency limit (>= 1).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Optional per-task timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timeout_secs: Option<u64>,
    /// Which pipeline variant to run.
    #[serde(default)]
    pub variant: PipelineVariant,
    /// Agent for the parallel extraction stage.
    pub extraction: AgentConfig,
    /// Agent for the structural refinement stage.
    pub structural: AgentConfig,
    /// Agent for the rendering stage.
    pub rendering: AgentConfig,
}

fn default_concurrency() -> usize {
    5
}

impl Default for NotegenConfig {
    fn default() -> Self {
        Self {
            input_dir: ".".to_string(),
            output_dir: "output".to_string(),
            concurrency: default_concurrency(),
            task_timeout_secs: None,
            variant: PipelineVariant::default(),
            extraction: AgentConfig::placeholder(
                "You transcribe handwritten study notes from images.",
                "Transcribe everything legible in the attached image as Markdown.",
            ),
            structural: AgentConfig::placeholder(
                "You are a subject-matter editor with final authority.",
                "Review the draft below, correct factual errors and merge duplicates.",
            ),
            rendering: AgentConfig::placeholder(
                "You are a content formatting engine.",
                "Split the text below into standalone note files.",
            ),
        }
    }
}

impl NotegenConfig {
    /// Loads the configuration from `path`, creating the file from defaults
    /// if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`NotegenError::Config`] when the file exists but cannot be
    /// read or parsed, or when the default template cannot be written.
    pub fn load_or_init(path: &Path) -> Result<Self, NotegenError> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| NotegenError::Config(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| NotegenError::Config(format!("parse {}: {e}", path.display())))
        } else {
            let config = Self::default();
            let raw = serde_json::to_string_pretty(&config)
                .map_err(|e| NotegenError::Config(e.to_string()))?;
            std::fs::write(path, raw)
                .map_err(|e| NotegenError::Config(format!("write {}: {e}", path.display())))?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let config = NotegenConfig::default();
        let json = serde_json::to_string(&config).expect("serializes");
        let back: NotegenConfig = serde_json::from_str(&json).expect("parses");
        assert_eq!(back.concurrency, 5);
        assert_eq!(back.variant, PipelineVariant::FlatText);
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notegen.json");

        let config = NotegenConfig::load_or_init(&path).expect("init");
        assert!(path.exists());
        assert_eq!(config.concurrency, 5);

        // Second load reads the file that was just written.
        let again = NotegenConfig::load_or_init(&path).expect("load");
        assert_eq!(again.output_dir, config.output_dir);
    }

    #[test]
    fn test_invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").expect("write");

        let err = NotegenConfig::load_or_init(&path).expect_err("must fail");
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_concurrency_defaults_when_absent() {
        let minimal = serde_json::json!({
            "input_dir": ".",
            "output_dir": "out",
            "extraction": AgentConfig::placeholder("a", "b"),
            "structural": AgentConfig::placeholder("a", "b"),
            "rendering": AgentConfig::placeholder("a", "b"),
        });
        let config: NotegenConfig =
            serde_json::from_value(minimal).expect("parses");
        assert_eq!(config.concurrency, 5);
        assert!(config.task_timeout_secs.is_none());
    }
}
