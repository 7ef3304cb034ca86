//! Generation gateway: the external text-generation capability.
//!
//! The pipeline owns no prompt content or model choice; it only needs a
//! [`Gateway`] it can call with an explicit [`Conversation`] value. The
//! conversation is borrowed read-only per call and cloned inside the client,
//! so concurrent callers can never observe or corrupt each other's turn
//! history. That isolation is the load-bearing concurrency invariant of the
//! whole crate.

mod openai;

pub use openai::OpenAiGateway;

use crate::errors::GatewayError;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction.
    System,
    /// User input.
    User,
    /// Model output.
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the turn.
    pub role: Role,
    /// The turn text.
    pub content: String,
}

/// An explicit, immutable conversation state handed to a gateway call.
///
/// A `Conversation` is a value, not a shared object: the gateway only ever
/// borrows it, and each concurrently executing task constructs its own.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Creates an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a conversation seeded with a system instruction.
    #[must_use]
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn {
                role: Role::System,
                content: system_prompt.into(),
            }],
        }
    }

    /// Returns the turns in order.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns the number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if the conversation has no turns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// A binary media attachment for a gateway call.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// MIME type, e.g. `image/jpeg`.
    pub media_type: String,
    /// Base64-encoded payload.
    pub data: String,
}

impl Attachment {
    /// Creates an attachment from raw bytes.
    #[must_use]
    pub fn from_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Reads a file and encodes it as an attachment, inferring the MIME type
    /// from the extension.
    pub async fn from_file(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(mime_for_path(path), &bytes))
    }

    /// Returns the attachment as a `data:` URI.
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Infers an image MIME type from a file extension.
fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// The external text-generation capability.
///
/// Implementations must be safely callable concurrently as long as each call
/// receives a distinct `Conversation`; they must return failure as an
/// explicit [`GatewayError`], never partial text. An empty or
/// whitespace-only reply is [`GatewayError::EmptyResponse`].
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Generates text for `prompt` in the context of `conversation`,
    /// optionally grounding on `attachments`.
    async fn generate(
        &self,
        conversation: &Conversation,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<String, GatewayError>;
}
