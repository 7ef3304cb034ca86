//! Test doubles for the gateway and input source seams.

use crate::errors::GatewayError;
use crate::gateway::{Attachment, Conversation, Gateway};
use crate::inputs::{InputItem, InputSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A scripted gateway that records calls and tracks concurrency.
///
/// The in-flight high-water mark lets tests assert that a worker pool never
/// exceeds its configured limit.
#[derive(Debug)]
pub struct MockGateway {
    default_reply: Result<String, String>,
    rules: Vec<(String, Result<String, String>)>,
    call_failures: Vec<(usize, String)>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    conversation_lengths: Mutex<Vec<usize>>,
    attachment_counts: Mutex<Vec<usize>>,
}

impl MockGateway {
    fn with_default(default_reply: Result<String, String>) -> Self {
        Self {
            default_reply,
            rules: Vec::new(),
            call_failures: Vec::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            conversation_lengths: Mutex::new(Vec::new()),
            attachment_counts: Mutex::new(Vec::new()),
        }
    }

    /// A gateway that replies with `text` to every call.
    #[must_use]
    pub fn always(text: impl Into<String>) -> Self {
        Self::with_default(Ok(text.into()))
    }

    /// A gateway that fails every call with `error`.
    #[must_use]
    pub fn always_failing(error: impl Into<String>) -> Self {
        Self::with_default(Err(error.into()))
    }

    /// A gateway that fails only the call with the given zero-based index,
    /// replying with `text` otherwise.
    #[must_use]
    pub fn failing_on_call(
        call_index: usize,
        error: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut gateway = Self::with_default(Ok(text.into()));
        gateway.call_failures = vec![(call_index, error.into())];
        gateway
    }

    /// Adds a reply used when the prompt contains `needle`. Rules are
    /// checked in insertion order before the default reply.
    #[must_use]
    pub fn replying_to(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Ok(text.into())));
        self
    }

    /// Adds a failure used when the prompt contains `needle`.
    #[must_use]
    pub fn failing_on(mut self, needle: impl Into<String>, error: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Err(error.into())));
        self
    }

    /// Delays every call, making concurrency overlap observable.
    #[must_use]
    pub const fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed executing simultaneously.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    #[must_use]
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Turn counts of the conversations received, in call order.
    #[must_use]
    pub fn recorded_conversation_lengths(&self) -> Vec<usize> {
        self.conversation_lengths.lock().clone()
    }

    /// Attachment counts received, in call order.
    #[must_use]
    pub fn recorded_attachment_counts(&self) -> Vec<usize> {
        self.attachment_counts.lock().clone()
    }

    fn reply_for(&self, call_index: usize, prompt: &str) -> Result<String, String> {
        if let Some((_, error)) = self.call_failures.iter().find(|(i, _)| *i == call_index) {
            return Err(error.clone());
        }
        for (needle, reply) in &self.rules {
            if prompt.contains(needle.as_str()) {
                return reply.clone();
            }
        }
        self.default_reply.clone()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn generate(
        &self,
        conversation: &Conversation,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<String, GatewayError> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        self.prompts.lock().push(prompt.to_string());
        self.conversation_lengths.lock().push(conversation.len());
        self.attachment_counts.lock().push(attachments.len());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.reply_for(call_index, prompt);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply.map_err(GatewayError::Connection)
    }
}

/// An in-memory input source that records removals.
#[derive(Debug, Default)]
pub struct MemorySource {
    items: Vec<InputItem>,
    removed: Mutex<Vec<InputItem>>,
}

impl MemorySource {
    /// Creates a source yielding the given items.
    #[must_use]
    pub fn new(items: Vec<InputItem>) -> Self {
        Self {
            items,
            removed: Mutex::new(Vec::new()),
        }
    }

    /// Creates a source with no items.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Items passed to [`InputSource::remove`] so far.
    #[must_use]
    pub fn removed(&self) -> Vec<InputItem> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl InputSource for MemorySource {
    async fn discover(&self) -> std::io::Result<Vec<InputItem>> {
        Ok(self.items.clone())
    }

    async fn remove(&self, items: &[InputItem]) -> usize {
        self.removed.lock().extend_from_slice(items);
        items.len()
    }
}
