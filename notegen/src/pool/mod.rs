//! Bounded-concurrency fan-out over independent extraction tasks.
//!
//! One task per input item; at most `concurrency` tasks run at once. Task
//! failures are data ([`TaskResult`]), never pipeline aborts: a gateway
//! error, an unreadable input, a timeout, an empty reply or a panicked task
//! all come back as `Failed` results and the pool always returns exactly one
//! result per item.

use crate::gateway::{Attachment, Conversation, Gateway};
use crate::inputs::InputItem;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Outcome of one extraction task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The gateway produced non-empty text.
    Success,
    /// The task failed; `error` carries the cause and `text` is empty.
    Failed,
}

/// The result of one extraction task, produced exactly once per input item
/// and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// The item this task processed.
    pub item: InputItem,
    /// Success or failure.
    pub status: TaskStatus,
    /// Extracted text; empty on failure.
    pub text: String,
    /// Failure cause, if any.
    pub error: Option<String>,
}

impl TaskResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(item: InputItem, text: impl Into<String>) -> Self {
        Self {
            item,
            status: TaskStatus::Success,
            text: text.into(),
            error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(item: InputItem, error: impl Into<String>) -> Self {
        Self {
            item,
            status: TaskStatus::Failed,
            text: String::new(),
            error: Some(error.into()),
        }
    }

    /// Returns true if the task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// Prompt material for the extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractionPrompt {
    /// System prompt for the per-task conversation.
    pub system_prompt: String,
    /// User instruction sent with each attachment.
    pub instruction: String,
}

/// Executes extraction tasks with a fixed concurrency bound.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    task_timeout: Option<Duration>,
}

impl WorkerPool {
    /// Creates a pool with the given concurrency limit (clamped to >= 1).
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            task_timeout: None,
        }
    }

    /// Sets a per-task timeout; an elapsed deadline becomes a `Failed`
    /// result rather than stalling the pool.
    #[must_use]
    pub const fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs one extraction task per item and returns every result.
    ///
    /// Results come back in completion order; callers must not rely on it.
    /// An empty `items` list returns immediately without a gateway call.
    pub async fn run(
        &self,
        gateway: Arc<dyn Gateway>,
        prompt: &ExtractionPrompt,
        items: Vec<InputItem>,
    ) -> Vec<TaskResult> {
        if items.is_empty() {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();
        let mut items_by_task: HashMap<tokio::task::Id, InputItem> =
            HashMap::with_capacity(items.len());

        for item in items {
            let gateway = Arc::clone(&gateway);
            let semaphore = Arc::clone(&semaphore);
            let prompt = prompt.clone();
            let timeout = self.task_timeout;
            let task_item = item.clone();

            let handle = join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TaskResult::failed(item, "worker pool shut down");
                };
                run_task(gateway, &prompt, item, timeout).await
            });
            items_by_task.insert(handle.id(), task_item);
        }

        let mut results = Vec::with_capacity(join_set.len());
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((task_id, result)) => {
                    items_by_task.remove(&task_id);
                    if let Some(error) = &result.error {
                        warn!(
                            item = %result.item.path.display(),
                            error = %error,
                            "Extraction task failed"
                        );
                    } else {
                        debug!(item = %result.item.path.display(), "Extraction task finished");
                    }
                    results.push(result);
                }
                Err(join_error) => {
                    warn!(error = %join_error, "Extraction task panicked");
                    if let Some(item) = items_by_task.remove(&join_error.id()) {
                        results.push(TaskResult::failed(
                            item,
                            format!("task panicked: {join_error}"),
                        ));
                    }
                }
            }
        }
        results
    }
}

/// One task unit: fresh conversation, one attachment, one gateway call.
async fn run_task(
    gateway: Arc<dyn Gateway>,
    prompt: &ExtractionPrompt,
    item: InputItem,
    timeout: Option<Duration>,
) -> TaskResult {
    let attachment = match Attachment::from_file(&item.path).await {
        Ok(att) => att,
        Err(e) => return TaskResult::failed(item, format!("read input: {e}")),
    };

    // Per-task context: never shared with a sibling task.
    let conversation = Conversation::with_system(&prompt.system_prompt);
    let attachments = [attachment];

    let call = gateway.generate(&conversation, &prompt.instruction, &attachments);
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return TaskResult::failed(
                    item,
                    format!("timed out after {}s", limit.as_secs()),
                )
            }
        },
        None => call.await,
    };

    match outcome {
        Ok(text) if text.trim().is_empty() => {
            TaskResult::failed(item, "empty response from gateway")
        }
        Ok(text) => TaskResult::success(item, text),
        Err(e) => TaskResult::failed(item, e.to_string()),
    }
}
