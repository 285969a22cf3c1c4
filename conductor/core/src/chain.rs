//! Chain Executor
//!
//! Runs an ordered list of commands one after another.
//!
//! # Ordering
//!
//! Steps are stably sorted by ascending priority and executed strictly in
//! sequence: step N has finished, and its effects are visible in the
//! orchestrator, before step N+1 starts. A step that fails, or that is
//! missing required fields, is recorded and the chain moves on.
//!
//! # Cancellation
//!
//! The token is checked before every step and during the pause between
//! steps. Cancelling stops further dispatch; results of finished steps are
//! kept.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::Command;
use crate::conversation::{ConversationHandle, ConversationMessage};
use crate::dispatch::{missing_fields_message, CommandDispatcher, StepResult};

/// Progress notification for streaming surfaces
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Completion, 0-100
    pub percent: u8,
    /// What just happened
    pub message: String,
}

impl ProgressEvent {
    /// Create an event, clamping `percent` to 100
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

/// Result of a chain run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    /// One result per executed step, in execution order
    pub steps: Vec<StepResult>,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
}

impl ChainReport {
    /// Whether every step ran and succeeded
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        !self.cancelled && self.steps.iter().all(|s| s.success)
    }

    /// Number of successful steps
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }
}

/// Sequential multi-command runner
#[derive(Clone, Debug)]
pub struct ChainExecutor {
    dispatcher: CommandDispatcher,
    step_delay: Duration,
}

impl ChainExecutor {
    /// Create an executor pausing `step_delay` between steps
    pub fn new(dispatcher: CommandDispatcher, step_delay: Duration) -> Self {
        Self {
            dispatcher,
            step_delay,
        }
    }

    /// Run `commands` in priority order
    pub async fn execute(
        &self,
        commands: &[Command],
        conversation: &ConversationHandle,
    ) -> Vec<StepResult> {
        self.execute_with(commands, conversation, &CancellationToken::new(), None)
            .await
            .steps
    }

    /// Run `commands` with cancellation and optional progress reporting
    pub async fn execute_with(
        &self,
        commands: &[Command],
        conversation: &ConversationHandle,
        cancel: &CancellationToken,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> ChainReport {
        let mut ordered: Vec<&Command> = commands.iter().collect();
        ordered.sort_by_key(|c| c.priority);

        let total = ordered.len();
        let mut steps = Vec::with_capacity(total);
        info!(conversation_id = %conversation.id(), steps = total, "Executing command chain");

        for (index, command) in ordered.into_iter().enumerate() {
            if index > 0 && !self.step_delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(self.step_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                info!(completed = index, remaining = total - index, "Command chain cancelled");
                conversation.append(ConversationMessage::system(format!(
                    "Chain cancelled after {index} of {total} steps"
                )));
                return ChainReport {
                    steps,
                    cancelled: true,
                };
            }

            let result = if command.validate() {
                self.dispatcher.execute(command).await
            } else {
                StepResult::failed(command.clone(), missing_fields_message(command))
            };

            let step = index + 1;
            let line = format!(
                "Step {step}/{total} {}: {}",
                if result.success { "✅" } else { "❌" },
                result.message
            );
            debug!(step, action = ?command.kind(), success = result.success, "Chain step finished");
            conversation.append(
                ConversationMessage::system(line.clone())
                    .with_metadata("step", serde_json::json!(step))
                    .with_metadata("success", serde_json::json!(result.success)),
            );

            if let Some(tx) = &progress {
                let percent = u8::try_from(step * 100 / total).unwrap_or(100);
                // A dropped receiver only means nobody is watching.
                let _ = tx.send(ProgressEvent::new(percent, line)).await;
            }
            steps.push(result);
        }

        ChainReport {
            steps,
            cancelled: false,
        }
    }
}
