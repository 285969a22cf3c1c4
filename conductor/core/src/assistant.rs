//! Assistant
//!
//! The chat surface entry point. One call takes a user's text through the
//! whole pipeline:
//!
//! ```text
//!   text ─▶ truncate ─▶ IntentParser ─▶ Command ─▶ fill gaps from conversation
//!                                         │
//!              needs more info ◀──────────┤
//!              (ask, don't run)           ├─▶ ChainedCommands ─▶ ChainExecutor
//!                                         └─▶ anything else   ─▶ CommandDispatcher
//!                                                       │
//!                               AssistantReply ◀────────┘
//! ```
//!
//! Every call produces a reply with a non-empty message, whatever the input.
//!
//! After each run the conversation remembers the latest session and its host,
//! so "disconnect it" or "take a screenshot" can follow "connect to ..."
//! without naming the session again. The username of the latest explicit
//! login is kept as a preference for later connects that omit one.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{ChainExecutor, ProgressEvent};
use crate::command::{ActionKind, Command, CommandAction};
use crate::conversation::{
    ConversationHandle, ConversationId, ConversationMessage, ConversationStore, CURRENT_HOST,
    LAST_SESSION_ID, PREFERRED_USERNAME,
};
use crate::dispatch::{CommandDispatcher, StepResult};
use crate::intent::IntentParser;

/// Assistant tuning
#[derive(Clone, Debug)]
pub struct AssistantConfig {
    /// Inputs longer than this many characters are truncated
    pub max_input_chars: usize,
    /// Pause between chain steps
    pub chain_step_delay: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 4000,
            chain_step_delay: Duration::from_millis(500),
        }
    }
}

/// Reply to one chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    /// Conversation the message belongs to
    pub conversation_id: ConversationId,
    /// What the input was understood as
    pub command: Command,
    /// Text to show the user
    pub message: String,
    /// Whether the request was carried out (or needed nothing)
    ///
    /// False when the reply only asks for more details.
    pub success: bool,
    /// Whether the user should supply more details
    pub needs_more_info: bool,
    /// Questions for the user
    pub follow_up_questions: Vec<String>,
    /// Per-step outcomes of executed commands
    pub steps: Vec<StepResult>,
}

/// Chat surface facade
#[derive(Clone, Debug)]
pub struct Assistant {
    parser: IntentParser,
    dispatcher: CommandDispatcher,
    chain: ChainExecutor,
    conversations: Arc<ConversationStore>,
    config: AssistantConfig,
}

impl Assistant {
    /// Create an assistant
    pub fn new(
        parser: IntentParser,
        dispatcher: CommandDispatcher,
        conversations: Arc<ConversationStore>,
        config: AssistantConfig,
    ) -> Self {
        let chain = ChainExecutor::new(dispatcher.clone(), config.chain_step_delay);
        Self {
            parser,
            dispatcher,
            chain,
            conversations,
            config,
        }
    }

    /// Conversation store
    #[must_use]
    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Parser mode label
    #[must_use]
    pub fn mode(&self) -> String {
        self.parser.mode()
    }

    /// Handle one chat message
    pub async fn handle(&self, text: &str, conversation_id: Option<ConversationId>) -> AssistantReply {
        self.handle_with(text, conversation_id, &CancellationToken::new(), None)
            .await
    }

    /// Handle one chat message with chain cancellation and progress
    pub async fn handle_with(
        &self,
        text: &str,
        conversation_id: Option<ConversationId>,
        cancel: &CancellationToken,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> AssistantReply {
        let conversation = self.conversations.get_or_create(conversation_id);
        let text = self.truncate(text);
        let command = self.parser.parse(&text, &conversation).await;
        let command = self.fill_from_context(&conversation, command);

        let reply = if command.needs_more_info && !command.validate() {
            self.ask_for_details(&conversation, command)
        } else {
            match command.kind() {
                ActionKind::ChainedCommands => {
                    self.run_chain(&conversation, command, cancel, progress).await
                }
                ActionKind::GeneralHelp => {
                    let message = command
                        .explanation
                        .clone()
                        .unwrap_or_else(|| crate::intent::reply_for(&text));
                    self.reply(&conversation, command, message, true, Vec::new())
                }
                _ => {
                    let result = self.dispatcher.execute(&command).await;
                    conversation.append(ConversationMessage::system(format!(
                        "{} {}",
                        if result.success { "✅" } else { "❌" },
                        result.message
                    )));
                    let message = result.message.clone();
                    let success = result.success;
                    self.reply(&conversation, command, message, success, vec![result])
                }
            }
        };
        self.remember(&conversation, &reply.steps);

        info!(
            conversation_id = %reply.conversation_id,
            action = ?reply.command.kind(),
            success = reply.success,
            needs_more_info = reply.needs_more_info,
            "Assistant replied"
        );
        reply
    }

    /// Handle a message in the background, streaming progress
    ///
    /// The channel yields intermediate events and closes after a final event
    /// at 100 percent carrying the reply message.
    #[must_use]
    pub fn respond_streaming(
        &self,
        text: &str,
        conversation_id: Option<ConversationId>,
    ) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(32);
        let assistant = self.clone();
        let text = text.to_string();

        tokio::spawn(async move {
            if tx
                .send(ProgressEvent::new(5, "Understanding your request..."))
                .await
                .is_err()
            {
                return;
            }

            let (step_tx, mut step_rx) = mpsc::channel::<ProgressEvent>(32);
            let forward_tx = tx.clone();
            let forward = tokio::spawn(async move {
                while let Some(event) = step_rx.recv().await {
                    let scaled = 10 + u16::from(event.percent) * 80 / 100;
                    let percent = u8::try_from(scaled).unwrap_or(90);
                    if forward_tx
                        .send(ProgressEvent::new(percent, event.message))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });

            let reply = assistant
                .handle_with(&text, conversation_id, &CancellationToken::new(), Some(step_tx))
                .await;
            if let Err(e) = forward.await {
                warn!(error = %e, "Progress forwarder failed");
            }
            let _ = tx.send(ProgressEvent::new(100, reply.message)).await;
        });

        rx
    }

    fn truncate(&self, text: &str) -> String {
        let max = self.config.max_input_chars;
        match text.char_indices().nth(max) {
            Some((cut, _)) => {
                debug!(max_chars = max, "Truncating long input");
                text[..cut].to_string()
            }
            None => text.to_string(),
        }
    }

    fn ask_for_details(&self, conversation: &ConversationHandle, command: Command) -> AssistantReply {
        let mut message = command
            .explanation
            .clone()
            .unwrap_or_else(|| "I need a few more details.".to_string());
        for question in &command.follow_up_questions {
            message.push('\n');
            message.push_str(question);
        }
        if !command.follow_up_questions.is_empty() {
            conversation.append(ConversationMessage::assistant(
                command.follow_up_questions.join("\n"),
            ));
        }
        self.reply(conversation, command, message, false, Vec::new())
    }

    /// Supply a missing session reference or username from the conversation
    fn fill_from_context(&self, conversation: &ConversationHandle, mut command: Command) -> Command {
        if let CommandAction::Chained(steps) = &mut command.action {
            *steps = std::mem::take(steps)
                .into_iter()
                .map(|step| self.fill_from_context(conversation, step))
                .collect();
            return command;
        }

        let filled = match &mut command.action {
            CommandAction::Disconnect { session } | CommandAction::Screenshot { session, .. }
                if session.is_none() =>
            {
                *session = conversation
                    .session_value(LAST_SESSION_ID)
                    .filter(|id| self.dispatcher.orchestrator().resolve(id).is_some());
                session.is_some()
            }
            CommandAction::Connect { username, .. } if username.is_none() => {
                *username = conversation.preference(PREFERRED_USERNAME);
                username.is_some()
            }
            _ => false,
        };

        if filled {
            debug!(
                conversation_id = %conversation.id(),
                action = ?command.kind(),
                "Filled command from conversation context"
            );
            if command.validate() {
                command.needs_more_info = false;
                command.follow_up_questions.clear();
            }
        }
        command
    }

    /// Record which session the conversation is now about
    fn remember(&self, conversation: &ConversationHandle, steps: &[StepResult]) {
        for step in steps.iter().filter(|s| s.success) {
            match (step.command.kind(), step.session_id) {
                (ActionKind::Connect | ActionKind::LoadProfile, Some(id)) => {
                    conversation.set_session_value(LAST_SESSION_ID, id.to_string());
                    if let Some(record) = self.dispatcher.orchestrator().get_session(id) {
                        conversation.set_session_value(CURRENT_HOST, record.host);
                    }
                    if let CommandAction::Connect {
                        username: Some(username),
                        ..
                    } = &step.command.action
                    {
                        conversation.set_preference(PREFERRED_USERNAME, username.clone());
                    }
                }
                (ActionKind::Disconnect, Some(id)) => {
                    let current = conversation.session_value(LAST_SESSION_ID);
                    if current.as_deref() == Some(id.to_string().as_str()) {
                        conversation.remove_session_value(LAST_SESSION_ID);
                        conversation.remove_session_value(CURRENT_HOST);
                    }
                }
                (ActionKind::DisconnectAll, _) => {
                    conversation.remove_session_value(LAST_SESSION_ID);
                    conversation.remove_session_value(CURRENT_HOST);
                }
                _ => {}
            }
        }
    }

    async fn run_chain(
        &self,
        conversation: &ConversationHandle,
        command: Command,
        cancel: &CancellationToken,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> AssistantReply {
        let report = self
            .chain
            .execute_with(command.sub_commands(), conversation, cancel, progress)
            .await;

        let total = command.sub_commands().len();
        let mut message = if report.cancelled {
            format!(
                "Chain cancelled: {} of {total} steps completed",
                report.steps.len()
            )
        } else {
            format!("Completed {} of {total} steps", report.succeeded())
        };
        for (i, step) in report.steps.iter().enumerate() {
            message.push_str(&format!(
                "\n{}. {} {}",
                i + 1,
                if step.success { "✅" } else { "❌" },
                step.message
            ));
        }

        let success = report.all_succeeded();
        self.reply(conversation, command, message, success, report.steps)
    }

    fn reply(
        &self,
        conversation: &ConversationHandle,
        command: Command,
        message: String,
        success: bool,
        steps: Vec<StepResult>,
    ) -> AssistantReply {
        conversation.record_activity();
        AssistantReply {
            conversation_id: conversation.id(),
            needs_more_info: command.needs_more_info,
            follow_up_questions: command.follow_up_questions.clone(),
            command,
            message,
            success,
            steps,
        }
    }
}
