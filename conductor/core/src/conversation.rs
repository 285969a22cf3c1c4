//! Conversation Store
//!
//! Multi-turn dialogue state for the chat surface. Each conversation owns its
//! message history plus two key/value maps: one for session context (the host
//! the user last talked about, the session a follow-up refers to) and one for
//! user preferences.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ConversationStore                        │
//! │   DashMap<ConversationId, Arc<Mutex<ConversationContext>>>  │
//! │                                                             │
//! │   ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │   │ conv 3f2a... │  │ conv 91bc... │  │ conv 07de... │      │
//! │   │  messages    │  │  messages    │  │  messages    │      │
//! │   │  session ctx │  │  session ctx │  │  session ctx │      │
//! │   │  preferences │  │  preferences │  │  preferences │      │
//! │   └──────────────┘  └──────────────┘  └──────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Thread Safety
//!
//! The outer map is sharded, so callers working on different conversations
//! never contend. Each context sits behind its own mutex; a
//! [`ConversationHandle`] locks it only for the duration of a single method
//! call, so no caller holds a lock across an await point.
//!
//! Contexts are created on first reference and never destroyed implicitly.
//! [`ConversationStore::prune_idle`] is the only garbage collection and runs
//! only when the owner calls it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session-context key for the host of the latest connection
pub const CURRENT_HOST: &str = "currentHost";
/// Session-context key for the id of the latest session
pub const LAST_SESSION_ID: &str = "lastSessionId";
/// Preference key for the username of the latest explicit login
pub const PREFERRED_USERNAME: &str = "preferredUsername";

// ============================================================================
// Core Types
// ============================================================================

/// Unique identifier for a conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Create a new unique conversation ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human on the chat surface
    User,
    /// The assistant
    Assistant,
    /// Progress and bookkeeping notes
    System,
}

/// A message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Who sent this message
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// When the message was recorded
    pub timestamp: DateTime<Utc>,
    /// Optional structured annotations
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ConversationMessage {
    /// Create a new message stamped with the current time
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// State of one conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Conversation identifier
    pub id: ConversationId,
    /// Ordered message history
    pub messages: Vec<ConversationMessage>,
    /// Session-scoped values (e.g. `currentHost`, `lastSessionId`)
    pub session_context: HashMap<String, String>,
    /// User preferences (e.g. `preferredScreenshotMode`)
    pub user_preferences: HashMap<String, String>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Last time the conversation was touched
    pub last_activity: DateTime<Utc>,
}

impl ConversationContext {
    /// Create an empty context
    #[must_use]
    pub fn new(id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            session_context: HashMap::new(),
            user_preferences: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    /// Mark activity (updates `last_activity`)
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Idle time as of `now`
    #[must_use]
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity).to_std().unwrap_or(Duration::ZERO)
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Shared handle to one conversation
///
/// Cloning the handle is cheap; all clones refer to the same context.
#[derive(Clone, Debug)]
pub struct ConversationHandle {
    id: ConversationId,
    inner: Arc<Mutex<ConversationContext>>,
}

impl ConversationHandle {
    fn new(context: ConversationContext) -> Self {
        Self {
            id: context.id,
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// Conversation identifier
    #[must_use]
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Append a message and bump the activity timestamp
    pub fn append(&self, message: ConversationMessage) {
        let mut ctx = self.inner.lock();
        ctx.messages.push(message);
        ctx.touch();
    }

    /// Bump the activity timestamp without adding a message
    pub fn record_activity(&self) {
        self.inner.lock().touch();
    }

    /// Copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> ConversationContext {
        self.inner.lock().clone()
    }

    /// Copy of the message history
    #[must_use]
    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.inner.lock().messages.clone()
    }

    /// Number of messages recorded
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Last activity timestamp
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.inner.lock().last_activity
    }

    /// Set a session-scoped value
    pub fn set_session_value(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .lock()
            .session_context
            .insert(key.into(), value.into());
    }

    /// Read a session-scoped value
    #[must_use]
    pub fn session_value(&self, key: &str) -> Option<String> {
        self.inner.lock().session_context.get(key).cloned()
    }

    /// Drop a session-scoped value, returning it
    pub fn remove_session_value(&self, key: &str) -> Option<String> {
        self.inner.lock().session_context.remove(key)
    }

    /// Set a user preference
    pub fn set_preference(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .lock()
            .user_preferences
            .insert(key.into(), value.into());
    }

    /// Read a user preference
    #[must_use]
    pub fn preference(&self, key: &str) -> Option<String> {
        self.inner.lock().user_preferences.get(key).cloned()
    }

    /// Render the last `limit` messages as prompt context
    #[must_use]
    pub fn transcript(&self, limit: usize) -> String {
        let ctx = self.inner.lock();
        let start = ctx.messages.len().saturating_sub(limit);
        ctx.messages[start..]
            .iter()
            .map(|m| {
                let who = match m.role {
                    MessageRole::User => "User",
                    MessageRole::Assistant => "Assistant",
                    MessageRole::System => "System",
                };
                format!("{who}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Store
// ============================================================================

/// Keyed store of conversations
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: DashMap<ConversationId, ConversationHandle>,
}

impl ConversationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the conversation for `id`, creating it if needed
    ///
    /// With no id a fresh, unique one is generated.
    pub fn get_or_create(&self, id: Option<ConversationId>) -> ConversationHandle {
        let id = id.unwrap_or_default();
        self.conversations
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(conversation_id = %id, "Created conversation");
                ConversationHandle::new(ConversationContext::new(id))
            })
            .clone()
    }

    /// Fetch an existing conversation
    #[must_use]
    pub fn get(&self, id: ConversationId) -> Option<ConversationHandle> {
        self.conversations.get(&id).map(|entry| entry.clone())
    }

    /// Append a message to an existing conversation
    ///
    /// Returns false if the conversation does not exist.
    pub fn append(&self, id: ConversationId, message: ConversationMessage) -> bool {
        match self.get(id) {
            Some(handle) => {
                handle.append(message);
                true
            }
            None => false,
        }
    }

    /// Bump the activity timestamp of an existing conversation
    pub fn record_activity(&self, id: ConversationId) -> bool {
        match self.get(id) {
            Some(handle) => {
                handle.record_activity();
                true
            }
            None => false,
        }
    }

    /// Remove a conversation
    pub fn remove(&self, id: ConversationId) -> bool {
        self.conversations.remove(&id).is_some()
    }

    /// IDs of all conversations
    #[must_use]
    pub fn list(&self) -> Vec<ConversationId> {
        self.conversations.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of conversations
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Drop conversations idle for longer than `max_idle`
    ///
    /// Returns the number removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let before = self.conversations.len();
        self.conversations
            .retain(|_, handle| handle.inner.lock().idle_for(now) <= max_idle);
        let removed = before.saturating_sub(self.conversations.len());
        if removed > 0 {
            tracing::info!(removed, "Pruned idle conversations");
        }
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_generates_distinct_ids() {
        let store = ConversationStore::new();
        let a = store.get_or_create(None);
        let b = store.get_or_create(None);

        assert_ne!(a.id(), b.id());
        assert_eq!(a.message_count(), 0);
        assert_eq!(b.message_count(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_or_create_with_id_returns_same_context() {
        let store = ConversationStore::new();
        let id = ConversationId::new();

        let first = store.get_or_create(Some(id));
        first.append(ConversationMessage::user("hello"));

        let second = store.get_or_create(Some(id));
        assert_eq!(second.id(), id);
        assert_eq!(second.message_count(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_bumps_activity() {
        let store = ConversationStore::new();
        let handle = store.get_or_create(None);
        let before = handle.last_activity();

        std::thread::sleep(Duration::from_millis(5));
        assert!(store.append(handle.id(), ConversationMessage::assistant("hi")));

        assert!(handle.last_activity() > before);
        assert_eq!(handle.messages()[0].role, MessageRole::Assistant);
    }

    #[test]
    fn test_append_to_unknown_conversation() {
        let store = ConversationStore::new();
        assert!(!store.append(ConversationId::new(), ConversationMessage::user("x")));
        assert!(!store.record_activity(ConversationId::new()));
    }

    #[test]
    fn test_context_maps_and_metadata() {
        let store = ConversationStore::new();
        let handle = store.get_or_create(None);

        handle.set_session_value("currentHost", "test-server");
        handle.set_preference("preferredMode", "fullscreen");
        handle.append(
            ConversationMessage::user("test message")
                .with_metadata("testKey", serde_json::json!("testValue")),
        );

        assert_eq!(handle.session_value("currentHost").as_deref(), Some("test-server"));
        assert_eq!(handle.preference("preferredMode").as_deref(), Some("fullscreen"));
        assert_eq!(handle.remove_session_value("currentHost").as_deref(), Some("test-server"));
        assert_eq!(handle.session_value("currentHost"), None);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(
            snapshot.messages[0].metadata.get("testKey"),
            Some(&serde_json::json!("testValue"))
        );
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(ConversationStore::new());
        let handle = store.get_or_create(None);

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        handle.append(ConversationMessage::user(format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(handle.message_count(), 400);
    }

    #[test]
    fn test_prune_idle_only_removes_stale() {
        let store = ConversationStore::new();
        let stale = store.get_or_create(None);
        let fresh = store.get_or_create(None);

        stale.inner.lock().last_activity = Utc::now() - chrono::Duration::hours(2);

        let removed = store.prune_idle(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert!(store.get(stale.id()).is_none());
        assert!(store.get(fresh.id()).is_some());
    }

    #[test]
    fn test_transcript_limits_messages() {
        let store = ConversationStore::new();
        let handle = store.get_or_create(None);
        handle.append(ConversationMessage::user("one"));
        handle.append(ConversationMessage::assistant("two"));
        handle.append(ConversationMessage::user("three"));

        assert_eq!(handle.transcript(2), "Assistant: two\nUser: three");
    }

    #[test]
    fn test_conversation_id_parse_round_trip() {
        let id = ConversationId::new();
        let parsed: ConversationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ConversationId>().is_err());
    }
}
