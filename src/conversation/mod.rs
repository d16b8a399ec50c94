//! Bounded, ordered conversation log with optional persistence.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{get_streaming_config, StreamingMode};
use crate::error::Result;
use crate::storage::KeyValueStore;

/// Number of leading messages kept by trimming when not configured otherwise.
pub const DEFAULT_PROTECTED_PREFIX: usize = 2;

/// Default number of messages in an outbound history payload.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A message in the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ConversationMessage {
    /// Message stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_streaming: None,
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.is_streaming = Some(true);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }
}

/// Fields to merge into an existing message. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct MessageUpdate {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_streaming: Option<bool>,
    /// Merged key by key into existing metadata.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl MessageUpdate {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn streaming(is_streaming: bool) -> Self {
        Self {
            is_streaming: Some(is_streaming),
            ..Default::default()
        }
    }
}

/// `{role, content}` pair sent as conversation context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Ordered message log bounded by `max_messages`.
///
/// After every mutation the log holds at most `max_messages` entries.
/// Trimming keeps the first `protected_prefix` messages and the most recent
/// remainder, dropping the middle.
pub struct Conversation {
    messages: Vec<ConversationMessage>,
    max_messages: usize,
    protected_prefix: usize,
    is_loading: bool,
    is_streaming: bool,
    error: Option<String>,
    storage: Option<(Arc<dyn KeyValueStore>, String)>,
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("messages", &self.messages.len())
            .field("max_messages", &self.max_messages)
            .field("protected_prefix", &self.protected_prefix)
            .field("is_loading", &self.is_loading)
            .field("is_streaming", &self.is_streaming)
            .field("error", &self.error)
            .field("storage_key", &self.storage.as_ref().map(|(_, k)| k))
            .finish()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::for_mode(StreamingMode::Default)
    }
}

impl Conversation {
    /// Empty log holding at most `max_messages` (at least one).
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: max_messages.max(1),
            protected_prefix: DEFAULT_PROTECTED_PREFIX,
            is_loading: false,
            is_streaming: false,
            error: None,
            storage: None,
        }
    }

    /// Log sized by a streaming profile.
    pub fn for_mode(mode: StreamingMode) -> Self {
        Self::new(get_streaming_config(mode).max_messages)
    }

    /// Number of leading messages kept by trimming. At most `max_messages - 1`
    /// are kept so the newest message always survives.
    pub fn with_protected_prefix(mut self, prefix: usize) -> Self {
        self.protected_prefix = prefix;
        self
    }

    /// Bind persistence to `key` in `store`.
    pub fn with_storage(mut self, store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        self.storage = Some((store, key.into()));
        self
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&ConversationMessage> {
        self.messages.get(index)
    }

    pub fn last_message(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Append a message, trimming if needed. Returns the new message's index.
    ///
    /// Trimming always keeps the newest message, so the index stays valid
    /// until the next mutation.
    pub fn add_message(&mut self, message: ConversationMessage) -> usize {
        self.messages.push(message);
        if self.messages.len() > self.max_messages {
            self.trim_conversation();
        }
        self.messages.len() - 1
    }

    /// Merge `update` into the message at `index`. Out of range is a no-op.
    pub fn update_message(&mut self, index: usize, update: MessageUpdate) {
        let Some(message) = self.messages.get_mut(index) else {
            return;
        };
        if let Some(role) = update.role {
            message.role = role;
        }
        if let Some(content) = update.content {
            message.content = content;
        }
        if let Some(timestamp) = update.timestamp {
            message.timestamp = timestamp;
        }
        if let Some(is_streaming) = update.is_streaming {
            message.is_streaming = Some(is_streaming);
        }
        if let Some(metadata) = update.metadata {
            message
                .metadata
                .get_or_insert_with(serde_json::Map::new)
                .extend(metadata);
        }
    }

    /// Append text to the content of the message at `index`. Out of range is a no-op.
    pub fn append_content(&mut self, index: usize, text: &str) {
        if let Some(message) = self.messages.get_mut(index) {
            message.content.push_str(text);
        }
    }

    pub fn remove_message(&mut self, index: usize) -> Option<ConversationMessage> {
        if index < self.messages.len() {
            Some(self.messages.remove(index))
        } else {
            None
        }
    }

    pub fn remove_last_message(&mut self) -> Option<ConversationMessage> {
        self.messages.pop()
    }

    /// Drop the middle of the log so it fits `max_messages`.
    pub fn trim_conversation(&mut self) {
        let before = self.messages.len();
        if before <= self.max_messages {
            return;
        }
        let prefix = self.protected_prefix.min(self.max_messages - 1);
        let tail = self.max_messages - prefix;
        self.messages.drain(prefix..before - tail);
        debug!(before, after = self.messages.len(), "trimmed conversation");
    }

    /// Empty the log, reset flags and remove any persisted copy.
    pub fn clear_conversation(&mut self) {
        self.messages.clear();
        self.is_loading = false;
        self.is_streaming = false;
        self.error = None;
        if let Some((store, key)) = &self.storage {
            if let Err(e) = store.remove(key) {
                warn!(key = %key, error = %e, "failed to remove persisted conversation");
            }
        }
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.is_streaming = streaming;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    /// The last `limit` messages as `{role, content}` pairs, oldest first.
    pub fn build_history(&self, limit: usize) -> Vec<HistoryEntry> {
        let start = self.messages.len().saturating_sub(limit);
        self.messages[start..]
            .iter()
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Replace the log with the persisted copy.
    ///
    /// Returns `false` when nothing was loaded: no storage bound, no entry,
    /// or an unreadable entry (logged).
    pub fn load_from_storage(&mut self) -> bool {
        let Some((store, key)) = &self.storage else {
            return false;
        };
        let raw = match store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read persisted conversation");
                return false;
            }
        };
        match serde_json::from_str::<Vec<ConversationMessage>>(&raw) {
            Ok(messages) => {
                self.messages = messages;
                self.trim_conversation();
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "ignoring corrupt persisted conversation");
                false
            }
        }
    }

    /// Persist the log. A no-op when no storage is bound.
    pub fn save_to_storage(&self) -> Result<()> {
        let Some((store, key)) = &self.storage else {
            return Ok(());
        };
        let raw = serde_json::to_string(&self.messages)?;
        store.set(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn numbered(conversation: &mut Conversation, count: usize) {
        for i in 0..count {
            conversation.add_message(ConversationMessage::user(format!("m{i}")));
        }
    }

    fn contents(conversation: &Conversation) -> Vec<&str> {
        conversation
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect()
    }

    #[test]
    fn trimming_keeps_prefix_and_recent_tail() {
        let mut conversation = Conversation::new(5);
        numbered(&mut conversation, 7);
        assert_eq!(contents(&conversation), vec!["m0", "m1", "m4", "m5", "m6"]);
    }

    #[test]
    fn length_never_exceeds_max() {
        let mut conversation = Conversation::new(4);
        for n in 0..20 {
            let index = conversation.add_message(ConversationMessage::user(format!("m{n}")));
            assert!(conversation.len() <= 4);
            assert_eq!(conversation.get(index).unwrap().content, format!("m{n}"));
        }
        assert_eq!(&contents(&conversation)[..2], &["m0", "m1"]);
    }

    #[test]
    fn protected_prefix_is_configurable() {
        let mut conversation = Conversation::new(3).with_protected_prefix(0);
        numbered(&mut conversation, 5);
        assert_eq!(contents(&conversation), vec!["m2", "m3", "m4"]);

        let mut conversation = Conversation::new(2).with_protected_prefix(5);
        numbered(&mut conversation, 4);
        assert_eq!(contents(&conversation), vec!["m0", "m3"]);
    }

    #[test]
    fn prefix_filling_the_log_still_keeps_new_message() {
        let mut conversation = Conversation::new(2);
        conversation.add_message(ConversationMessage::system("sys"));
        conversation.add_message(ConversationMessage::user("ctx"));
        let index = conversation.add_message(ConversationMessage::assistant(""));
        conversation.append_content(index, "reply");
        assert_eq!(contents(&conversation), vec!["sys", "reply"]);

        let mut single = Conversation::new(1);
        single.add_message(ConversationMessage::user("old"));
        let index = single.add_message(ConversationMessage::user("new"));
        assert_eq!(index, 0);
        assert_eq!(contents(&single), vec!["new"]);
    }

    #[test]
    fn update_out_of_range_is_noop() {
        let mut conversation = Conversation::new(5);
        numbered(&mut conversation, 1);
        conversation.update_message(3, MessageUpdate::content("ignored"));
        conversation.append_content(3, "ignored");
        assert_eq!(contents(&conversation), vec!["m0"]);
    }

    #[test]
    fn update_merges_fields() {
        let mut conversation = Conversation::new(5);
        let index = conversation.add_message(
            ConversationMessage::assistant("").streaming().with_metadata("a", json!(1)),
        );
        conversation.append_content(index, "Hel");
        conversation.append_content(index, "lo");
        let mut metadata = serde_json::Map::new();
        metadata.insert("b".to_string(), json!(2));
        conversation.update_message(
            index,
            MessageUpdate {
                is_streaming: Some(false),
                metadata: Some(metadata),
                ..Default::default()
            },
        );
        let message = conversation.get(index).unwrap();
        assert_eq!(message.content, "Hello");
        assert_eq!(message.is_streaming, Some(false));
        let metadata = message.metadata.as_ref().unwrap();
        assert_eq!(metadata.get("a"), Some(&json!(1)));
        assert_eq!(metadata.get("b"), Some(&json!(2)));
    }

    #[test]
    fn remove_is_bounds_checked() {
        let mut conversation = Conversation::new(5);
        numbered(&mut conversation, 3);
        assert!(conversation.remove_message(9).is_none());
        assert_eq!(conversation.remove_message(1).unwrap().content, "m1");
        assert_eq!(conversation.remove_last_message().unwrap().content, "m2");
        assert_eq!(contents(&conversation), vec!["m0"]);
        conversation.remove_last_message();
        assert!(conversation.remove_last_message().is_none());
    }

    #[test]
    fn build_history_returns_tail_pairs() {
        let mut conversation = Conversation::new(10);
        numbered(&mut conversation, 5);
        let history = conversation.build_history(2);
        assert_eq!(
            history,
            vec![
                HistoryEntry {
                    role: Role::User,
                    content: "m3".to_string()
                },
                HistoryEntry {
                    role: Role::User,
                    content: "m4".to_string()
                },
            ]
        );
        assert_eq!(conversation.build_history(50).len(), 5);
        assert_eq!(
            serde_json::to_value(&history[0]).unwrap(),
            json!({"role": "user", "content": "m3"})
        );
    }

    #[test]
    fn clear_resets_flags_and_storage() {
        let store = Arc::new(MemoryStore::new());
        let mut conversation = Conversation::new(5).with_storage(store.clone(), "chat");
        numbered(&mut conversation, 2);
        conversation.save_to_storage().unwrap();
        conversation.set_loading(true);
        conversation.set_streaming(true);
        conversation.set_error(Some("boom".to_string()));

        conversation.clear_conversation();

        assert!(conversation.is_empty());
        assert!(!conversation.is_loading());
        assert!(!conversation.is_streaming());
        assert_eq!(conversation.error(), None);
        assert_eq!(store.get("chat").unwrap(), None);
    }

    #[test]
    fn storage_round_trip_restores_timestamps() {
        let store = Arc::new(MemoryStore::new());
        let stamp = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut conversation = Conversation::new(5).with_storage(store.clone(), "chat");
        conversation.add_message(ConversationMessage::system("ctx").with_timestamp(stamp));
        conversation.save_to_storage().unwrap();

        let mut restored = Conversation::new(5).with_storage(store, "chat");
        assert!(restored.load_from_storage());
        assert_eq!(restored.messages(), conversation.messages());
        assert_eq!(restored.get(0).unwrap().timestamp, stamp);
    }

    #[test]
    fn load_failures_return_false() {
        let mut unbound = Conversation::new(5);
        assert!(!unbound.load_from_storage());

        let store = Arc::new(MemoryStore::with_entries([("chat", "not json")]));
        let mut conversation = Conversation::new(5).with_storage(store, "chat");
        assert!(!conversation.load_from_storage());
        assert!(conversation.is_empty());
    }
}
