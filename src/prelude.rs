//! Convenience re-exports for common use.

pub use crate::chat::StreamingChat;
pub use crate::config::{
    get_streaming_config, ClientConfig, EndpointMode, StreamingConfig, StreamingMode,
};
pub use crate::conversation::{Conversation, ConversationMessage, HistoryEntry, Role};
pub use crate::error::{Result, StreamError};
pub use crate::sse::{
    EventKind, SseEvent, SseStreamDriver, StreamHandler, StreamRequestConfig, StreamResult,
};
pub use crate::storage::{FileStore, KeyValueStore, MemoryStore};
