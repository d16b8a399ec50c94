//! Per-feature streaming profiles.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::StreamError;

/// Named streaming profile.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    EnumIter, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StreamingMode {
    #[default]
    Default,
    #[strum(to_string = "plan_mode", serialize = "plan-mode", serialize = "plan")]
    PlanMode,
    Assistant,
    #[strum(to_string = "smart_query", serialize = "smart-query")]
    SmartQuery,
}

impl StreamingMode {
    /// Parse a mode name, falling back to [`StreamingMode::Default`] for unknown names.
    pub fn from_name_lenient(name: &str) -> Self {
        Self::from_str(name.trim()).unwrap_or_default()
    }
}

/// Retry policy advertised to callers of a streaming mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

/// Streaming parameters for one [`StreamingMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Milliseconds before the stream is aborted. `0` means unbounded.
    pub timeout_ms: u64,
    pub max_messages: usize,
    pub auto_scroll: bool,
    pub retry: RetryConfig,
}

static DEFAULT_CONFIG: StreamingConfig = StreamingConfig {
    timeout_ms: 120_000,
    max_messages: 50,
    auto_scroll: true,
    retry: RetryConfig {
        enabled: true,
        max_attempts: 2,
        base_delay_ms: 1_000,
    },
};

// Plan mode runs multi-step reasoning on the backend and needs the longest window.
static PLAN_MODE_CONFIG: StreamingConfig = StreamingConfig {
    timeout_ms: 300_000,
    max_messages: 30,
    auto_scroll: true,
    retry: RetryConfig {
        enabled: false,
        max_attempts: 1,
        base_delay_ms: 0,
    },
};

static ASSISTANT_CONFIG: StreamingConfig = StreamingConfig {
    timeout_ms: 130_000,
    max_messages: 50,
    auto_scroll: true,
    retry: RetryConfig {
        enabled: true,
        max_attempts: 3,
        base_delay_ms: 1_000,
    },
};

static SMART_QUERY_CONFIG: StreamingConfig = StreamingConfig {
    timeout_ms: 90_000,
    max_messages: 20,
    auto_scroll: false,
    retry: RetryConfig {
        enabled: true,
        max_attempts: 2,
        base_delay_ms: 2_000,
    },
};

/// Look up the profile for `mode`. `None` yields the default profile.
pub fn get_streaming_config(mode: impl Into<Option<StreamingMode>>) -> &'static StreamingConfig {
    match mode.into().unwrap_or_default() {
        StreamingMode::Default => &DEFAULT_CONFIG,
        StreamingMode::PlanMode => &PLAN_MODE_CONFIG,
        StreamingMode::Assistant => &ASSISTANT_CONFIG,
        StreamingMode::SmartQuery => &SMART_QUERY_CONFIG,
    }
}

/// Look up a profile by name. Unknown names degrade to the default profile.
pub fn streaming_config_for(name: &str) -> &'static StreamingConfig {
    get_streaming_config(StreamingMode::from_name_lenient(name))
}

pub fn get_streaming_timeout(mode: impl Into<Option<StreamingMode>>) -> u64 {
    get_streaming_config(mode).timeout_ms
}

pub fn get_max_messages(mode: impl Into<Option<StreamingMode>>) -> usize {
    get_streaming_config(mode).max_messages
}

/// Streaming modes that have a backend endpoint.
///
/// [`StreamingMode::Default`] has no endpoint and cannot be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EndpointMode {
    PlanMode,
    Assistant,
    SmartQuery,
}

const ANALYSIS_STREAM_PATH: &str = "/api/v1/analysis/smart-query/stream";
const ASSISTANT_STREAM_PATH: &str = "/api/v1/assistant/chat/stream";

/// Fixed URL path for a streaming endpoint.
pub fn get_streaming_endpoint(mode: EndpointMode) -> &'static str {
    match mode {
        EndpointMode::PlanMode | EndpointMode::SmartQuery => ANALYSIS_STREAM_PATH,
        EndpointMode::Assistant => ASSISTANT_STREAM_PATH,
    }
}

impl From<EndpointMode> for StreamingMode {
    fn from(mode: EndpointMode) -> Self {
        match mode {
            EndpointMode::PlanMode => Self::PlanMode,
            EndpointMode::Assistant => Self::Assistant,
            EndpointMode::SmartQuery => Self::SmartQuery,
        }
    }
}

impl TryFrom<StreamingMode> for EndpointMode {
    type Error = StreamError;

    fn try_from(mode: StreamingMode) -> Result<Self, Self::Error> {
        match mode {
            StreamingMode::PlanMode => Ok(Self::PlanMode),
            StreamingMode::Assistant => Ok(Self::Assistant),
            StreamingMode::SmartQuery => Ok(Self::SmartQuery),
            StreamingMode::Default => Err(StreamError::Configuration(
                "the default streaming mode has no endpoint".to_string(),
            )),
        }
    }
}
