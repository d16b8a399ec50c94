//! Server-sent-event streaming over HTTP POST.

pub mod driver;
pub mod event;
pub mod framing;
pub mod http;

pub use driver::{
    SseStreamDriver, StreamHandler, StreamRequestConfig, StreamResult, DEFAULT_STREAM_TIMEOUT,
};
pub use event::{parse_line, EventKind, ParsedLine, SseEvent};
pub use framing::LineBuffer;
