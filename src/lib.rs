//! caeli-stream — streaming client core for CaeliCrawler
//!
//! Three pieces, in dependency order:
//!
//! - [`config`]: per-feature streaming profiles (timeout, message cap, retry).
//! - [`sse`]: a single-flight driver that POSTs a JSON body, frames the
//!   streamed `data:` lines into [`sse::SseEvent`]s and dispatches them in
//!   order, with timeout and cancellation.
//! - [`conversation`]: a bounded message log that builds outbound history.
//!
//! [`chat::StreamingChat`] wires them together for one endpoint.
//!
//! # Quick Start
//!
//! ```no_run
//! use caeli_stream::prelude::*;
//! use caeli_stream::chat::NoopHandler;
//!
//! # async fn example() {
//! let config = ClientConfig::from_env();
//! let mut chat = StreamingChat::new(SseStreamDriver::new(), EndpointMode::Assistant, &config);
//! let result = chat.send("Which sources failed last night?", Default::default(), &mut NoopHandler).await;
//! if result.success {
//!     println!("{}", chat.conversation().last_message().map(|m| m.content.as_str()).unwrap_or(""));
//! }
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod prelude;
pub mod sse;
pub mod storage;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
