//! TRANSLATOR (spec.md §4.5): pure, stateless dialect conversion between
//! the Responses, Chat-Completions and Completions wire dialects, plus the
//! tool-name shortening map SSE translation needs to de-shorten against.
//!
//! No I/O lives here; the dispatcher in `services/gateway` owns fetching
//! bytes off the wire and feeds them through these functions.

pub mod chat_to_responses;
pub mod completions;
pub mod error;
pub mod responses_to_chat;
pub mod sse;
pub mod streaming;
pub mod tool_names;

pub use chat_to_responses::chat_to_responses;
pub use completions::{chat_chunk_to_completions_chunk, chat_to_completions, completions_to_chat};
pub use error::{Error, Result};
pub use responses_to_chat::responses_to_chat;
pub use sse::{LineBuffer, parse_sse_events};
pub use streaming::StreamState;
pub use tool_names::ToolNameMap;
