//! Shared types for the MUZ chat relay.
//!
//! Both the relay server and the client library speak the same JSON shapes:
//! the OpenAI-style chat message list sent to `POST /api/chat`, the SSE
//! records streamed back, and the `{error, details}` body used for every
//! non-streaming failure.

pub mod catalog;
pub mod message;
pub mod stream;

pub use catalog::{ModelInfo, DEFAULT_MODEL, MODELS};
pub use message::{ChatMessage, ContentPart, ImageUrl, MessageContent, Role};
pub use stream::{
    ErrorBody, ErrorCode, StreamChoice, StreamChunk, StreamDelta, StreamError, DATA_PREFIX,
    DONE_SENTINEL,
};
