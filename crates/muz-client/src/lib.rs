//! Client side of the MUZ chat relay.
//!
//! - [`relay`]: HTTP client for `POST /api/chat` and the [`ChatTransport`] seam.
//! - [`decoder`]: turns the relayed SSE byte stream into text fragments.
//! - [`controller`]: drives one chat turn against an owned [`Conversation`].
//! - [`preview`]: pulls HTML/CSS/JS code blocks out of assistant replies.
//!
//! # Quick-start
//!
//! ```rust,no_run
//! use muz_client::{ChatController, Conversation, RelayClient, SendRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), muz_client::ClientError> {
//! let controller = ChatController::new(RelayClient::new("http://localhost:3001")?);
//! let conversation = Conversation::new("deepseek/deepseek-chat");
//! let cancel = CancellationToken::new();
//!
//! let turn = controller
//!     .send(conversation, SendRequest::text("Hello!"), &cancel, |c| {
//!         if let Some(last) = c.messages().last() {
//!             print!("\r{}", last.display_text());
//!         }
//!     })
//!     .await;
//! println!("\n{:?}", turn.outcome);
//! # Ok(())
//! # }
//! ```

pub mod attachment;
pub mod controller;
pub mod conversation;
pub mod decoder;
pub mod error;
pub mod preview;
pub mod relay;

pub use attachment::{Attachment, AttachmentInfo};
pub use controller::{ChatController, SendRequest, Turn, TurnOutcome, MAX_MESSAGES};
pub use conversation::{Conversation, Message, MessageState};
pub use decoder::{decode_fragments, SseEvent, SseLineDecoder};
pub use error::ClientError;
pub use preview::CodePreview;
pub use relay::{ByteStream, ChatTransport, RelayClient};
