//! Conversation controller: runs one chat turn end to end.
//!
//! A turn appends the user message and an empty assistant placeholder, opens
//! the relay stream, and grows the placeholder fragment by fragment until the
//! stream ends, fails, or the caller cancels. Every sent turn leaves the
//! placeholder in a terminal [`MessageState`].

use futures::StreamExt;
use muz_types::{ChatMessage, MessageContent, ModelInfo, Role, MODELS};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::attachment::{Attachment, compose_content};
use crate::conversation::{Conversation, MessageState};
use crate::decoder::decode_fragments;
use crate::error::ClientError;
use crate::preview::CodePreview;
use crate::relay::ChatTransport;

/// Default cap on messages per conversation.
pub const MAX_MESSAGES: usize = 50;

const CANCELLED_NOTE: &str = "Response cancelled.";

/// Text typed by the user plus any attached files.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl SendRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// The stream broke off after partial content; carries the cause.
    Truncated(String),
    Cancelled,
    /// Nothing usable arrived; carries the notice shown in the placeholder.
    Failed(String),
    /// Refused before anything was sent; the conversation is unchanged.
    Rejected(String),
}

/// The conversation handed back from [`ChatController::send`].
#[derive(Debug)]
pub struct Turn {
    pub conversation: Conversation,
    pub outcome: TurnOutcome,
}

pub struct ChatController<T> {
    transport: T,
    max_messages: usize,
}

impl<T: ChatTransport> ChatController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            max_messages: MAX_MESSAGES,
        }
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Run one turn against `conversation`.
    ///
    /// `observer` sees the conversation after every change: the optimistic
    /// user message with its placeholder, each appended fragment, and the
    /// terminal state. Cancelling `cancel` drops the relay stream, which
    /// closes the connection and with it the upstream request.
    pub async fn send<F>(
        &self,
        mut conversation: Conversation,
        request: SendRequest,
        cancel: &CancellationToken,
        mut observer: F,
    ) -> Turn
    where
        F: FnMut(&Conversation),
    {
        if let Err(notice) = self.admit(&conversation, &request) {
            info!(notice = %notice, "send rejected");
            return Turn {
                conversation,
                outcome: TurnOutcome::Rejected(notice),
            };
        }

        let model = conversation.model().to_owned();
        let content = compose_content(request.text.trim(), &request.attachments);
        conversation.push(Role::User, content, MessageState::Complete);
        if let Some(user) = conversation.last_mut() {
            user.attachment = request.attachments.first().map(Attachment::info);
        }

        let history = conversation.wire_history();
        conversation.push(Role::Assistant, MessageContent::default(), MessageState::Streaming);
        if let Some(placeholder) = conversation.last_mut() {
            placeholder.model = Some(model.clone());
        }
        observer(&conversation);

        let span = info_span!("chat_turn", model = %model, history = history.len());
        let outcome = self
            .stream_reply(&mut conversation, &model, &history, cancel, &mut observer)
            .instrument(span)
            .await;

        settle(&mut conversation, &outcome);
        observer(&conversation);

        Turn {
            conversation,
            outcome,
        }
    }

    /// Fill the placeholder (the last message) until the stream ends.
    async fn stream_reply<F>(
        &self,
        conversation: &mut Conversation,
        model: &str,
        history: &[ChatMessage],
        cancel: &CancellationToken,
        observer: &mut F,
    ) -> TurnOutcome
    where
        F: FnMut(&Conversation),
    {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.transport.open(model, history) => Some(opened),
        };

        let bytes = match opened {
            None => {
                info!("turn cancelled before the relay answered");
                return TurnOutcome::Cancelled;
            }
            Some(Err(e)) => {
                warn!(error = %e, "relay request failed");
                return TurnOutcome::Failed(notice(&e));
            }
            Some(Ok(bytes)) => bytes,
        };

        let mut fragments = decode_fragments(bytes);
        let mut received = 0usize;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(fragments = received, "turn cancelled; dropping relay stream");
                    break TurnOutcome::Cancelled;
                }

                next = fragments.next() => match next {
                    Some(Ok(fragment)) => {
                        received += 1;
                        if let Some(placeholder) = conversation.last_mut() {
                            placeholder.content.push_str(&fragment);
                        }
                        observer(&*conversation);
                    }
                    Some(Err(e)) => {
                        let has_content = conversation
                            .messages()
                            .last()
                            .is_some_and(|m| !m.content.is_empty());
                        warn!(error = %e, fragments = received, "relay stream interrupted");
                        break if has_content {
                            TurnOutcome::Truncated(notice(&e))
                        } else {
                            TurnOutcome::Failed(notice(&e))
                        };
                    }
                    None => {
                        debug!(fragments = received, "relay stream finished");
                        break TurnOutcome::Completed;
                    }
                },
            }
        };

        drop(fragments);
        outcome
    }

    /// Checks that must pass before anything is appended or sent.
    fn admit(&self, conversation: &Conversation, request: &SendRequest) -> Result<(), String> {
        if request.text.trim().is_empty() && request.attachments.is_empty() {
            return Err("Type a message or attach a file before sending.".to_owned());
        }

        // The user message and the assistant placeholder both count.
        if conversation.len() + 2 > self.max_messages {
            return Err(format!(
                "This conversation has reached the limit of {} messages. Start a new chat to continue.",
                self.max_messages
            ));
        }

        for attachment in &request.attachments {
            attachment.validate()?;
        }

        let model = conversation.model();
        if request.attachments.iter().any(Attachment::is_image) && !ModelInfo::supports_vision(model) {
            let vision: Vec<&str> = MODELS.iter().filter(|m| m.vision).map(|m| m.id).collect();
            return Err(format!(
                "{model} cannot read images. Switch to a vision model ({}) to send pictures.",
                vision.join(", ")
            ));
        }

        Ok(())
    }
}

/// Apply the terminal state to the placeholder.
fn settle(conversation: &mut Conversation, outcome: &TurnOutcome) {
    let Some(placeholder) = conversation.last_mut() else {
        return;
    };

    match outcome {
        TurnOutcome::Completed => {
            placeholder.state = MessageState::Complete;
            placeholder.code_preview = CodePreview::extract(&placeholder.content.text());
        }
        TurnOutcome::Truncated(_) => placeholder.state = MessageState::Truncated,
        TurnOutcome::Cancelled => {
            if placeholder.content.is_empty() {
                placeholder.notice = Some(CANCELLED_NOTE.to_owned());
            }
            placeholder.state = MessageState::Cancelled;
        }
        TurnOutcome::Failed(message) => {
            placeholder.content = MessageContent::Text(format!("Error: {message}"));
            placeholder.state = MessageState::Failed;
        }
        TurnOutcome::Rejected(_) => {}
    }
}

/// Human-readable text for a failed turn.
fn notice(err: &ClientError) -> String {
    match err {
        ClientError::Relay { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
