//! In-memory conversation owned by the caller and threaded through
//! [`ChatController::send`](crate::ChatController::send).

use chrono::{DateTime, Utc};
use muz_types::{ChatMessage, MessageContent, Role};

use crate::attachment::AttachmentInfo;
use crate::preview::CodePreview;

/// Lifecycle of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MessageState {
    Complete,
    /// Assistant placeholder still receiving fragments.
    Streaming,
    /// The stream broke off after some content arrived.
    Truncated,
    Cancelled,
    /// Content is an error notice, not model output.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: u64,
    pub role: Role,
    pub content: MessageContent,
    /// Model that produced an assistant message.
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub attachment: Option<AttachmentInfo>,
    pub code_preview: Option<CodePreview>,
    /// Status line shown in place of empty content, e.g. for a reply
    /// cancelled before any text arrived. Never sent to the model.
    pub notice: Option<String>,
    pub state: MessageState,
}

impl Message {
    /// Text content, ignoring image parts.
    pub fn text(&self) -> String {
        self.content.text()
    }

    /// What a UI should render: the content, or the notice when there is none.
    pub fn display_text(&self) -> String {
        match &self.notice {
            Some(notice) if self.content.is_empty() => notice.clone(),
            _ => self.text(),
        }
    }

    /// Whether this entry belongs in the history sent to the model.
    fn is_history(&self) -> bool {
        match self.state {
            MessageState::Failed => false,
            _ => !(self.role == Role::Assistant && self.content.is_empty()),
        }
    }

    fn to_wire(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Ordered message list plus the model new turns are sent to.
#[derive(Debug, Clone)]
pub struct Conversation {
    model: String,
    messages: Vec<Message>,
    next_id: u64,
}

impl Conversation {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            next_id: 1,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switch models; takes effect from the next turn.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Start a new chat. Ids keep increasing.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Seed a system prompt.
    pub fn push_system(&mut self, text: impl Into<String>) -> u64 {
        self.push(Role::System, MessageContent::Text(text.into()), MessageState::Complete)
    }

    pub(crate) fn push(&mut self, role: Role, content: MessageContent, state: MessageState) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message {
            id,
            role,
            content,
            model: None,
            timestamp: Utc::now(),
            attachment: None,
            code_preview: None,
            notice: None,
            state,
        });
        id
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut()
    }

    /// History as sent to the relay. Failed messages (their content is an
    /// error notice rather than model output) and assistant messages without
    /// any text are left out.
    pub fn wire_history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.is_history())
            .map(Message::to_wire)
            .collect()
    }
}
