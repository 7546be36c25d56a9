//! Request / response types for `POST /api/chat`.

use muz_types::ChatMessage;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::ServerError;

/// Request body for `POST /api/chat`.
///
/// Both fields default to empty so a missing field surfaces as a validation
/// error with a readable reason rather than a bare deserialization failure.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ChatRelayRequest {
    /// Gateway model identifier, e.g. `"deepseek/deepseek-chat"`.
    #[serde(default)]
    #[validate(length(min = 1, message = "model must be a non-empty string"))]
    pub model: String,

    /// Conversation so far, oldest first.
    #[serde(default)]
    #[validate(length(min = 1, message = "messages must be a non-empty array"))]
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<ChatMessage>,
}

impl ChatRelayRequest {
    /// Validate and normalise the request; `model` is trimmed.
    pub fn checked(mut self) -> Result<Self, ServerError> {
        self.model = self.model.trim().to_owned();
        self.validate()
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
        Ok(self)
    }
}

/// Error body documented for every non-streaming failure.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
