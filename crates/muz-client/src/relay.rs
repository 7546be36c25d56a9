//! HTTP client for the relay's `POST /api/chat`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use muz_types::ChatMessage;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::ClientError;

/// Relayed response body, read chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

const DEFAULT_RELAY_URL: &str = "http://localhost:3001";

/// Opens one streamed chat completion. The controller depends on this
/// trait rather than on [`RelayClient`] directly.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, model: &str, messages: &[ChatMessage]) -> Result<ByteStream, ClientError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

/// Client for a running muz-server.
#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: String,
    http: Client,
}

impl RelayClient {
    /// `base_url` is the relay origin, e.g. `"http://localhost:3001"`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(concat!("muz-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { base_url, http }
    }

    /// Relay origin from `MUZ_PROXY_URL`, defaulting to `http://localhost:3001`.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = std::env::var("MUZ_PROXY_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_owned());
        Self::new(base_url)
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// POST the conversation and return the SSE body as a byte stream.
    ///
    /// A non-success status becomes [`ClientError::Relay`] carrying the
    /// relay's `error` message, or `"HTTP <status>"` when it has none.
    pub async fn open_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ByteStream, ClientError> {
        let response = self
            .http
            .post(self.chat_url())
            .json(&ChatRequest { model, messages })
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), model, "relay responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Relay {
                status: status.as_u16(),
                message: error_message(status.as_u16(), &body),
            });
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| ClientError::Transport(e.to_string()))
            .boxed())
    }
}

#[async_trait]
impl ChatTransport for RelayClient {
    async fn open(&self, model: &str, messages: &[ChatMessage]) -> Result<ByteStream, ClientError> {
        self.open_stream(model, messages).await
    }
}

/// Extract the human-readable message from an error response body.
fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("error")
            .and_then(|e| e.as_str())
            .filter(|e| !e.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP {status}")),
        Err(_) => "Unknown error".to_owned(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoder::decode_fragments;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn error_message_prefers_error_field() {
        assert_eq!(error_message(400, r#"{"error":"bad model"}"#), "bad model");
        assert_eq!(error_message(500, r#"{"message":"x"}"#), "HTTP 500");
        assert_eq!(error_message(502, "<html>bad gateway</html>"), "Unknown error");
    }

    #[test]
    fn chat_url_tolerates_trailing_slash() {
        let client = RelayClient::new("http://relay.local:3001/").unwrap();
        assert_eq!(client.chat_url(), "http://relay.local:3001/api/chat");
    }

    #[tokio::test]
    async fn client_sends_its_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("user-agent", concat!("muz-client/", env!("CARGO_PKG_VERSION"))))
            .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let stream = RelayClient::new(server.uri())
            .unwrap()
            .open_stream("m", &[ChatMessage::user("hello")])
            .await
            .unwrap();
        let fragments: Vec<_> = decode_fragments(stream).collect().await;
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn streams_relay_body_into_fragments() {
        let server = MockServer::start().await;
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
                   data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n\
                   data: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(serde_json::json!({
                "model": "m",
                "messages": [{ "role": "user", "content": "hello" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RelayClient::new(server.uri()).unwrap();
        let stream = client
            .open_stream("m", &[ChatMessage::user("hello")])
            .await
            .unwrap();
        let fragments: Vec<String> = decode_fragments(stream)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hi".to_owned(), " there".to_owned()]);
    }

    #[tokio::test]
    async fn relay_error_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": "upstream gateway error: 429",
                "details": "rate limited"
            })))
            .mount(&server)
            .await;

        let err = RelayClient::new(server.uri())
            .unwrap()
            .open_stream("m", &[ChatMessage::user("hello")])
            .await
            .err()
            .expect("relay rejected the request");
        match err {
            ClientError::Relay { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "upstream gateway error: 429");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
