//! Upstream model gateway.
//!
//! [`Gateway`] is the seam between the relay route and the third-party
//! chat-completions API. [`OpenRouterGateway`] is the production
//! implementation; route tests substitute a scripted stub.

use std::fmt::Debug;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use muz_types::ChatMessage;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

/// Upstream response body as it is read off the wire.
pub type UpstreamStream = BoxStream<'static, Result<Bytes, GatewayError>>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request never produced a response (connect failure, timeout, TLS).
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Reading the streamed body failed after the response started.
    #[error("upstream stream failed: {0}")]
    Stream(String),
}

/// Body sent to the gateway's chat-completions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl UpstreamRequest {
    pub fn streaming(model: String, messages: Vec<ChatMessage>) -> Self {
        Self {
            model,
            messages,
            stream: true,
        }
    }
}

/// Outcome of opening one upstream call.
pub enum GatewayReply {
    /// The gateway accepted the request; its body follows chunk by chunk.
    Streaming(UpstreamStream),
    /// The gateway answered with a non-success status.
    Rejected { status: StatusCode, body: String },
}

impl Debug for GatewayReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayReply::Streaming(_) => f.write_str("GatewayReply::Streaming(..)"),
            GatewayReply::Rejected { status, body } => f
                .debug_struct("GatewayReply::Rejected")
                .field("status", status)
                .field("body", body)
                .finish(),
        }
    }
}

/// A chat-completions gateway that can be asked for exactly one streamed reply.
#[async_trait]
pub trait Gateway: Send + Sync + Debug {
    async fn open(&self, request: UpstreamRequest) -> Result<GatewayReply, GatewayError>;
}

// ── OpenRouter ────────────────────────────────────────────────────────────────

/// Production gateway speaking the OpenRouter chat-completions API.
pub struct OpenRouterGateway {
    client: Client,
    url: String,
    api_key: String,
    referer: String,
    app_title: String,
}

impl Debug for OpenRouterGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterGateway")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl OpenRouterGateway {
    /// Build the gateway client. The timeout bounds the whole call, streamed
    /// body included.
    pub fn new(cfg: &Config, api_key: String) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .user_agent(concat!("muz-server/", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.upstream_timeout)
            .build()?;
        Ok(Self {
            client,
            url: cfg.upstream_url.clone(),
            api_key,
            referer: cfg.referer.clone(),
            app_title: cfg.app_title.clone(),
        })
    }
}

#[async_trait]
impl Gateway for OpenRouterGateway {
    async fn open(&self, request: UpstreamRequest) -> Result<GatewayReply, GatewayError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.app_title)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "gateway responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                warn!(error = %e, "failed to read gateway error body");
                String::new()
            });
            return Ok(GatewayReply::Rejected { status, body });
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| GatewayError::Stream(e.to_string()))
            .boxed();
        Ok(GatewayReply::Streaming(stream))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tower::ServiceExt;
    use wiremock::matchers::{body_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::routes;
    use crate::state::AppState;

    const API_KEY: &str = "sk-or-test";

    fn config_for(url: &str) -> Config {
        let url = url.to_owned();
        Config::from_lookup(move |key| match key {
            "MUZ_UPSTREAM_URL" => Some(url.clone()),
            "MUZ_REFERER" => Some("https://muz.test".to_owned()),
            "MUZ_APP_TITLE" => Some("MUZ Test".to_owned()),
            "OPENROUTER_API_KEY" => Some(API_KEY.to_owned()),
            _ => None,
        })
    }

    fn gateway_for(url: &str) -> OpenRouterGateway {
        OpenRouterGateway::new(&config_for(url), API_KEY.to_owned()).unwrap()
    }

    fn hello() -> UpstreamRequest {
        UpstreamRequest::streaming(
            "deepseek/deepseek-chat".to_owned(),
            vec![ChatMessage::user("hello")],
        )
    }

    #[tokio::test]
    async fn open_sends_credential_attribution_and_streaming_body() {
        let server = MockServer::start().await;
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header_eq("authorization", "Bearer sk-or-test"))
            .and(header_eq("HTTP-Referer", "https://muz.test"))
            .and(header_eq("X-Title", "MUZ Test"))
            .and(body_json(json!({
                "model": "deepseek/deepseek-chat",
                "messages": [{ "role": "user", "content": "hello" }],
                "stream": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&format!("{}/api/v1/chat/completions", server.uri()));
        let body = match gateway.open(hello()).await.unwrap() {
            GatewayReply::Streaming(body) => body,
            other => panic!("unexpected reply: {other:?}"),
        };
        let bytes: Vec<Bytes> = body.map(|c| c.unwrap()).collect().await;
        assert_eq!(bytes.concat(), sse.as_bytes());
    }

    #[tokio::test]
    async fn non_success_status_and_body_are_returned_verbatim() {
        let server = MockServer::start().await;
        let error = r#"{"error":{"message":"Rate limit exceeded","code":429}}"#;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(error))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&format!("{}/api/v1/chat/completions", server.uri()));
        match gateway.open(hello()).await.unwrap() {
            GatewayReply::Rejected { status, body } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(body, error);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    /// Address nothing listens on.
    async fn closed_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/api/v1/chat/completions")
    }

    #[tokio::test]
    async fn connect_failure_is_a_transport_error() {
        let gateway = gateway_for(&closed_address().await);
        let err = gateway.open(hello()).await.err().expect("nothing is listening");
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[tokio::test]
    async fn connect_failure_reaches_the_client_as_502() {
        let url = closed_address().await;
        let config = config_for(&url);
        let gateway = OpenRouterGateway::new(&config, API_KEY.to_owned()).unwrap();
        let app = routes::build(Arc::new(AppState {
            config: Arc::new(config),
            gateway: Some(Arc::new(gateway)),
        }));

        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "model": "deepseek/deepseek-chat",
                    "messages": [{ "role": "user", "content": "hello" }]
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    /// Read one HTTP request (head plus `content-length` body) off the socket.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    async fn write_chunk(socket: &mut TcpStream, data: &[u8]) {
        socket
            .write_all(format!("{:x}\r\n", data.len()).as_bytes())
            .await
            .unwrap();
        socket.write_all(data).await.unwrap();
        socket.write_all(b"\r\n").await.unwrap();
        socket.flush().await.unwrap();
    }

    #[tokio::test]
    async fn body_chunks_arrive_before_the_response_finishes() {
        const FIRST: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";
        const LAST: &[u8] = b"data: [DONE]\n\n";

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            write_chunk(&mut socket, FIRST).await;
            // The rest is held back until the first chunk has been read.
            let _ = release_rx.await;
            write_chunk(&mut socket, LAST).await;
            socket.write_all(b"0\r\n\r\n").await.unwrap();
        });

        let gateway = gateway_for(&format!("http://{addr}/api/v1/chat/completions"));
        let mut body = match gateway.open(hello()).await.unwrap() {
            GatewayReply::Streaming(body) => body,
            other => panic!("unexpected reply: {other:?}"),
        };

        let first = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("first chunk readable while the response is still open")
            .unwrap()
            .unwrap();
        assert_eq!(&first[..], FIRST);

        release_tx.send(()).unwrap();
        let rest: Vec<Bytes> = body.map(|c| c.unwrap()).collect().await;
        assert_eq!(rest.concat(), LAST);
    }
}
