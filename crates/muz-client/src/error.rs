use thiserror::Error;

/// Errors returned by the relay client and the stream decoder.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP client could not be built, or the request to the relay could
    /// not be sent or its response not read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Relay { status: u16, message: String },

    /// The response body broke off mid-stream.
    #[error("stream interrupted: {0}")]
    Transport(String),

    /// The gateway reported an error inside the stream.
    #[error("{0}")]
    Upstream(String),

    /// The stream ended without `[DONE]` and without any text.
    #[error("the response ended before any content arrived")]
    EmptyStream,
}
