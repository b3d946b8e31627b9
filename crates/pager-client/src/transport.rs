//! Network boundary of the client.
//!
//! [`SendTransport`] publishes and reads the latest slot; [`StreamSource`]
//! opens the event stream. [`HttpTransport`] implements both against a
//! running server; tests substitute their own.

use crate::error::ClientError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use pager_protocol::{ApiResponse, FrameDecoder, MessageEvent, PublishRequest};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Decoded events from one stream connection.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<MessageEvent, ClientError>> + Send>>;

/// Publish and read.
#[async_trait]
pub trait SendTransport: Send + Sync {
    /// Publish one message.
    ///
    /// Resolves to the server's response on success.
    async fn publish(&self, request: &PublishRequest) -> Result<ApiResponse, ClientError>;

    /// Read the latest stored message.
    async fn fetch_latest(&self) -> Result<ApiResponse, ClientError>;
}

/// Open event streams.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open a new stream connection.
    async fn open_stream(&self) -> Result<EventStream, ClientError>;
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, without trailing slash.
    pub base_url: String,
    /// Path of the event stream endpoint.
    pub stream_path: String,
    /// Timeout for publish and read requests.
    pub request_timeout: Duration,
    /// Delay before reconnecting a dropped stream.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            stream_path: "/api/sse".to_string(),
            request_timeout: Duration::from_secs(10),
            reconnect_delay: crate::reconnect::DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ClientConfig {
    /// Defaults with `PAGER_URL` applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("PAGER_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        config
    }
}

/// HTTP implementation of both transport traits.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Create a transport for the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        // No overall timeout: it would cut long-lived streams.
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

async fn read_api_response(response: reqwest::Response) -> Result<ApiResponse, String> {
    let status = response.status();
    match response.json::<ApiResponse>().await {
        Ok(body) if status.is_success() && body.is_success() => Ok(body),
        Ok(body) => Err(body.message),
        Err(_) => Err(format!("Unexpected response: {status}")),
    }
}

#[async_trait]
impl SendTransport for HttpTransport {
    async fn publish(&self, request: &PublishRequest) -> Result<ApiResponse, ClientError> {
        let response = self
            .client
            .post(self.url("/api/message"))
            .timeout(self.config.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::SendFailed(e.to_string()))?;

        read_api_response(response)
            .await
            .map_err(ClientError::SendFailed)
    }

    async fn fetch_latest(&self) -> Result<ApiResponse, ClientError> {
        let response = self
            .client
            .get(self.url("/api/message"))
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        read_api_response(response)
            .await
            .map_err(ClientError::FetchFailed)
    }
}

#[async_trait]
impl StreamSource for HttpTransport {
    async fn open_stream(&self) -> Result<EventStream, ClientError> {
        let url = self.url(&self.config.stream_path);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        debug!(url = %url, "Event stream opened");
        Ok(decode_event_stream(response.bytes_stream()))
    }
}

/// Tracks sequence numbers on one connection.
#[derive(Debug, Default)]
pub struct SequenceCheck {
    last: Option<u64>,
}

impl SequenceCheck {
    /// Record `seq`, warning if it is not exactly one past the previous.
    ///
    /// Returns `true` if the sequence is intact.
    pub fn observe(&mut self, seq: u64) -> bool {
        let expected = self.last.map_or(1, |last| last + 1);
        self.last = Some(seq);

        if seq == expected {
            return true;
        }
        if seq < expected {
            warn!(seq, expected, "Stream sequence went backwards");
        } else {
            warn!(seq, expected, missed = seq - expected, "Stream sequence gap");
        }
        false
    }

    /// The last sequence number seen.
    #[must_use]
    pub fn last(&self) -> Option<u64> {
        self.last
    }
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: FrameDecoder,
    sequence: SequenceCheck,
    done: bool,
}

/// Turn a raw byte stream into decoded events.
///
/// The stream ends after the first transport or protocol error.
pub fn decode_event_stream<S, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: FrameDecoder::new(),
        sequence: SequenceCheck::default(),
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        loop {
            match st.decoder.next_frame() {
                Ok(Some(frame)) => {
                    st.sequence.observe(frame.seq);
                    return Some((Ok(frame.event), st));
                }
                Ok(None) => {}
                Err(e) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => st.decoder.extend(&chunk),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
                None => return None,
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use pager_protocol::{codec, StreamFrame};

    fn frame(seq: u64, text: &str) -> Bytes {
        codec::encode(&StreamFrame::new(seq, MessageEvent::new(text, None))).unwrap()
    }

    #[tokio::test]
    async fn test_decodes_split_frames_and_skips_comments() {
        let mut raw = Vec::new();
        raw.extend_from_slice(codec::KEEP_ALIVE);
        raw.extend_from_slice(&frame(1, "one"));
        raw.extend_from_slice(&frame(2, "two"));

        let chunks: Vec<Result<Bytes, ClientError>> = raw
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let mut events = decode_event_stream(stream::iter(chunks));

        assert_eq!(events.next().await.unwrap().unwrap().message, "one");
        assert_eq!(events.next().await.unwrap().unwrap().message, "two");
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(frame(1, "one")),
            Err(ClientError::StreamDisconnected),
            Ok(frame(2, "two")),
        ];
        let mut events = decode_event_stream(stream::iter(chunks));

        assert!(events.next().await.unwrap().is_ok());
        assert!(matches!(
            events.next().await,
            Some(Err(ClientError::StreamDisconnected))
        ));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_protocol_error() {
        let chunks: Vec<Result<Bytes, ClientError>> =
            vec![Ok(Bytes::from_static(b"id: x\ndata: {}\n\n"))];
        let mut events = decode_event_stream(stream::iter(chunks));

        assert!(matches!(
            events.next().await,
            Some(Err(ClientError::Protocol(_)))
        ));
    }

    #[test]
    fn test_sequence_check() {
        let mut check = SequenceCheck::default();
        assert!(check.observe(1));
        assert!(check.observe(2));
        assert!(!check.observe(4));
        assert!(check.observe(5));
        assert!(!check.observe(3));
        assert_eq!(check.last(), Some(3));
    }

    #[test]
    fn test_sequence_must_start_at_one() {
        let mut check = SequenceCheck::default();
        assert!(!check.observe(2));
    }
}
