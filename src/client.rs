//! HTTP transport for the chat backend.
//!
//! `ChatClient` posts the conversation to `/chat` and exposes the streamed
//! response as an ordered sequence of content fragments. The `ChatTransport`
//! trait is the seam between the conversation controller and the network,
//! so tests can drive the controller with a scripted stream.

use crate::error::ChatError;
use crate::models::{ChatRequest, Message};
use crate::sse::{Frame, FrameDecoder};
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use reqwest::Client;
use std::collections::VecDeque;
use std::pin::Pin;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Ordered fragments, terminated by end-of-stream (completion) or one error.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Transport seam for issuing one streamed chat exchange.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the accumulated conversation and return the fragment stream.
    async fn stream_chat(&self, messages: &[Message]) -> Result<FragmentStream, ChatError>;
}

/// Client for the streaming chat backend.
pub struct ChatClient {
    base_url: String,
    client: Client,
}

impl ChatClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    /// POST `/chat` with `{messages, stream: true}` and decode the response
    /// body into fragments.
    ///
    /// A non-success status becomes `ChatError::Status` with the body text as
    /// detail. Inside the stream, a `[DONE]` frame or transport EOF ends the
    /// sequence; an `[ERROR]` frame yields a single `ChatError::Protocol`
    /// item and then ends it.
    async fn stream_chat(&self, messages: &[Message]) -> Result<FragmentStream, ChatError> {
        let url = format!("{}/chat", self.base_url);
        let request = ChatRequest::new(messages.to_vec());

        tracing::debug!(url = %url, messages = messages.len(), "opening chat stream");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ChatError::Status { status, body });
        }

        let bytes_stream = response.bytes_stream();

        // Pull chunks, feed the frame decoder, and hand out one item per
        // poll. Decoded frames that have not been consumed yet wait in the
        // pending queue.
        let fragment_stream = stream::unfold(
            (bytes_stream, FrameDecoder::new(), VecDeque::<Frame>::new()),
            |(mut bytes_stream, mut decoder, mut pending)| async move {
                loop {
                    if let Some(frame) = pending.pop_front() {
                        match frame {
                            Frame::Fragment(text) => {
                                return Some((Ok(text), (bytes_stream, decoder, pending)));
                            }
                            Frame::Done => return None,
                            Frame::Error(detail) => {
                                return Some((
                                    Err(ChatError::Protocol(detail)),
                                    (bytes_stream, decoder, pending),
                                ));
                            }
                        }
                    }

                    if decoder.is_finished() {
                        return None;
                    }

                    match bytes_stream.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                        Some(Err(e)) => {
                            return Some((
                                Err(ChatError::Network(e)),
                                (bytes_stream, decoder, pending),
                            ));
                        }
                        None => {
                            // Transport closed without [DONE]: flush any
                            // complete trailing frame, then finish cleanly.
                            pending.extend(decoder.finish());
                            if pending.is_empty() {
                                return None;
                            }
                        }
                    }
                }
            },
        );

        Ok(Box::pin(fragment_stream))
    }
}
