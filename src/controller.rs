//! Conversation controller: owns the message log and drives one streamed
//! exchange at a time.
//!
//! State machine per instance: idle → busy on `send`; busy → idle on stream
//! completion, stream error, or cancellation. A `send` while a session is
//! active cancels that session first; requests are never queued. The log is
//! persisted after every mutation, and a failed save never interrupts the
//! conversation flow.

use crate::client::{ChatClient, ChatTransport};
use crate::error::ChatError;
use crate::models::Message;
use crate::storage::HistoryStore;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Marker appended to the trailing assistant message when a stream is
/// cancelled mid-flight.
pub const CANCELLED_MARKER: &str = " [cancelled]";

/// Events published to an optional presentation sink so a front end can
/// render incrementally without polling the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// One decoded fragment was appended to the trailing assistant message.
    Fragment(String),
    /// The stream finished normally.
    Completed,
    /// The stream was cancelled; the log carries the cancellation marker.
    Cancelled,
    /// The stream failed; the log keeps whatever was streamed before.
    Failed(String),
}

/// Single authority over the active session's cancellation token.
///
/// `send` installs a fresh token when a session opens and removes it when
/// the session closes, so cancelling between sessions is a no-op and can
/// never affect a future exchange.
#[derive(Clone, Default)]
struct SessionSlot {
    token: Arc<Mutex<Option<CancellationToken>>>,
}

impl SessionSlot {
    fn install(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.lock() = Some(token.clone());
        token
    }

    fn clear(&self) {
        *self.lock() = None;
    }

    /// Trigger and release the active token, if any.
    fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        // A poisoned slot still holds a usable token; recover the guard
        // rather than panicking in library code.
        self.token.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Clonable handle that cancels the controller's active session from
/// another task, e.g. a Ctrl-C watcher.
#[derive(Clone)]
pub struct CancelHandle {
    slot: SessionSlot,
}

impl CancelHandle {
    /// Cancel the in-flight exchange. Returns false when nothing is active.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }
}

enum StreamOutcome {
    Completed,
    Cancelled,
}

/// Controller for a single conversation.
pub struct ChatController<T: ChatTransport = ChatClient> {
    transport: T,
    store: HistoryStore,
    messages: Vec<Message>,
    slot: SessionSlot,
    last_error: Option<String>,
    events: Option<UnboundedSender<ChatEvent>>,
}

impl ChatController<ChatClient> {
    /// Controller over the default HTTP transport, seeded from the store.
    pub fn new(store: HistoryStore) -> Self {
        Self::with_transport(ChatClient::new(), store)
    }
}

impl<T: ChatTransport> ChatController<T> {
    /// Controller over a custom transport, seeded from the store.
    pub fn with_transport(transport: T, store: HistoryStore) -> Self {
        let messages = store.load();
        Self {
            transport,
            store,
            messages,
            slot: SessionSlot::default(),
            last_error: None,
            events: None,
        }
    }

    /// Attach a sink for incremental presentation events.
    pub fn set_event_sink(&mut self, sink: UnboundedSender<ChatEvent>) {
        self.events = Some(sink);
    }

    /// The current ordered message sequence.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// True while a stream session is active.
    pub fn is_busy(&self) -> bool {
        self.slot.is_active()
    }

    /// The last error surfaced by `send`, cleared on the next `send`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Handle for cancelling the active session from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            slot: self.slot.clone(),
        }
    }

    /// Send a user message and stream the assistant's reply into the log.
    ///
    /// Appends the user message and an empty assistant placeholder, issues
    /// the request with everything accumulated before the placeholder, and
    /// applies each fragment to the trailing message, persisting after every
    /// step. Cancellation appends `" [cancelled]"` and returns Ok; transport
    /// and protocol errors are surfaced with partial content left in place.
    pub async fn send(&mut self, text: &str) -> Result<(), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        // An active session never queues behind a new send.
        self.cancel();
        self.last_error = None;

        self.messages.push(Message::user(text));
        self.persist();

        // Snapshot before the placeholder: the empty assistant message is
        // excluded from the outbound request.
        let outbound = self.messages.clone();
        self.messages.push(Message::assistant(""));
        self.persist();

        let token = self.slot.install();
        let outcome = self.run_stream(&outbound, &token).await;
        self.slot.clear();

        match outcome {
            Ok(StreamOutcome::Completed) => {
                tracing::debug!("stream completed");
                self.emit(ChatEvent::Completed);
                Ok(())
            }
            Ok(StreamOutcome::Cancelled) => {
                tracing::debug!("stream cancelled");
                self.emit(ChatEvent::Cancelled);
                Ok(())
            }
            Err(err) => {
                tracing::warn!("stream failed: {err}");
                self.last_error = Some(err.to_string());
                self.emit(ChatEvent::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Cancel the active session, if any. Safe to call while idle.
    ///
    /// The cancellation marker is appended by the streaming loop, exactly
    /// once, so repeated calls cannot double-append it.
    pub fn cancel(&mut self) {
        if self.slot.cancel() {
            tracing::debug!("cancellation requested");
        }
    }

    /// Cancel any active session, then empty and persist the log.
    pub fn clear(&mut self) {
        self.cancel();
        self.messages.clear();
        self.last_error = None;
        self.persist();
    }

    async fn run_stream(
        &mut self,
        outbound: &[Message],
        token: &CancellationToken,
    ) -> Result<StreamOutcome, ChatError> {
        let mut fragments = self.transport.stream_chat(outbound).await?;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Ok(self.finish_cancelled());
                }
                next = fragments.next() => {
                    // Cancellation may have fired while this item was being
                    // produced; anything behind it is dropped silently,
                    // including a late [DONE] or [ERROR].
                    if token.is_cancelled() {
                        return Ok(self.finish_cancelled());
                    }
                    match next {
                        Some(Ok(fragment)) => {
                            self.append_to_tail(&fragment);
                            self.persist();
                            self.emit(ChatEvent::Fragment(fragment));
                        }
                        Some(Err(err)) => return Err(err),
                        None => return Ok(StreamOutcome::Completed),
                    }
                },
            }
        }
    }

    fn finish_cancelled(&mut self) -> StreamOutcome {
        self.append_to_tail(CANCELLED_MARKER);
        self.persist();
        StreamOutcome::Cancelled
    }

    fn append_to_tail(&mut self, text: &str) {
        if let Some(last) = self.messages.last_mut() {
            last.append(text);
        }
    }

    fn persist(&mut self) {
        if let Err(err) = self.store.save(&self.messages) {
            // Never interrupts the conversation flow.
            tracing::warn!("failed to persist conversation: {err:#}");
        }
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(sink) = &self.events {
            let _ = sink.send(event);
        }
    }
}
