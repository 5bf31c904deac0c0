//! Murmur - a terminal client for streaming chat backends
//!
//! The library half of the crate: the event-stream frame decoder, the HTTP
//! transport, the conversation controller, and the persisted message log.
//! The binary in `main.rs` wraps these in a paced REPL.

pub mod client;
pub mod controller;
pub mod error;
pub mod models;
pub mod sse;
pub mod storage;

pub use client::{ChatClient, ChatTransport, FragmentStream, DEFAULT_BASE_URL};
pub use controller::{CancelHandle, ChatController, ChatEvent, CANCELLED_MARKER};
pub use error::ChatError;
pub use models::{ChatRequest, Message, Role};
pub use storage::HistoryStore;
