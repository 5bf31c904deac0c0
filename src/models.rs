//! Data model for conversations and the chat request body.

use serde::{Deserialize, Serialize};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in the conversation log.
///
/// The role is fixed at creation. Content only grows, and only while the
/// message is the trailing assistant message of an in-flight exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Append streamed text to this message's content.
    pub fn append(&mut self, fragment: &str) {
        self.content.push_str(fragment);
    }
}

/// Request body for the streaming chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            stream: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_append_grows_content() {
        let mut msg = Message::assistant("");
        msg.append("Hel");
        msg.append("lo");
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.role, Role::Assistant);
    }

    #[test]
    fn test_chat_request_json_shape() {
        let req = ChatRequest::new(vec![Message::user("Hi")]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messages": [{"role": "user", "content": "Hi"}],
                "stream": true
            })
        );
    }

    #[test]
    fn test_message_round_trip() {
        let msgs = vec![Message::user("A"), Message::assistant("B")];
        let json = serde_json::to_string(&msgs).unwrap();
        let back: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msgs);
    }
}
