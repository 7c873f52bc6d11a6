use anyhow::{Context, Result};
use serde::Serialize;

pub const DEFAULT_MESSAGE_TEXT: &str = "hello world";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// The single user message written to the child's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl OutboundMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Message,
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Compact JSON without the trailing newline. serde_json escapes any
    /// newline inside the text, so the result is always one line.
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize outbound message")
    }
}

impl Default for OutboundMessage {
    fn default() -> Self {
        Self::user_text(DEFAULT_MESSAGE_TEXT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn label(self) -> &'static str {
        match self {
            StreamKind::Stdout => "STDOUT",
            StreamKind::Stderr => "STDERR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_message_matches_wire_shape() {
        let line = OutboundMessage::default().to_line().unwrap();
        assert_eq!(
            line,
            r#"{"type":"message","role":"user","content":[{"type":"text","text":"hello world"}]}"#
        );
    }

    #[test]
    fn multiline_text_stays_on_one_line() {
        let line = OutboundMessage::user_text("first\nsecond").to_line().unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains(r#""text":"first\nsecond""#));
    }
}
