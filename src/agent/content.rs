//! Content model - conversation messages and wire translation
//!
//! History is append-only: the agent never mutates a message after it is
//! produced, it only appends new ones.

use chrono::{DateTime, Local};

use crate::error::Error;
use crate::Result;

use super::backend::{Content, FileData, Part as WirePart};

pub use super::backend::VideoMetadata;

/// A message in the conversation history.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
}

/// A message from the end user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessage {
    pub parts: Vec<Part>,
}

impl UserMessage {
    /// Create a user message with a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
        }
    }
}

/// A message produced by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantMessage {
    pub model: String,
    pub timestamp: DateTime<Local>,
    pub parts: Vec<Part>,
}

/// One part of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text {
        text: String,
        /// Internal "thought" text, not meant for display.
        thought: bool,
        /// Opaque continuation signature attached to thought parts.
        thought_signature: Option<String>,
    },
    FileRef {
        uri: String,
        mime_type: String,
        display_name: Option<String>,
        video_metadata: Option<VideoMetadata>,
    },
}

impl Part {
    /// Create a plain text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text {
            text: text.into(),
            thought: false,
            thought_signature: None,
        }
    }

    fn to_wire(&self) -> WirePart {
        match self {
            Part::Text {
                text,
                thought,
                thought_signature,
            } => WirePart {
                text: Some(text.clone()),
                thought: if *thought { Some(true) } else { None },
                thought_signature: thought_signature.clone(),
                ..WirePart::default()
            },
            Part::FileRef {
                uri,
                mime_type,
                display_name,
                video_metadata,
            } => WirePart {
                file_data: Some(FileData {
                    file_uri: uri.clone(),
                    mime_type: mime_type.clone(),
                    display_name: display_name.clone(),
                }),
                video_metadata: video_metadata.clone(),
                ..WirePart::default()
            },
        }
    }

    fn from_wire(part: &WirePart) -> Option<Self> {
        if let Some(ref text) = part.text {
            return Some(Part::Text {
                text: text.clone(),
                thought: part.thought.unwrap_or(false),
                thought_signature: part.thought_signature.clone(),
            });
        }

        if let Some(ref file) = part.file_data {
            return Some(Part::FileRef {
                uri: file.file_uri.clone(),
                mime_type: file.mime_type.clone(),
                display_name: file.display_name.clone(),
                video_metadata: part.video_metadata.clone(),
            });
        }

        // Function calls and responses are loop-internal, not message parts.
        None
    }
}

/// Translate history plus the new user message into wire content blocks.
pub fn build_contents(history: &[Message], message: &UserMessage) -> Vec<Content> {
    let mut contents = Vec::with_capacity(history.len() + 1);

    for message in history {
        let (role, parts) = match message {
            Message::User(user) => ("user", &user.parts),
            Message::Assistant(assistant) => ("model", &assistant.parts),
        };
        contents.push(Content::new(role, parts.iter().map(Part::to_wire).collect()));
    }

    contents.push(Content::new(
        "user",
        message.parts.iter().map(Part::to_wire).collect(),
    ));
    contents
}

/// Extract the final assistant message from the blocks appended during one
/// turn. Fails with [`Error::EmptyResponse`] if no parts survive — the
/// agent never returns a message with zero parts.
pub fn extract_reply(model: &str, appended: &[Content]) -> Result<AssistantMessage> {
    let parts: Vec<Part> = appended
        .iter()
        .filter(|content| content.role == "model")
        .flat_map(|content| content.parts.iter())
        .filter_map(Part::from_wire)
        .collect();

    if parts.is_empty() {
        return Err(Error::EmptyResponse);
    }

    Ok(AssistantMessage {
        model: model.to_string(),
        timestamp: Local::now(),
        parts,
    })
}
