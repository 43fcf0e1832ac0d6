//! Conversation turn and bot reply types exchanged with the host harness.
//!
//! Field names serialize in the host's camelCase shape (`messageText`,
//! `sourceData`, `mimeType`).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::RequestTrace;

/// Sender tag of bot replies.
pub const BOT_SENDER: &str = "bot";

/// Media fixture attached to a user turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// Where the fixture came from; used as attachment name.
    pub media_uri: String,
    /// MIME type, e.g. `audio/wav`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Downloaded content. `None` until the host has fetched it.
    #[serde(skip)]
    pub buffer: Option<Vec<u8>>,
}

impl Media {
    /// A fetched audio fixture.
    pub fn audio(media_uri: impl Into<String>, mime_type: impl Into<String>, buffer: Vec<u8>) -> Self {
        Self {
            media_uri: media_uri.into(),
            mime_type: Some(mime_type.into()),
            buffer: Some(buffer),
        }
    }
}

/// Named, MIME-typed binary payload carried on a turn or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    /// Standard base64 of the content.
    pub base64: String,
}

impl Attachment {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            base64: BASE64.encode(bytes),
        }
    }

    /// Decode the content.
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.base64)
    }
}

/// One step of the scripted conversation, as far as the connector cares.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvoStep {
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
}

/// A simulated user turn handed to [`crate::SpeechAdapter::user_says`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTurn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<Media>,
    /// Filled by the adapter with the audio that was sent.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Filled by the adapter with the TTS request, when one was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_data: Option<RequestTrace>,
    /// The whole scripted conversation, if the host provides it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation: Vec<ConvoStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_index: Option<usize>,
}

impl UserTurn {
    /// A text-only turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            message_text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A turn carrying one audio fixture.
    pub fn audio(media: Media) -> Self {
        Self {
            media: vec![media],
            ..Self::default()
        }
    }

    /// Text the recognized speech is expected to match.
    ///
    /// The next conversation step's text if that step belongs to the bot,
    /// otherwise the turn's own text.
    pub fn wer_reference(&self) -> Option<&str> {
        let next_bot_text = self
            .current_step_index
            .and_then(|i| i.checked_add(1))
            .and_then(|next| self.conversation.get(next))
            .filter(|step| step.sender == BOT_SENDER)
            .and_then(|step| step.message_text.as_deref())
            .filter(|text| !text.is_empty());

        next_bot_text.or_else(|| self.message_text.as_deref().filter(|t| !t.is_empty()))
    }
}

/// Diagnostic trace attached to a reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// Reply delivered to the host after a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotReply {
    pub sender: String,
    /// Recognized text; `None` when STT is not configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
    pub source_data: SourceData,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Default for BotReply {
    fn default() -> Self {
        Self {
            sender: BOT_SENDER.to_string(),
            message_text: None,
            source_data: SourceData::default(),
            attachments: Vec::new(),
        }
    }
}
