//! BSP Speech Connector Library
//!
//! Lets a conversation-testing harness talk to speech interfaces: user text
//! is synthesized into audio via a TTS endpoint, and audio (synthesized or
//! recorded fixtures) is recognized back into text via an STT endpoint.

pub mod handler;
pub mod message;
pub mod plugin;
pub mod request;

pub use handler::SpeechAdapter;
pub use message::{Attachment, BotReply, ConvoStep, Media, SourceData, UserTurn};
pub use plugin::{descriptor, PluginDescriptor};
pub use request::{status_url, BodyTrace, RequestTemplate, RequestTrace};
