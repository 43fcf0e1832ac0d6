//! Speech adapter: endpoint validation and turn processing.
//!
//! This module provides the `SpeechAdapter` struct that turns user turns into
//! audio (via TTS, or by passing a recorded fixture through) and, when an STT
//! endpoint is configured, recognizes that audio back into text.

use std::collections::BTreeMap;

use bsp_connector_common::config::SpeechConfig;
use bsp_connector_common::error::{Endpoint, Error, HttpFailure, Result};
use bsp_connector_common::render;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::message::{Attachment, BotReply, UserTurn};
use crate::request::{self, is_textual_content_type, BodyTrace, RequestTemplate, RequestTrace};

/// MIME type of audio sent to STT and of synthesized audio.
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Attachment name of synthesized audio.
pub const TTS_ATTACHMENT_NAME: &str = "tts.wav";

/// Multipart field carrying the audio for STT.
pub const STT_CONTENT_FIELD: &str = "content";

/// File name of the audio part sent to STT.
pub const STT_FILE_NAME: &str = "input.wav";

/// Speech synthesis & recognition adapter.
///
/// Build it with the host's reply channel, call [`validate`](Self::validate)
/// once, then [`user_says`](Self::user_says) for every user turn.
pub struct SpeechAdapter {
    config: SpeechConfig,
    http: reqwest::Client,
    replies: mpsc::UnboundedSender<BotReply>,
    stt: Option<RequestTemplate>,
    tts: Option<RequestTemplate>,
}

impl SpeechAdapter {
    /// Create an adapter delivering replies on `replies`.
    pub fn new(config: SpeechConfig, replies: mpsc::UnboundedSender<BotReply>) -> Self {
        Self::with_client(config, reqwest::Client::new(), replies)
    }

    /// Create an adapter with a caller-supplied HTTP client.
    pub fn with_client(
        config: SpeechConfig,
        http: reqwest::Client,
        replies: mpsc::UnboundedSender<BotReply>,
    ) -> Self {
        Self {
            config,
            http,
            replies,
            stt: None,
            tts: None,
        }
    }

    /// Create an adapter together with the receiving end of its reply channel.
    pub fn channel(config: SpeechConfig) -> (Self, mpsc::UnboundedReceiver<BotReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(config, tx), rx)
    }

    /// The configuration this adapter was built with.
    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// STT template, present once validation succeeded with STT configured.
    pub fn stt_template(&self) -> Option<&RequestTemplate> {
        self.stt.as_ref()
    }

    /// TTS template, present once validation succeeded with TTS configured.
    pub fn tts_template(&self) -> Option<&RequestTemplate> {
        self.tts.as_ref()
    }

    /// Build the request templates and probe each configured endpoint.
    ///
    /// # Errors
    /// Returns `Error::Config` for unusable settings and `Error::Validation`
    /// when a status probe fails or does not answer `{"status": "OK"}`.
    #[instrument(level = "info", name = "validate_adapter", skip(self))]
    pub async fn validate(&mut self) -> Result<()> {
        self.stt = None;
        self.tts = None;

        let mut stt = None;
        let mut tts = None;
        for endpoint in [Endpoint::Stt, Endpoint::Tts] {
            let config = self.config.endpoint(endpoint);
            if !config.is_configured() {
                debug!(%endpoint, "Endpoint not configured, skipping");
                continue;
            }

            let template = RequestTemplate::from_endpoint(config)?;
            self.check_status(&template).await?;

            match endpoint {
                Endpoint::Stt => stt = Some(template),
                Endpoint::Tts => tts = Some(template),
            }
        }
        self.stt = stt;
        self.tts = tts;

        info!(
            stt = self.stt.is_some(),
            tts = self.tts.is_some(),
            "Speech adapter validated"
        );
        Ok(())
    }

    async fn check_status(&self, template: &RequestTemplate) -> Result<()> {
        let endpoint = template.endpoint;
        let url = template.status_url();
        debug!(%endpoint, url = %url, "Checking status");

        let request = self
            .http
            .get(&url)
            .query(&template.params)
            .headers(template.headers.clone())
            .timeout(template.timeout);

        let response = request::send(request)
            .await
            .map_err(|f| Error::validation(endpoint, f.to_string()))?;
        let (_, body) = request::read_body(response)
            .await
            .map_err(|f| Error::validation(endpoint, f.to_string()))?;

        match serde_json::from_slice::<Value>(&body) {
            Ok(value) if value.get("status").and_then(Value::as_str) == Some("OK") => {
                debug!(%endpoint, response = %render::shorten_json(&value), "Status OK");
                Ok(())
            }
            _ => Err(Error::validation(
                endpoint,
                format!("response is: {}", render::shorten_bytes(&body)),
            )),
        }
    }

    /// Process one user turn.
    ///
    /// The turn's audio (first media fixture, or TTS output for its text) is
    /// appended to `turn.attachments`. If STT is configured the audio is
    /// recognized, and a [`BotReply`] is sent on the reply channel.
    ///
    /// # Errors
    /// Fails before any reply is queued if media is unusable, TTS is needed
    /// but not configured, the turn is empty, or a remote call fails.
    #[instrument(
        level = "info",
        name = "user_says",
        skip(self, turn),
        fields(has_text = turn.message_text.is_some(), media = turn.media.len())
    )]
    pub async fn user_says(&self, turn: &mut UserTurn) -> Result<()> {
        let (audio, attachment) = self.turn_audio(turn).await?;
        turn.attachments.push(attachment.clone());

        let mut reply = BotReply {
            attachments: vec![attachment],
            ..BotReply::default()
        };

        if let Some(stt) = &self.stt {
            let wer = turn.wer_reference().map(str::to_string);
            let recognized = self.recognize(stt, audio, wer.as_deref()).await?;
            reply.source_data.request = Some(recognized.request);
            reply.source_data.response = recognized.response;
            reply.message_text = Some(recognized.text);
        }

        debug!(text = ?reply.message_text, "Queueing bot reply");
        self.replies.send(reply).map_err(|_| Error::Delivery)
    }

    /// Audio for a turn: the first media fixture, or synthesized speech.
    async fn turn_audio(&self, turn: &mut UserTurn) -> Result<(Vec<u8>, Attachment)> {
        if let Some(media) = turn.media.first() {
            let buffer = media
                .buffer
                .as_deref()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| {
                    Error::media(format!("Media attachment {} not downloaded", media.media_uri))
                })?;

            let mime_type = media
                .mime_type
                .as_deref()
                .filter(|m| m.starts_with("audio"))
                .ok_or_else(|| {
                    Error::media(format!(
                        "Media attachment {} mime type {} not supported (audio only)",
                        media.media_uri,
                        media
                            .mime_type
                            .as_deref()
                            .filter(|m| !m.is_empty())
                            .unwrap_or("<empty>")
                    ))
                })?;

            debug!(uri = %media.media_uri, mime_type, bytes = buffer.len(), "Passing audio fixture through");
            let attachment = Attachment::from_bytes(&media.media_uri, mime_type, buffer);
            return Ok((buffer.to_vec(), attachment));
        }

        if let Some(text) = turn.message_text.clone().filter(|t| !t.is_empty()) {
            let tts = self
                .tts
                .as_ref()
                .ok_or_else(|| Error::not_configured(Endpoint::Tts, "only audio input supported"))?;
            let audio = self.synthesize(tts, &text, turn).await?;
            let attachment = Attachment::from_bytes(TTS_ATTACHMENT_NAME, WAV_MIME_TYPE, &audio);
            return Ok((audio, attachment));
        }

        Err(Error::EmptyTurn)
    }

    /// Call TTS for `text`, recording the request on the turn.
    async fn synthesize(&self, tts: &RequestTemplate, text: &str, turn: &mut UserTurn) -> Result<Vec<u8>> {
        let mut params = tts.params.clone();
        params.insert("text".to_string(), text.to_string());

        let mut builder = tts.builder(&self.http, &params, &tts.headers);
        let body_trace = match &tts.body {
            Some(body) => {
                builder = builder.json(body);
                BodyTrace::Json { value: body.clone() }
            }
            None => BodyTrace::None,
        };
        turn.source_data = Some(tts.trace(&params, &tts.headers, body_trace));

        info!(url = %tts.url, "Synthesizing speech");
        let context = format!("TTS \"{text}\"");
        let response = request::send(builder)
            .await
            .map_err(|f| Error::transport(&context, f))?;
        let (content_type, audio) = request::read_body(response)
            .await
            .map_err(|f| Error::transport(&context, f))?;

        let textual = content_type.as_deref().is_some_and(is_textual_content_type);
        if audio.is_empty() || textual {
            return Err(Error::response_shape(
                Endpoint::Tts,
                render::shorten_bytes(&audio),
            ));
        }

        debug!(bytes = audio.len(), content_type = ?content_type, "Received synthesized audio");
        Ok(audio)
    }

    /// Submit audio to STT.
    async fn recognize(
        &self,
        stt: &RequestTemplate,
        audio: Vec<u8>,
        wer: Option<&str>,
    ) -> Result<Recognized> {
        let mut params: BTreeMap<String, String> = stt.params.clone();
        if let Some(wer) = wer {
            params.insert("wer".to_string(), wer.to_string());
        }

        let mut headers = stt.headers.clone();
        headers.remove(CONTENT_TYPE);
        let audio_bytes = audio.len();

        let (builder, body_trace) = match stt.body.as_ref().and_then(Value::as_object) {
            Some(fields) => {
                let part = Part::bytes(audio)
                    .file_name(STT_FILE_NAME)
                    .mime_str(WAV_MIME_TYPE)
                    .map_err(|e| Error::transport("STT", HttpFailure::from(e)))?;
                let mut form = Form::new().part(STT_CONTENT_FIELD, part);
                for (key, value) in fields {
                    form = form.text(key.clone(), value.to_string());
                }
                let builder = stt.builder(&self.http, &params, &headers).multipart(form);
                let mut names: Vec<String> = fields.keys().cloned().collect();
                names.sort();
                let trace = BodyTrace::Multipart {
                    fields: names,
                    audio_bytes,
                };
                (builder, trace)
            }
            None => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(WAV_MIME_TYPE));
                let builder = stt.builder(&self.http, &params, &headers).body(audio);
                let trace = BodyTrace::Audio {
                    content_type: WAV_MIME_TYPE.to_string(),
                    bytes: audio_bytes,
                };
                (builder, trace)
            }
        };
        let trace = stt.trace(&params, &headers, body_trace);

        info!(url = %stt.url, bytes = audio_bytes, "Recognizing speech");
        let response = request::send(builder)
            .await
            .map_err(|f| Error::transport("STT", f))?;
        let (_, body) = request::read_body(response)
            .await
            .map_err(|f| Error::transport("STT", f))?;

        if body.is_empty() {
            return Ok(Recognized {
                text: String::new(),
                request: trace,
                response: None,
            });
        }

        let value: Value = serde_json::from_slice(&body)
            .map_err(|_| Error::response_shape(Endpoint::Stt, render::shorten_bytes(&body)))?;
        let text = value
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        debug!(text = %text, "Recognized speech");

        Ok(Recognized {
            text,
            request: trace,
            response: Some(value),
        })
    }
}

struct Recognized {
    text: String,
    request: RequestTrace,
    response: Option<Value>,
}
