//! Integration tests for the speech adapter against mocked STT/TTS services.
//!
//! Run with: `cargo test --package bsp-connector --test integration_test`

use std::time::Duration;

use bsp_connector::{ConvoStep, Media, SpeechAdapter, UserTurn};
use bsp_connector::message::BotReply;
use bsp_connector_common::SpeechConfig;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{body_json, body_string_contains, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FAKE_WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

fn caps(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("caps must be a JSON object")
}

async fn mount_status_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .mount(server)
        .await;
}

async fn validated(caps_value: Value) -> (SpeechAdapter, UnboundedReceiver<BotReply>) {
    let config = SpeechConfig::from_caps(&caps(caps_value)).expect("valid caps");
    let (mut adapter, replies) = SpeechAdapter::channel(config);
    adapter.validate().await.expect("validation should pass");
    (adapter, replies)
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_validate_probes_both_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(2)
        .mount(&server)
        .await;

    let (adapter, _replies) = validated(json!({
        "BSP_STT_URL": format!("{}/api/stt/en", server.uri()),
        "BSP_TTS_URL": format!("{}/api/tts/en", server.uri()),
    }))
    .await;

    assert!(adapter.stt_template().is_some());
    assert!(adapter.tts_template().is_some());
}

#[tokio::test]
async fn test_validate_forwards_configured_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(1)
        .mount(&server)
        .await;

    validated(json!({
        "BSP_TTS_URL": format!("{}/api/tts/en", server.uri()),
        "BSP_TTS_HEADERS": r#"{"x-api-key": "secret"}"#,
    }))
    .await;
}

#[tokio::test]
async fn test_validate_rejects_non_ok_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "DOWN"})))
        .mount(&server)
        .await;

    let config =
        SpeechConfig::from_caps(&caps(json!({ "BSP_TTS_URL": format!("{}/tts", server.uri()) })))
            .unwrap();
    let (mut adapter, _replies) = SpeechAdapter::channel(config);
    let err = adapter.validate().await.unwrap_err().to_string();

    assert!(err.starts_with("Checking TTS Status failed"), "got: {err}");
    assert!(err.contains("DOWN"));
    assert!(adapter.tts_template().is_none());
}

#[tokio::test]
async fn test_validate_reports_status_code_and_truncated_body() {
    let server = MockServer::start().await;
    let long_body = "e".repeat(500);
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(503).set_body_string(long_body.clone()))
        .mount(&server)
        .await;

    let config =
        SpeechConfig::from_caps(&caps(json!({ "BSP_STT_URL": format!("{}/stt", server.uri()) })))
            .unwrap();
    let (mut adapter, _replies) = SpeechAdapter::channel(config);
    let err = adapter.validate().await.unwrap_err().to_string();

    let prefix = "Checking STT Status failed - Status: 503 / Response: ";
    assert!(err.starts_with(prefix), "got: {err}");
    assert_eq!(err[prefix.len()..].chars().count(), 200);
    assert!(!err.contains(&long_body));
}

#[tokio::test]
async fn test_validate_reports_unreachable_endpoint() {
    let config = SpeechConfig::from_caps(&caps(json!({
        "BSP_STT_URL": "http://127.0.0.1:1/api/stt/en",
        "BSP_STT_TIMEOUT": 2000,
    })))
    .unwrap();
    let (mut adapter, _replies) = SpeechAdapter::channel(config);
    let err = adapter.validate().await.unwrap_err().to_string();

    assert!(err.starts_with("Checking STT Status failed - "), "got: {err}");
    assert!(!err.contains("Status: "));
}

#[tokio::test]
async fn test_validate_failure_keeps_no_templates() {
    let stt_server = MockServer::start().await;
    mount_status_ok(&stt_server).await;
    let tts_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "DOWN"})))
        .mount(&tts_server)
        .await;

    let config = SpeechConfig::from_caps(&caps(json!({
        "BSP_STT_URL": format!("{}/stt", stt_server.uri()),
        "BSP_TTS_URL": format!("{}/tts", tts_server.uri()),
    })))
    .unwrap();
    let (mut adapter, _replies) = SpeechAdapter::channel(config);
    let err = adapter.validate().await.unwrap_err().to_string();

    assert!(err.starts_with("Checking TTS Status failed"), "got: {err}");
    assert!(adapter.stt_template().is_none());
    assert!(adapter.tts_template().is_none());
}

#[tokio::test]
async fn test_validate_rejects_invalid_params_before_probing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(0)
        .mount(&server)
        .await;

    let config = SpeechConfig::from_caps(&caps(json!({
        "BSP_TTS_URL": format!("{}/tts", server.uri()),
        "BSP_TTS_PARAMS": "{not json",
    })))
    .unwrap();
    let (mut adapter, _replies) = SpeechAdapter::channel(config);
    let err = adapter.validate().await.unwrap_err().to_string();
    assert!(err.contains("BSP_TTS_PARAMS"), "got: {err}");
}

// =============================================================================
// Turn processing
// =============================================================================

#[tokio::test]
async fn test_tts_then_stt_delivers_recognized_text() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/tts/en"))
        .and(query_param("text", "hello"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FAKE_WAV, "audio/wav"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/stt/en"))
        .and(header("content-type", "audio/wav"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hello"})))
        .expect(1)
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({
        "BSP_STT_URL": format!("{}/api/stt/en", server.uri()),
        "BSP_TTS_URL": format!("{}/api/tts/en", server.uri()),
    }))
    .await;

    let mut turn = UserTurn::text("hello");
    adapter.user_says(&mut turn).await.unwrap();

    assert_eq!(turn.attachments.len(), 1);
    assert_eq!(turn.attachments[0].name, "tts.wav");
    assert_eq!(turn.attachments[0].mime_type, "audio/wav");
    assert_eq!(turn.attachments[0].bytes().unwrap(), FAKE_WAV);

    let tts_trace = turn.source_data.as_ref().expect("TTS request recorded");
    assert_eq!(tts_trace.params.get("text").map(String::as_str), Some("hello"));

    let reply = replies.recv().await.unwrap();
    assert_eq!(reply.sender, "bot");
    assert_eq!(reply.message_text.as_deref(), Some("hello"));
    assert_eq!(reply.source_data.response, Some(json!({"text": "hello"})));
    assert!(reply.source_data.request.is_some());
    assert_eq!(reply.attachments, turn.attachments);
}

#[tokio::test]
async fn test_pass_through_skips_tts() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(path("/api/tts/en"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FAKE_WAV, "audio/wav"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/stt/en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "good morning"})))
        .expect(1)
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({
        "BSP_STT_URL": format!("{}/api/stt/en", server.uri()),
        "BSP_TTS_URL": format!("{}/api/tts/en", server.uri()),
    }))
    .await;

    let mp3 = b"ID3\x03\x00fake mp3".to_vec();
    let mut turn = UserTurn::audio(Media::audio("fixtures/good_morning.mp3", "audio/mpeg", mp3.clone()));
    adapter.user_says(&mut turn).await.unwrap();

    assert_eq!(turn.attachments.len(), 1);
    assert_eq!(turn.attachments[0].name, "fixtures/good_morning.mp3");
    assert_eq!(turn.attachments[0].mime_type, "audio/mpeg");
    assert_eq!(turn.attachments[0].bytes().unwrap(), mp3);
    assert!(turn.source_data.is_none());

    let reply = replies.recv().await.unwrap();
    assert_eq!(reply.message_text.as_deref(), Some("good morning"));
}

#[tokio::test]
async fn test_tts_merges_text_into_configured_params() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/tts/de"))
        .and(query_param("voice", "anna"))
        .and(query_param("text", "guten tag"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FAKE_WAV, "audio/wav"))
        .expect(1)
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({
        "BSP_TTS_URL": format!("{}/api/tts/de", server.uri()),
        "BSP_TTS_PARAMS": {"voice": "anna", "text": "overridden"},
    }))
    .await;

    let mut turn = UserTurn::text("guten tag");
    adapter.user_says(&mut turn).await.unwrap();

    // no STT: reply carries the audio but no recognized text
    let reply = replies.recv().await.unwrap();
    assert!(reply.message_text.is_none());
    assert_eq!(reply.attachments.len(), 1);
}

#[tokio::test]
async fn test_tts_sends_configured_body_as_json() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/tts"))
        .and(body_json(json!({"format": "wav", "rate": 16000})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FAKE_WAV, "audio/wav"))
        .expect(1)
        .mount(&server)
        .await;

    let (adapter, _replies) = validated(json!({
        "BSP_TTS_URL": format!("{}/tts", server.uri()),
        "BSP_TTS_METHOD": "POST",
        "BSP_TTS_BODY": r#"{"format": "wav", "rate": 16000}"#,
    }))
    .await;

    let mut turn = UserTurn::text("hello");
    adapter.user_says(&mut turn).await.unwrap();
}

#[tokio::test]
async fn test_tts_non_binary_response_is_rejected() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/tts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "voice missing"})))
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({ "BSP_TTS_URL": format!("{}/tts", server.uri()) })).await;

    let mut turn = UserTurn::text("hello");
    let err = adapter.user_says(&mut turn).await.unwrap_err().to_string();

    assert_eq!(err, r#"TTS failed, response is: {"error":"voice missing"}"#);
    assert!(turn.attachments.is_empty());
    assert!(replies.try_recv().is_err());
}

#[tokio::test]
async fn test_tts_http_error_reports_status_and_body() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/tts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("voice not found"))
        .mount(&server)
        .await;

    let (adapter, _replies) = validated(json!({ "BSP_TTS_URL": format!("{}/tts", server.uri()) })).await;

    let mut turn = UserTurn::text("hello");
    let err = adapter.user_says(&mut turn).await.unwrap_err().to_string();

    assert_eq!(err, "TTS \"hello\" failed - Status: 500 / Response: voice not found");
    // the request is recorded even though the call failed
    assert!(turn.source_data.is_some());
}

#[tokio::test]
async fn test_tts_empty_body_is_rejected() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/tts"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "audio/wav"))
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({ "BSP_TTS_URL": format!("{}/tts", server.uri()) })).await;

    let mut turn = UserTurn::text("hello");
    let err = adapter.user_says(&mut turn).await.unwrap_err().to_string();

    assert_eq!(err, "TTS failed, response is: ");
    assert!(turn.attachments.is_empty());
    assert!(replies.try_recv().is_err());
}

#[tokio::test]
async fn test_tts_timeout_aborts_turn() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/tts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(FAKE_WAV.to_vec())
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({
        "BSP_TTS_URL": format!("{}/tts", server.uri()),
        "BSP_TTS_TIMEOUT": 200,
    }))
    .await;

    let mut turn = UserTurn::text("hi");
    let err = adapter.user_says(&mut turn).await.unwrap_err().to_string();

    assert!(err.starts_with("TTS \"hi\" failed - request timed out: "), "got: {err}");
    assert!(turn.attachments.is_empty());
    assert!(replies.try_recv().is_err());
}

#[tokio::test]
async fn test_stt_timeout_aborts_turn() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/stt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"text": "hello"}))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({
        "BSP_STT_URL": format!("{}/stt", server.uri()),
        "BSP_STT_TIMEOUT": "200",
    }))
    .await;

    let mut turn = UserTurn::audio(Media::audio("hello.wav", "audio/wav", FAKE_WAV.to_vec()));
    let err = adapter.user_says(&mut turn).await.unwrap_err().to_string();

    assert!(err.starts_with("STT failed - request timed out: "), "got: {err}");
    assert!(replies.try_recv().is_err());
}

#[tokio::test]
async fn test_stt_multipart_includes_body_fields() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/stt/en"))
        .and(header_regex("content-type", "^multipart/form-data; boundary="))
        .and(body_string_contains("name=\"content\"; filename=\"input.wav\""))
        .and(body_string_contains("Content-Type: audio/wav"))
        .and(body_string_contains("name=\"language\""))
        .and(body_string_contains("\"en-US\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hello"})))
        .expect(1)
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({
        "BSP_STT_URL": format!("{}/api/stt/en", server.uri()),
        "BSP_STT_BODY": {"language": "en-US", "hints": ["hello"]},
    }))
    .await;

    let mut turn = UserTurn::audio(Media::audio("hello.wav", "audio/wav", FAKE_WAV.to_vec()));
    adapter.user_says(&mut turn).await.unwrap();

    let reply = replies.recv().await.unwrap();
    assert_eq!(reply.message_text.as_deref(), Some("hello"));
    let request = reply.source_data.request.unwrap();
    assert_eq!(
        serde_json::to_value(&request.body).unwrap(),
        json!({"kind": "multipart", "fields": ["hints", "language"], "audio_bytes": FAKE_WAV.len()})
    );
}

#[tokio::test]
async fn test_stt_receives_wer_reference() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/stt"))
        .and(query_param("wer", "how can I help"))
        .and(query_param("language", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "how can I help"})))
        .expect(1)
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({
        "BSP_STT_URL": format!("{}/stt", server.uri()),
        "BSP_STT_PARAMS": r#"{"language": "en"}"#,
    }))
    .await;

    let mut turn = UserTurn {
        conversation: vec![
            ConvoStep { sender: "me".into(), message_text: None },
            ConvoStep { sender: "bot".into(), message_text: Some("how can I help".into()) },
        ],
        current_step_index: Some(0),
        ..UserTurn::audio(Media::audio("greeting.wav", "audio/wav", FAKE_WAV.to_vec()))
    };
    adapter.user_says(&mut turn).await.unwrap();

    let reply = replies.recv().await.unwrap();
    assert_eq!(reply.message_text.as_deref(), Some("how can I help"));
}

#[tokio::test]
async fn test_stt_without_text_field_yields_empty_text() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/stt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"confidence": 0.1})))
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({ "BSP_STT_URL": format!("{}/stt", server.uri()) })).await;

    let mut turn = UserTurn::audio(Media::audio("noise.wav", "audio/wav", FAKE_WAV.to_vec()));
    adapter.user_says(&mut turn).await.unwrap();

    let reply = replies.recv().await.unwrap();
    assert_eq!(reply.message_text.as_deref(), Some(""));
    assert_eq!(reply.source_data.response, Some(json!({"confidence": 0.1})));
}

#[tokio::test]
async fn test_stt_failure_queues_no_reply() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/stt"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({ "BSP_STT_URL": format!("{}/stt", server.uri()) })).await;

    let mut turn = UserTurn::audio(Media::audio("hello.wav", "audio/wav", FAKE_WAV.to_vec()));
    let err = adapter.user_says(&mut turn).await.unwrap_err().to_string();

    assert_eq!(err, "STT failed - Status: 502 / Response: upstream down");
    assert!(replies.try_recv().is_err());
}

#[tokio::test]
async fn test_stt_non_json_response_is_rejected() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/stt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let (adapter, _replies) = validated(json!({ "BSP_STT_URL": format!("{}/stt", server.uri()) })).await;

    let mut turn = UserTurn::audio(Media::audio("hello.wav", "audio/wav", FAKE_WAV.to_vec()));
    let err = adapter.user_says(&mut turn).await.unwrap_err().to_string();
    assert_eq!(err, "STT failed, response is: <html>maintenance</html>");
}

#[tokio::test]
async fn test_replies_arrive_in_turn_order() {
    let server = MockServer::start().await;
    mount_status_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/stt"))
        .and(query_param("wer", "first"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "first"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stt"))
        .and(query_param("wer", "second"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "second"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tts"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FAKE_WAV, "audio/wav"))
        .mount(&server)
        .await;

    let (adapter, mut replies) = validated(json!({
        "BSP_STT_URL": format!("{}/stt", server.uri()),
        "BSP_TTS_URL": format!("{}/tts", server.uri()),
    }))
    .await;

    for text in ["first", "second"] {
        let mut turn = UserTurn::text(text);
        adapter.user_says(&mut turn).await.unwrap();
    }

    assert_eq!(replies.recv().await.unwrap().message_text.as_deref(), Some("first"));
    assert_eq!(replies.recv().await.unwrap().message_text.as_deref(), Some("second"));
}
