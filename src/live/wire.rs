use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use super::session::LiveConfig;
use crate::audio::{mime_type, AudioFrame};

/// One frame's worth of transport-ready audio: PCM bytes plus the MIME-like
/// tag identifying encoding and sample rate.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl EncodedChunk {
    /// Encode a captured frame for transport (clamped 16-bit LE PCM).
    pub fn from_frame(frame: &AudioFrame) -> Self {
        Self {
            data: crate::audio::encode_frame(&frame.samples),
            mime_type: mime_type(frame.sample_rate),
        }
    }
}

/// Decoded inbound event, plus the session-level markers.
///
/// The session delivers one lazy sequence of these instead of separate
/// open/message/error/close callbacks; the sequence is finite and always
/// terminated by `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Remote acknowledged the setup message
    Connected,
    /// Interim transcription of the input audio
    PartialTranscript(String),
    /// The remote marked an utterance boundary
    TurnComplete,
    /// Model-generated text (carries tag-bracketed sound labels)
    ModelText(String),
    /// Remote or transport error
    Error(String),
    /// Terminal marker; nothing follows
    Closed,
}

/// Wrap an encoded chunk in the outbound media envelope:
/// `{ "media": { "data": <base64>, "mimeType": "audio/pcm;rate=16000" } }`
pub fn media_message(chunk: &EncodedChunk) -> String {
    let message = json!({
        "media": {
            "data": base64::engine::general_purpose::STANDARD.encode(&chunk.data),
            "mimeType": chunk.mime_type,
        }
    });
    message.to_string()
}

/// Session configuration sent as the first message on the wire.
pub fn setup_message(config: &LiveConfig) -> String {
    let mut setup = json!({
        "model": config.model,
        "responseModalities": ["AUDIO"],
        "systemInstruction": config.system_instruction,
    });
    if config.input_transcription {
        setup["inputAudioTranscription"] = json!({});
    }
    json!({ "setup": setup }).to_string()
}

/// Unwrap a base64 media payload back into raw bytes.
///
/// Only needed if the remote echoes audio; kept as the inverse of the
/// envelope for the round-trip guarantee.
pub fn decode_envelope(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .context("invalid base64 media payload")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    input_transcription: Option<Transcription>,
    turn_complete: Option<bool>,
    model_turn: Option<ModelTurn>,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Decode one inbound wire message into zero or more events.
///
/// Unknown-but-well-formed messages decode to an empty list; malformed
/// payloads return an error the caller logs and skips (a decode anomaly is
/// never fatal to the event loop).
pub fn decode_server_message(payload: &str) -> Result<Vec<ServerEvent>> {
    let message: InboundMessage =
        serde_json::from_str(payload).context("malformed server message")?;

    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(ServerEvent::Connected);
    }

    if let Some(content) = message.server_content {
        if let Some(transcription) = content.input_transcription {
            if let Some(text) = transcription.text {
                if !text.is_empty() {
                    events.push(ServerEvent::PartialTranscript(text));
                }
            }
        }

        if let Some(turn) = content.model_turn {
            for part in turn.parts.unwrap_or_default() {
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        events.push(ServerEvent::ModelText(text));
                    }
                }
            }
        }

        if content.turn_complete == Some(true) {
            events.push(ServerEvent::TurnComplete);
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        for bytes in [vec![], vec![0u8], vec![1, 2, 3, 255, 0, 128]] {
            let chunk = EncodedChunk {
                data: bytes.clone(),
                mime_type: mime_type(16000),
            };
            let message = media_message(&chunk);
            let value: serde_json::Value = serde_json::from_str(&message).unwrap();
            let data = value["media"]["data"].as_str().unwrap();
            assert_eq!(decode_envelope(data).unwrap(), bytes);
            assert_eq!(value["media"]["mimeType"], "audio/pcm;rate=16000");
        }
    }

    #[test]
    fn decodes_partial_transcript() {
        let events = decode_server_message(
            r#"{"serverContent":{"inputTranscription":{"text":"hello"}}}"#,
        )
        .unwrap();
        assert_eq!(events, vec![ServerEvent::PartialTranscript("hello".into())]);
    }

    #[test]
    fn decodes_turn_complete_after_model_text() {
        let events = decode_server_message(
            r#"{"serverContent":{"modelTurn":{"parts":[{"text":"[doorbell]"}]},"turnComplete":true}}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                ServerEvent::ModelText("[doorbell]".into()),
                ServerEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn decodes_setup_ack() {
        let events = decode_server_message(r#"{"setupComplete":{}}"#).unwrap();
        assert_eq!(events, vec![ServerEvent::Connected]);
    }

    #[test]
    fn unknown_message_is_empty_not_error() {
        let events = decode_server_message(r#"{"usageMetadata":{"tokens":3}}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_message_is_an_error() {
        assert!(decode_server_message("not json").is_err());
    }

    #[test]
    fn setup_message_toggles_transcription() {
        let config = LiveConfig {
            model: "models/test".into(),
            system_instruction: "transcribe".into(),
            input_transcription: true,
        };
        let value: serde_json::Value =
            serde_json::from_str(&setup_message(&config)).unwrap();
        assert_eq!(value["setup"]["model"], "models/test");
        assert_eq!(value["setup"]["responseModalities"][0], "AUDIO");
        assert!(value["setup"]["inputAudioTranscription"].is_object());

        let without = LiveConfig {
            input_transcription: false,
            ..config
        };
        let value: serde_json::Value =
            serde_json::from_str(&setup_message(&without)).unwrap();
        assert!(value["setup"].get("inputAudioTranscription").is_none());
    }
}
