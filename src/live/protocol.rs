//! Gemini Live API protocol types
//!
//! JSON messages exchanged over the `BidiGenerateContent` WebSocket.
//!
//! # Protocol Overview
//!
//! 1. Connect to the `BidiGenerateContent` endpoint
//! 2. Send `setup` (model, voice, system instruction, transcription)
//! 3. Receive `setupComplete`
//! 4. Stream microphone audio via `realtimeInput.mediaChunks`
//! 5. Receive `serverContent` carrying audio parts, transcripts and the
//!    `interrupted` / `turnComplete` flags
//!
//! Server messages are loosely shaped (every field optional), so they are
//! flattened into [`InboundEvent`] at this boundary and nothing untyped
//! travels further into the engine.

use serde::{Deserialize, Serialize};

/// Gemini Live WebSocket endpoint (API key appended as `?key=`)
pub const LIVE_API_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio model for interview practice
pub const DEFAULT_LIVE_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

/// Default prebuilt voice of the interviewer
pub const DEFAULT_VOICE: &str = "Puck";

/// Base64 audio payload with its format tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub mime_type: String,
    pub data: String,
}

// ============================================================================
// Client Messages (sent TO Gemini)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Output modalities - the coach answers with audio
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

/// Empty object enabling transcription of one direction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioTranscriptionConfig {}

/// Session setup sent as the first message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupConfig {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
}

impl SetupConfig {
    /// Audio-out interview session with transcripts captured both ways
    pub fn interview(model: &str, voice: &str, system_instruction: &str) -> Self {
        Self {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                },
            },
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: system_instruction.to_string(),
                }],
            },
            input_audio_transcription: Some(AudioTranscriptionConfig {}),
            output_audio_transcription: Some(AudioTranscriptionConfig {}),
        }
    }

    pub fn instruction_text(&self) -> &str {
        self.system_instruction
            .parts
            .first()
            .map(|p| p.text.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaBlob>,
}

/// Messages sent from client to the Live API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupConfig),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    pub fn setup(config: SetupConfig) -> Self {
        Self::Setup(config)
    }

    /// Wrap one encoded microphone chunk
    pub fn realtime_audio(blob: MediaBlob) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![blob],
        })
    }
}

// ============================================================================
// Server Messages (received FROM Gemini)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<MediaBlob>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

/// Raw server message. Exactly one top-level field is normally present;
/// fields this client does not use (tool calls, usage) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

/// Who produced a transcript fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    /// The job seeker (input transcription)
    You,
    /// The interviewer agent (output transcription)
    Coach,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::You => "You",
            Speaker::Coach => "Coach",
        }
    }
}

/// Typed inbound events consumed by the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    TranscriptFragment { speaker: Speaker, text: String },
    AudioFragment(MediaBlob),
    /// The user started talking over the agent
    Interrupted,
    TurnComplete,
    /// Server announced it will close the connection soon
    GoAway { time_left: Option<String> },
    Closed { reason: Option<String> },
    Error { message: String },
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Flatten into typed events, in the order the controller applies them:
    /// transcripts, then audio, then interruption.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        if let Some(content) = self.server_content {
            if let Some(t) = content.output_transcription {
                events.push(InboundEvent::TranscriptFragment {
                    speaker: Speaker::Coach,
                    text: t.text,
                });
            }
            if let Some(t) = content.input_transcription {
                events.push(InboundEvent::TranscriptFragment {
                    speaker: Speaker::You,
                    text: t.text,
                });
            }
            if let Some(turn) = content.model_turn {
                events.extend(
                    turn.parts
                        .into_iter()
                        .filter_map(|p| p.inline_data)
                        .filter(|blob| blob.mime_type.starts_with("audio/"))
                        .map(InboundEvent::AudioFragment),
                );
            }
            if content.interrupted {
                events.push(InboundEvent::Interrupted);
            }
            if content.turn_complete {
                events.push(InboundEvent::TurnComplete);
            }
        }

        if let Some(go_away) = self.go_away {
            events.push(InboundEvent::GoAway {
                time_left: go_away.time_left,
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_serialization() {
        let msg = ClientMessage::setup(SetupConfig::interview(
            DEFAULT_LIVE_MODEL,
            DEFAULT_VOICE,
            "Be strict",
        ));
        let json = serde_json::to_value(&msg).unwrap();

        let setup = &json["setup"];
        assert_eq!(setup["model"], DEFAULT_LIVE_MODEL);
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
        assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "Be strict");
        assert!(setup["inputAudioTranscription"].is_object());
        assert!(setup["outputAudioTranscription"].is_object());
    }

    #[test]
    fn test_realtime_audio_serialization() {
        let msg = ClientMessage::realtime_audio(MediaBlob {
            mime_type: "audio/pcm;rate=16000".to_string(),
            data: "AAAA".to_string(),
        });
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"realtimeInput\""));
        assert!(json.contains("\"mediaChunks\":[{"));
        assert!(json.contains("\"mimeType\":\"audio/pcm;rate=16000\""));
        assert!(json.contains("\"data\":\"AAAA\""));
    }

    #[test]
    fn test_setup_complete_deserialization() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert!(msg.is_setup_complete());
        assert!(msg.into_events().is_empty());
    }

    #[test]
    fn test_server_content_audio_and_transcripts() {
        let json = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
                        {"text": "thinking"}
                    ]
                },
                "outputTranscription": {"text": "Tell me about yourself."},
                "inputTranscription": {"text": "Hello"}
            }
        }"#;

        let events = serde_json::from_str::<ServerMessage>(json)
            .unwrap()
            .into_events();

        assert_eq!(
            events,
            vec![
                InboundEvent::TranscriptFragment {
                    speaker: Speaker::Coach,
                    text: "Tell me about yourself.".to_string()
                },
                InboundEvent::TranscriptFragment {
                    speaker: Speaker::You,
                    text: "Hello".to_string()
                },
                InboundEvent::AudioFragment(MediaBlob {
                    mime_type: "audio/pcm;rate=24000".to_string(),
                    data: "AAA=".to_string()
                }),
            ]
        );
    }

    #[test]
    fn test_interrupted_and_turn_complete() {
        let json = r#"{"serverContent": {"interrupted": true}}"#;
        let events = serde_json::from_str::<ServerMessage>(json)
            .unwrap()
            .into_events();
        assert_eq!(events, vec![InboundEvent::Interrupted]);

        let json = r#"{"serverContent": {"turnComplete": true}}"#;
        let events = serde_json::from_str::<ServerMessage>(json)
            .unwrap()
            .into_events();
        assert_eq!(events, vec![InboundEvent::TurnComplete]);
    }

    #[test]
    fn test_go_away() {
        let json = r#"{"goAway": {"timeLeft": "10s"}}"#;
        let events = serde_json::from_str::<ServerMessage>(json)
            .unwrap()
            .into_events();
        assert_eq!(
            events,
            vec![InboundEvent::GoAway {
                time_left: Some("10s".to_string())
            }]
        );
    }

    #[test]
    fn test_unknown_message_yields_no_events() {
        let json = r#"{"usageMetadata": {"totalTokenCount": 42}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(!msg.is_setup_complete());
        assert!(msg.into_events().is_empty());
    }

    #[test]
    fn test_non_audio_inline_data_is_ignored() {
        let json = r#"{"serverContent": {"modelTurn": {"parts": [
            {"inlineData": {"mimeType": "image/png", "data": "AAA="}}
        ]}}}"#;
        let events = serde_json::from_str::<ServerMessage>(json)
            .unwrap()
            .into_events();
        assert!(events.is_empty());
    }
}
