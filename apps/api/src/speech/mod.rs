//! Speech client: transcription and synthesis through Deepgram's REST API.
//!
//! Audio crosses the HTTP boundary as data URIs (`data:<mime>;base64,<payload>`),
//! the same shape a browser `FileReader.readAsDataURL` produces.

use std::time::Duration;

use base64::prelude::*;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const LISTEN_URL: &str = "https://api.deepgram.com/v1/listen?model=nova-2&smart_format=true&detect_language=true";
const SPEAK_URL: &str = "https://api.deepgram.com/v1/speak?model=aura-asteria-en";
const SYNTHESIZED_MIME: &str = "audio/mpeg";

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed audio data URI: {0}")]
    InvalidDataUri(String),

    #[error("Speech provider returned no transcript")]
    NoTranscript,
}

/// Decoded audio ready to send to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub mime: String,
    pub bytes: Bytes,
}

impl AudioPayload {
    pub fn from_data_uri(uri: &str) -> Result<Self, SpeechError> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| SpeechError::InvalidDataUri("missing 'data:' scheme".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| SpeechError::InvalidDataUri("missing ',' separator".to_string()))?;
        if !header.ends_with(";base64") {
            return Err(SpeechError::InvalidDataUri(
                "only base64 payloads are supported".to_string(),
            ));
        }
        // "audio/webm;codecs=opus;base64" -> "audio/webm"
        let mime = header.split(';').next().unwrap_or_default();
        if !mime.starts_with("audio/") {
            return Err(SpeechError::InvalidDataUri(format!(
                "expected an audio mime type, got '{mime}'"
            )));
        }
        let bytes = BASE64_STANDARD
            .decode(payload)
            .map_err(|e| SpeechError::InvalidDataUri(e.to_string()))?;
        if bytes.is_empty() {
            return Err(SpeechError::InvalidDataUri("empty audio payload".to_string()));
        }
        Ok(Self {
            mime: mime.to_string(),
            bytes: Bytes::from(bytes),
        })
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64_STANDARD.encode(&self.bytes))
    }
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    transcript: String,
}

impl ListenResponse {
    fn transcript(self) -> Option<String> {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
    }
}

#[derive(Clone)]
pub struct SpeechClient {
    client: Client,
    api_key: String,
}

impl SpeechClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, SpeechError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
        })
    }

    /// Converts recorded audio to text. A blank transcript is returned as-is;
    /// deciding what silence means is the caller's business.
    pub async fn transcribe(&self, audio: &AudioPayload) -> Result<String, SpeechError> {
        let response = self
            .client
            .post(LISTEN_URL)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", &audio.mime)
            .body(audio.bytes.clone())
            .send()
            .await?;

        let response = check_status(response).await?;
        let parsed: ListenResponse = response.json().await?;
        let transcript = parsed.transcript().ok_or(SpeechError::NoTranscript)?;
        debug!("Transcribed {} bytes into {} chars", audio.bytes.len(), transcript.len());
        Ok(transcript)
    }

    /// Synthesizes spoken audio. `None` when the provider answers with no audio.
    pub async fn synthesize(&self, text: &str) -> Result<Option<AudioPayload>, SpeechError> {
        let response = self
            .client
            .post(SPEAK_URL)
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&json!({ "text": text }))
            .send()
            .await?;

        let response = check_status(response).await?;
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("audio/"))
            .unwrap_or_else(|| SYNTHESIZED_MIME.to_string());
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(AudioPayload { mime, bytes }))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SpeechError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SpeechError::Api {
        status: status.as_u16(),
        message,
    })
}
