//! Serverless speech endpoint backend.
//!
//! Sends `POST {endpoint}/runsync` with
//! `{"input": {"text", "voice_id", "output_format": "mp3", "mp3_bitrate"}}`
//! and expects `{"status": "COMPLETED", "output": {"audio_base64", "tokens"}}`.

use crate::defaults;
use crate::error::{Result, VoxcastError};
use crate::synth::{SynthesisOutput, Synthesizer};
use crate::transcript::TranscriptWord;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    input: SynthesisInput<'a>,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
    voice_id: &'a str,
    output_format: &'static str,
    mp3_bitrate: u32,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<SynthesisPayload>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SynthesisPayload {
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    tokens: Vec<TranscriptWord>,
    #[serde(default)]
    duration_seconds: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Synthesizer backed by a serverless speech endpoint.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    voice_id: String,
    mp3_bitrate: u32,
}

impl HttpSynthesizer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: None,
            voice_id: defaults::DEFAULT_VOICE.to_string(),
            mp3_bitrate: defaults::DEFAULT_MP3_BITRATE,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Voice to request. `"default"` maps to the built-in default voice.
    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        let voice_id = voice_id.into();
        self.voice_id = if voice_id == "default" {
            defaults::DEFAULT_VOICE.to_string()
        } else {
            voice_id
        };
        self
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.mp3_bitrate = kbps;
        self
    }

    fn run_url(&self) -> String {
        format!("{}/runsync", self.endpoint)
    }

    fn request_body<'a>(&'a self, text: &'a str) -> RunRequest<'a> {
        RunRequest {
            input: SynthesisInput {
                text,
                voice_id: &self.voice_id,
                output_format: "mp3",
                mp3_bitrate: self.mp3_bitrate,
            },
        }
    }

    /// Turns a decoded response into audio and timings.
    fn parse_response(&self, response: RunResponse) -> Result<SynthesisOutput> {
        if let Some(error) = response.error {
            return Err(VoxcastError::Synthesis { message: error });
        }
        if let Some(status) = response.status.as_deref()
            && status != "COMPLETED"
        {
            return Err(VoxcastError::Synthesis {
                message: format!("job finished with status {}", status),
            });
        }

        let payload = response.output.unwrap_or_default();
        if let Some(error) = payload.error {
            return Err(VoxcastError::Synthesis { message: error });
        }
        let encoded = payload.audio_base64.ok_or_else(|| VoxcastError::Synthesis {
            message: "response is missing audio_base64".to_string(),
        })?;
        let audio = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| VoxcastError::Synthesis {
                message: format!("invalid audio_base64: {}", e),
            })?;

        let words: Vec<TranscriptWord> = payload
            .tokens
            .into_iter()
            .filter(|t| !t.text.trim().is_empty())
            .collect();

        let duration_seconds = payload
            .duration_seconds
            .or_else(|| words.last().map(|w| w.end_ts))
            .unwrap_or_else(|| self.estimate_duration(audio.len()));

        Ok(SynthesisOutput {
            audio,
            words,
            duration_seconds,
        })
    }

    /// Constant-bitrate estimate: bytes / (kbps * 1000 / 8).
    fn estimate_duration(&self, bytes: usize) -> f64 {
        let bytes_per_second = f64::from(self.mp3_bitrate) * 1000.0 / 8.0;
        if bytes_per_second > 0.0 {
            bytes as f64 / bytes_per_second
        } else {
            0.0
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesisOutput> {
        if text.trim().is_empty() {
            return Err(VoxcastError::Synthesis {
                message: "no text provided".to_string(),
            });
        }

        tracing::debug!(
            voice = %self.voice_id,
            bitrate = self.mp3_bitrate,
            text_len = text.len(),
            "requesting synthesis"
        );

        let mut request = self
            .client
            .post(self.run_url())
            .timeout(REQUEST_TIMEOUT)
            .json(&self.request_body(text));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| VoxcastError::Synthesis {
            message: format!("request failed: {}", e),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoxcastError::Synthesis {
                message: format!("endpoint returned {}: {}", status, body.trim()),
            });
        }

        let decoded: RunResponse = response.json().await.map_err(|e| VoxcastError::Synthesis {
            message: format!("invalid response body: {}", e),
        })?;

        let output = self.parse_response(decoded)?;
        tracing::debug!(
            bytes = output.audio.len(),
            words = output.words.len(),
            duration = output.duration_seconds,
            "synthesis complete"
        );
        Ok(output)
    }

    fn name(&self) -> &str {
        "http"
    }
}
