use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::audio::write_pcm_wav;
use crate::capability::{CapabilityResult, VoiceSynthesizer};
use crate::error::CapabilityError;

const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io";
const PCM_SAMPLE_RATE: u32 = 22050;

/// ElevenLabs text-to-speech. Audio is requested as raw PCM and written out
/// as a WAV so its duration can be read back for caption timing.
#[derive(Debug, Clone)]
pub struct ElevenLabsSynthesizer {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: ELEVENLABS_API_BASE.to_string(),
            client: Client::new(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl VoiceSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str, out: &Path) -> CapabilityResult<PathBuf> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CapabilityError::Unavailable("ELEVENLABS_API_KEY not set".to_string()))?;
        if text.trim().is_empty() {
            return Err(CapabilityError::Malformed("nothing to narrate".to_string()));
        }

        info!("Calling ElevenLabs TTS ({} chars, voice {})", text.len(), voice_id);
        let response = self
            .client
            .post(format!("{}/v1/text-to-speech/{}", self.base_url, voice_id))
            .query(&[("output_format", format!("pcm_{}", PCM_SAMPLE_RATE))])
            .header("xi-api-key", api_key)
            .json(&json!({
                "text": text,
                "model_id": "eleven_monolingual_v1",
                "voice_settings": { "stability": 0.5, "similarity_boost": 0.7 }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let pcm = response.bytes().await?;
        let wav = out.to_path_buf();
        tokio::task::spawn_blocking(move || write_pcm_wav(&wav, &pcm, PCM_SAMPLE_RATE))
            .await
            .map_err(|e| CapabilityError::Malformed(format!("PCM writer stopped: {}", e)))?
            .map_err(|e| CapabilityError::Malformed(format!("bad PCM payload: {}", e)))?;
        info!("Narration written to {}", out.display());
        Ok(out.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_a_skip() {
        let tts = ElevenLabsSynthesizer::new(None);
        let err = tts
            .synthesize("hello", "voice", Path::new("/nonexistent/vo.wav"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
