use crate::api::{SpeechRequest, SpeechSynthesis};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logw;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// MP3, 44.1 kHz, 128 kbps.
pub const MP3_44100_128: &str = "mp3_44100_128";

pub struct ElevenLabsTts {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl ElevenLabsTts {
    pub fn new(client: Client, cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            api_key: cfg.require_elevenlabs_key()?.to_string(),
            base_url: cfg.elevenlabs_base_url.trim_end_matches('/').to_string(),
            timeout: cfg.request_timeout(),
        })
    }

    fn endpoint(&self, request: &SpeechRequest) -> String {
        format!(
            "{}/text-to-speech/{}?output_format={}",
            self.base_url, request.voice_id, request.output_format
        )
    }
}

#[async_trait]
impl SpeechSynthesis for ElevenLabsTts {
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let body = serde_json::json!({
            "text": request.text,
            "model_id": request.model_id,
        });

        let mut resp = self
            .client
            .post(self.endpoint(request))
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("ElevenLabs request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            logw(format!("ElevenLabs TTS failed HTTP {}", status.as_u16()));
            return Err(Error::Synthesis(format!(
                "HTTP {}: {}",
                status.as_u16(),
                detail.chars().take(400).collect::<String>()
            )));
        }

        let mut written = 0u64;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Error::Synthesis(format!("audio stream interrupted: {}", e)))?
        {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_voice_and_format() {
        let cfg = Config {
            elevenlabs_key: "xi-test".to_string(),
            ..Config::default()
        };
        let tts = ElevenLabsTts::new(Client::new(), &cfg).unwrap();
        let request = SpeechRequest {
            voice_id: cfg.eleven_voice_id.clone(),
            model_id: cfg.eleven_model_id.clone(),
            text: "hello".to_string(),
            output_format: MP3_44100_128.to_string(),
        };
        assert_eq!(
            tts.endpoint(&request),
            "https://api.elevenlabs.io/v1/text-to-speech/uYXf8XasLslADfZ2MB4u?output_format=mp3_44100_128"
        );
    }

    #[test]
    fn constructor_requires_key() {
        assert!(ElevenLabsTts::new(Client::new(), &Config::default()).is_err());
    }
}
