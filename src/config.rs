use crate::clip_plan::ClipTiming;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const ELEVEN_KEY_ENV: &str = "ELEVEN_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "open_api_key")]
    #[serde(default)]
    pub openai_key: String,
    #[serde(rename = "elevenlabs_api_key")]
    #[serde(default)]
    pub elevenlabs_key: String,
    #[serde(default = "default_voice_id")]
    pub eleven_voice_id: String,
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_elevenlabs_base_url")]
    pub elevenlabs_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default)]
    pub clip_timing: ClipTiming,
    #[serde(default)]
    pub purge_intermediates: bool,
}

fn default_voice_id() -> String {
    "uYXf8XasLslADfZ2MB4u".to_string()
}

fn default_model_id() -> String {
    "eleven_monolingual_v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_elevenlabs_base_url() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: String::new(),
            elevenlabs_key: String::new(),
            eleven_voice_id: default_voice_id(),
            eleven_model_id: default_model_id(),
            openai_model: default_openai_model(),
            openai_base_url: default_openai_base_url(),
            elevenlabs_base_url: default_elevenlabs_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            work_dir: default_work_dir(),
            clip_timing: ClipTiming::default(),
            purge_intermediates: false,
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields defaults plus
    /// environment keys.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if fs::metadata(&path).await.is_ok() {
            return Self::load(path).await;
        }
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(OPENAI_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.openai_key = key.trim().to_string();
        }
        if let Some(key) = lookup(ELEVEN_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.elevenlabs_key = key.trim().to_string();
        }
    }

    pub fn require_openai_key(&self) -> Result<&str> {
        if self.openai_key.is_empty() {
            anyhow::bail!("config.json: open_api_key missing (or set {})", OPENAI_KEY_ENV);
        }
        Ok(&self.openai_key)
    }

    pub fn require_elevenlabs_key(&self) -> Result<&str> {
        if self.elevenlabs_key.is_empty() {
            anyhow::bail!("config.json: elevenlabs_api_key missing (or set {})", ELEVEN_KEY_ENV);
        }
        Ok(&self.elevenlabs_key)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"open_api_key": "sk-test"}"#).unwrap();

        assert_eq!(config.openai_key, "sk-test");
        assert!(config.elevenlabs_key.is_empty());
        assert_eq!(config.eleven_voice_id, "uYXf8XasLslADfZ2MB4u");
        assert_eq!(config.eleven_model_id, "eleven_monolingual_v1");
        assert_eq!(config.openai_model, "gpt-3.5-turbo");
        assert_eq!(config.work_dir, PathBuf::from("work"));
        assert_eq!(config.clip_timing, ClipTiming::Fixed);
        assert!(!config.purge_intermediates);
    }

    #[test]
    fn clip_timing_parses_snake_case() {
        let config: Config =
            serde_json::from_str(r#"{"clip_timing": "match_audio", "purge_intermediates": true}"#)
                .unwrap();
        assert_eq!(config.clip_timing, ClipTiming::MatchAudio);
        assert!(config.purge_intermediates);
    }

    #[test]
    fn environment_overrides_file_keys() {
        let mut config = Config {
            openai_key: "from-file".to_string(),
            ..Config::default()
        };
        config.apply_env(|key| match key {
            OPENAI_KEY_ENV => Some(" from-env ".to_string()),
            ELEVEN_KEY_ENV => Some("   ".to_string()),
            _ => None,
        });

        assert_eq!(config.openai_key, "from-env");
        assert!(config.elevenlabs_key.is_empty());
        assert!(config.require_openai_key().is_ok());

        let err = config.require_elevenlabs_key().unwrap_err();
        assert!(err.to_string().contains("elevenlabs_api_key"));
    }

    #[tokio::test]
    async fn load_reports_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").await.unwrap();

        let err = Config::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[tokio::test]
    async fn load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(config.request_timeout_secs, 120);
    }
}
