//! Seams to the external text and speech services.

pub mod elevenlabs;
pub mod openai;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWrite;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Any chat-completion provider.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub voice_id: String,
    pub model_id: String,
    pub text: String,
    pub output_format: String,
}

/// Any text-to-speech provider that streams encoded audio.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    /// Write the encoded audio into `out` chunk by chunk, in order. Returns the
    /// number of bytes written.
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64>;
}
