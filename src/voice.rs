use crate::api::{SpeechRequest, SpeechSynthesis};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::script::GeneratedScript;
use crate::{logi, logok};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Narration audio on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub path: PathBuf,
}

impl AudioTrack {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub struct VoiceSynthesizer {
    backend: Box<dyn SpeechSynthesis>,
    voice_id: String,
    model_id: String,
    output_format: String,
}

impl VoiceSynthesizer {
    pub fn new(backend: Box<dyn SpeechSynthesis>, cfg: &Config) -> Self {
        Self {
            backend,
            voice_id: cfg.eleven_voice_id.clone(),
            model_id: cfg.eleven_model_id.clone(),
            output_format: crate::api::elevenlabs::MP3_44100_128.to_string(),
        }
    }

    /// Synthesize `script` into `dest`. The stream lands in a temp file next to
    /// `dest` and is renamed over it only once complete, so a failed run never
    /// leaves a truncated file and never clobbers the previous narration.
    pub async fn synthesize_to(&self, script: &GeneratedScript, dest: &Path) -> Result<AudioTrack> {
        if script.text.trim().is_empty() {
            return Err(Error::Synthesis("script text is empty".to_string()));
        }

        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).await?;

        let (std_file, temp_path) = tempfile::Builder::new()
            .prefix(".voiceover-")
            .suffix(".part")
            .tempfile_in(&dir)?
            .into_parts();
        let mut file = fs::File::from_std(std_file);

        let request = SpeechRequest {
            voice_id: self.voice_id.clone(),
            model_id: self.model_id.clone(),
            text: script.text.clone(),
            output_format: self.output_format.clone(),
        };

        logi(format!(
            "Synthesizing narration ({} chars, voice {}) -> {}",
            script.text.len(),
            self.voice_id,
            dest.display()
        ));
        let written = self.backend.synthesize(&request, &mut file).await?;
        if written == 0 {
            return Err(Error::Synthesis("service returned an empty audio stream".to_string()));
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp_path.persist(dest).map_err(|e| Error::Io(e.error))?;
        logok(format!("Voiceover written: {} ({} bytes)", dest.display(), written));
        Ok(AudioTrack::new(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::AsyncWrite;

    struct ChunkedSpeech {
        chunks: Vec<&'static str>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl SpeechSynthesis for ChunkedSpeech {
        async fn synthesize(
            &self,
            _request: &SpeechRequest,
            out: &mut (dyn AsyncWrite + Unpin + Send),
        ) -> Result<u64> {
            let mut written = 0u64;
            for (i, chunk) in self.chunks.iter().enumerate() {
                if self.fail_after == Some(i) {
                    return Err(Error::Synthesis("audio stream interrupted".to_string()));
                }
                out.write_all(chunk.as_bytes()).await?;
                written += chunk.len() as u64;
            }
            Ok(written)
        }
    }

    fn synthesizer(chunks: Vec<&'static str>, fail_after: Option<usize>) -> VoiceSynthesizer {
        VoiceSynthesizer::new(Box::new(ChunkedSpeech { chunks, fail_after }), &Config::default())
    }

    async fn leftover_parts(dir: &Path) -> usize {
        let mut count = 0;
        let mut entries = fs::read_dir(dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().ends_with(".part") {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn chunks_are_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voiceover.mp3");
        let synth = synthesizer(vec!["ID3", "-frame1", "-frame2"], None);

        let track = synth
            .synthesize_to(&GeneratedScript::new("hello there"), &dest)
            .await
            .unwrap();

        assert_eq!(track.path, dest);
        assert_eq!(fs::read(&dest).await.unwrap(), b"ID3-frame1-frame2");
        assert_eq!(leftover_parts(dir.path()).await, 0);
    }

    #[tokio::test]
    async fn interrupted_stream_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voiceover.mp3");
        fs::write(&dest, b"previous narration").await.unwrap();

        let synth = synthesizer(vec!["ID3", "-frame1", "-frame2"], Some(2));
        let err = synth
            .synthesize_to(&GeneratedScript::new("hello there"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Synthesis(_)));
        assert_eq!(fs::read(&dest).await.unwrap(), b"previous narration");
        assert_eq!(leftover_parts(dir.path()).await, 0);
    }

    #[tokio::test]
    async fn empty_stream_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voiceover.mp3");
        let synth = synthesizer(vec![], None);

        let err = synth
            .synthesize_to(&GeneratedScript::new("hello there"), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Synthesis(_)));
        assert!(fs::metadata(&dest).await.is_err());
    }

    #[tokio::test]
    async fn successive_runs_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voiceover.mp3");

        synthesizer(vec!["first"], None)
            .synthesize_to(&GeneratedScript::new("one"), &dest)
            .await
            .unwrap();
        synthesizer(vec!["second"], None)
            .synthesize_to(&GeneratedScript::new("two"), &dest)
            .await
            .unwrap();

        assert_eq!(fs::read(&dest).await.unwrap(), b"second");
    }
}
