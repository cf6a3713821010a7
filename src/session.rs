//! Per-run pipeline state. A [`Session`] owns a private directory under the
//! work dir and carries each step's output to the next one.

use crate::compositor::{self, Compositor, FinalVideo};
use crate::error::{Error, Result};
use crate::media::{self, MediaItem};
use crate::script::{GeneratedScript, ScriptGenerator, ScriptRequest};
use crate::voice::{AudioTrack, VoiceSynthesizer};
use crate::{logi, logok, logw};
use rand::{Rng, distributions::Alphanumeric};
use std::path::{Path, PathBuf};
use tokio::fs;

const SESSIONS_DIR: &str = "sessions";
const UPLOADS_DIR: &str = "uploads";
const SEGMENTS_DIR: &str = "segments";
const AUDIO_FILE: &str = "voiceover.mp3";
const VIDEO_FILE: &str = "final_video.mp4";

/// `YYYYmmdd-HHMMSS-xxxxxx`; sortable by start time, unique enough for
/// concurrent runs sharing a work dir.
pub fn new_session_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!(
        "{}-{}",
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        suffix.to_ascii_lowercase()
    )
}

#[derive(Debug)]
pub struct Session {
    id: String,
    root: PathBuf,
    purge_intermediates: bool,
    script: Option<GeneratedScript>,
    audio: Option<AudioTrack>,
    media: Vec<MediaItem>,
}

impl Session {
    pub async fn create(work_dir: &Path, purge_intermediates: bool) -> Result<Self> {
        let id = new_session_id();
        let root = work_dir.join(SESSIONS_DIR).join(&id);
        fs::create_dir_all(root.join(UPLOADS_DIR)).await?;
        logi(format!("Session {} at {}", id, root.display()));
        Ok(Self {
            id,
            root,
            purge_intermediates,
            script: None,
            audio: None,
            media: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join(SEGMENTS_DIR)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.root.join(AUDIO_FILE)
    }

    pub fn final_video_path(&self) -> PathBuf {
        self.root.join(VIDEO_FILE)
    }

    pub fn script(&self) -> Option<&GeneratedScript> {
        self.script.as_ref()
    }

    pub fn audio(&self) -> Option<&AudioTrack> {
        self.audio.as_ref()
    }

    pub fn media(&self) -> &[MediaItem] {
        &self.media
    }

    /// Generate a fresh script, replacing any previous one. On failure the
    /// previous script is dropped too.
    pub async fn generate_script(
        &mut self,
        generator: &ScriptGenerator,
        request: &ScriptRequest,
    ) -> Result<&GeneratedScript> {
        self.script = None;
        let script = generator.generate(request).await?;
        Ok(self.script.insert(script))
    }

    /// Supply a script produced elsewhere (e.g. edited by hand).
    pub fn set_script(&mut self, script: GeneratedScript) {
        self.script = Some(script);
    }

    /// Voice the pending script. The script is consumed only when the audio
    /// file is safely in place.
    pub async fn generate_voiceover(&mut self, synth: &VoiceSynthesizer) -> Result<&AudioTrack> {
        let script = self.script.as_ref().ok_or(Error::MissingStage("script"))?;
        let track = synth.synthesize_to(script, &self.audio_path()).await?;
        self.script = None;
        Ok(self.audio.insert(track))
    }

    /// Use an existing narration file instead of synthesizing one.
    pub fn attach_audio(&mut self, track: AudioTrack) {
        self.audio = Some(track);
    }

    pub async fn add_upload(&mut self, original_filename: &str, bytes: &[u8]) -> Result<&MediaItem> {
        let item = media::store_upload(&self.uploads_dir(), original_filename, bytes).await?;
        logi(format!("Stored upload {} -> {}", original_filename, item.path.display()));
        self.media.push(item);
        Ok(&self.media[self.media.len() - 1])
    }

    pub async fn import_media(&mut self, source: &Path) -> Result<&MediaItem> {
        let item = media::import_file(&self.uploads_dir(), source)
            .await
            .map_err(|e| Error::media_read(source.display(), e))?;
        logi(format!("Imported {} -> {}", source.display(), item.path.display()));
        self.media.push(item);
        Ok(&self.media[self.media.len() - 1])
    }

    /// Confirm the uploads can be composed before any paid step runs.
    /// Returns how many items will appear in the video.
    pub async fn check_media(&self) -> Result<usize> {
        let sources = Compositor::preflight(&self.media).await?;
        logok(format!("{} media item(s) ready", sources.len()));
        Ok(sources.len())
    }

    /// Compose every upload over the narration into this session's final
    /// video. Scratch segments are always cleared afterwards; uploads and
    /// narration follow the retention setting.
    pub async fn render(&mut self, compositor: &Compositor) -> Result<FinalVideo> {
        let audio = self.audio.clone().ok_or(Error::MissingStage("voiceover"))?;
        let video = compositor
            .compose(&self.media, &audio, &self.segments_dir(), &self.final_video_path())
            .await?;

        fs::remove_dir(self.segments_dir()).await.ok();
        if self.purge_intermediates {
            self.purge().await;
        }
        Ok(video)
    }

    async fn purge(&mut self) {
        compositor::clear_directory_contents(&self.uploads_dir()).await;
        self.media.clear();
        if let Some(track) = self.audio.take() {
            if track.path.starts_with(&self.root) {
                if let Err(e) = fs::remove_file(&track.path).await {
                    logw(format!("Could not remove {}: {}", track.path.display(), e));
                }
            }
        }
        logok(format!("Purged intermediates for session {}", self.id));
    }

    /// End the session. With `purge_intermediates`, everything except the
    /// final video is removed.
    pub async fn close(mut self) -> Result<()> {
        if self.purge_intermediates {
            self.purge().await;
            fs::remove_dir(self.uploads_dir()).await.ok();
        }
        logi(format!("Session {} closed", self.id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatMessage, SpeechRequest, SpeechSynthesis, TextCompletion};
    use crate::config::Config;
    use crate::script::ScriptStyle;
    use async_trait::async_trait;
    use tokio::io::{AsyncWrite, AsyncWriteExt};

    struct EchoTitle;

    #[async_trait]
    impl TextCompletion for EchoTitle {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            Ok(format!("Script from: {}", messages[1].content.lines().next().unwrap_or("")))
        }
    }

    struct FakeSpeech;

    #[async_trait]
    impl SpeechSynthesis for FakeSpeech {
        async fn synthesize(
            &self,
            request: &SpeechRequest,
            out: &mut (dyn AsyncWrite + Unpin + Send),
        ) -> Result<u64> {
            out.write_all(request.text.as_bytes()).await?;
            Ok(request.text.len() as u64)
        }
    }

    #[test]
    fn session_ids_are_distinct_and_shaped() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
        let parts: Vec<&str> = a.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 6);
    }

    #[tokio::test]
    async fn sessions_get_separate_namespaces() {
        let work = tempfile::tempdir().unwrap();
        let a = Session::create(work.path(), false).await.unwrap();
        let b = Session::create(work.path(), false).await.unwrap();

        assert_ne!(a.audio_path(), b.audio_path());
        assert_ne!(a.final_video_path(), b.final_video_path());
        assert!(a.uploads_dir().starts_with(work.path().join("sessions")));
        assert!(fs::metadata(a.uploads_dir()).await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn voiceover_requires_and_consumes_script() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::create(work.path(), false).await.unwrap();
        let synth = VoiceSynthesizer::new(Box::new(FakeSpeech), &Config::default());

        let err = session.generate_voiceover(&synth).await.unwrap_err();
        assert!(matches!(err, Error::MissingStage("script")));

        let generator = ScriptGenerator::new(Box::new(EchoTitle));
        let request = ScriptRequest::from_form("Desk Fan", "quiet", ScriptStyle::Review);
        let script = session.generate_script(&generator, &request).await.unwrap();
        assert!(script.text.contains("'Desk Fan'"));

        let track = session.generate_voiceover(&synth).await.unwrap().clone();
        assert_eq!(track.path, session.audio_path());
        assert!(session.script().is_none());
        let spoken = fs::read_to_string(&track.path).await.unwrap();
        assert!(spoken.starts_with("Script from: Write a 1-minute first-person product review"));
    }

    #[tokio::test]
    async fn render_requires_voiceover() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::create(work.path(), false).await.unwrap();
        session.add_upload("a.png", b"png").await.unwrap();

        let err = session.render(&Compositor::default()).await.unwrap_err();
        assert!(matches!(err, Error::MissingStage("voiceover")));
    }

    #[tokio::test]
    async fn render_without_uploads_is_no_usable_media() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::create(work.path(), false).await.unwrap();
        session.attach_audio(AudioTrack::new(work.path().join("narration.mp3")));

        let err = session.render(&Compositor::default()).await.unwrap_err();
        assert!(matches!(err, Error::NoUsableMedia(_)));
        assert!(fs::metadata(session.final_video_path()).await.is_err());
    }

    #[tokio::test]
    async fn media_check_fails_before_any_script_exists() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::create(work.path(), false).await.unwrap();
        session.add_upload("notes.txt", b"not media").await.unwrap();

        let err = session.check_media().await.unwrap_err();
        assert!(matches!(err, Error::NoUsableMedia(_)));
        assert!(session.script().is_none());
        assert!(session.audio().is_none());
    }

    #[tokio::test]
    async fn uploads_with_same_name_are_both_kept() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::create(work.path(), false).await.unwrap();

        session.add_upload("photo.jpg", b"one").await.unwrap();
        session.add_upload("photo.jpg", b"two").await.unwrap();

        let paths: Vec<PathBuf> = session.media().iter().map(|m| m.path.clone()).collect();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
        assert_eq!(fs::read(&paths[0]).await.unwrap(), b"one");
        assert_eq!(fs::read(&paths[1]).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn close_with_purge_removes_intermediates() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::create(work.path(), true).await.unwrap();
        session.add_upload("clip.mp4", b"data").await.unwrap();
        let synth = VoiceSynthesizer::new(Box::new(FakeSpeech), &Config::default());
        session.set_script(GeneratedScript::new("narration"));
        let audio = session.generate_voiceover(&synth).await.unwrap().path.clone();
        let uploads = session.uploads_dir();
        let root = session.root().to_path_buf();

        session.close().await.unwrap();

        assert!(fs::metadata(&audio).await.is_err());
        assert!(fs::metadata(&uploads).await.is_err());
        assert!(fs::metadata(&root).await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn close_without_purge_retains_files() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::create(work.path(), false).await.unwrap();
        let item = session.add_upload("clip.mp4", b"data").await.unwrap().path.clone();

        session.close().await.unwrap();
        assert!(fs::metadata(&item).await.is_ok());
    }
}
