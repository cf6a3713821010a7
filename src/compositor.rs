//! Media normalizer and compositor: heterogeneous uploads plus one narration
//! track in, one encoded MP4 out.

use crate::clip_plan::{self, Canvas, Clip, ClipTiming, OUTPUT_FPS, SourceInfo};
use crate::error::{Error, Result};
use crate::ffmpeg;
use crate::media::{MediaItem, MediaKind};
use crate::voice::AudioTrack;
use crate::{logi, logok, logw};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalVideo {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Compositor {
    timing: ClipTiming,
}

impl Compositor {
    pub fn new(timing: ClipTiming) -> Self {
        Self { timing }
    }

    /// Items whose extension we can compose, in input order. Everything else
    /// is skipped with a warning.
    pub fn usable_items(items: &[MediaItem]) -> Vec<(&MediaItem, MediaKind)> {
        items
            .iter()
            .filter_map(|item| match item.kind() {
                Some(kind) => Some((item, kind)),
                None => {
                    logw(format!("Skipping unsupported file: {}", item.original_filename));
                    None
                }
            })
            .collect()
    }

    /// Open and probe every usable item. A recognised file that cannot be
    /// read or probed fails the whole run, naming that file.
    pub async fn probe_sources(items: &[(&MediaItem, MediaKind)]) -> Result<Vec<SourceInfo>> {
        let mut sources = Vec::with_capacity(items.len());
        for (item, kind) in items {
            let label = item.original_filename.clone();
            fs::File::open(&item.path)
                .await
                .map_err(|e| Error::media_read(&label, e))?;

            let probe = ffmpeg::ffprobe_video(&item.path)
                .await
                .map_err(|e| blame_source(&label, e))?;
            let duration = match kind {
                MediaKind::Video => Some(probe.duration.ok_or_else(|| {
                    Error::media_read(&label, "no duration reported for the video stream")
                })?),
                MediaKind::Image => None,
            };

            sources.push(SourceInfo {
                path: item.path.clone(),
                label,
                kind: *kind,
                width: probe.width,
                height: probe.height,
                duration,
            });
        }
        Ok(sources)
    }

    /// Everything `compose` checks before rendering: at least one usable item
    /// and every usable item readable.
    pub async fn preflight(items: &[MediaItem]) -> Result<Vec<SourceInfo>> {
        let usable = Self::usable_items(items);
        if usable.is_empty() {
            return Err(Error::NoUsableMedia(format!(
                "{} item(s) supplied, none of them an image or video",
                items.len()
            )));
        }
        Self::probe_sources(&usable).await
    }

    /// Compose `items` over `audio` into `output`. Segments are rendered into
    /// `scratch_dir`, which is emptied again once the output is in place.
    pub async fn compose(
        &self,
        items: &[MediaItem],
        audio: &AudioTrack,
        scratch_dir: &Path,
        output: &Path,
    ) -> Result<FinalVideo> {
        let sources = Self::preflight(items).await?;

        let audio_label = audio.path.display().to_string();
        fs::File::open(&audio.path)
            .await
            .map_err(|e| Error::media_read(&audio_label, e))?;
        let audio_seconds = if self.timing.needs_audio_duration() {
            Some(
                ffmpeg::ffprobe_duration_seconds(&audio.path)
                    .await
                    .map_err(|e| blame_source(&audio_label, e))?,
            )
        } else {
            None
        };

        let per_clip = self.timing.per_clip_seconds(sources.len(), audio_seconds);
        let clips = clip_plan::plan_clips(&sources, per_clip);
        let canvas = clip_plan::canvas_for(&clips);
        logi(format!(
            "Composing {} clip(s) at {:.2}s each on a {}x{} canvas ({:.2}s total)",
            clips.len(),
            per_clip,
            canvas.width,
            canvas.height,
            clip_plan::total_duration(&clips)
        ));

        self.render(&clips, canvas, audio, scratch_dir, output).await?;
        logok(format!("Final video written: {}", output.display()));
        Ok(FinalVideo {
            path: output.to_path_buf(),
        })
    }

    async fn render(
        &self,
        clips: &[Clip],
        canvas: Canvas,
        audio: &AudioTrack,
        scratch_dir: &Path,
        output: &Path,
    ) -> Result<()> {
        fs::create_dir_all(scratch_dir)
            .await
            .map_err(|e| render_io("create scratch dir", scratch_dir, e))?;
        let list_path = scratch_dir.join("concat_list.txt");
        let mut listf = fs::File::create(&list_path)
            .await
            .map_err(|e| render_io("create segment list", &list_path, e))?;

        for (idx, clip) in clips.iter().enumerate() {
            let segment = scratch_dir.join(format!("segment_{:03}.mp4", idx + 1));
            logi(format!(
                "Rendering clip {}/{}: {} ({:.2}s, {} frames)",
                idx + 1,
                clips.len(),
                clip.label,
                clip.duration,
                clip.frames
            ));
            ffmpeg::ffmpeg_render_segment(clip, canvas, &segment)
                .await
                .map_err(|e| Error::Render(format!("clip {} ({}): {}", idx + 1, clip.label, e)))?;

            listf
                .write_all(concat_entry(&segment, scratch_dir).as_bytes())
                .await
                .map_err(|e| render_io("write segment list", &list_path, e))?;
        }
        listf
            .flush()
            .await
            .map_err(|e| render_io("write segment list", &list_path, e))?;
        drop(listf);

        let out_dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| render_io("create output dir", &out_dir, e))?;
        let temp_out = tempfile::Builder::new()
            .prefix(".render-")
            .suffix(".mp4")
            .tempfile_in(&out_dir)
            .map_err(|e| render_io("create temp output in", &out_dir, e))?
            .into_temp_path();

        let video_seconds = clip_plan::total_frames(clips) as f64 / OUTPUT_FPS as f64;
        ffmpeg::ffmpeg_concat_with_audio(&list_path, &audio.path, video_seconds, &temp_out)
            .await
            .map_err(|e| Error::Render(e.to_string()))?;
        let size = fs::metadata(&temp_out).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(Error::Render("encoder produced an empty file".to_string()));
        }
        temp_out
            .persist(output)
            .map_err(|e| Error::Render(format!("could not move output into place: {}", e.error)))?;

        clear_directory_contents(scratch_dir).await;
        Ok(())
    }
}

/// A tool that never started says nothing about the file it was pointed at.
fn blame_source(label: &str, err: Error) -> Error {
    match err {
        Error::ToolUnavailable(_) => err,
        other => Error::media_read(label, other),
    }
}

fn render_io(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::Render(format!("could not {} {}: {}", action, path.display(), err))
}

/// One concat-demuxer line. Paths are written relative to the list file.
fn concat_entry(segment: &Path, list_dir: &Path) -> String {
    let rel = pathdiff::diff_paths(segment, list_dir).unwrap_or_else(|| segment.to_path_buf());
    let escaped = rel.display().to_string().replace('\'', "'\\''");
    format!("file '{}'\n", escaped)
}

pub(crate) async fn clear_directory_contents(dir_path: &Path) {
    if fs::metadata(dir_path).await.is_err() {
        return;
    }

    for entry in walkdir::WalkDir::new(dir_path)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir(path).await.ok();
        } else {
            fs::remove_file(path).await.ok();
        }
    }
}
