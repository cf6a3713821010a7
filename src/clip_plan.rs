//! Clip timing and geometry. Pure arithmetic; nothing here touches disk.

use crate::media::MediaKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const TARGET_WIDTH: u32 = 720;
pub const OUTPUT_FPS: u32 = 24;
pub const MIN_CLIP_SECONDS: f64 = 3.0;
pub const NOMINAL_TOTAL_SECONDS: f64 = 60.0;

/// How the per-clip display time is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipTiming {
    /// `max(3.0, 60.0 / n)` regardless of narration length.
    #[default]
    Fixed,
    /// Narration duration split evenly across the items.
    MatchAudio,
}

impl ClipTiming {
    pub fn needs_audio_duration(self) -> bool {
        matches!(self, ClipTiming::MatchAudio)
    }

    pub fn per_clip_seconds(self, n: usize, audio_seconds: Option<f64>) -> f64 {
        match (self, audio_seconds) {
            (ClipTiming::MatchAudio, Some(audio)) if audio > 0.0 => audio / n.max(1) as f64,
            _ => fixed_duration_per_clip(n),
        }
    }
}

pub fn fixed_duration_per_clip(n: usize) -> f64 {
    MIN_CLIP_SECONDS.max(NOMINAL_TOTAL_SECONDS / n.max(1) as f64)
}

/// Height after scaling to [`TARGET_WIDTH`], preserving aspect ratio.
pub fn scaled_height(width: u32, height: u32) -> u32 {
    if width == 0 {
        return height.max(1);
    }
    let h = (TARGET_WIDTH as f64 * height as f64 / width as f64).round() as u32;
    h.max(1)
}

/// What probing a source file told us.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub label: String,
    pub kind: MediaKind,
    pub width: u32,
    pub height: u32,
    /// Picture duration; only meaningful for video.
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub source: PathBuf,
    pub label: String,
    pub kind: MediaKind,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Frames this clip occupies on the 24 fps output grid.
    pub frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

/// Build clips in input order. Video shorter than `per_clip` keeps its full
/// length.
pub fn plan_clips(sources: &[SourceInfo], per_clip: f64) -> Vec<Clip> {
    let mut clips: Vec<Clip> = sources
        .iter()
        .map(|src| {
            let duration = match (src.kind, src.duration) {
                (MediaKind::Video, Some(d)) if d > 0.0 => per_clip.min(d),
                _ => per_clip,
            };
            Clip {
                source: src.path.clone(),
                label: src.label.clone(),
                kind: src.kind,
                duration,
                width: TARGET_WIDTH,
                height: scaled_height(src.width, src.height),
                frames: 0,
            }
        })
        .collect();
    allocate_frames(&mut clips);
    clips
}

/// Snap clip boundaries to the frame grid by rounding the running total, so
/// rounding error never accumulates past half a frame.
fn allocate_frames(clips: &mut [Clip]) {
    let fps = OUTPUT_FPS as f64;
    let mut elapsed = 0.0;
    let mut prev_boundary = 0u64;
    for clip in clips.iter_mut() {
        elapsed += clip.duration;
        let boundary = (elapsed * fps).round() as u64;
        clip.frames = boundary.saturating_sub(prev_boundary).max(1);
        prev_boundary += clip.frames;
    }
}

/// Smallest canvas holding every clip, rounded up to even dimensions.
pub fn canvas_for(clips: &[Clip]) -> Canvas {
    let width = clips.iter().map(|c| c.width).max().unwrap_or(TARGET_WIDTH);
    let height = clips.iter().map(|c| c.height).max().unwrap_or(TARGET_WIDTH);
    Canvas {
        width: round_up_even(width),
        height: round_up_even(height),
    }
}

fn round_up_even(v: u32) -> u32 {
    v + (v & 1)
}

pub fn total_duration(clips: &[Clip]) -> f64 {
    clips.iter().map(|c| c.duration).sum()
}

pub fn total_frames(clips: &[Clip]) -> u64 {
    clips.iter().map(|c| c.frames).sum()
}
