use crate::clip_plan::{Canvas, Clip, OUTPUT_FPS};
use crate::error::{Error, Result};
use crate::media::MediaKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tokio::process::Command;

const STDERR_TAIL: usize = 600;

fn tail(text: &str) -> String {
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    trimmed[start..].to_string()
}

async fn run_cmd(program: &str, args: &[String]) -> Result<Vec<u8>> {
    let output = Command::new(program).args(args).output().await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::ToolUnavailable(format!("{} not found in PATH", program))
        } else {
            Error::ToolUnavailable(format!("{} could not be started: {}", program, e))
        }
    })?;

    if !output.status.success() {
        return Err(Error::ToolFailed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            tail(&String::from_utf8_lossy(&output.stderr))
        )));
    }

    Ok(output.stdout)
}

fn probe_args(entries: &[&str], path: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-v".into(), "error".into()];
    args.extend(entries.iter().map(|s| s.to_string()));
    args.push(path.display().to_string());
    args
}

/// First video stream as the decoder will hand it to filters: width and
/// height already swapped for quarter-turn rotations, duration taken from the
/// stream itself when the container reports one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn positive_seconds(text: Option<&str>) -> Option<f64> {
    text?.trim().parse::<f64>().ok().filter(|d| *d > 0.0)
}

impl ProbeStream {
    /// Display-matrix rotation wins over the legacy `rotate` tag.
    fn rotation(&self) -> f64 {
        self.side_data_list
            .iter()
            .find_map(|sd| sd.rotation)
            .or_else(|| self.tags.get("rotate").and_then(|r| r.trim().parse().ok()))
            .unwrap_or(0.0)
    }
}

fn is_quarter_turn(degrees: f64) -> bool {
    let turned = degrees.rem_euclid(360.0).round() as i64;
    turned == 90 || turned == 270
}

fn parse_video_probe(json: &str) -> Option<VideoProbe> {
    let probe: ProbeOutput = serde_json::from_str(json).ok()?;
    let stream = probe.streams.first()?;
    let (w, h) = (stream.width?, stream.height?);
    if w == 0 || h == 0 {
        return None;
    }
    let (width, height) = if is_quarter_turn(stream.rotation()) {
        (h, w)
    } else {
        (w, h)
    };
    let duration = positive_seconds(stream.duration.as_deref())
        .or_else(|| positive_seconds(probe.format.as_ref()?.duration.as_deref()));
    Some(VideoProbe {
        width,
        height,
        duration,
    })
}

pub async fn ffprobe_video(path: &Path) -> Result<VideoProbe> {
    let args = probe_args(
        &[
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,duration:stream_side_data=rotation:stream_tags=rotate:format=duration",
            "-of",
            "json",
        ],
        path,
    );
    let stdout = run_cmd("ffprobe", &args).await?;
    parse_video_probe(&String::from_utf8_lossy(&stdout))
        .ok_or_else(|| Error::ToolFailed(format!("no video dimensions in {}", path.display())))
}

/// Upright width and height of the first video stream.
pub async fn ffprobe_dimensions(path: &Path) -> Result<(u32, u32)> {
    let probe = ffprobe_video(path).await?;
    Ok((probe.width, probe.height))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let args = probe_args(
        &[
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ],
        path,
    );
    let stdout = run_cmd("ffprobe", &args).await?;
    let text = String::from_utf8_lossy(&stdout);
    match text.trim().parse::<f64>() {
        Ok(d) if d > 0.0 => Ok(d),
        _ => Err(Error::ToolFailed(format!(
            "no usable duration in {} ({:?})",
            path.display(),
            text.trim()
        ))),
    }
}

/// Count streams of one type: `"a"` for audio, `"v"` for video.
pub async fn ffprobe_stream_count(path: &Path, stream_type: &str) -> Result<usize> {
    let args = probe_args(
        &[
            "-select_streams",
            stream_type,
            "-show_entries",
            "stream=index",
            "-of",
            "csv=p=0",
        ],
        path,
    );
    let stdout = run_cmd("ffprobe", &args).await?;
    Ok(String::from_utf8_lossy(&stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count())
}

/// Scale to the clip's size, centre on the canvas, lock to the output grid.
fn segment_filter(clip: &Clip, canvas: Canvas) -> String {
    let mut filter = format!(
        "scale={}:{},setsar=1,pad={}:{}:(ow-iw)/2:(oh-ih)/2:black,fps={},format=yuv420p",
        clip.width, clip.height, canvas.width, canvas.height, OUTPUT_FPS
    );
    if clip.kind == MediaKind::Video {
        // Hold the last frame if the source runs short of its frame budget.
        filter.push_str(",tpad=stop_mode=clone:stop=-1");
    }
    filter
}

pub fn segment_args(clip: &Clip, canvas: Canvas, out_mp4: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
    ];

    match clip.kind {
        MediaKind::Image => {
            args.extend([
                "-loop".into(),
                "1".into(),
                "-framerate".into(),
                OUTPUT_FPS.to_string(),
            ]);
        }
        MediaKind::Video => {
            args.extend(["-ss".into(), "0".into(), "-t".into(), format!("{:.3}", clip.duration)]);
        }
    }

    args.extend([
        "-i".into(),
        clip.source.display().to_string(),
        "-vf".into(),
        segment_filter(clip, canvas),
        "-frames:v".into(),
        clip.frames.to_string(),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-preset".into(),
        "veryfast".into(),
        "-crf".into(),
        "22".into(),
        "-r".into(),
        OUTPUT_FPS.to_string(),
        out_mp4.display().to_string(),
    ]);
    args
}

pub async fn ffmpeg_render_segment(clip: &Clip, canvas: Canvas, out_mp4: &Path) -> Result<()> {
    run_cmd("ffmpeg", &segment_args(clip, canvas, out_mp4)).await?;
    Ok(())
}

/// Concatenate the segment list and lay `audio` under it. The picture sets
/// the length: longer narration is cut, shorter narration is padded with
/// silence.
pub fn mux_args(list_txt: &Path, audio: &Path, video_seconds: f64, out_mp4: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_txt.display().to_string(),
        "-i".into(),
        audio.display().to_string(),
        "-filter_complex".into(),
        "[1:a:0]apad[a]".into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "[a]".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-preset".into(),
        "veryfast".into(),
        "-crf".into(),
        "22".into(),
        "-r".into(),
        OUTPUT_FPS.to_string(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-t".into(),
        format!("{:.3}", video_seconds),
        "-movflags".into(),
        "+faststart".into(),
        "-f".into(),
        "mp4".into(),
        out_mp4.display().to_string(),
    ]
}

pub async fn ffmpeg_concat_with_audio(
    list_txt: &Path,
    audio: &Path,
    video_seconds: f64,
    out_mp4: &Path,
) -> Result<()> {
    run_cmd("ffmpeg", &mux_args(list_txt, audio, video_seconds, out_mp4)).await?;
    Ok(())
}

/// Both `ffmpeg` and `ffprobe` answer `-version`.
pub async fn tools_available() -> bool {
    for tool in ["ffmpeg", "ffprobe"] {
        if run_cmd(tool, &["-version".to_string()]).await.is_err() {
            return false;
        }
    }
    true
}
