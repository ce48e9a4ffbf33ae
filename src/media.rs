//! Media assembly via the ffmpeg command-line tool.
//!
//! [`MediaAssembler`] is the seam the pipeline talks to; [`FfmpegAssembler`]
//! is the real implementation. Argument construction is kept in pure
//! functions so it can be tested without ffmpeg installed.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Canvas;
use crate::error::MediaError;
use crate::layout::LayoutResult;
use crate::models::CaptionEntry;

pub type MediaResult<T> = std::result::Result<T, MediaError>;

const FPS: &str = "30";
const LABEL_FONT_SIZE: u32 = 60;

/// A caption entry with its computed overlay layout.
#[derive(Debug, Clone)]
pub struct CaptionOverlay {
    pub entry: CaptionEntry,
    pub layout: LayoutResult,
}

/// Everything needed to produce the final video.
#[derive(Debug, Clone)]
pub struct AssemblyJob {
    /// Clips in scene order.
    pub clips: Vec<PathBuf>,
    pub narration: Option<PathBuf>,
    /// Background music, looped under the video.
    pub music: Option<PathBuf>,
    pub music_volume: f32,
    pub overlays: Vec<CaptionOverlay>,
    pub canvas: Canvas,
    /// Output length in seconds.
    pub duration: f64,
    /// Loop the concatenated video until `duration` is reached.
    pub loop_video: bool,
    /// Scratch directory for intermediate files.
    pub work_dir: PathBuf,
    pub output: PathBuf,
}

#[async_trait]
pub trait MediaAssembler: Send + Sync {
    /// Solid-color clip labeled with `label`, held for `seconds`.
    async fn placeholder_clip(
        &self,
        label: &str,
        color: &str,
        seconds: u32,
        canvas: Canvas,
        out: &Path,
    ) -> MediaResult<()>;

    /// Plain black clip.
    async fn blank_clip(&self, seconds: u32, canvas: Canvas, out: &Path) -> MediaResult<()>;

    /// Concatenate, mux audio and burn in caption overlays.
    async fn assemble(&self, job: &AssemblyJob) -> MediaResult<()>;

    /// Minimal single-clip video carrying only `caption`.
    async fn fallback_video(
        &self,
        caption: &str,
        seconds: u32,
        canvas: Canvas,
        out: &Path,
    ) -> MediaResult<()>;
}

/// Escape a value for a filter option inside a filtergraph.
///
/// First the option level (`\ ' :`), then the filtergraph level
/// (`\ ' [ ] , ;`).
pub fn escape_filter_value(value: &str) -> String {
    let mut option_level = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(c);
    }
    let mut graph_level = String::with_capacity(option_level.len());
    for c in option_level.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph_level.push('\\');
        }
        graph_level.push(c);
    }
    graph_level
}

/// Contents of a concat demuxer list file.
pub fn concat_list(clips: &[PathBuf]) -> String {
    let mut list = String::new();
    for clip in clips {
        let path = clip.to_string_lossy().replace('\'', "'\\''");
        let _ = writeln!(list, "file '{}'", path);
    }
    list
}

fn to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    ffmpeg_path: String,
    font_file: Option<PathBuf>,
    caption_font_size: u32,
    timeout: Duration,
}

impl FfmpegAssembler {
    /// Create an assembler, searching for the ffmpeg binary in PATH.
    pub fn new() -> Self {
        let ffmpeg_path = which::which("ffmpeg")
            .map_or_else(|_| "ffmpeg".to_string(), |p| p.to_string_lossy().to_string());
        Self {
            ffmpeg_path,
            font_file: None,
            caption_font_size: 80,
            timeout: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: &str) -> Self {
        self.ffmpeg_path = path.to_string();
        self
    }

    #[must_use]
    pub fn with_font_file(mut self, font_file: Option<PathBuf>) -> Self {
        self.font_file = font_file;
        self
    }

    #[must_use]
    pub fn with_caption_font_size(mut self, size: u32) -> Self {
        self.caption_font_size = size;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn font_option(&self) -> String {
        match &self.font_file {
            Some(path) => format!("fontfile={}:", escape_filter_value(&path.to_string_lossy())),
            None => String::new(),
        }
    }

    /// drawtext filter centering `text` on the frame.
    fn centered_label(&self, text: &str, font_size: u32) -> String {
        format!(
            "drawtext={}text={}:expansion=none:fontsize={}:fontcolor=white:x=(w-text_w)/2:y=(h-text_h)/2",
            self.font_option(),
            escape_filter_value(text),
            font_size
        )
    }

    /// drawbox + drawtext filters for the caption overlays.
    pub fn caption_filters(&self, overlays: &[CaptionOverlay]) -> Vec<String> {
        let mut filters = Vec::new();
        for overlay in overlays {
            let layout = &overlay.layout;
            if layout.is_blank() {
                continue;
            }
            let enable = format!(
                "enable='between(t,{:.3},{:.3})'",
                overlay.entry.start, overlay.entry.end
            );
            let (box_x, box_y) = layout.placement;
            filters.push(format!(
                "drawbox=x={}:y={}:w={}:h={}:color=white@0.95:t=fill:{}",
                box_x, box_y, layout.box_width, layout.box_height, enable
            ));
            for line in &layout.lines {
                filters.push(format!(
                    "drawtext={}text={}:expansion=none:fontsize={}:fontcolor=black:x={}:y={}:{}",
                    self.font_option(),
                    escape_filter_value(&line.text),
                    self.caption_font_size,
                    box_x + line.x,
                    box_y + line.y,
                    enable
                ));
            }
        }
        filters
    }

    /// Arguments for the final mix of the concatenated video.
    pub fn final_mix_args(&self, job: &AssemblyJob, concat_path: &Path) -> Vec<String> {
        let Canvas { width, height } = job.canvas;
        let mut args = to_strings(&["-y", "-hide_banner", "-loglevel", "error"]);
        if job.loop_video {
            args.extend(to_strings(&["-stream_loop", "-1"]));
        }
        args.push("-i".to_string());
        args.push(concat_path.to_string_lossy().to_string());

        let mut next_input = 1;
        let narration_idx = job.narration.as_ref().map(|path| {
            args.push("-i".to_string());
            args.push(path.to_string_lossy().to_string());
            next_input += 1;
            next_input - 1
        });
        let music_idx = job.music.as_ref().map(|path| {
            args.extend(to_strings(&["-stream_loop", "-1", "-i"]));
            args.push(path.to_string_lossy().to_string());
            next_input += 1;
            next_input - 1
        });

        let mut video_chain = vec![
            format!("scale={w}:{h}:force_original_aspect_ratio=decrease", w = width, h = height),
            format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2", w = width, h = height),
            "setsar=1".to_string(),
        ];
        video_chain.extend(self.caption_filters(&job.overlays));
        video_chain.push("format=yuv420p".to_string());
        let mut graph = format!("[0:v]{}[v]", video_chain.join(","));

        let audio = match (narration_idx, music_idx) {
            (Some(vo), Some(bg)) => Some(format!(
                "[{vo}:a]volume=1.0[vo];[{bg}:a]volume={vol}[bg];[vo][bg]amix=inputs=2:duration=longest:dropout_transition=0[a]",
                vo = vo,
                bg = bg,
                vol = job.music_volume
            )),
            (Some(vo), None) => Some(format!("[{}:a]volume=1.0[a]", vo)),
            (None, Some(bg)) => Some(format!("[{}:a]volume={}[a]", bg, job.music_volume)),
            (None, None) => None,
        };
        if let Some(audio) = &audio {
            graph.push(';');
            graph.push_str(audio);
        }

        args.push("-filter_complex".to_string());
        args.push(graph);
        args.extend(to_strings(&["-map", "[v]"]));
        if audio.is_some() {
            args.extend(to_strings(&["-map", "[a]", "-c:a", "aac"]));
        } else {
            args.push("-an".to_string());
        }
        args.push("-t".to_string());
        args.push(format!("{:.3}", job.duration));
        args.extend(to_strings(&[
            "-c:v", "libx264", "-preset", "veryfast", "-r", FPS, "-movflags", "+faststart",
        ]));
        args.push(job.output.to_string_lossy().to_string());
        args
    }

    /// Arguments for a solid-color clip with an optional centered label.
    pub fn color_clip_args(
        &self,
        color: &str,
        label: Option<&str>,
        seconds: u32,
        canvas: Canvas,
        out: &Path,
    ) -> Vec<String> {
        let mut args = to_strings(&["-y", "-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i"]);
        args.push(format!(
            "color=c={}:s={}:d={}:r={}",
            color,
            canvas.size_arg(),
            seconds.max(1),
            FPS
        ));
        if let Some(label) = label.filter(|l| !l.trim().is_empty()) {
            args.push("-vf".to_string());
            args.push(self.centered_label(label, LABEL_FONT_SIZE));
        }
        args.extend(to_strings(&["-c:v", "libx264", "-pix_fmt", "yuv420p", "-an"]));
        args.push(out.to_string_lossy().to_string());
        args
    }

    async fn run(&self, step: &'static str, args: &[String]) -> MediaResult<()> {
        debug!("ffmpeg {}: {}", step, args.join(" "));
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| MediaError::Timeout(step))?
            .map_err(|source| MediaError::Spawn { step, source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(10).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(MediaError::Failed {
                step,
                stderr: tail.join("\n"),
            });
        }
        Ok(())
    }

    async fn concat(&self, job: &AssemblyJob) -> MediaResult<PathBuf> {
        let mut clips = Vec::with_capacity(job.clips.len());
        for clip in &job.clips {
            let abs = tokio::fs::canonicalize(clip).await.unwrap_or_else(|_| clip.clone());
            clips.push(abs);
        }
        let list_path = job.work_dir.join("concat.txt");
        tokio::fs::write(&list_path, concat_list(&clips)).await?;

        let concat_path = job.work_dir.join("concat.mp4");
        let list = list_path.to_string_lossy().to_string();
        let out = concat_path.to_string_lossy().to_string();

        let copy_args = to_strings(&[
            "-y", "-hide_banner", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i", &list,
            "-an", "-c:v", "copy", &out,
        ]);
        if let Err(e) = self.run("concat", &copy_args).await {
            warn!("ffmpeg concat with copy failed ({}); retrying with re-encode", e);
            let scale = format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
                w = job.canvas.width,
                h = job.canvas.height
            );
            let encode_args = to_strings(&[
                "-y", "-hide_banner", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i",
                &list, "-an", "-vf", &scale, "-c:v", "libx264", "-pix_fmt", "yuv420p", "-r", FPS,
                &out,
            ]);
            self.run("concat re-encode", &encode_args).await?;
        }
        Ok(concat_path)
    }
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaAssembler for FfmpegAssembler {
    async fn placeholder_clip(
        &self,
        label: &str,
        color: &str,
        seconds: u32,
        canvas: Canvas,
        out: &Path,
    ) -> MediaResult<()> {
        let args = self.color_clip_args(color, Some(label), seconds, canvas, out);
        self.run("placeholder", &args).await
    }

    async fn blank_clip(&self, seconds: u32, canvas: Canvas, out: &Path) -> MediaResult<()> {
        let args = self.color_clip_args("black", None, seconds, canvas, out);
        self.run("blank clip", &args).await
    }

    async fn assemble(&self, job: &AssemblyJob) -> MediaResult<()> {
        if job.clips.is_empty() {
            return Err(MediaError::NoInput("no clips".to_string()));
        }
        info!("Concatenating {} clips", job.clips.len());
        let concat_path = self.concat(job).await?;

        info!(
            "Mixing final video ({} captions, narration: {}, music: {})",
            job.overlays.len(),
            job.narration.is_some(),
            job.music.is_some()
        );
        let args = self.final_mix_args(job, &concat_path);
        self.run("final mix", &args).await?;

        tokio::fs::remove_file(&concat_path).await.ok();
        tokio::fs::remove_file(job.work_dir.join("concat.txt")).await.ok();
        Ok(())
    }

    async fn fallback_video(
        &self,
        caption: &str,
        seconds: u32,
        canvas: Canvas,
        out: &Path,
    ) -> MediaResult<()> {
        let args = self.color_clip_args("black", Some(caption), seconds, canvas, out);
        self.run("fallback video", &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{FontMetrics, layout};

    fn job(narration: bool, music: bool) -> AssemblyJob {
        let canvas = Canvas::LANDSCAPE;
        let entry = CaptionEntry {
            text: "Hello world".to_string(),
            start: 0.0,
            end: 2.5,
        };
        let overlay = CaptionOverlay {
            layout: layout(&entry.text, canvas.width, canvas.height, &FontMetrics::default()),
            entry,
        };
        AssemblyJob {
            clips: vec![PathBuf::from("/w/scene_0.mp4"), PathBuf::from("/w/scene_1.mp4")],
            narration: narration.then(|| PathBuf::from("/w/narration.wav")),
            music: music.then(|| PathBuf::from("/a/music.mp3")),
            music_volume: 0.25,
            overlays: vec![overlay],
            canvas,
            duration: 8.0,
            loop_video: false,
            work_dir: PathBuf::from("/w"),
            output: PathBuf::from("/w/final.mp4"),
        }
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("plain text"), "plain text");
        assert_eq!(escape_filter_value("a:b"), "a\\\\:b");
        assert_eq!(escape_filter_value("it's"), "it\\\\\\'s");
        assert_eq!(escape_filter_value("one, two"), "one\\, two");
        assert_eq!(escape_filter_value("[x]"), "\\[x\\]");
    }

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/a/b.mp4"), PathBuf::from("/a/it's.mp4")]);
        assert_eq!(list, "file '/a/b.mp4'\nfile '/a/it'\\''s.mp4'\n");
    }

    #[test]
    fn test_final_mix_without_audio() {
        let assembler = FfmpegAssembler::new().with_ffmpeg_path("ffmpeg");
        let args = assembler.final_mix_args(&job(false, false), Path::new("/w/concat.mp4"));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.iter().any(|a| a == "[a]"));
        assert_eq!(args.last().unwrap(), "/w/final.mp4");
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.starts_with("[0:v]scale=1920:1080"));
        assert!(graph.contains("drawbox=x="));
        assert!(graph.contains("text=Hello world"));
        assert!(graph.contains("enable='between(t,0.000,2.500)'"));
    }

    #[test]
    fn test_final_mix_with_narration_and_music() {
        let assembler = FfmpegAssembler::new();
        let args = assembler.final_mix_args(&job(true, true), Path::new("/w/concat.mp4"));
        let inputs: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && args[i - 1] == "-i")
            .map(|(_, a)| a)
            .collect();
        assert_eq!(inputs, vec!["/w/concat.mp4", "/w/narration.wav", "/a/music.mp3"]);
        assert!(args.contains(&"-stream_loop".to_string()));
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.contains("[1:a]volume=1.0[vo]"));
        assert!(graph.contains("[2:a]volume=0.25[bg]"));
        assert!(graph.contains("amix=inputs=2"));
        assert!(args.contains(&"[a]".to_string()));
    }

    #[test]
    fn test_loop_video_flag() {
        let assembler = FfmpegAssembler::new();
        let mut looped = job(false, false);
        looped.loop_video = true;
        let args = assembler.final_mix_args(&looped, Path::new("/w/concat.mp4"));
        let pos = args.iter().position(|a| a == "/w/concat.mp4").unwrap();
        assert_eq!(args[pos - 3..pos], ["-stream_loop", "-1", "-i"]);
    }

    #[test]
    fn test_music_only_mix() {
        let assembler = FfmpegAssembler::new();
        let args = assembler.final_mix_args(&job(false, true), Path::new("/w/concat.mp4"));
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.contains("[1:a]volume=0.25[a]"));
    }

    #[test]
    fn test_blank_overlays_skipped() {
        let assembler = FfmpegAssembler::new();
        let overlay = CaptionOverlay {
            entry: CaptionEntry {
                text: String::new(),
                start: 0.0,
                end: 1.0,
            },
            layout: layout("", 1920, 1080, &FontMetrics::default()),
        };
        assert!(assembler.caption_filters(&[overlay]).is_empty());
    }

    #[test]
    fn test_color_clip_args() {
        let assembler = FfmpegAssembler::new();
        let args = assembler.color_clip_args(
            "#4ECDC4",
            Some("A dog runs"),
            3,
            Canvas::LANDSCAPE,
            Path::new("/w/scene_0.mp4"),
        );
        assert!(args.contains(&"color=c=#4ECDC4:s=1920x1080:d=3:r=30".to_string()));
        assert!(args.iter().any(|a| a.contains("text=A dog runs")));

        let blank = assembler.color_clip_args("black", None, 3, Canvas::LANDSCAPE, Path::new("/w/b.mp4"));
        assert!(!blank.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_font_file_is_passed() {
        let assembler = FfmpegAssembler::new().with_font_file(Some(PathBuf::from("/fonts/Arial Bold.ttf")));
        let filters = assembler.caption_filters(&job(false, false).overlays);
        assert!(filters[1].starts_with("drawtext=fontfile=/fonts/Arial Bold.ttf:"));
    }
}
