use std::path::PathBuf;
use std::time::Duration;

use crate::layout::CaptionFont;
use crate::models::SceneDescriptor;

/// Target frame size of a rendered video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub const LANDSCAPE: Canvas = Canvas {
        width: 1920,
        height: 1080,
    };
    pub const PORTRAIT: Canvas = Canvas {
        width: 1080,
        height: 1920,
    };

    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Deterministic substitutes used when an external capability fails.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    pub generic_description: String,
    pub script: String,
    pub scenes: Vec<SceneDescriptor>,
    pub placeholder_colors: Vec<String>,
    pub blank_clip_seconds: u32,
    pub fallback_caption_words: usize,
    pub fallback_video_seconds: u32,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            generic_description: "A generic image with visual elements".to_string(),
            script: "A beautiful story unfolds before our eyes. Each moment captures the essence \
                     of wonder and discovery. The journey takes us through breathtaking \
                     landscapes and intimate moments."
                .to_string(),
            scenes: vec![
                SceneDescriptor::new(
                    "Opening scene with dramatic lighting",
                    4,
                    "Cinematic opening shot with dramatic lighting, inspired by the reference images",
                ),
                SceneDescriptor::new(
                    "Middle scene with dynamic movement",
                    4,
                    "Dynamic middle scene with flowing movement and vibrant colors",
                ),
                SceneDescriptor::new(
                    "Closing scene with emotional impact",
                    4,
                    "Emotional closing scene with powerful visual impact and resolution",
                ),
            ],
            placeholder_colors: ["#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            blank_clip_seconds: 3,
            fallback_caption_words: 10,
            fallback_video_seconds: 10,
        }
    }
}

impl FallbackPolicy {
    /// Placeholder color for a scene, picked by description length.
    pub fn placeholder_color(&self, description: &str) -> &str {
        if self.placeholder_colors.is_empty() {
            return "black";
        }
        let idx = description.chars().count() % self.placeholder_colors.len();
        &self.placeholder_colors[idx]
    }

    /// Scenes to use when script generation fails; never empty.
    pub fn fallback_scenes(&self) -> Vec<SceneDescriptor> {
        if self.scenes.is_empty() {
            vec![SceneDescriptor::new("Opening scene", 3, "Beautiful opening scene with dramatic lighting")]
        } else {
            self.scenes.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Request-scoped working directories live under here.
    pub work_dir: PathBuf,
    /// Promoted outputs land in `<public_dir>/videos`.
    pub public_dir: PathBuf,
    /// Trend assets: `<assets_dir>/trends/<id>/...`.
    pub assets_dir: PathBuf,
    pub story_canvas: Canvas,
    pub trend_canvas: Canvas,
    pub request_timeout: Duration,
    pub call_timeout: Duration,
    pub max_parallel: usize,
    /// Provisional seconds per trend caption before narration timing is known.
    pub caption_seconds: f64,
    /// Max characters per story caption chunk.
    pub caption_chunk_chars: usize,
    pub font: CaptionFont,
    pub music_volume: f32,
    pub default_voice_id: String,
    /// Keep intermediate files of successful runs.
    pub keep_work_dir: bool,
    pub fallback: FallbackPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./work"),
            public_dir: PathBuf::from("./public"),
            assets_dir: PathBuf::from("./assets"),
            story_canvas: Canvas::LANDSCAPE,
            trend_canvas: Canvas::PORTRAIT,
            request_timeout: Duration::from_secs(600),
            call_timeout: Duration::from_secs(120),
            max_parallel: 4,
            caption_seconds: 2.0,
            caption_chunk_chars: 80,
            font: CaptionFont::default(),
            music_volume: 0.25,
            default_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            keep_work_dir: false,
            fallback: FallbackPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn videos_dir(&self) -> PathBuf {
        self.public_dir.join("videos")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_scenes_have_fixed_shape() {
        let policy = FallbackPolicy::default();
        let scenes = policy.fallback_scenes();
        assert_eq!(scenes.len(), 3);
        assert!(scenes.iter().all(|s| s.duration == 4));
    }

    #[test]
    fn test_fallback_scenes_never_empty() {
        let policy = FallbackPolicy {
            scenes: Vec::new(),
            ..FallbackPolicy::default()
        };
        assert_eq!(policy.fallback_scenes().len(), 1);
    }

    #[test]
    fn test_placeholder_color_by_length() {
        let policy = FallbackPolicy::default();
        assert_eq!(policy.placeholder_color(""), "#FF6B6B");
        assert_eq!(policy.placeholder_color("abc"), "#96CEB4");
        assert_eq!(policy.placeholder_color("abcde"), "#FF6B6B");
    }
}
