use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Input of the image/prompt driven flavor.
#[derive(Debug, Clone, Default)]
pub struct StoryRequest {
    pub prompt: String,
    pub style: String,
    pub images: Vec<Vec<u8>>,
}

impl StoryRequest {
    pub fn new(prompt: impl Into<String>, style: impl Into<String>, images: Vec<Vec<u8>>) -> Self {
        Self {
            prompt: prompt.into(),
            style: style.into(),
            images,
        }
    }

    /// Images carrying at least one byte.
    pub fn usable_images(&self) -> Vec<&[u8]> {
        self.images
            .iter()
            .filter(|img| !img.is_empty())
            .map(|img| img.as_slice())
            .collect()
    }
}

/// Input of the trend driven flavor.
#[derive(Debug, Clone, Deserialize)]
pub struct TrendRequest {
    pub trend_id: String,
    pub prompt: String,
}

/// One scene of the storyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub description: String,
    /// Target duration in seconds, always > 0.
    pub duration: u32,
    pub prompt: String,
}

impl SceneDescriptor {
    pub fn new(description: impl Into<String>, duration: u32, prompt: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            duration: duration.max(1),
            prompt: prompt.into(),
        }
    }
}

/// Script text plus its storyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub text: String,
    pub scenes: Vec<SceneDescriptor>,
}

/// A timed caption line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionEntry {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Completed,
    Failed,
}

/// Which pipeline entry point produced a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flavor {
    Story,
    Trend(String),
}

impl Flavor {
    /// Prefix of the promoted output file name.
    pub fn output_prefix(&self) -> &str {
        match self {
            Self::Story => "story",
            Self::Trend(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub id: String,
    pub script: String,
    pub scenes: Vec<SceneDescriptor>,
    /// One entry per scene; `None` when not even a blank clip could be made.
    pub clips: Vec<Option<PathBuf>>,
    pub narration: Option<PathBuf>,
    pub captions: Vec<CaptionEntry>,
    /// Promoted output file under the public directory.
    pub video: Option<PathBuf>,
    pub status: PipelineStatus,
}

impl PipelineResult {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: String::new(),
            scenes: Vec::new(),
            clips: Vec::new(),
            narration: None,
            captions: Vec::new(),
            video: None,
            status: PipelineStatus::Pending,
        }
    }
}
