//! External capabilities consumed by the pipeline.
//!
//! Each capability is a narrow async trait so the pipeline can be driven by
//! the real HTTP adapters (`openai`, `tts`, `runway`) or by test stubs.
//! Implementations report a missing credential as
//! [`CapabilityError::Unavailable`]; the pipeline treats that as a skip.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CapabilityError;
use crate::media::MediaAssembler;
use crate::models::{SceneDescriptor, Script};

pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

#[async_trait]
pub trait VisionDescriber: Send + Sync {
    /// Describe one uploaded image for use as storyboard context.
    async fn describe(&self, image: &[u8]) -> CapabilityResult<String>;
}

#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    /// Write a script and storyboard from the prompt and image descriptions.
    async fn generate(
        &self,
        prompt: &str,
        style: &str,
        descriptions: &[String],
    ) -> CapabilityResult<Script>;

    /// Write short caption lines for a trend template.
    async fn caption_lines(&self, prompt: &str, template: &str) -> CapabilityResult<Vec<String>>;
}

#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    /// Synthesize `text` into an audio file at `out`.
    async fn synthesize(&self, text: &str, voice_id: &str, out: &Path) -> CapabilityResult<PathBuf>;
}

#[async_trait]
pub trait ClipGenerator: Send + Sync {
    /// Generate a video clip for one scene into `out`.
    async fn generate(
        &self,
        scene: &SceneDescriptor,
        reference_image: Option<&[u8]>,
        out: &Path,
    ) -> CapabilityResult<PathBuf>;
}

/// The collaborators one pipeline talks to.
#[derive(Clone)]
pub struct Capabilities {
    pub vision: Arc<dyn VisionDescriber>,
    pub script: Arc<dyn ScriptGenerator>,
    pub voice: Arc<dyn VoiceSynthesizer>,
    pub clips: Arc<dyn ClipGenerator>,
    pub media: Arc<dyn MediaAssembler>,
}
