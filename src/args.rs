use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::layout::CaptionFont;
use crate::jobs::DEFAULT_JOB_CAPACITY;

#[derive(Parser, Debug)]
#[clap(name = "vireo", about = "Story and trend video generation service")]
pub struct Args {
    #[clap(long, env = "VIREO_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    #[clap(long, env = "VIREO_PUBLIC_DIR", default_value = "./public")]
    pub public_dir: PathBuf,

    #[clap(long, env = "VIREO_WORK_DIR", default_value = "./work")]
    pub work_dir: PathBuf,

    #[clap(long, env = "VIREO_ASSETS_DIR", default_value = "./assets")]
    pub assets_dir: PathBuf,

    /// Prefix for returned video and asset URLs, e.g. http://localhost:8000
    #[clap(long, env = "PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Path to ffmpeg; looked up on PATH when omitted.
    #[clap(long, env = "FFMPEG_PATH")]
    pub ffmpeg: Option<String>,

    /// Font used for burned-in captions.
    #[clap(long, env = "VIREO_FONT_FILE")]
    pub font_file: Option<PathBuf>,

    #[clap(long, default_value_t = 80)]
    pub caption_font_size: u32,

    #[clap(long, env = "VIREO_REQUEST_TIMEOUT_SECS", default_value_t = 600)]
    pub request_timeout_secs: u64,

    #[clap(long, env = "VIREO_CALL_TIMEOUT_SECS", default_value_t = 120)]
    pub call_timeout_secs: u64,

    #[clap(long, env = "VIREO_MEDIA_TIMEOUT_SECS", default_value_t = 300)]
    pub media_timeout_secs: u64,

    #[clap(long, env = "VIREO_MAX_PARALLEL", default_value_t = 4)]
    pub max_parallel: usize,

    #[clap(long, env = "VIREO_MAX_UPLOAD_MB", default_value_t = 50)]
    pub max_upload_mb: usize,

    /// Finished jobs remembered for `/status`; oldest are dropped first.
    #[clap(long, env = "VIREO_MAX_JOBS", default_value_t = DEFAULT_JOB_CAPACITY)]
    pub max_jobs: usize,

    /// Keep intermediate files of successful runs.
    #[clap(long)]
    pub keep_work_dir: bool,

    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[clap(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub elevenlabs_api_key: Option<String>,

    #[clap(long, env = "RUNWAY_API_KEY", hide_env_values = true)]
    pub runway_api_key: Option<String>,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            work_dir: self.work_dir.clone(),
            public_dir: self.public_dir.clone(),
            assets_dir: self.assets_dir.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            max_parallel: self.max_parallel.max(1),
            keep_work_dir: self.keep_work_dir,
            font: CaptionFont::load(self.font_file.as_deref(), self.caption_font_size),
            ..PipelineConfig::default()
        }
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media_timeout_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build_config() {
        let args = Args::parse_from(["vireo", "--max-parallel", "0", "--call-timeout-secs", "5"]);
        let config = args.pipeline_config();
        assert_eq!(config.max_parallel, 1);
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.font.font_size(), 80);
        assert!(matches!(config.font, CaptionFont::Approximate(_)));
        assert_eq!(config.videos_dir(), PathBuf::from("./public/videos"));
    }

    #[test]
    fn test_upload_limit_in_bytes() {
        let args = Args::parse_from(["vireo", "--max-upload-mb", "2"]);
        assert_eq!(args.max_upload_bytes(), 2 * 1024 * 1024);
    }
}
