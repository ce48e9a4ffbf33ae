pub mod api;
pub mod args;
pub mod audio;
pub mod capability;
pub mod config;
pub mod error;
pub mod jobs;
pub mod layout;
pub mod media;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod runway;
pub mod script;
pub mod subtitle;
pub mod trends;
pub mod tts;
pub mod utils;

pub use capability::Capabilities;
pub use config::PipelineConfig;
pub use error::{CapabilityError, MediaError, PipelineError};
pub use models::{PipelineResult, PipelineStatus, StoryRequest, TrendRequest};
pub use pipeline::Pipeline;
