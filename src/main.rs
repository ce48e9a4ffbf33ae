use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vireo::api::{self, AppState};
use vireo::args::Args;
use vireo::media::FfmpegAssembler;
use vireo::openai::OpenAiClient;
use vireo::runway::RunwayClient;
use vireo::tts::ElevenLabsSynthesizer;
use vireo::{Capabilities, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!("Starting Vireo video generation service");

    let config = args.pipeline_config();
    tokio::fs::create_dir_all(config.videos_dir())
        .await
        .with_context(|| format!("creating {}", config.videos_dir().display()))?;
    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("creating {}", config.work_dir.display()))?;

    for (name, key) in [
        ("OpenAI", &args.openai_api_key),
        ("ElevenLabs", &args.elevenlabs_api_key),
        ("Runway", &args.runway_api_key),
    ] {
        if key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            warn!("{} API key not set; that stage will use its fallback", name);
        }
    }

    let mut media = FfmpegAssembler::new()
        .with_font_file(args.font_file.clone())
        .with_caption_font_size(config.font.font_size())
        .with_timeout(args.media_timeout());
    if let Some(ffmpeg) = &args.ffmpeg {
        media = media.with_ffmpeg_path(ffmpeg);
    }

    let openai = Arc::new(OpenAiClient::new(args.openai_api_key.clone()));
    let caps = Capabilities {
        vision: openai.clone(),
        script: openai,
        voice: Arc::new(ElevenLabsSynthesizer::new(args.elevenlabs_api_key.clone())),
        clips: Arc::new(RunwayClient::new(args.runway_api_key.clone())),
        media: Arc::new(media),
    };

    let state = AppState::new(Pipeline::new(caps, config), args.public_base_url.clone())
        .with_job_capacity(args.max_jobs);
    let app = api::router(state, args.max_upload_bytes());

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!("Listening on {}", args.bind);
    axum::serve(listener, app).await?;

    Ok(())
}
