//! Story pipeline
//!
//! Drives one request through five strictly sequential stages:
//!
//! 1. describe uploaded images
//! 2. write the script and storyboard (or trend captions)
//! 3. generate one clip per scene
//! 4. synthesize narration
//! 5. assemble the final video
//!
//! Stages 1-4 never fail: every capability error is replaced by a
//! deterministic substitute from [`FallbackPolicy`](crate::config::FallbackPolicy).
//! Stage 5 falls back to a minimal captioned video; only when that also fails
//! does the request end up `Failed`.

use futures::future::join_all;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::audio::wav_duration_seconds;
use crate::capability::{Capabilities, CapabilityResult};
use crate::config::{Canvas, PipelineConfig};
use crate::error::{CapabilityError, PipelineError, Result};
use crate::layout::layout;
use crate::media::{AssemblyJob, CaptionOverlay};
use crate::models::{
    CaptionEntry, Flavor, PipelineResult, PipelineStatus, SceneDescriptor, Script, StoryRequest,
    TrendRequest,
};
use crate::script::{fallback_caption_lines, generic_scene};
use crate::subtitle::{captions_end, retime_captions, time_captions, uniform_captions};
use crate::trends::{Trend, find_trend};
use crate::utils::{chunk_text, first_words, short_id};

const DEFAULT_STYLE: &str = "cinematic";

/// Per-request state: identity, scratch directory and deadline.
struct RequestContext {
    id: Uuid,
    work_dir: PathBuf,
    deadline: Instant,
    flavor: Flavor,
    canvas: Canvas,
}

pub struct Pipeline {
    caps: Capabilities,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(caps: Capabilities, config: PipelineConfig) -> Self {
        Self { caps, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the image/prompt driven flavor.
    pub async fn run(&self, request: StoryRequest) -> Result<PipelineResult> {
        self.run_with_id(Uuid::new_v4(), request).await
    }

    pub async fn run_with_id(&self, id: Uuid, request: StoryRequest) -> Result<PipelineResult> {
        let span = info_span!("pipeline", %id, flavor = "story");
        async {
            let ctx = self.open_request(id, Flavor::Story, self.config.story_canvas).await?;
            if request.prompt.trim().is_empty() && request.usable_images().is_empty() {
                self.discard(&ctx).await;
                return Err(PipelineError::Validation(
                    "a prompt or at least one image is required".to_string(),
                ));
            }
            Ok(self.story_stages(&ctx, &request).await)
        }
        .instrument(span)
        .await
    }

    /// Run the trend driven flavor.
    pub async fn run_trend(&self, request: TrendRequest) -> Result<PipelineResult> {
        self.run_trend_with_id(Uuid::new_v4(), request).await
    }

    pub async fn run_trend_with_id(&self, id: Uuid, request: TrendRequest) -> Result<PipelineResult> {
        let span = info_span!("pipeline", %id, flavor = %request.trend_id);
        async {
            let trend = find_trend(&request.trend_id)
                .ok_or_else(|| PipelineError::UnknownTrend(request.trend_id.clone()))?;
            let flavor = Flavor::Trend(trend.id.to_string());
            let ctx = self.open_request(id, flavor, self.config.trend_canvas).await?;
            if request.prompt.trim().is_empty() {
                self.discard(&ctx).await;
                return Err(PipelineError::Validation("prompt is required".to_string()));
            }
            Ok(self.trend_stages(&ctx, trend, request.prompt.trim()).await)
        }
        .instrument(span)
        .await
    }

    async fn open_request(&self, id: Uuid, flavor: Flavor, canvas: Canvas) -> Result<RequestContext> {
        let work_dir = self.config.work_dir.join(id.to_string());
        tokio::fs::create_dir_all(&work_dir).await?;
        Ok(RequestContext {
            id,
            work_dir,
            deadline: Instant::now() + self.config.request_timeout,
            flavor,
            canvas,
        })
    }

    async fn discard(&self, ctx: &RequestContext) {
        if let Err(e) = tokio::fs::remove_dir_all(&ctx.work_dir).await {
            warn!("Failed to remove work dir {}: {}", ctx.work_dir.display(), e);
        }
    }

    async fn story_stages(&self, ctx: &RequestContext, request: &StoryRequest) -> PipelineResult {
        let images: Vec<&[u8]> = request.images.iter().map(|img| img.as_slice()).collect();
        info!("Step 1/5: Describing {} images", images.len());
        let descriptions = self.describe_images(ctx, &images).await;

        info!("Step 2/5: Writing script");
        let style = if request.style.trim().is_empty() {
            DEFAULT_STYLE
        } else {
            request.style.trim()
        };
        let script = self
            .write_script(ctx, request.prompt.trim(), style, &descriptions)
            .await;
        info!("Script has {} scenes", script.scenes.len());

        info!("Step 3/5: Generating {} clips", script.scenes.len());
        let reference = request.usable_images().first().copied();
        let clips = self.generate_clips(ctx, &script.scenes, reference).await;

        info!("Step 4/5: Narration");
        let voice = self.config.default_voice_id.clone();
        let narration = self.narrate(ctx, &script.text, &voice).await;

        info!("Step 5/5: Assembling final video");
        let scenes_total: f64 = script.scenes.iter().map(|s| s.duration as f64).sum();
        let spoken = narration.as_ref().and_then(|(_, duration)| *duration);
        // captions follow the voice when there is one
        let caption_span = spoken.unwrap_or(scenes_total);
        let total = scenes_total.max(spoken.unwrap_or(0.0));
        let lines = chunk_text(&script.text, self.config.caption_chunk_chars);
        let captions = time_captions(&lines, caption_span);
        let job = self.assembly_job(
            ctx,
            &clips,
            narration.as_ref().map(|(path, _)| path.clone()),
            None,
            &captions,
            total,
            total > scenes_total,
        );
        let video = self.assemble(ctx, job, &script.text).await;

        self.finish(ctx, script, clips, narration.map(|(p, _)| p), captions, video)
            .await
    }

    async fn trend_stages(&self, ctx: &RequestContext, trend: &Trend, prompt: &str) -> PipelineResult {
        info!("Step 1/5: No images to describe for trend {}", trend.id);

        info!("Step 2/5: Writing captions");
        let lines = match self
            .call(ctx, "caption lines", self.caps.script.caption_lines(prompt, trend.template))
            .await
        {
            Ok(lines) if !lines.is_empty() => lines,
            Ok(_) => fallback_caption_lines(prompt, trend.template),
            Err(e) => {
                log_fallback("caption lines", &e);
                fallback_caption_lines(prompt, trend.template)
            }
        };
        let mut captions = uniform_captions(&lines, self.config.caption_seconds);
        let script_text = captions
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let scene = SceneDescriptor::new(
            trend.title,
            captions_end(&captions).ceil() as u32,
            format!("{} ({})", prompt, trend.description),
        );
        let scenes = vec![scene];

        info!("Step 3/5: Base clip");
        let base_video = trend.base_video_path(&self.config.assets_dir);
        let clips = if tokio::fs::metadata(&base_video).await.is_ok() {
            info!("Using trend base video {}", base_video.display());
            vec![Some(base_video)]
        } else {
            self.generate_clips(ctx, &scenes, None).await
        };

        info!("Step 4/5: Narration");
        let narration = self.narrate(ctx, &script_text, trend.voice_id).await;
        if let Some((_, Some(duration))) = &narration {
            captions = retime_captions(&captions, *duration);
        }

        info!("Step 5/5: Assembling final video");
        let music_path = trend.music_path(&self.config.assets_dir);
        let music = tokio::fs::metadata(&music_path).await.ok().map(|_| music_path);
        let total = captions_end(&captions).max(1.0);
        let job = self.assembly_job(
            ctx,
            &clips,
            narration.as_ref().map(|(path, _)| path.clone()),
            music,
            &captions,
            total,
            true,
        );
        let video = self.assemble(ctx, job, &script_text).await;

        let script = Script {
            text: script_text,
            scenes,
        };
        self.finish(ctx, script, clips, narration.map(|(p, _)| p), captions, video)
            .await
    }

    /// Bound one capability call by the per-call timeout and the request
    /// deadline, whichever comes first.
    async fn call<T, F>(&self, ctx: &RequestContext, what: &str, fut: F) -> CapabilityResult<T>
    where
        F: Future<Output = CapabilityResult<T>>,
    {
        let now = Instant::now();
        if now >= ctx.deadline {
            return Err(CapabilityError::Timeout(format!("{}: request deadline passed", what)));
        }
        let limit = (ctx.deadline - now).min(self.config.call_timeout);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(format!(
                "{} after {:.1}s",
                what,
                limit.as_secs_f64()
            ))),
        }
    }

    async fn describe_images(&self, ctx: &RequestContext, images: &[&[u8]]) -> Vec<String> {
        let permits = Semaphore::new(self.config.max_parallel.max(1));
        let mut tasks = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            tasks.push(self.describe_one(ctx, &permits, i, image));
        }
        join_all(tasks).await
    }

    async fn describe_one(
        &self,
        ctx: &RequestContext,
        permits: &Semaphore,
        i: usize,
        image: &[u8],
    ) -> String {
        let fallback = &self.config.fallback.generic_description;
        if image.is_empty() {
            warn!("Image {} is empty; using fallback description", i);
            return fallback.clone();
        }
        let _permit = permits.acquire().await.ok();
        match self.call(ctx, "describe", self.caps.vision.describe(image)).await {
            Ok(description) if !description.trim().is_empty() => description,
            Ok(_) => {
                warn!("Empty description for image {}; using fallback", i);
                fallback.clone()
            }
            Err(e) => {
                log_fallback(&format!("describe image {}", i), &e);
                fallback.clone()
            }
        }
    }

    async fn write_script(
        &self,
        ctx: &RequestContext,
        prompt: &str,
        style: &str,
        descriptions: &[String],
    ) -> Script {
        match self
            .call(ctx, "script", self.caps.script.generate(prompt, style, descriptions))
            .await
        {
            Ok(mut script) => {
                if script.scenes.is_empty() {
                    warn!("Script came back without scenes; adding a generic scene");
                    script.scenes.push(generic_scene());
                }
                script
            }
            Err(e) => {
                log_fallback("script", &e);
                Script {
                    text: self.config.fallback.script.clone(),
                    scenes: self.config.fallback.fallback_scenes(),
                }
            }
        }
    }

    /// One clip per scene, in scene order. `None` only when even the blank
    /// clip could not be rendered.
    async fn generate_clips(
        &self,
        ctx: &RequestContext,
        scenes: &[SceneDescriptor],
        reference: Option<&[u8]>,
    ) -> Vec<Option<PathBuf>> {
        let permits = Semaphore::new(self.config.max_parallel.max(1));
        let mut tasks = Vec::with_capacity(scenes.len());
        for (i, scene) in scenes.iter().enumerate() {
            tasks.push(self.generate_clip(ctx, &permits, i, scene, reference));
        }
        let clips = join_all(tasks).await;
        info!(
            "Generated {}/{} clips",
            clips.iter().filter(|c| c.is_some()).count(),
            scenes.len()
        );
        clips
    }

    async fn generate_clip(
        &self,
        ctx: &RequestContext,
        permits: &Semaphore,
        i: usize,
        scene: &SceneDescriptor,
        reference: Option<&[u8]>,
    ) -> Option<PathBuf> {
        let out = ctx.work_dir.join(format!("scene_{}.mp4", i));
        let _permit = permits.acquire().await.ok();
        match self
            .call(ctx, "clip", self.caps.clips.generate(scene, reference, &out))
            .await
        {
            Ok(path) => {
                info!("Generated clip for scene {}", i + 1);
                Some(path)
            }
            Err(e) => {
                log_fallback(&format!("clip {}", i), &e);
                // never reuse output of an abandoned call
                tokio::fs::remove_file(&out).await.ok();
                self.placeholder(ctx, scene, &out).await
            }
        }
    }

    async fn placeholder(
        &self,
        ctx: &RequestContext,
        scene: &SceneDescriptor,
        out: &Path,
    ) -> Option<PathBuf> {
        let fallback = &self.config.fallback;
        let color = fallback.placeholder_color(&scene.description);
        match self
            .caps
            .media
            .placeholder_clip(&scene.description, color, scene.duration, ctx.canvas, out)
            .await
        {
            Ok(()) => return Some(out.to_path_buf()),
            Err(e) => warn!("Placeholder clip failed: {}; trying a blank clip", e),
        }
        match self
            .caps
            .media
            .blank_clip(fallback.blank_clip_seconds, ctx.canvas, out)
            .await
        {
            Ok(()) => Some(out.to_path_buf()),
            Err(e) => {
                error!("Blank clip failed: {}; scene will be skipped", e);
                None
            }
        }
    }

    /// Narration file and, when readable, its duration in seconds.
    async fn narrate(
        &self,
        ctx: &RequestContext,
        text: &str,
        voice_id: &str,
    ) -> Option<(PathBuf, Option<f64>)> {
        let out = ctx.work_dir.join("narration.wav");
        match self
            .call(ctx, "narration", self.caps.voice.synthesize(text, voice_id, &out))
            .await
        {
            Ok(path) => {
                let wav = path.clone();
                let read = tokio::task::spawn_blocking(move || wav_duration_seconds(&wav)).await;
                let duration = match read {
                    Ok(Ok(duration)) => Some(duration),
                    Ok(Err(e)) => {
                        warn!("Could not read narration length: {}", e);
                        None
                    }
                    Err(e) => {
                        warn!("Narration length task failed: {}", e);
                        None
                    }
                };
                Some((path, duration))
            }
            Err(e) => {
                log_fallback("narration", &e);
                tokio::fs::remove_file(&out).await.ok();
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assembly_job(
        &self,
        ctx: &RequestContext,
        clips: &[Option<PathBuf>],
        narration: Option<PathBuf>,
        music: Option<PathBuf>,
        captions: &[CaptionEntry],
        duration: f64,
        loop_video: bool,
    ) -> AssemblyJob {
        let overlays = captions
            .iter()
            .map(|entry| CaptionOverlay {
                layout: layout(
                    &entry.text,
                    ctx.canvas.width,
                    ctx.canvas.height,
                    &self.config.font,
                ),
                entry: entry.clone(),
            })
            .collect();
        AssemblyJob {
            clips: clips.iter().flatten().cloned().collect(),
            narration,
            music,
            music_volume: self.config.music_volume,
            overlays,
            canvas: ctx.canvas,
            duration,
            loop_video,
            work_dir: ctx.work_dir.clone(),
            output: ctx.work_dir.join("final.mp4"),
        }
    }

    /// Produce the final file in the work dir, falling back to a minimal
    /// captioned video.
    async fn assemble(&self, ctx: &RequestContext, job: AssemblyJob, script: &str) -> Option<PathBuf> {
        if job.clips.is_empty() {
            warn!("No clips to assemble; going straight to the fallback video");
        } else {
            match self.caps.media.assemble(&job).await {
                Ok(()) => return Some(job.output),
                Err(e) => warn!("Assembly failed: {}; rendering fallback video", e),
            }
        }

        let fallback = &self.config.fallback;
        let caption = first_words(script, fallback.fallback_caption_words);
        match self
            .caps
            .media
            .fallback_video(&caption, fallback.fallback_video_seconds, ctx.canvas, &job.output)
            .await
        {
            Ok(()) => Some(job.output),
            Err(e) => {
                error!("Fallback video failed: {}", e);
                None
            }
        }
    }

    /// Move the final file to public storage and drop the work dir.
    async fn promote(&self, ctx: &RequestContext, video: &Path) -> std::io::Result<PathBuf> {
        let videos_dir = self.config.videos_dir();
        tokio::fs::create_dir_all(&videos_dir).await?;
        let name = format!("{}-{}.mp4", ctx.flavor.output_prefix(), short_id(&ctx.id));
        let target = videos_dir.join(name);
        tokio::fs::copy(video, &target).await?;
        Ok(target)
    }

    async fn finish(
        &self,
        ctx: &RequestContext,
        script: Script,
        clips: Vec<Option<PathBuf>>,
        narration: Option<PathBuf>,
        captions: Vec<CaptionEntry>,
        video: Option<PathBuf>,
    ) -> PipelineResult {
        let promoted = match video {
            Some(video) => match self.promote(ctx, &video).await {
                Ok(path) => Some(path),
                Err(e) => {
                    error!("Failed to promote {}: {}", video.display(), e);
                    None
                }
            },
            None => None,
        };

        let status = if promoted.is_some() {
            info!("Pipeline complete");
            PipelineStatus::Completed
        } else {
            error!("Pipeline failed: no video produced");
            PipelineStatus::Failed
        };
        let (clips, narration) =
            if status == PipelineStatus::Failed || !self.config.keep_work_dir {
                self.discard(ctx).await;
                // intermediates under the work dir are gone now
                let live = |path: Option<PathBuf>| path.filter(|p| !p.starts_with(&ctx.work_dir));
                (clips.into_iter().map(live).collect(), live(narration))
            } else {
                (clips, narration)
            };

        PipelineResult {
            id: ctx.id.to_string(),
            script: script.text,
            scenes: script.scenes,
            clips,
            narration,
            captions,
            video: promoted,
            status,
        }
    }
}

fn log_fallback(stage: &str, err: &CapabilityError) {
    if err.is_unavailable() {
        info!("Skipping {} ({}); using fallback", stage, err);
    } else {
        warn!("{} failed: {}; using fallback", stage, err);
    }
}
