use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::capability::{CapabilityResult, ClipGenerator};
use crate::error::CapabilityError;
use crate::models::SceneDescriptor;
use crate::utils::image_data_url;

const RUNWAY_API_BASE: &str = "https://api.runwayml.com";

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    output: Option<InferenceOutput>,
}

#[derive(Debug, Deserialize)]
struct InferenceOutput {
    video_url: Option<String>,
}

/// RunwayML text/image-to-video adapter.
#[derive(Debug, Clone)]
pub struct RunwayClient {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl RunwayClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: RUNWAY_API_BASE.to_string(),
            client: Client::new(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

fn inference_body(scene: &SceneDescriptor, reference_image: Option<&[u8]>) -> serde_json::Value {
    let mut input = json!({
        "prompt": scene.prompt,
        "duration": scene.duration,
        "width": 1920,
        "height": 1080,
        "fps": 24
    });
    if let Some(image) = reference_image {
        input["reference_image"] = json!(image_data_url(image));
    }
    json!({ "model": "gen-2", "input": input })
}

#[async_trait]
impl ClipGenerator for RunwayClient {
    async fn generate(
        &self,
        scene: &SceneDescriptor,
        reference_image: Option<&[u8]>,
        out: &Path,
    ) -> CapabilityResult<PathBuf> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CapabilityError::Unavailable("RUNWAY_API_KEY not set".to_string()))?;

        info!("Requesting clip: {:.80}", scene.prompt);
        let response = self
            .client
            .post(format!("{}/v1/inference", self.base_url))
            .bearer_auth(api_key)
            .json(&inference_body(scene, reference_image))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: InferenceResponse = response.json().await?;
        let video_url = parsed
            .output
            .and_then(|o| o.video_url)
            .ok_or_else(|| CapabilityError::Malformed("no output.video_url".to_string()))?;

        let bytes = self
            .client
            .get(&video_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(out, &bytes).await?;
        info!("Clip saved to {} ({} bytes)", out.display(), bytes.len());
        Ok(out.to_path_buf())
    }
}
