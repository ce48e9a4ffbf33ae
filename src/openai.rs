use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::capability::{CapabilityResult, ScriptGenerator, VisionDescriber};
use crate::error::CapabilityError;
use crate::models::Script;
use crate::script::{parse_caption_lines, parse_script_response};
use crate::utils::image_data_url;

const OPENAI_API_BASE: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const DESCRIBE_PROMPT: &str = "Describe this image in detail, focusing on visual elements, style, \
mood, and any objects or scenes that could be used for video generation. Be specific about \
colors, lighting, composition, and atmosphere.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI chat completions adapter, used for both image description and
/// script writing.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            client: Client::new(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn api_key(&self) -> CapabilityResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CapabilityError::Unavailable("OPENAI_API_KEY not set".to_string()))
    }

    async fn chat(&self, body: serde_json::Value) -> CapabilityResult<String> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
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

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CapabilityError::Malformed("no message content in completion".to_string()))
    }
}

#[async_trait]
impl VisionDescriber for OpenAiClient {
    async fn describe(&self, image: &[u8]) -> CapabilityResult<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": 300,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": DESCRIBE_PROMPT },
                    { "type": "image_url", "image_url": { "url": image_data_url(image) } }
                ]
            }]
        });
        let description = self.chat(body).await?;
        debug!("Image description: {:.120}", description);
        Ok(description.trim().to_string())
    }
}

#[async_trait]
impl ScriptGenerator for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        style: &str,
        descriptions: &[String],
    ) -> CapabilityResult<Script> {
        let body = json!({
            "model": self.model,
            "max_tokens": 800,
            "temperature": 0.7,
            "messages": [
                { "role": "system", "content": script_system_prompt(style) },
                { "role": "user", "content": script_user_prompt(prompt, descriptions) }
            ]
        });
        let content = self.chat(body).await?;
        let script = parse_script_response(&content);
        if script.text.is_empty() {
            return Err(CapabilityError::Malformed(
                "response has no SCRIPT: section".to_string(),
            ));
        }
        info!("Script generated with {} scenes", script.scenes.len());
        Ok(script)
    }

    async fn caption_lines(&self, prompt: &str, template: &str) -> CapabilityResult<Vec<String>> {
        let body = json!({
            "model": self.model,
            "max_tokens": 200,
            "temperature": 0.9,
            "messages": [
                {
                    "role": "system",
                    "content": "You write captions for short vertical meme videos. Reply with 3 to 5 \
                                caption lines, one per line, at most 8 words each, no numbering."
                },
                {
                    "role": "user",
                    "content": format!("Trend template: {}\nIdea: {}", template, prompt)
                }
            ]
        });
        let content = self.chat(body).await?;
        let lines = parse_caption_lines(&content);
        if lines.is_empty() {
            return Err(CapabilityError::Malformed("no caption lines in response".to_string()));
        }
        Ok(lines)
    }
}

fn script_system_prompt(style: &str) -> String {
    format!(
        r#"You are a professional video script writer and storyboard artist. Create a compelling short story video based on the user's prompt and reference images.

Style: {style}

Write a short, engaging script (3-5 sentences) that tells a complete story, then break it into 3-5 scenes of 3-5 seconds each. Keep the whole video under 20 seconds. Give every scene a detailed visual prompt for AI video generation, informed by the reference images.

Output format:
SCRIPT: <script>

SCENES:
1. <scene description> | Duration: <seconds> seconds | Prompt: <visual prompt>
2. <scene description> | Duration: <seconds> seconds | Prompt: <visual prompt>"#
    )
}

fn script_user_prompt(prompt: &str, descriptions: &[String]) -> String {
    let images = if descriptions.is_empty() {
        "(none)".to_string()
    } else {
        descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| format!("Image {}: {}", i + 1, d))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "User Request: {}\n\nReference Images:\n{}\n\nPlease create a compelling story video based on this prompt and the visual style of the reference images.",
        prompt, images
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let client = OpenAiClient::new(None);
        let err = client.describe(b"img").await.unwrap_err();
        assert!(err.is_unavailable());

        let client = OpenAiClient::new(Some("  ".to_string()));
        let err = client.generate("p", "s", &[]).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_user_prompt_lists_images() {
        let prompt = script_user_prompt("robots", &["a red car".to_string(), "a tree".to_string()]);
        assert!(prompt.contains("Image 1: a red car"));
        assert!(prompt.contains("Image 2: a tree"));
        assert!(script_user_prompt("robots", &[]).contains("(none)"));
    }

    #[test]
    fn test_system_prompt_carries_style() {
        assert!(script_system_prompt("noir").contains("Style: noir"));
    }
}
