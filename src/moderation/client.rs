use crate::config::ModerationConfig;
use crate::error::{Result, SyncError};
use crate::moderation::verdict::{TextVerdict, VisionVerdict};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Seam over the AI provider's two moderation surfaces. The engine only ever
/// talks to this trait; provider-specific JSON stays in this module.
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    /// Bulk text/image moderation. The provider accepts at most one image
    /// per call, so callers pass the logo here and defer screenshots to the
    /// vision stage.
    async fn moderate_content(
        &self,
        texts: &[String],
        image_url: Option<&str>,
    ) -> Result<TextVerdict>;

    /// Vision-based contextual analysis over a prompt plus image set. The
    /// reply must carry the verdict as a JSON object.
    async fn analyze_images(&self, prompt: &str, image_urls: &[String]) -> Result<VisionVerdict>;
}

// ---- provider response shapes ----

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, bool>,
}

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

/// Collapses per-input moderation results into one verdict: flagged if any
/// input is, with the union of flagged category names.
fn aggregate_results(results: &[ModerationResult]) -> TextVerdict {
    let flagged = results.iter().any(|r| r.flagged);
    let mut categories: Vec<String> = results
        .iter()
        .flat_map(|r| {
            r.categories
                .iter()
                .filter(|(_, hit)| **hit)
                .map(|(name, _)| name.clone())
        })
        .collect();
    categories.sort();
    categories.dedup();
    TextVerdict { flagged, categories }
}

/// Pulls the verdict object out of an assistant reply, tolerating a markdown
/// code fence around the JSON.
fn parse_vision_reply(content: &str) -> Result<VisionVerdict> {
    let trimmed = content.trim();
    let body = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.trim_start_matches(['\r', '\n'])
            .trim_end_matches('`')
            .trim()
    } else {
        trimmed
    };
    serde_json::from_str(body)
        .map_err(|e| SyncError::ModerationParseError(format!("vision reply not valid JSON: {e}")))
}

pub struct OpenAiModerationClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    moderation_model: String,
    vision_model: String,
    max_vision_tokens: u32,
}

impl OpenAiModerationClient {
    pub fn new(config: &ModerationConfig) -> Self {
        // Every outbound call must carry a deadline; no deadline-less fallback.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("moderation HTTP client with timeout");
        Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            moderation_model: config.moderation_model.clone(),
            vision_model: config.vision_model.clone(),
            max_vision_tokens: config.max_vision_tokens,
        }
    }

    async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/{}", self.api_url, endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::ModerationUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::ModerationUnavailable(format!(
                "{endpoint} returned {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ModerationProvider for OpenAiModerationClient {
    #[instrument(skip_all, fields(texts = texts.len(), has_image = image_url.is_some()))]
    async fn moderate_content(
        &self,
        texts: &[String],
        image_url: Option<&str>,
    ) -> Result<TextVerdict> {
        let mut input: Vec<serde_json::Value> = texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| json!({"type": "text", "text": t}))
            .collect();
        if let Some(url) = image_url {
            input.push(json!({"type": "image_url", "image_url": {"url": url}}));
        }

        let body = json!({
            "model": self.moderation_model,
            "input": input,
        });
        let response = self.post("moderations", body).await?;
        let parsed: ModerationResponse = response
            .json()
            .await
            .map_err(|e| SyncError::ModerationParseError(e.to_string()))?;

        let verdict = aggregate_results(&parsed.results);
        debug!(flagged = verdict.flagged, "moderation result");
        Ok(verdict)
    }

    #[instrument(skip_all, fields(images = image_urls.len()))]
    async fn analyze_images(&self, prompt: &str, image_urls: &[String]) -> Result<VisionVerdict> {
        let mut content = vec![json!({"type": "text", "text": prompt})];
        for url in image_urls {
            content.push(json!({"type": "image_url", "image_url": {"url": url}}));
        }

        let body = json!({
            "model": self.vision_model,
            "max_tokens": self.max_vision_tokens,
            "messages": [{"role": "user", "content": content}],
        });
        let response = self.post("chat/completions", body).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SyncError::ModerationParseError(e.to_string()))?;

        let reply = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| {
                SyncError::ModerationParseError("vision response carried no message".to_string())
            })?;
        parse_vision_reply(reply)
    }
}
