use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use civiclens_common::Category;

use crate::{categorize_prompt, parse_analysis, ImageAnalysis, IssueAnalyzer, ANALYSIS_PROMPT, CAPTION_PROMPT};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const VISION_MODEL: &str = "gpt-4o";
const TEXT_MODEL: &str = "gpt-4o-mini";
const VISION_TIMEOUT: Duration = Duration::from_secs(30);
const TEXT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct OpenAiAnalyzer {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiAnalyzer {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    async fn chat(
        &self,
        model: &str,
        messages: serde_json::Value,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": model,
                "messages": messages,
                "max_tokens": max_tokens,
                "temperature": 0.3,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error ({status}): {body}"));
        }

        let body: serde_json::Value = response.json().await?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no response from OpenAI API"))
    }

    async fn vision_request(&self, image_url: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let messages = json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": image_url, "detail": "high" } }
            ]
        }]);
        self.chat(VISION_MODEL, messages, max_tokens, VISION_TIMEOUT).await
    }
}

#[async_trait]
impl IssueAnalyzer for OpenAiAnalyzer {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    async fn analyze_image(&self, image_url: &str) -> Result<ImageAnalysis> {
        match self.vision_request(image_url, ANALYSIS_PROMPT, 500).await {
            Ok(text) => Ok(parse_analysis(&text, VISION_MODEL)),
            Err(e) => {
                warn!(error = %e, "OpenAI image analysis failed, using fallback");
                Ok(ImageAnalysis::fallback("fallback"))
            }
        }
    }

    async fn describe_image(&self, image_url: &str) -> Result<String> {
        match self.vision_request(image_url, CAPTION_PROMPT, 200).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(error = %e, "OpenAI description generation failed");
                Ok("Image description unavailable".to_string())
            }
        }
    }

    async fn categorize(&self, title: &str, description: &str) -> Result<Category> {
        let messages = json!([
            { "role": "system", "content": "You are a civic issue categorization system." },
            { "role": "user", "content": categorize_prompt(title, description) }
        ]);
        match self.chat(TEXT_MODEL, messages, 10, TEXT_TIMEOUT).await {
            Ok(text) => Ok(Category::from_str_loose(&text)),
            Err(e) => {
                warn!(error = %e, "OpenAI categorization failed");
                Ok(Category::Other)
            }
        }
    }
}
