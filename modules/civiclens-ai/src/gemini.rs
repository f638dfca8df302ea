use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use tracing::warn;

use civiclens_common::Category;

use crate::{categorize_prompt, parse_analysis, ImageAnalysis, IssueAnalyzer, ANALYSIS_PROMPT, CAPTION_PROMPT};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL: &str = "gemini-1.5-pro";
const VISION_TIMEOUT: Duration = Duration::from_secs(30);
const TEXT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct GeminiAnalyzer {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl GeminiAnalyzer {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Fetch an image and return (base64 body, mime type). Gemini takes
    /// inline data rather than URLs.
    async fn fetch_image(&self, image_url: &str) -> Result<(String, String)> {
        let response = self
            .http
            .get(image_url)
            .timeout(VISION_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("image fetch failed: {}", response.status()));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response.bytes().await?;
        Ok((base64::engine::general_purpose::STANDARD.encode(&bytes), mime))
    }

    async fn generate(
        &self,
        parts: serde_json::Value,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{MODEL}:generateContent?key={}",
            self.base_url, self.api_key
        );

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(&json!({
                "contents": [{ "parts": parts }],
                "generationConfig": {
                    "temperature": 0.3,
                    "topK": 32,
                    "topP": 1,
                    "maxOutputTokens": max_tokens,
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error ({status}): {body}"));
        }

        let body: serde_json::Value = response.json().await?;
        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no response from Gemini API"))
    }

    async fn vision_request(&self, image_url: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let (data, mime) = self.fetch_image(image_url).await?;
        let parts = json!([
            { "text": prompt },
            { "inline_data": { "mime_type": mime, "data": data } }
        ]);
        self.generate(parts, max_tokens, VISION_TIMEOUT).await
    }
}

#[async_trait]
impl IssueAnalyzer for GeminiAnalyzer {
    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    async fn analyze_image(&self, image_url: &str) -> Result<ImageAnalysis> {
        match self.vision_request(image_url, ANALYSIS_PROMPT, 500).await {
            Ok(text) => Ok(parse_analysis(&text, MODEL)),
            Err(e) => {
                warn!(error = %e, "Gemini image analysis failed, using fallback");
                Ok(ImageAnalysis::fallback("fallback"))
            }
        }
    }

    async fn describe_image(&self, image_url: &str) -> Result<String> {
        match self.vision_request(image_url, CAPTION_PROMPT, 200).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(error = %e, "Gemini description generation failed");
                Ok("Image description unavailable".to_string())
            }
        }
    }

    async fn categorize(&self, title: &str, description: &str) -> Result<Category> {
        let parts = json!([{ "text": categorize_prompt(title, description) }]);
        match self.generate(parts, 10, TEXT_TIMEOUT).await {
            Ok(text) => Ok(Category::from_str_loose(&text)),
            Err(e) => {
                warn!(error = %e, "Gemini categorization failed");
                Ok(Category::Other)
            }
        }
    }
}
