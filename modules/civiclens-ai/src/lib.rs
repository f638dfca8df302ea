//! Injectable AI capability for issue enrichment.
//!
//! The API server holds an `Arc<dyn IssueAnalyzer>` chosen at startup from
//! configuration: Gemini when a Gemini key is present, OpenAI when an OpenAI
//! key is present, otherwise the deterministic keyword classifier. Every
//! operation degrades to a local fallback on provider failure; enrichment
//! must never fail the request that triggered it.

pub mod classifier;
pub mod gemini;
pub mod openai;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use civiclens_common::{Category, Config};

pub use classifier::{estimate_priority, KeywordClassifier};
pub use gemini::GeminiAnalyzer;
pub use openai::OpenAiAnalyzer;

/// Severity as assessed from an image, independent of triage priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

/// Structured output of an image analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageAnalysis {
    pub description: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
    pub suggested_category: Category,
    pub confidence: f32,
    #[serde(default = "Utc::now")]
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub provider: String,
}

impl ImageAnalysis {
    /// Analysis returned when a provider call fails. Low confidence so it is
    /// never preferred over caller-supplied values.
    pub fn fallback(provider: &str) -> Self {
        Self {
            description: "AI analysis unavailable - manual review required".to_string(),
            issues: Vec::new(),
            severity: Severity::Medium,
            suggested_category: Category::Other,
            confidence: 0.1,
            processed_at: Utc::now(),
            provider: provider.to_string(),
        }
    }
}

/// Capability object over the AI enrichment operations the issue pipeline
/// uses. Implementations must be infallible in spirit: on provider errors
/// they return fallback values rather than propagating failures.
#[async_trait]
pub trait IssueAnalyzer: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Analyze a civic infrastructure image: description, visible issues,
    /// severity, suggested category, confidence.
    async fn analyze_image(&self, image_url: &str) -> Result<ImageAnalysis>;

    /// Short caption for a stored image.
    async fn describe_image(&self, image_url: &str) -> Result<String>;

    /// Classify an issue from its title and description.
    async fn categorize(&self, title: &str, description: &str) -> Result<Category>;
}

/// Select the analyzer implied by configuration. Gemini wins over OpenAI when
/// both keys are set; with no key configured the keyword classifier keeps
/// everything deterministic.
pub fn analyzer_from_config(config: &Config) -> Arc<dyn IssueAnalyzer> {
    if !config.gemini_api_key.is_empty() {
        tracing::info!(provider = "gemini", "AI analyzer initialized");
        Arc::new(GeminiAnalyzer::new(&config.gemini_api_key))
    } else if !config.openai_api_key.is_empty() {
        tracing::info!(provider = "openai", "AI analyzer initialized");
        Arc::new(OpenAiAnalyzer::new(&config.openai_api_key))
    } else {
        tracing::info!(provider = "keyword", "no AI key configured, using keyword classifier");
        Arc::new(KeywordClassifier::new())
    }
}

/// Prompt shared by both vision providers.
pub(crate) const ANALYSIS_PROMPT: &str = "Analyze this civic infrastructure image and provide:\n\
    1. A detailed description of what you see\n\
    2. Any infrastructure issues (potholes, broken lights, drainage problems, etc.)\n\
    3. The severity level (low, medium, high)\n\
    4. The most appropriate category from: pothole, street_light, drainage, traffic_signal, \
    road_damage, sidewalk, graffiti, garbage, water_leak, park_maintenance, noise_complaint, other\n\
    5. A confidence score (0-1)\n\n\
    Respond in JSON with keys: description, issues, severity, suggested_category, confidence";

pub(crate) const CAPTION_PROMPT: &str = "Provide a clear, concise description of this civic \
    infrastructure image. Focus on what infrastructure elements are visible and any issues \
    that need attention.";

pub(crate) fn categorize_prompt(title: &str, description: &str) -> String {
    format!(
        "You are a civic issue categorization system. Based on the issue title and description, \
        classify it into one of these categories: pothole, street_light, drainage, traffic_signal, \
        road_damage, sidewalk, graffiti, garbage, water_leak, park_maintenance, noise_complaint, \
        other. Respond with only the category name.\n\nTitle: {title}\nDescription: {description}"
    )
}

/// Parse a provider's analysis response. Providers frequently wrap JSON in
/// markdown fences or fall back to prose; prose becomes a low-confidence
/// analysis carrying the raw text as the description.
pub(crate) fn parse_analysis(raw: &str, provider: &str) -> ImageAnalysis {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(v) => ImageAnalysis {
            description: v["description"]
                .as_str()
                .unwrap_or("AI analysis completed")
                .to_string(),
            issues: v["issues"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|i| i.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            severity: match v["severity"].as_str().unwrap_or("medium") {
                "low" => Severity::Low,
                "high" => Severity::High,
                _ => Severity::Medium,
            },
            suggested_category: Category::from_str_loose(
                v["suggested_category"].as_str().unwrap_or("other"),
            ),
            confidence: v["confidence"].as_f64().unwrap_or(0.5) as f32,
            processed_at: Utc::now(),
            provider: provider.to_string(),
        },
        Err(_) => ImageAnalysis {
            description: trimmed.to_string(),
            issues: Vec::new(),
            severity: Severity::Medium,
            suggested_category: Category::Other,
            confidence: 0.3,
            processed_at: Utc::now(),
            provider: provider.to_string(),
        },
    }
}
