//! Deterministic keyword classifier and priority heuristic.
//!
//! Used as the `IssueAnalyzer` when no provider key is configured, and in
//! tests so nothing depends on a network call. The priority heuristic is
//! always local, regardless of which analyzer is active.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use civiclens_common::{Category, Priority};

use crate::{ImageAnalysis, IssueAnalyzer};

const URGENT_KEYWORDS: [&str; 6] = ["emergency", "dangerous", "unsafe", "hazard", "urgent", "critical"];
const HIGH_KEYWORDS: [&str; 5] = ["major", "severe", "broken", "damaged", "flooding"];
const MINOR_KEYWORDS: [&str; 4] = ["minor", "small", "slight", "cosmetic"];

/// Keyword hints per category, checked against title (weight 2) and
/// description (weight 1). First-listed category wins ties.
const CATEGORY_KEYWORDS: [(Category, &[&str]); 11] = [
    (Category::Pothole, &["pothole", "pot hole"]),
    (Category::StreetLight, &["street light", "streetlight", "lamp post", "lamppost"]),
    (Category::TrafficSignal, &["traffic signal", "traffic light", "stop light"]),
    (Category::WaterLeak, &["water leak", "burst pipe", "hydrant", "water main"]),
    (Category::Drainage, &["drain", "sewer", "flood", "standing water"]),
    (Category::RoadDamage, &["road damage", "crack", "asphalt", "road surface"]),
    (Category::Sidewalk, &["sidewalk", "footpath", "curb", "kerb"]),
    (Category::Graffiti, &["graffiti", "spray paint", "vandalism", "tagging"]),
    (Category::Garbage, &["garbage", "trash", "litter", "dumping", "rubbish"]),
    (Category::ParkMaintenance, &["park", "playground", "bench", "overgrown"]),
    (Category::NoiseComplaint, &["noise", "loud", "music", "construction sound"]),
];

/// Estimate triage priority from category and text, per the service's
/// longstanding heuristic: urgent keywords dominate, then category-specific
/// keyword tiers, then per-category defaults.
pub fn estimate_priority(
    category: Category,
    description: &str,
    analysis: Option<&ImageAnalysis>,
) -> Priority {
    let text = format!(
        "{} {}",
        description,
        analysis.map(|a| a.description.as_str()).unwrap_or("")
    )
    .to_lowercase();

    if URGENT_KEYWORDS.iter().any(|k| text.contains(k)) {
        return Priority::Urgent;
    }

    let has_high = HIGH_KEYWORDS.iter().any(|k| text.contains(k));
    let has_minor = MINOR_KEYWORDS.iter().any(|k| text.contains(k));

    match category {
        Category::WaterLeak | Category::TrafficSignal | Category::Drainage if has_high => {
            Priority::High
        }
        Category::Pothole | Category::RoadDamage | Category::StreetLight => {
            if has_high {
                Priority::High
            } else if has_minor {
                Priority::Low
            } else {
                Priority::Medium
            }
        }
        _ => default_priority(category),
    }
}

fn default_priority(category: Category) -> Priority {
    match category {
        Category::WaterLeak | Category::TrafficSignal => Priority::High,
        Category::Drainage | Category::Pothole | Category::RoadDamage | Category::StreetLight => {
            Priority::Medium
        }
        Category::Sidewalk
        | Category::Graffiti
        | Category::Garbage
        | Category::ParkMaintenance
        | Category::NoiseComplaint => Priority::Low,
        Category::Other => Priority::Medium,
    }
}

/// Deterministic analyzer backed by the keyword tables above.
pub struct KeywordClassifier {
    word: Regex,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self {
            // Collapses whitespace so multi-word keywords match across line breaks
            word: Regex::new(r"\s+").expect("static regex"),
        }
    }

    fn classify(&self, title: &str, description: &str) -> Category {
        let title = self.word.replace_all(&title.to_lowercase(), " ").to_string();
        let description = self
            .word
            .replace_all(&description.to_lowercase(), " ")
            .to_string();

        let mut best = (Category::Other, 0u32);
        for (category, keywords) in CATEGORY_KEYWORDS {
            let mut score = 0u32;
            for kw in keywords {
                if title.contains(kw) {
                    score += 2;
                }
                if description.contains(kw) {
                    score += 1;
                }
            }
            if score > best.1 {
                best = (category, score);
            }
        }
        best.0
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IssueAnalyzer for KeywordClassifier {
    fn provider_name(&self) -> &'static str {
        "keyword"
    }

    async fn analyze_image(&self, _image_url: &str) -> Result<ImageAnalysis> {
        // No vision capability; callers get the manual-review fallback.
        Ok(ImageAnalysis::fallback("keyword"))
    }

    async fn describe_image(&self, _image_url: &str) -> Result<String> {
        Ok("Image description unavailable - AI service not configured".to_string())
    }

    async fn categorize(&self, title: &str, description: &str) -> Result<Category> {
        Ok(self.classify(title, description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn classifies_pothole_from_title() {
        let c = KeywordClassifier::new();
        let cat = c.categorize("Huge pothole on Main St", "The road has a hole").await.unwrap();
        assert_eq!(cat, Category::Pothole);
    }

    #[tokio::test]
    async fn title_outweighs_description() {
        let c = KeywordClassifier::new();
        // "graffiti" in title (2) beats "trash" in description (1)
        let cat = c.categorize("Graffiti on wall", "someone left trash too").await.unwrap();
        assert_eq!(cat, Category::Graffiti);
    }

    #[tokio::test]
    async fn unmatched_text_is_other() {
        let c = KeywordClassifier::new();
        let cat = c.categorize("Something odd", "hard to say what this is").await.unwrap();
        assert_eq!(cat, Category::Other);
    }

    #[test]
    fn urgent_keyword_dominates() {
        let p = estimate_priority(Category::Graffiti, "this is dangerous and urgent", None);
        assert_eq!(p, Priority::Urgent);
    }

    #[test]
    fn high_keyword_lifts_water_leak() {
        let p = estimate_priority(Category::WaterLeak, "severe leak under the road", None);
        assert_eq!(p, Priority::High);
    }

    #[test]
    fn minor_keyword_lowers_pothole() {
        let p = estimate_priority(Category::Pothole, "small cosmetic dent", None);
        assert_eq!(p, Priority::Low);
    }

    #[test]
    fn category_defaults_apply() {
        assert_eq!(estimate_priority(Category::TrafficSignal, "out", None), Priority::High);
        assert_eq!(estimate_priority(Category::Garbage, "bags on corner", None), Priority::Low);
        assert_eq!(estimate_priority(Category::Other, "misc", None), Priority::Medium);
    }

    #[test]
    fn analysis_description_feeds_heuristic() {
        let mut analysis = ImageAnalysis::fallback("test");
        analysis.description = "severe flooding visible".to_string();
        let p = estimate_priority(Category::Drainage, "water pooling", Some(&analysis));
        assert_eq!(p, Priority::High);
    }
}
