//! Priority classifier: free text in, triage estimate out.
//!
//! Pure and deterministic: identical input always yields identical output,
//! which makes reprocessing idempotent and the classifier testable in
//! isolation. No store access, no side effects.

use serde::{Deserialize, Serialize};

use super::keywords::{
    department_hint, CATEGORY_KEYWORDS, HIGH_KEYWORDS, NEGATIVE_KEYWORDS, POSITIVE_KEYWORDS,
    URGENT_KEYWORDS,
};
use crate::state::{ConcernCategory, Priority, Sentiment};

/// Triage estimate for a concern's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageAnalysis {
    pub priority: Priority,
    pub category: ConcernCategory,
    /// Suggested owning department for the category.
    pub department_hint: String,
    pub sentiment: Sentiment,
    /// Urgent priority combined with negative sentiment.
    pub auto_escalation: bool,
    /// Heuristic confidence in the estimate, 0.0 to 1.0.
    pub confidence: f64,
}

impl TriageAnalysis {
    /// Compact form for logging.
    pub fn summary(&self) -> String {
        format!(
            "priority={} category={} sentiment={:?} auto_escalation={} confidence={:.2}",
            self.priority, self.category, self.sentiment, self.auto_escalation, self.confidence,
        )
    }
}

/// Keyword-driven concern classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityClassifier;

impl PriorityClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify subject and description together.
    pub fn classify(&self, subject: &str, description: &str) -> TriageAnalysis {
        let text = format!("{subject} {description}").to_lowercase();

        let priority = if URGENT_KEYWORDS.iter().any(|kw| text.contains(kw)) {
            Priority::Urgent
        } else if HIGH_KEYWORDS.iter().any(|kw| text.contains(kw)) {
            Priority::High
        } else {
            Priority::Medium
        };

        let (category, category_hits) = Self::categorize(&text);
        let sentiment = Self::sentiment(&text);
        let auto_escalation = priority == Priority::Urgent && sentiment == Sentiment::Negative;

        let base = match priority {
            Priority::Urgent => 0.9,
            Priority::High => 0.75,
            Priority::Medium | Priority::Low => 0.5,
        };
        let confidence = (base + 0.05 * category_hits.min(4) as f64).min(0.95);

        TriageAnalysis {
            priority,
            category,
            department_hint: department_hint(category).to_string(),
            sentiment,
            auto_escalation,
            confidence,
        }
    }

    /// Argmax over category keyword hits; ties keep the earlier table entry,
    /// zero hits fall back to `general`.
    fn categorize(text: &str) -> (ConcernCategory, usize) {
        let mut best = (ConcernCategory::General, 0usize);
        for (category, keywords) in CATEGORY_KEYWORDS {
            let hits = keywords.iter().filter(|kw| text.contains(*kw)).count();
            if hits > best.1 {
                best = (*category, hits);
            }
        }
        best
    }

    /// Majority vote between positive and negative hits; ties are neutral.
    fn sentiment(text: &str) -> Sentiment {
        let positive = POSITIVE_KEYWORDS.iter().filter(|kw| text.contains(*kw)).count();
        let negative = NEGATIVE_KEYWORDS.iter().filter(|kw| text.contains(*kw)).count();
        match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        }
    }
}
