//! Inbound tasks and their classification

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::policy::{SubnetId, default_subnet};
use crate::routing::{Classification, ReasoningDepth, TaskType, TimeSensitivity};

/// One unit of external work requiring a generated response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "new_task_id")]
    pub id: String,
    pub content: String,
    #[serde(default = "default_subnet")]
    pub subnet_id: SubnetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

impl Task {
    /// Create a task with a generated id
    pub fn new(content: impl Into<String>, subnet_id: SubnetId) -> Self {
        Self {
            id: new_task_id(),
            content: content.into(),
            subnet_id,
            classification: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }
}

const RANKING_KEYWORDS: &[&str] = &["rank", "order these", "sort these", "prioritize", "which is best"];
const EVALUATION_KEYWORDS: &[&str] = &[
    "evaluate", "score", "rate this", "rate the", "assess", "judge", "grade", "is this correct", "review",
];
const COMPLEX_KEYWORDS: &[&str] = &[
    "step by step", "explain why", "prove", "derive", "analyze", "analyse", "compare", "design",
    "trade-off", "tradeoff",
];
const URGENT_KEYWORDS: &[&str] = &["urgent", "asap", "immediately", "right now"];
const FLEXIBLE_KEYWORDS: &[&str] = &["no rush", "whenever", "when you can"];

/// Keyword and length heuristic classifier
///
/// Never fails: empty or unrecognised content gets the default
/// classification (generation, medium, normal, confidence 0.7).
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    /// Content at or below this many characters counts as simple
    simple_max_chars: usize,
    /// Content above this many characters counts as complex
    complex_min_chars: usize,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self {
            simple_max_chars: 80,
            complex_min_chars: 1500,
        }
    }
}

impl TaskClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify task content
    pub fn classify(&self, content: &str) -> Classification {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Classification::default();
        }

        let lower = trimmed.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        let chars = trimmed.chars().count();

        let ranking = contains_any(RANKING_KEYWORDS);
        let evaluation = contains_any(EVALUATION_KEYWORDS);
        let task_type = if ranking {
            TaskType::Ranking
        } else if evaluation {
            TaskType::Evaluation
        } else {
            TaskType::Generation
        };

        let complex = contains_any(COMPLEX_KEYWORDS);
        let reasoning_depth = if complex || chars > self.complex_min_chars {
            ReasoningDepth::Complex
        } else if chars <= self.simple_max_chars {
            ReasoningDepth::Simple
        } else {
            ReasoningDepth::Medium
        };

        let time_sensitivity = if contains_any(URGENT_KEYWORDS) {
            TimeSensitivity::Urgent
        } else if contains_any(FLEXIBLE_KEYWORDS) {
            TimeSensitivity::Flexible
        } else {
            TimeSensitivity::Normal
        };

        // Explicit signals raise confidence; conflicting type signals lower it
        let mut confidence = Classification::default().confidence;
        if ranking != evaluation {
            confidence += 0.1;
        } else if ranking && evaluation {
            confidence -= 0.1;
        }
        if complex {
            confidence += 0.05;
        }

        let classification = Classification::new(task_type, reasoning_depth)
            .with_time_sensitivity(time_sensitivity)
            .with_confidence(confidence);

        debug!(
            task_type = %classification.task_type,
            reasoning_depth = %classification.reasoning_depth,
            time_sensitivity = %classification.time_sensitivity,
            confidence = classification.confidence,
            "Classified task"
        );
        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::policy::DEFAULT_SUBNET;
    use crate::performance::TaskResult;

    #[test]
    fn test_empty_content_gets_defaults() {
        let classifier = TaskClassifier::new();
        assert_eq!(classifier.classify(""), Classification::default());
        assert_eq!(classifier.classify("   \n"), Classification::default());
    }

    #[test]
    fn test_short_question_is_simple_generation() {
        let c = TaskClassifier::new().classify("What is 2+2?");
        assert_eq!(c.task_type, TaskType::Generation);
        assert_eq!(c.reasoning_depth, ReasoningDepth::Simple);
        assert_eq!(c.time_sensitivity, TimeSensitivity::Normal);
        assert!((c.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_ranking_and_evaluation_keywords() {
        let classifier = TaskClassifier::new();
        let ranking = classifier.classify("Rank the following three completions by helpfulness");
        assert_eq!(ranking.task_type, TaskType::Ranking);
        assert!((ranking.confidence - 0.8).abs() < 1e-9);

        let evaluation = classifier.classify("Evaluate whether this summary is faithful");
        assert_eq!(evaluation.task_type, TaskType::Evaluation);
    }

    #[test]
    fn test_complex_by_keyword_or_length() {
        let classifier = TaskClassifier::new();
        let keyword = classifier.classify("Explain why the sky is blue, step by step");
        assert_eq!(keyword.reasoning_depth, ReasoningDepth::Complex);

        let long = "word ".repeat(400);
        assert_eq!(classifier.classify(&long).reasoning_depth, ReasoningDepth::Complex);

        let medium = "a".repeat(200);
        assert_eq!(classifier.classify(&medium).reasoning_depth, ReasoningDepth::Medium);
    }

    #[test]
    fn test_time_sensitivity() {
        let classifier = TaskClassifier::new();
        assert_eq!(
            classifier.classify("Urgent: summarize this").time_sensitivity,
            TimeSensitivity::Urgent
        );
        assert_eq!(
            classifier.classify("No rush, write a haiku").time_sensitivity,
            TimeSensitivity::Flexible
        );
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        let classifier = TaskClassifier::new();
        let long = "z".repeat(5000);
        for content in ["rank and score and evaluate these", "prove it", "x", long.as_str()] {
            let c = classifier.classify(content);
            assert!((0.0..=1.0).contains(&c.confidence));
        }
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let task: Task = serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(task.subnet_id, DEFAULT_SUBNET);
        assert!(!task.id.is_empty());
        assert!(task.classification.is_none());
    }

    #[test]
    fn test_task_and_result_share_subnet_default() {
        let task: Task = serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        let result: TaskResult = serde_json::from_str(
            r#"{"task_id": "t-1", "timestamp": "2024-01-15T10:30:00", "validator_score": 0.8,
                "tokens_spent": 100, "llm_used": "openai-gpt4", "prompt_strategy": "concise_generation"}"#,
        )
        .unwrap();
        assert_eq!(task.subnet_id, 1);
        assert_eq!(task.subnet_id, result.subnet_id);
    }
}
