//! Result records and aggregate performance snapshots

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::policy::{SubnetId, default_subnet};

/// Scores above this count as a success
pub const SUCCESS_SCORE: f64 = 0.5;
/// Mean scores below this trigger a prompt strategy review
pub const LOW_AVERAGE_SCORE: f64 = 0.6;
/// Success rates below this trigger an admission policy review
pub const LOW_SUCCESS_RATE: f64 = 0.5;

/// Outcome of one answered task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub validator_score: f64,
    pub tokens_spent: u64,
    pub llm_used: String,
    pub prompt_strategy: String,
    #[serde(default = "default_subnet")]
    pub subnet_id: SubnetId,
}

/// Accept RFC 3339 timestamps and naive ISO 8601 timestamps taken as UTC
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

impl TaskResult {
    /// Create a result stamped with the current time
    pub fn new(
        task_id: impl Into<String>,
        validator_score: f64,
        tokens_spent: u64,
        llm_used: impl Into<String>,
        prompt_strategy: impl Into<String>,
        subnet_id: SubnetId,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            timestamp: Utc::now(),
            validator_score,
            tokens_spent,
            llm_used: llm_used.into(),
            prompt_strategy: prompt_strategy.into(),
            subnet_id,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_success(&self) -> bool {
        self.validator_score > SUCCESS_SCORE
    }
}

/// Aggregate statistics for one LLM or strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub tasks: usize,
    pub avg_score: f64,
    pub success_rate: f64,
}

#[derive(Default)]
struct Accumulator {
    tasks: usize,
    score_sum: f64,
    successes: usize,
}

impl Accumulator {
    fn add(&mut self, result: &TaskResult) {
        self.tasks += 1;
        self.score_sum += result.validator_score;
        if result.is_success() {
            self.successes += 1;
        }
    }

    fn finish(&self) -> GroupStats {
        if self.tasks == 0 {
            return GroupStats::default();
        }
        GroupStats {
            tasks: self.tasks,
            avg_score: self.score_sum / self.tasks as f64,
            success_rate: self.successes as f64 / self.tasks as f64,
        }
    }
}

/// Windowed performance metrics derived from the result log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    /// Window length; 0 when the window held no results
    pub period_days: u32,
    pub tasks_completed: usize,
    pub average_score: f64,
    pub success_rate: f64,
    pub total_tokens_spent: u64,
    pub by_llm: BTreeMap<String, GroupStats>,
    pub by_strategy: BTreeMap<String, GroupStats>,
    pub generated_at: DateTime<Utc>,
}

impl PerformanceSnapshot {
    /// Zero-valued snapshot for an empty window
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            period_days: 0,
            tasks_completed: 0,
            average_score: 0.0,
            success_rate: 0.0,
            total_tokens_spent: 0,
            by_llm: BTreeMap::new(),
            by_strategy: BTreeMap::new(),
            generated_at,
        }
    }

    /// Aggregate a window of results
    pub fn from_results<'a>(
        period_days: u32,
        results: impl IntoIterator<Item = &'a TaskResult>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut overall = Accumulator::default();
        let mut tokens: u64 = 0;
        let mut by_llm: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut by_strategy: BTreeMap<String, Accumulator> = BTreeMap::new();

        for result in results {
            overall.add(result);
            tokens = tokens.saturating_add(result.tokens_spent);
            by_llm.entry(result.llm_used.clone()).or_default().add(result);
            by_strategy
                .entry(result.prompt_strategy.clone())
                .or_default()
                .add(result);
        }

        if overall.tasks == 0 {
            return Self::empty(generated_at);
        }

        let stats = overall.finish();
        Self {
            period_days,
            tasks_completed: stats.tasks,
            average_score: stats.avg_score,
            success_rate: stats.success_rate,
            total_tokens_spent: tokens,
            by_llm: by_llm.into_iter().map(|(k, v)| (k, v.finish())).collect(),
            by_strategy: by_strategy
                .into_iter()
                .map(|(k, v)| (k, v.finish()))
                .collect(),
            generated_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks_completed == 0
    }

    /// LLM with the highest mean score
    pub fn best_llm(&self) -> Option<&str> {
        best_group(&self.by_llm)
    }

    /// Strategy with the highest mean score
    pub fn best_strategy(&self) -> Option<&str> {
        best_group(&self.by_strategy)
    }

    /// Advisory recommendations
    pub fn recommendations(&self) -> Vec<String> {
        let mut recommendations = Vec::new();

        if self.average_score < LOW_AVERAGE_SCORE {
            recommendations
                .push("Average score is low. Consider adjusting prompt strategies.".to_string());
        }
        if self.success_rate < LOW_SUCCESS_RATE {
            recommendations
                .push("Task success rate is poor. Review task selection logic.".to_string());
        }
        if let Some(llm) = self.best_llm() {
            recommendations.push(format!("Best performing LLM: {}", llm));
        }
        if let Some(strategy) = self.best_strategy() {
            recommendations.push(format!("Best performing strategy: {}", strategy));
        }

        recommendations
    }
}

/// Group with the maximum mean score; the first in name order wins ties
fn best_group(groups: &BTreeMap<String, GroupStats>) -> Option<&str> {
    let mut best: Option<(&str, f64)> = None;
    for (name, stats) in groups.iter().filter(|(_, s)| s.tasks > 0) {
        match best {
            Some((_, score)) if stats.avg_score <= score => {}
            _ => best = Some((name.as_str(), stats.avg_score)),
        }
    }
    best.map(|(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(id: &str, score: f64, llm: &str, strategy: &str) -> TaskResult {
        TaskResult::new(id, score, 100, llm, strategy, 1)
    }

    #[test]
    fn test_aggregates() {
        let results = vec![
            result("a", 0.9, "claude-sonnet", "structured_reasoning"),
            result("b", 0.5, "gemini-pro", "concise_generation"),
            result("c", 0.7, "claude-sonnet", "concise_generation"),
            result("d", 0.2, "gemini-pro", "concise_generation"),
        ];
        let snapshot = PerformanceSnapshot::from_results(7, &results, Utc::now());

        assert_eq!(snapshot.period_days, 7);
        assert_eq!(snapshot.tasks_completed, 4);
        assert!((snapshot.average_score - 0.575).abs() < 1e-9);
        assert!((snapshot.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(snapshot.total_tokens_spent, 400);

        let claude = &snapshot.by_llm["claude-sonnet"];
        assert_eq!(claude.tasks, 2);
        assert!((claude.avg_score - 0.8).abs() < 1e-9);
        assert!((claude.success_rate - 1.0).abs() < 1e-9);

        let concise = &snapshot.by_strategy["concise_generation"];
        assert_eq!(concise.tasks, 3);
        assert!((concise.success_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_of_exactly_half_is_not_success() {
        let results = vec![result("a", 0.5, "x", "y")];
        let snapshot = PerformanceSnapshot::from_results(1, &results, Utc::now());
        assert_eq!(snapshot.success_rate, 0.0);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = PerformanceSnapshot::from_results(7, &[], Utc::now());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.period_days, 0);
        assert!(snapshot.by_llm.is_empty());
        assert!(snapshot.best_llm().is_none());
    }

    #[test]
    fn test_recommendation_thresholds() {
        let good = vec![
            result("a", 0.9, "claude-sonnet", "structured_reasoning"),
            result("b", 0.8, "gemini-pro", "concise_generation"),
        ];
        let recs = PerformanceSnapshot::from_results(7, &good, Utc::now()).recommendations();
        assert_eq!(
            recs,
            vec![
                "Best performing LLM: claude-sonnet".to_string(),
                "Best performing strategy: structured_reasoning".to_string(),
            ]
        );

        let poor = vec![result("a", 0.3, "gemini-pro", "concise_generation")];
        let recs = PerformanceSnapshot::from_results(7, &poor, Utc::now()).recommendations();
        assert!(recs[0].starts_with("Average score is low"));
        assert!(recs[1].starts_with("Task success rate is poor"));
        assert_eq!(recs.len(), 4);
    }

    #[test]
    fn test_best_group_ties_go_to_first_name() {
        let results = vec![
            result("a", 0.7, "openai-gpt4", "s"),
            result("b", 0.7, "claude-sonnet", "s"),
        ];
        let snapshot = PerformanceSnapshot::from_results(7, &results, Utc::now());
        assert_eq!(snapshot.best_llm(), Some("claude-sonnet"));
    }

    #[test]
    fn test_reads_naive_and_rfc3339_timestamps() {
        let naive: TaskResult = serde_json::from_str(
            r#"{"timestamp": "2026-10-01T12:30:00.250000", "task_id": "t", "validator_score": 0.7,
                "tokens_spent": 500, "llm_used": "openai-gpt4",
                "prompt_strategy": "structured_reasoning", "subnet_id": 1}"#,
        )
        .unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 10, 1, 12, 30, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(naive.timestamp, expected);

        let rfc: TaskResult = serde_json::from_str(
            r#"{"timestamp": "2026-10-01T12:30:00Z", "task_id": "t", "validator_score": 0.7,
                "tokens_spent": 500, "llm_used": "openai-gpt4",
                "prompt_strategy": "structured_reasoning"}"#,
        )
        .unwrap();
        assert_eq!(rfc.subnet_id, 1);
        assert_eq!(rfc.timestamp, Utc.with_ymd_and_hms(2026, 10, 1, 12, 30, 0).unwrap());
    }
}
