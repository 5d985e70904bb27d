//! Types for budget-aware model routing

use serde::{Deserialize, Serialize};

use crate::strategy::PromptStrategy;

/// Kind of work a task asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Produce new content
    #[default]
    Generation,
    /// Judge or score existing content
    Evaluation,
    /// Order a set of candidates
    Ranking,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::Ranking => write!(f, "ranking"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generation" => Ok(Self::Generation),
            "evaluation" => Ok(Self::Evaluation),
            "ranking" => Ok(Self::Ranking),
            _ => Err(format!("Unknown task type: {}", s)),
        }
    }
}

/// How much reasoning a task needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningDepth {
    Simple,
    #[default]
    Medium,
    Complex,
}

impl std::fmt::Display for ReasoningDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Medium => write!(f, "medium"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

impl std::str::FromStr for ReasoningDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "medium" => Ok(Self::Medium),
            "complex" => Ok(Self::Complex),
            _ => Err(format!("Unknown reasoning depth: {}", s)),
        }
    }
}

/// How soon a response is expected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSensitivity {
    Urgent,
    #[default]
    Normal,
    Flexible,
}

impl std::fmt::Display for TimeSensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Urgent => write!(f, "urgent"),
            Self::Normal => write!(f, "normal"),
            Self::Flexible => write!(f, "flexible"),
        }
    }
}

/// Classification attached to a task before admission
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub task_type: TaskType,
    pub reasoning_depth: ReasoningDepth,
    pub time_sensitivity: TimeSensitivity,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            task_type: TaskType::Generation,
            reasoning_depth: ReasoningDepth::Medium,
            time_sensitivity: TimeSensitivity::Normal,
            confidence: 0.7,
        }
    }
}

impl Classification {
    pub fn new(task_type: TaskType, reasoning_depth: ReasoningDepth) -> Self {
        Self {
            task_type,
            reasoning_depth,
            ..Default::default()
        }
    }

    pub fn with_time_sensitivity(mut self, time_sensitivity: TimeSensitivity) -> Self {
        self.time_sensitivity = time_sensitivity;
        self
    }

    /// Set confidence, clamped into [0, 1]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Inference provider, each with its own token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Openai,
    Anthropic,
    Google,
}

impl Provider {
    /// Ledger key for this provider
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    /// Infer the provider from a model name by family substring
    pub fn for_model(model: &str) -> Option<Self> {
        let model = model.to_lowercase();
        if model.contains("gpt") {
            Some(Self::Openai)
        } else if model.contains("claude") {
            Some(Self::Anthropic)
        } else if model.contains("gemini") {
            Some(Self::Google)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "anthropic" => Ok(Self::Anthropic),
            "google" => Ok(Self::Google),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Model target chosen for a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub model: String,
    pub provider: Provider,
    /// Subnet token ceiling for one task
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Full routing outcome for an admitted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub model: String,
    pub provider: Provider,
    pub max_tokens: u32,
    pub temperature: f32,
    pub strategy: PromptStrategy,
    /// Tokens the task may spend after the strategy multiplier and budget cap
    pub allocated_tokens: u64,
}

impl RoutingDecision {
    pub fn new(selection: ModelSelection, strategy: PromptStrategy, allocated_tokens: u64) -> Self {
        Self {
            model: selection.model,
            provider: selection.provider,
            max_tokens: selection.max_tokens,
            temperature: selection.temperature,
            strategy,
            allocated_tokens,
        }
    }
}
