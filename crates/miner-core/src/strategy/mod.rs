//! Prompt strategy catalog
//!
//! Each strategy pairs a prompt template with a token-cost multiplier that the
//! router applies when sizing a task's allocation. Operators may override a
//! built-in template; the multiplier is fixed per strategy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

const TASK_PLACEHOLDER: &str = "{task_content}";

const STRUCTURED_REASONING_TEMPLATE: &str = "You are an expert reasoning assistant. Analyze the following task and provide a structured response with clear reasoning steps.

Task: {task_content}

Please provide:
1. Understanding: What does this task ask?
2. Reasoning: What is your step-by-step reasoning?
3. Conclusion: What is your final answer?

Be clear, logical, and thorough.";

const CONCISE_GENERATION_TEMPLATE: &str = "Provide a brief, direct response to the following task. Be concise and avoid unnecessary verbosity.

Task: {task_content}

Response:";

const CALIBRATED_UNCERTAINTY_TEMPLATE: &str = "Analyze the following task and provide a response that includes your confidence level.

Task: {task_content}

Please:
1. Provide your best answer/analysis
2. Rate your confidence (0-100%)
3. Note any uncertainties or limitations

Be honest about what you don't know.";

/// A named prompt-construction approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStrategy {
    /// Chain-of-thought with explicit reasoning steps
    StructuredReasoning,
    /// Minimal verbosity, direct answers
    ConciseGeneration,
    /// Answer plus a stated confidence level
    CalibratedUncertainty,
}

impl PromptStrategy {
    /// All built-in strategies
    pub const ALL: [PromptStrategy; 3] = [
        Self::StructuredReasoning,
        Self::ConciseGeneration,
        Self::CalibratedUncertainty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredReasoning => "structured_reasoning",
            Self::ConciseGeneration => "concise_generation",
            Self::CalibratedUncertainty => "calibrated_uncertainty",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::StructuredReasoning => "Use chain-of-thought and explicit reasoning steps",
            Self::ConciseGeneration => "Minimal verbosity, direct answers",
            Self::CalibratedUncertainty => "Express confidence levels and uncertainty",
        }
    }

    /// Multiplier applied to a subnet's token ceiling
    pub fn token_multiplier(&self) -> f64 {
        match self {
            Self::StructuredReasoning => 1.2,
            Self::ConciseGeneration => 0.8,
            Self::CalibratedUncertainty => 1.0,
        }
    }

    /// Task kinds this strategy suits
    pub fn best_for(&self) -> &'static [&'static str] {
        match self {
            Self::StructuredReasoning => &["evaluation", "ranking", "complex_generation"],
            Self::ConciseGeneration => &["fast_generation"],
            Self::CalibratedUncertainty => &["scoring", "ranking", "confidence_calibration"],
        }
    }

    fn builtin_template(&self) -> &'static str {
        match self {
            Self::StructuredReasoning => STRUCTURED_REASONING_TEMPLATE,
            Self::ConciseGeneration => CONCISE_GENERATION_TEMPLATE,
            Self::CalibratedUncertainty => CALIBRATED_UNCERTAINTY_TEMPLATE,
        }
    }
}

impl std::fmt::Display for PromptStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PromptStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured_reasoning" => Ok(Self::StructuredReasoning),
            "concise_generation" => Ok(Self::ConciseGeneration),
            "calibrated_uncertainty" => Ok(Self::CalibratedUncertainty),
            _ => Err(format!("Unknown prompt strategy: {}", s)),
        }
    }
}

/// Catalog of prompt templates with optional operator overrides
#[derive(Debug, Clone, Default)]
pub struct StrategyCatalog {
    custom_templates: HashMap<PromptStrategy, String>,
}

impl StrategyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with overrides keyed by strategy name
    ///
    /// Names that match no strategy are logged and skipped.
    pub fn from_templates(templates: &BTreeMap<String, String>) -> Self {
        let mut catalog = Self::new();
        for (name, template) in templates {
            match name.parse::<PromptStrategy>() {
                Ok(strategy) => catalog.set_custom_template(strategy, template.clone()),
                Err(e) => warn!(error = %e, "Ignoring custom template"),
            }
        }
        catalog
    }

    /// Override the template for a strategy
    ///
    /// Templates without a `{task_content}` placeholder get the task appended.
    pub fn set_custom_template(&mut self, strategy: PromptStrategy, template: impl Into<String>) {
        let template = template.into();
        if !template.contains(TASK_PLACEHOLDER) {
            warn!(strategy = %strategy, "Custom template has no {{task_content}} placeholder");
        }
        self.custom_templates.insert(strategy, template);
        info!(strategy = %strategy, "Registered custom template");
    }

    /// Template for a strategy, preferring a custom override
    pub fn template(&self, strategy: PromptStrategy) -> &str {
        self.custom_templates
            .get(&strategy)
            .map(String::as_str)
            .unwrap_or_else(|| strategy.builtin_template())
    }

    /// Build the prompt for a task
    pub fn apply(&self, strategy: PromptStrategy, task_content: &str) -> String {
        let template = self.template(strategy);
        if template.contains(TASK_PLACEHOLDER) {
            template.replace(TASK_PLACEHOLDER, task_content)
        } else {
            format!("{}\n\n{}", template, task_content)
        }
    }

    /// Whether a strategy has an operator override
    pub fn is_customized(&self, strategy: PromptStrategy) -> bool {
        self.custom_templates.contains_key(&strategy)
    }
}
