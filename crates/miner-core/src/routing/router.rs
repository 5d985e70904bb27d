//! Model Router - budget-aware model and strategy selection
//!
//! Routing is a pure function of the task classification, the subnet policy
//! and the ledger's remaining tokens. It never fails: unknown model families
//! fall back to a configured provider.

use tracing::{debug, warn};

use super::types::{
    Classification, ModelSelection, Provider, ReasoningDepth, RoutingDecision, TaskType,
};
use crate::budget::BudgetLedger;
use crate::config::{RoutingConfig, SubnetPolicy};
use crate::strategy::PromptStrategy;

/// Share of the remaining budget a capped task may take
const REMAINING_BUDGET_SHARE: f64 = 0.9;

/// Model Router
#[derive(Debug, Clone)]
pub struct Router {
    config: RoutingConfig,
    fallback_provider: Provider,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

impl Router {
    /// Create a router from routing configuration
    pub fn new(config: RoutingConfig) -> Self {
        let fallback_provider = config.fallback_provider.parse().unwrap_or_else(|e: String| {
            warn!(error = %e, "Invalid fallback provider, using openai");
            Provider::Openai
        });
        Self {
            config,
            fallback_provider,
        }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Select the model target for a task
    ///
    /// Priority order: complex reasoning takes the highest-capability model;
    /// otherwise simple generation takes the fastest model; otherwise the
    /// subnet's preferred model.
    pub fn select(
        &self,
        task_type: TaskType,
        reasoning_depth: ReasoningDepth,
        policy: &SubnetPolicy,
    ) -> ModelSelection {
        let model = if reasoning_depth == ReasoningDepth::Complex {
            self.config.complex_model.clone()
        } else if task_type == TaskType::Generation && reasoning_depth == ReasoningDepth::Simple {
            self.config.fast_model.clone()
        } else {
            policy.preferred_llm.clone()
        };

        let provider = self.provider_for_model(&model);
        debug!(
            model = %model,
            provider = %provider,
            task_type = %task_type,
            reasoning_depth = %reasoning_depth,
            "Selected model"
        );

        ModelSelection {
            model,
            provider,
            max_tokens: policy.max_tokens_per_task,
            temperature: self.config.temperature,
        }
    }

    /// Provider for a model name, falling back when no family matches
    pub fn provider_for_model(&self, model: &str) -> Provider {
        Provider::for_model(model).unwrap_or_else(|| {
            warn!(
                model,
                fallback = %self.fallback_provider,
                "Model matches no known provider family, using fallback"
            );
            self.fallback_provider
        })
    }

    /// Prompt strategy for a task
    pub fn strategy_for(&self, task_type: TaskType, reasoning_depth: ReasoningDepth) -> PromptStrategy {
        match (task_type, reasoning_depth) {
            (TaskType::Evaluation | TaskType::Ranking, _) => PromptStrategy::StructuredReasoning,
            (TaskType::Generation, ReasoningDepth::Complex) => PromptStrategy::StructuredReasoning,
            (TaskType::Generation, _) => PromptStrategy::ConciseGeneration,
        }
    }

    /// Tokens a task may spend
    ///
    /// The subnet ceiling scaled by the strategy multiplier, capped to 90% of
    /// the provider's remaining tokens when that is smaller.
    pub fn allocate_tokens(&self, max_tokens: u32, multiplier: f64, remaining: u64) -> u64 {
        let want = (max_tokens as f64 * multiplier.max(0.0)).ceil() as u64;
        if remaining < want {
            let capped = (remaining as f64 * REMAINING_BUDGET_SHARE).floor() as u64;
            debug!(want, remaining, capped, "Allocation capped by remaining budget");
            capped
        } else {
            want
        }
    }

    /// Compose selection, strategy and allocation for a classified task
    pub fn route(
        &self,
        classification: &Classification,
        policy: &SubnetPolicy,
        ledger: &BudgetLedger,
    ) -> RoutingDecision {
        let selection = self.select(
            classification.task_type,
            classification.reasoning_depth,
            policy,
        );
        let strategy = self.strategy_for(classification.task_type, classification.reasoning_depth);
        let remaining = ledger.remaining(selection.provider.as_str());
        let allocated = self.allocate_tokens(
            selection.max_tokens,
            strategy.token_multiplier(),
            remaining,
        );

        RoutingDecision::new(selection, strategy, allocated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetAccount;

    fn policy() -> SubnetPolicy {
        SubnetPolicy::default()
            .with_preferred_llm("openai-gpt4")
            .with_max_tokens(1500)
    }

    #[test]
    fn test_complex_takes_priority() {
        let router = Router::default();
        for task_type in [TaskType::Generation, TaskType::Evaluation, TaskType::Ranking] {
            let selection = router.select(task_type, ReasoningDepth::Complex, &policy());
            assert_eq!(selection.model, "claude-sonnet");
            assert_eq!(selection.provider, Provider::Anthropic);
        }
    }

    #[test]
    fn test_simple_generation_takes_fast_model() {
        let router = Router::default();
        let selection = router.select(TaskType::Generation, ReasoningDepth::Simple, &policy());
        assert_eq!(selection.model, "gemini-pro");
        assert_eq!(selection.provider, Provider::Google);
    }

    #[test]
    fn test_otherwise_preferred_model() {
        let router = Router::default();
        let selection = router.select(TaskType::Evaluation, ReasoningDepth::Simple, &policy());
        assert_eq!(selection.model, "openai-gpt4");
        assert_eq!(selection.provider, Provider::Openai);
        assert_eq!(selection.max_tokens, 1500);
        assert!((selection.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unknown_model_uses_fallback_provider() {
        let router = Router::new(RoutingConfig {
            fallback_provider: "google".to_string(),
            ..Default::default()
        });
        let policy = SubnetPolicy::default().with_preferred_llm("llama-3-70b");
        let selection = router.select(TaskType::Ranking, ReasoningDepth::Medium, &policy);
        assert_eq!(selection.model, "llama-3-70b");
        assert_eq!(selection.provider, Provider::Google);
    }

    #[test]
    fn test_invalid_fallback_provider_defaults_to_openai() {
        let router = Router::new(RoutingConfig {
            fallback_provider: "mistral".to_string(),
            ..Default::default()
        });
        assert_eq!(router.provider_for_model("local-model"), Provider::Openai);
    }

    #[test]
    fn test_strategy_mapping() {
        let router = Router::default();
        assert_eq!(
            router.strategy_for(TaskType::Ranking, ReasoningDepth::Simple),
            PromptStrategy::StructuredReasoning
        );
        assert_eq!(
            router.strategy_for(TaskType::Generation, ReasoningDepth::Complex),
            PromptStrategy::StructuredReasoning
        );
        assert_eq!(
            router.strategy_for(TaskType::Generation, ReasoningDepth::Medium),
            PromptStrategy::ConciseGeneration
        );
    }

    #[test]
    fn test_allocate_tokens() {
        let router = Router::default();
        assert_eq!(router.allocate_tokens(1000, 1.2, 100_000), 1200);
        assert_eq!(router.allocate_tokens(1000, 0.8, 100_000), 800);
        assert_eq!(router.allocate_tokens(1000, 1.0, 1000), 1000);
        assert_eq!(router.allocate_tokens(1000, 1.0, 500), 450);
        assert_eq!(router.allocate_tokens(1000, 1.0, 0), 0);
    }

    #[test]
    fn test_route_composes_decision() {
        let router = Router::default();
        let ledger = BudgetLedger::in_memory()
            .with_account("anthropic", BudgetAccount::new(1_000_000, 0));
        let classification = Classification::new(TaskType::Evaluation, ReasoningDepth::Complex);

        let decision = router.route(&classification, &policy(), &ledger);
        assert_eq!(decision.model, "claude-sonnet");
        assert_eq!(decision.provider, Provider::Anthropic);
        assert_eq!(decision.strategy, PromptStrategy::StructuredReasoning);
        assert_eq!(decision.allocated_tokens, 1800);
    }

    #[test]
    fn test_route_caps_to_remaining_budget() {
        let router = Router::default();
        let ledger = BudgetLedger::in_memory().with_account(
            "openai",
            BudgetAccount {
                monthly_allowance: 1000,
                used_this_month: 900,
                daily_limit: 0,
            },
        );
        let classification = Classification::new(TaskType::Ranking, ReasoningDepth::Medium);

        let decision = router.route(&classification, &policy(), &ledger);
        assert_eq!(decision.provider, Provider::Openai);
        assert_eq!(decision.allocated_tokens, 90);
    }
}
